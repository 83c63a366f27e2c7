use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::DprError;
use crate::provider::Provider;
use crate::wire::LlmRequest;

#[derive(Debug, Clone, Default)]
pub struct SavedPaths {
    pub request: Option<PathBuf>,
    pub response: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ResponseRecord<'a> {
    request_id: Uuid,
    provider: &'a str,
    received_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn tx_dir(root: &Path, tx: Uuid) -> PathBuf {
    root.join(".finbox").join("tx").join(tx.to_string())
}

fn stem(req: &LlmRequest) -> String {
    let stage: String = req
        .stage
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{}.{}", stage, req.id.simple())
}

pub fn save_request(dir: &Path, req: &LlmRequest) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let p = dir.join(format!("{}.request.json", stem(req)));
    fs::write(&p, to_string_pretty(req)?)?;
    Ok(p)
}

pub fn save_response(
    dir: &Path,
    req: &LlmRequest,
    provider: &str,
    result: &Result<String, DprError>,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let record = ResponseRecord {
        request_id: req.id,
        provider,
        received_at: Utc::now(),
        text: result.as_ref().ok().map(String::as_str),
        error: result.as_ref().err().map(|e| e.to_string()),
    };
    let p = dir.join(format!("{}.response.json", stem(req)));
    fs::write(&p, to_string_pretty(&record)?)?;
    Ok(p)
}

/// Provider decorator that writes each request and raw response to the
/// transaction directory. Write failures are logged, never returned.
pub struct Recorder<P> {
    inner: P,
    dir: PathBuf,
    save_request: bool,
    save_response: bool,
}

impl<P: Provider> Recorder<P> {
    pub fn new(inner: P, root: &Path, tx: Uuid, save_request: bool, save_response: bool) -> Self {
        Self {
            inner,
            dir: tx_dir(root, tx),
            save_request,
            save_response,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl<P: Provider> Provider for Recorder<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, req: &LlmRequest) -> Result<String, DprError> {
        let mut saved = SavedPaths::default();
        if self.save_request {
            match save_request(&self.dir, req) {
                Ok(p) => saved.request = Some(p),
                Err(e) => tracing::warn!(error = %e, "could not save request artifact"),
            }
        }

        let result = self.inner.complete(req).await;

        if self.save_response {
            match save_response(&self.dir, req, self.inner.name(), &result) {
                Ok(p) => saved.response = Some(p),
                Err(e) => tracing::warn!(error = %e, "could not save response artifact"),
            }
        }
        tracing::debug!(stage = %req.stage, request = ?saved.request, response = ?saved.response, "artifacts");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _req: &LlmRequest) -> Result<String, DprError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn writes_request_and_response() {
        let root = tempfile::tempdir().unwrap();
        let tx = Uuid::new_v4();
        let rec = Recorder::new(Fixed("draft"), root.path(), tx, true, true);
        let req = LlmRequest::new("chapter.0", "sys", "user");
        assert_eq!(rec.complete(&req).await.unwrap(), "draft");

        let files: Vec<_> = fs::read_dir(rec.dir()).unwrap().collect();
        assert_eq!(files.len(), 2);
        let resp = fs::read_to_string(
            rec.dir().join(format!("chapter.0.{}.response.json", req.id.simple())),
        )
        .unwrap();
        assert!(resp.contains("\"text\": \"draft\""));
    }

    #[tokio::test]
    async fn nothing_written_when_disabled() {
        let root = tempfile::tempdir().unwrap();
        let rec = Recorder::new(Fixed("x"), root.path(), Uuid::new_v4(), false, false);
        rec.complete(&LlmRequest::new("s", "a", "b")).await.unwrap();
        assert!(!rec.dir().exists());
    }

    #[test]
    fn stage_is_sanitized_for_file_names() {
        let req = LlmRequest::new("chapter/3 draft", "", "");
        assert!(stem(&req).starts_with("chapter_3_draft."));
    }
}
