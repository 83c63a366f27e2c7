use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{Args, ProviderKind};
use crate::errors::DprError;
use crate::model::ChapterList;
use crate::placeholder::{Placeholders, DEFAULT_PREFIX};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    /// Falls back to the provider's default model.
    pub model: Option<String>,
    pub api_base: Option<String>,
    /// Per-call timeout; 0 disables it and leaves only cancellation.
    pub timeout_secs: u64,
    pub temperature: f32,
    /// Directory for the progress database and saved artifacts.
    pub root: String,
    pub db_path: Option<String>,
    pub placeholder_prefix: String,
    pub chapters: ChapterList,
    pub save_request: bool,
    pub save_response: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAI,
            model: None,
            api_base: None,
            timeout_secs: 300,
            temperature: 0.6,
            root: ".".into(),
            db_path: None,
            placeholder_prefix: DEFAULT_PREFIX.into(),
            chapters: ChapterList::dpr_default(),
            save_request: false,
            save_response: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, DprError> {
        toml::from_str(s).map_err(|e| DprError::Config(e.to_string()))
    }

    /// Defaults, overlaid by the TOML file when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, DprError> {
        match path {
            None => Ok(Self::default()),
            Some(p) => {
                let s = fs::read_to_string(p)
                    .map_err(|e| DprError::Config(format!("reading {}: {e}", p.display())))?;
                let cfg = Self::from_toml_str(&s)?;
                tracing::debug!(path = %p.display(), "loaded config file");
                Ok(cfg)
            }
        }
    }

    /// CLI flags win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(p) = &args.provider {
            self.provider = p.clone();
        }
        if let Some(m) = &args.model {
            self.model = Some(m.clone());
        }
        if let Some(t) = args.timeout_secs {
            self.timeout_secs = t;
        }
        if let Some(r) = &args.root {
            self.root = r.clone();
        }
        if let Some(db) = &args.db {
            self.db_path = Some(db.clone());
        }
        self.save_request |= args.save_request;
        self.save_response |= args.save_response;
    }

    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.db_path {
            Some(p) => PathBuf::from(p),
            None => Path::new(&self.root).join(".finbox").join("progress.db"),
        }
    }

    pub fn placeholders(&self) -> Result<Placeholders, DprError> {
        Placeholders::new(&self.placeholder_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.chapters.len(), 13);
        assert_eq!(cfg.placeholder_prefix, "VAR");
        assert_eq!(cfg.model_name(), "gpt-4.1-mini");
        assert_eq!(cfg.database_path(), Path::new(".").join(".finbox").join("progress.db"));
    }

    #[test]
    fn file_overrides_fields() {
        let cfg = Config::from_toml_str(
            r#"
provider = "sarvam"
timeout_secs = 0
placeholder_prefix = "TOKEN"
chapters = ["Executive Summary", "Market Analysis"]
db_path = "/tmp/x.db"
"#,
        )
        .unwrap();
        assert!(matches!(cfg.provider, ProviderKind::Sarvam));
        assert_eq!(cfg.model_name(), "sarvam-m");
        assert!(cfg.timeout().is_none());
        assert_eq!(cfg.chapters.title(1), Some("Market Analysis"));
        assert_eq!(cfg.database_path(), PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.placeholders().unwrap().token("k"), "TOKEN{k}");
    }

    #[test]
    fn invalid_chapter_list_is_config_error() {
        let err = Config::from_toml_str("chapters = []").unwrap_err();
        assert!(matches!(err, DprError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("finbox.toml");
        fs::write(&p, "temperature = 0.2\n").unwrap();
        let cfg = Config::load(Some(&p)).unwrap();
        assert!((cfg.temperature - 0.2).abs() < f32::EPSILON);
    }
}
