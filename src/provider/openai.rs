use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{http_client, Provider};
use crate::errors::DprError;
use crate::wire::LlmRequest;

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const SARVAM_BASE: &str = "https://api.sarvam.ai/v1";

enum Auth {
    Bearer(String),
    Header(&'static str, String),
}

/// Chat-completions adapter for OpenAI and for OpenAI-compatible services
/// (SarvamAI) that differ only in base URL and auth header.
pub struct OpenAiCompatible {
    name: &'static str,
    model: String,
    base_url: String,
    auth: Auth,
    client: Client,
    supports_json_mode: bool,
}

impl OpenAiCompatible {
    pub fn openai(
        model: String,
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, DprError> {
        Ok(Self {
            name: "openai",
            model,
            base_url: base_url.unwrap_or_else(|| OPENAI_BASE.to_string()),
            auth: Auth::Bearer(api_key),
            client: http_client(timeout)?,
            supports_json_mode: true,
        })
    }

    pub fn sarvam(
        model: String,
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, DprError> {
        Ok(Self {
            name: "sarvam",
            model,
            base_url: base_url.unwrap_or_else(|| SARVAM_BASE.to_string()),
            auth: Auth::Header("API-Subscription-Key", api_key),
            client: http_client(timeout)?,
            supports_json_mode: false,
        })
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// Pull the first choice's text out of a chat-completions body.
pub(crate) fn parse_chat_content(body: &str) -> Result<String, DprError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| DprError::Provider(format!("failed to parse chat response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| DprError::Provider("chat response had no content".into()))
}

#[async_trait]
impl Provider for OpenAiCompatible {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, req: &LlmRequest) -> Result<String, DprError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": req.user }
            ],
        });
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if req.json_mode && self.supports_json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        tracing::debug!(provider = self.name, stage = %req.stage, url = %url, prompt_chars = req.user.len(), "POST chat completion");

        let builder = self.client.post(&url).json(&body);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::Header(name, key) => builder.header(*name, key),
        };

        let resp = builder.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            tracing::warn!(provider = self.name, %status, body = %text, "provider returned an error status");
            return Err(DprError::Provider(format!("{} API error ({}): {}", self.name, status, text)));
        }

        parse_chat_content(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello"}},{"message":{"content":"x"}}]}"#;
        assert_eq!(parse_chat_content(body).unwrap(), "Hello");
    }

    #[test]
    fn empty_choices_is_provider_error() {
        assert!(matches!(parse_chat_content(r#"{"choices":[]}"#), Err(DprError::Provider(_))));
    }

    #[test]
    fn null_content_is_provider_error() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(matches!(parse_chat_content(body), Err(DprError::Provider(_))));
    }

    #[test]
    fn non_json_body_is_provider_error() {
        assert!(matches!(parse_chat_content("<html>502</html>"), Err(DprError::Provider(_))));
    }
}
