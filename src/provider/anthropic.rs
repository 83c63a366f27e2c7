use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{http_client, Provider};
use crate::errors::DprError;
use crate::wire::LlmRequest;

const DEFAULT_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct Anthropic {
    model: String,
    api_key: String,
    api_base: String,
    client: Client,
}

impl Anthropic {
    pub fn new(
        model: String,
        api_key: String,
        api_base: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, DprError> {
        Ok(Self {
            model,
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_BASE.to_string()),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Serialize)]
struct MsgRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
    system: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MsgResponse {
    content: Vec<Block>,
}

#[derive(Deserialize)]
struct Block {
    #[serde(default)]
    text: String,
    #[serde(default)]
    r#type: String,
}

pub(crate) fn parse_messages_content(body: &str) -> Result<String, DprError> {
    let parsed: MsgResponse = serde_json::from_str(body)
        .map_err(|e| DprError::Provider(format!("anthropic response parse error: {e}")))?;
    let text: String = parsed
        .content
        .into_iter()
        .filter(|b| b.r#type == "text")
        .map(|b| b.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(DprError::Provider("anthropic: empty content".into()));
    }
    Ok(text)
}

#[async_trait]
impl Provider for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, req: &LlmRequest) -> Result<String, DprError> {
        let url = format!("{}/v1/messages", self.api_base.trim_end_matches('/'));
        let body = MsgRequest {
            model: &self.model,
            max_tokens: 8192,
            messages: vec![Msg { role: "user", content: &req.user }],
            system: &req.system,
            temperature: req.temperature,
        };

        tracing::debug!(stage = %req.stage, url = %url, "POST anthropic messages");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(DprError::Provider(format!("anthropic API error ({status}): {text}")));
        }

        parse_messages_content(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"Part one. "},{"type":"tool_use"},{"type":"text","text":"Part two."}]}"#;
        assert_eq!(parse_messages_content(body).unwrap(), "Part one. Part two.");
    }

    #[test]
    fn no_text_is_error() {
        assert!(parse_messages_content(r#"{"content":[]}"#).is_err());
    }
}
