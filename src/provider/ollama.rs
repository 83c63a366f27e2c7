use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{http_client, Provider};
use crate::errors::DprError;
use crate::wire::LlmRequest;

const DEFAULT_URL: &str = "http://localhost:11434";

pub struct Ollama {
    model: String,
    url: String,
    client: Client,
}

impl Ollama {
    pub fn new(model: String, url: Option<String>, timeout: Option<Duration>) -> Result<Self, DprError> {
        Ok(Self {
            model,
            url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: String,
}

#[async_trait]
impl Provider for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, req: &LlmRequest) -> Result<String, DprError> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                Msg { role: "system", content: &req.system },
                Msg { role: "user", content: &req.user },
            ],
            stream: false,
            format: req.json_mode.then_some("json"),
            options: OllamaOptions { temperature: req.temperature.unwrap_or(0.7) },
        };

        tracing::debug!(stage = %req.stage, url = %url, "POST ollama chat");

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(DprError::Provider(format!("ollama error ({status}): {text}")));
        }

        // Some proxies return the bare content instead of the chat envelope.
        let content = match serde_json::from_str::<ChatResponse>(&text) {
            Ok(c) => c.message.content,
            Err(_) => text,
        };
        if content.trim().is_empty() {
            return Err(DprError::Provider("ollama: empty content".into()));
        }
        Ok(content)
    }
}
