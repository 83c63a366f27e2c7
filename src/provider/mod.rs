use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::ProviderKind;
use crate::config::Config;
use crate::errors::DprError;
use crate::wire::LlmRequest;

pub mod anthropic;
pub mod ollama;
pub mod openai;

/// Prompt in, text out. Adapters do not retry and do not interpret the text.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, req: &LlmRequest) -> Result<String, DprError>;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

#[async_trait]
impl<P: Provider + ?Sized> Provider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, req: &LlmRequest) -> Result<String, DprError> {
        (**self).complete(req).await
    }
}

/// Run one completion, giving up as soon as `cancel` fires.
pub async fn complete_cancellable(
    provider: &(dyn Provider + Send + Sync),
    req: &LlmRequest,
    cancel: &CancellationToken,
) -> Result<String, DprError> {
    if cancel.is_cancelled() {
        return Err(DprError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(stage = %req.stage, provider = provider.name(), "provider call cancelled");
            Err(DprError::Cancelled)
        }
        res = provider.complete(req) => res,
    }
}

pub(crate) fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client, DprError> {
    let mut b = reqwest::Client::builder();
    if let Some(t) = timeout {
        b = b.timeout(t);
    }
    b.build().map_err(|e| DprError::Provider(format!("http client: {e}")))
}

fn api_key(var: &str) -> Result<String, DprError> {
    std::env::var(var).map_err(|_| DprError::Config(format!("{var} env var is not set")))
}

pub fn make_provider(cfg: &Config) -> Result<DynProvider, DprError> {
    let timeout = cfg.timeout();
    match cfg.provider {
        ProviderKind::OpenAI => Ok(Box::new(openai::OpenAiCompatible::openai(
            cfg.model_name(),
            api_key("OPENAI_API_KEY")?,
            cfg.api_base.clone(),
            timeout,
        )?)),
        ProviderKind::Sarvam => Ok(Box::new(openai::OpenAiCompatible::sarvam(
            cfg.model_name(),
            api_key("SARVAM_API_KEY")?,
            cfg.api_base.clone(),
            timeout,
        )?)),
        ProviderKind::Anthropic => Ok(Box::new(anthropic::Anthropic::new(
            cfg.model_name(),
            api_key("ANTHROPIC_API_KEY")?,
            cfg.api_base.clone(),
            timeout,
        )?)),
        ProviderKind::Ollama => Ok(Box::new(ollama::Ollama::new(
            cfg.model_name(),
            cfg.api_base.clone(),
            timeout,
        )?)),
    }
}
