use thiserror::Error;

#[derive(Error, Debug)]
pub enum DprError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("malformed model output ({} bytes)", raw.len())]
    MalformedModelOutput { raw: String },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(String),
}

impl DprError {
    pub fn malformed(raw: impl Into<String>) -> Self {
        DprError::MalformedModelOutput { raw: raw.into() }
    }

    /// Message suitable for showing to the person driving the wizard.
    pub fn user_message(&self) -> String {
        match self {
            DprError::Provider(msg) => format!("The AI provider failed: {msg}"),
            DprError::MalformedModelOutput { .. } => {
                "The AI returned a response we could not read. Please try again.".to_string()
            }
            DprError::Persistence(msg) => {
                format!("Could not save your progress ({msg}). Your draft is kept; try again.")
            }
            DprError::InvalidState(msg) => msg.clone(),
            DprError::Cancelled => "The request was cancelled.".to_string(),
            DprError::Config(msg) => format!("Configuration problem: {msg}"),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, DprError::InvalidState(_) | DprError::Config(_))
    }
}

impl From<rusqlite::Error> for DprError {
    fn from(e: rusqlite::Error) -> Self {
        DprError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for DprError {
    fn from(e: reqwest::Error) -> Self {
        DprError::Provider(e.to_string())
    }
}
