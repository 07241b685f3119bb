use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Handshake credential missing, malformed, expired or for an unknown account.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Persistence(String),

    #[error("not found: {0}")]
    Lookup(String),
}

impl GatewayError {
    /// Text sent to the client in `message_error`. Store internals stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Persistence(_) => "Failed to complete request, please retry".to_string(),
            GatewayError::Authentication(_) => "Authentication error".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn store(err: anyhow::Error) -> Self {
        GatewayError::Persistence(format!("{err:#}"))
    }
}
