use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    /// The exchange answered but rejected the request. The raw body is kept
    /// so callers can inspect what came back.
    #[error("Business error: {code} - {message}")]
    BusinessError {
        code: i64,
        message: String,
        body: Value,
    },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    /// Whether a caller may reasonably try the same request again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::ConnectionTimeout(_))
    }

    /// Response body attached to a business rejection, if any.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::BusinessError { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::ConnectionTimeout(format!("Request timed out: {}", e))
        } else {
            Self::NetworkError(format!("Request failed: {}", e))
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        Self::ProtocolError(format!("Malformed JSON: {}", e))
    }
}
