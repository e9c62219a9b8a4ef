//! Domain-specific error types for whos-next

use thiserror::Error;

/// Main error type for the whos-next client
#[derive(Error, Debug)]
pub enum WhosNextError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Transport failure during {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Validation rejected: {message}")]
    ValidationRejected { message: String },

    #[error("Recommendation quota exhausted: {message}")]
    QuotaExhausted { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification used by controllers to pick the user-visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or server unreachable, including timeouts and malformed replies
    TransportFailure,
    /// Valid request, no matching entity
    NotFound,
    /// Server declined the payload (bad override, unknown model)
    ValidationRejected,
    /// Metered call refused for lack of credits
    QuotaExhausted,
    /// Rejected on the client before any request left
    Local,
}

impl WhosNextError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WhosNextError::Transport { .. }
            | WhosNextError::Timeout { .. }
            | WhosNextError::Serialization { .. } => ErrorKind::TransportFailure,
            WhosNextError::NotFound { .. } => ErrorKind::NotFound,
            WhosNextError::ValidationRejected { .. } => ErrorKind::ValidationRejected,
            WhosNextError::QuotaExhausted { .. } => ErrorKind::QuotaExhausted,
            WhosNextError::Config { .. }
            | WhosNextError::InvalidParams { .. }
            | WhosNextError::Internal { .. } => ErrorKind::Local,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        WhosNextError::InvalidParams {
            message: message.into(),
        }
    }

    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        WhosNextError::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for WhosNextError {
    fn from(err: anyhow::Error) -> Self {
        WhosNextError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WhosNextError {
    fn from(err: serde_json::Error) -> Self {
        WhosNextError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for WhosNextError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return WhosNextError::Serialization {
                message: format!("Malformed response body: {}", err),
            };
        }
        WhosNextError::Transport {
            operation: "http request".to_string(),
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<csv::Error> for WhosNextError {
    fn from(err: csv::Error) -> Self {
        WhosNextError::Serialization {
            message: format!("CSV error: {}", err),
        }
    }
}

impl From<std::io::Error> for WhosNextError {
    fn from(err: std::io::Error) -> Self {
        WhosNextError::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<tokio::task::JoinError> for WhosNextError {
    fn from(err: tokio::task::JoinError) -> Self {
        WhosNextError::Internal {
            message: format!("request task failed: {}", err),
        }
    }
}

impl From<toml::de::Error> for WhosNextError {
    fn from(err: toml::de::Error) -> Self {
        WhosNextError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for whos-next operations
pub type Result<T> = std::result::Result<T, WhosNextError>;
