//! Error types for the Integration Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Label selector could not be parsed
    #[error("Invalid label selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// API discovery error
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] envconfig::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Error::Discovery(msg.into())
    }

    /// Create a selector parse error
    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// HTTP status code of the API response, if this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }

    /// The API server answered 404
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }

    /// The API server answered 403
    pub fn is_forbidden(&self) -> bool {
        self.status_code() == Some(403)
    }
}
