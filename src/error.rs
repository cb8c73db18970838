//! Error types shared by the backend seam, actions and watchers

use std::time::Duration;

/// Result type for client operations
pub type KiadisaResult<T> = Result<T, KiadisaError>;

/// Errors that can occur while talking to the hosted backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KiadisaError {
    #[error("User not signed in")]
    NotAuthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Game has already started")]
    GameAlreadyStarted,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Response parsing failed: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse error taxonomy used for notices and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    NotFound,
    Authorization,
    Network,
    Validation,
    Backend,
}

/// Message fragments the hosted backend and browsers use for transport failures
const NETWORK_SIGNATURES: &[&str] = &["Failed to fetch", "NetworkError", "Network request failed"];

impl KiadisaError {
    /// Build an error from raw backend text, recognizing transport failures
    pub fn from_backend_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if NETWORK_SIGNATURES.iter().any(|sig| message.contains(sig)) {
            Self::Network(message)
        } else {
            Self::Backend(message)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated => ErrorKind::Authentication,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::Network(_) | Self::Timeout(_) => ErrorKind::Network,
            Self::Validation(_) | Self::GameAlreadyStarted => ErrorKind::Validation,
            Self::Backend(_) | Self::Decode(_) | Self::Config(_) => ErrorKind::Backend,
        }
    }

    /// Whether a watcher should schedule another attempt after this error
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

impl From<reqwest::Error> for KiadisaError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            Self::Network(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Backend(e.to_string())
        }
    }
}

impl From<serde_json::Error> for KiadisaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_signature_is_recognized() {
        let err = KiadisaError::from_backend_message("TypeError: Failed to fetch");
        assert!(matches!(err, KiadisaError::Network(_)));
        assert!(err.is_retryable());

        let err = KiadisaError::from_backend_message("duplicate key value");
        assert!(matches!(err, KiadisaError::Backend(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable_and_mentions_timeout() {
        let err = KiadisaError::Timeout(Duration::from_secs(10));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Timeout"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(KiadisaError::NotAuthenticated.kind(), ErrorKind::Authentication);
        assert_eq!(
            KiadisaError::Unauthorized("host only".into()).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(KiadisaError::NotFound("Game".into()).kind(), ErrorKind::NotFound);
        assert_eq!(KiadisaError::GameAlreadyStarted.kind(), ErrorKind::Validation);
    }
}
