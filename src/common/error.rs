//! Common Error Types
//!
//! Provides unified error handling across all modules.

use thiserror::Error;

use crate::storage::StorageError;
use crate::withdraw::{LookupError, WithdrawError};

/// Root error type for the service
#[derive(Debug, Error)]
pub enum LnurlwError {
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("redemption error: {0}")]
    Withdraw(#[from] WithdrawError),

    /// Invalid link parameters or input
    #[error("validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LnurlwError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            LnurlwError::Storage(StorageError::Connection(_)) | LnurlwError::Io(_) => true,
            LnurlwError::Withdraw(e) => matches!(
                e,
                WithdrawError::Conflict | WithdrawError::RateLimited { .. }
            ),
            _ => false,
        }
    }

    /// Get error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            LnurlwError::Config(_) => "CONFIG_ERROR",
            LnurlwError::Logging(_) => "LOGGING_ERROR",
            LnurlwError::Storage(_) => "STORAGE_ERROR",
            LnurlwError::Lookup(LookupError::NotFound) => "NOT_FOUND",
            LnurlwError::Lookup(LookupError::Spent) => "ALREADY_REDEEMED",
            LnurlwError::Lookup(LookupError::Storage(_)) => "STORAGE_ERROR",
            LnurlwError::Withdraw(e) => e.code(),
            LnurlwError::Validation(_) => "VALIDATION_ERROR",
            LnurlwError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using LnurlwError
pub type Result<T> = std::result::Result<T, LnurlwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LnurlwError::validation("max below min");
        assert!(err.to_string().contains("max below min"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_wrapped_error_codes() {
        let err: LnurlwError = WithdrawError::AlreadyRedeemed.into();
        assert_eq!(err.error_code(), "ALREADY_REDEEMED");

        let err: LnurlwError = LookupError::Spent.into();
        assert_eq!(err.error_code(), "ALREADY_REDEEMED");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LnurlwError::from(WithdrawError::Conflict).is_retryable());
        assert!(LnurlwError::from(StorageError::Connection("pool".into())).is_retryable());
        assert!(!LnurlwError::from(WithdrawError::InvalidChallenge).is_retryable());
        assert!(!LnurlwError::validation("bad").is_retryable());
    }
}
