//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the LNURL-withdraw service.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, Network, WithdrawConfig};
pub use error::{LnurlwError, Result};
pub use logging::{
    claim_fingerprint, generate_correlation_id, init_from_config, init_logging, log_api_request,
    log_api_response, log_redemption_event, log_security_event, log_system_event, ErrorDetails,
    EventCategory, LogEvent, LogLevel, LoggingError,
};
