//! Structured Logging
//!
//! JSON events for log aggregation plus a pretty format for development.
//! Every request gets a correlation ID; redemption events carry a
//! fingerprint of the holder's claim, never the claim itself.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lnurlw::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! tracing::info!(target: "lnurlw::api", request_id = %id, "Serving challenge");
//! ```

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Redemption attempts and their outcome
    Redemption,
    /// Payment gateway calls
    Transfer,
    /// Security events (bad challenges, unknown slots, throttling)
    Security,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_filter().to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Log a security-related event
pub fn log_security_event(
    event_type: &str,
    success: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Security, event_type).with_data(
        serde_json::json!({
            "success": success,
            "details": details
        }),
    );

    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }

    if success {
        tracing::info!(target: "lnurlw::security", "{}", event.to_json());
    } else {
        tracing::warn!(target: "lnurlw::security", "{}", event.to_json());
    }
}

/// Log an API request
pub fn log_api_request(method: &str, path: &str, client_ip: Option<&str>, correlation_id: &str) {
    let event = LogEvent::new(
        LogLevel::Info,
        EventCategory::Api,
        format!("{} {}", method, path),
    )
    .with_correlation_id(correlation_id)
    .with_data(serde_json::json!({
        "method": method,
        "path": path,
        "client_ip": client_ip
    }));

    tracing::info!(target: "lnurlw::api", "{}", event.to_json());
}

/// Log an API response
pub fn log_api_response(
    method: &str,
    path: &str,
    status: u16,
    duration_ms: u64,
    correlation_id: &str,
) {
    let level = if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };

    let event = LogEvent::new(
        level,
        EventCategory::Api,
        format!("{} {} -> {}", method, path, status),
    )
    .with_correlation_id(correlation_id)
    .with_duration(duration_ms)
    .with_data(serde_json::json!({
        "method": method,
        "path": path,
        "status": status
    }));

    match level {
        LogLevel::Error => tracing::error!(target: "lnurlw::api", "{}", event.to_json()),
        LogLevel::Warn => tracing::warn!(target: "lnurlw::api", "{}", event.to_json()),
        _ => tracing::info!(target: "lnurlw::api", "{}", event.to_json()),
    }
}

/// Log a process lifecycle event (startup, shutdown)
pub fn log_system_event(event_type: &str, details: serde_json::Value) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::System, event_type).with_data(details);
    tracing::info!(target: "lnurlw::system", "{}", event.to_json());
}

/// Log the outcome of a redemption's transfer phase
pub fn log_redemption_event(
    event_type: &str,
    link_id: &str,
    used_count: u32,
    claim_fingerprint: &str,
    duration_ms: u64,
    error: Option<&str>,
) {
    let success = error.is_none();
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Redemption, event_type)
        .with_correlation_id(link_id)
        .with_duration(duration_ms)
        .with_data(serde_json::json!({
            "link_id": link_id,
            "used_count": used_count,
            "claim": claim_fingerprint,
            "success": success
        }));

    if let Some(err) = error {
        event = event.with_error("TRANSFER_FAILED", err);
    }

    if success {
        tracing::info!(target: "lnurlw::redemption", "{}", event.to_json());
    } else {
        tracing::error!(target: "lnurlw::redemption", "{}", event.to_json());
    }
}

/// Short stable fingerprint of a payment claim for log correlation
pub fn claim_fingerprint(claim: &str) -> String {
    let digest = Sha256::digest(claim.as_bytes());
    hex::encode(&digest[..8])
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_filter();
        EnvFilter::new(format!(
            "lnurlw={},lnurlw_api={},tower_http={},axum={}",
            level, level, level, level
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from the service configuration
///
/// Mainnet deployments log JSON; everything else logs pretty text.
pub fn init_from_config(config: &super::config::WithdrawConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    let json_format = config.network == super::config::Network::Mainnet;

    init_logging(level, json_format)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
