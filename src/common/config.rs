//! Environment-based Configuration
//!
//! All settings come from environment variables (a `.env` file is loaded
//! first by the binary). The gateway API key is a secret and is never
//! printed.
//!
//! # Environment Variables
//!
//! - `LNURLW_NETWORK` - "mainnet", "testnet" or "regtest" (default: "regtest")
//! - `LNURLW_PORT` - HTTP port (default: 3001)
//! - `LNURLW_PUBLIC_URL` - Base URL wallets reach us at (default: `http://localhost:{port}`)
//! - `LNURLW_DATABASE` - SQLite path, or ":memory:" (default: "./data/lnurlw.sqlite3")
//! - `LNURLW_GATEWAY_URL` - Wallet API base URL (default: "http://localhost:5000")
//! - `LNURLW_GATEWAY_KEY` - Wallet API admin key
//! - `LNURLW_TRANSFER_TIMEOUT_SECS` - Upper bound on one payment (default: 30)
//! - `LNURLW_RATE_LIMIT_PER_MIN` - Requests per client IP per minute (default: 120)
//! - `LNURLW_TRUST_PROXY_HEADERS` - Key throttling on X-Forwarded-For / X-Real-IP;
//!   only set behind a reverse proxy that overwrites them (default: false)
//! - `LNURLW_LOG_LEVEL` - Logging level (default: "info")

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DATABASE: &str = "./data/lnurlw.sqlite3";
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("not allowed on {0}: {1}")]
    NotAllowed(String, String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" | "dev" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "LNURLW_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct WithdrawConfig {
    pub network: Network,
    pub port: u16,
    /// Base of every callback URL handed to wallets
    pub public_url: String,
    /// SQLite path or ":memory:"
    pub database: String,
    pub gateway_url: String,
    pub gateway_key: String,
    pub transfer_timeout: Duration,
    /// Requests per client IP per minute; 0 disables throttling
    pub rate_limit_per_min: u32,
    /// Take the client IP from proxy headers instead of the socket peer
    pub trust_proxy_headers: bool,
    pub log_level: String,
}

impl WithdrawConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network: Network = lookup("LNURLW_NETWORK")
            .unwrap_or_else(|| "regtest".to_string())
            .parse()?;

        let port = parse_or("LNURLW_PORT", lookup("LNURLW_PORT"), DEFAULT_PORT)?;

        let public_url = lookup("LNURLW_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let database = lookup("LNURLW_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let gateway_url = lookup("LNURLW_GATEWAY_URL")
            .unwrap_or_else(|| "http://localhost:5000".to_string());
        let gateway_key = lookup("LNURLW_GATEWAY_KEY").unwrap_or_default();

        let timeout_secs: u64 = parse_or(
            "LNURLW_TRANSFER_TIMEOUT_SECS",
            lookup("LNURLW_TRANSFER_TIMEOUT_SECS"),
            30,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "LNURLW_TRANSFER_TIMEOUT_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let rate_limit_per_min = parse_or(
            "LNURLW_RATE_LIMIT_PER_MIN",
            lookup("LNURLW_RATE_LIMIT_PER_MIN"),
            120,
        )?;

        let trust_proxy_headers = parse_or(
            "LNURLW_TRUST_PROXY_HEADERS",
            lookup("LNURLW_TRUST_PROXY_HEADERS"),
            false,
        )?;

        let log_level = lookup("LNURLW_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            network,
            port,
            public_url,
            database,
            gateway_url,
            gateway_key,
            transfer_timeout: Duration::from_secs(timeout_secs),
            rate_limit_per_min,
            trust_proxy_headers,
            log_level,
        })
    }

    /// Whether the link store lives only in process memory
    pub fn uses_memory_store(&self) -> bool {
        self.database == IN_MEMORY_DATABASE
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Ok(());
        }

        if !self.public_url.starts_with("https://") {
            return Err(ConfigError::NotAllowed(
                "mainnet".to_string(),
                "LNURLW_PUBLIC_URL must use https".to_string(),
            ));
        }

        if self.uses_memory_store() {
            return Err(ConfigError::NotAllowed(
                "mainnet".to_string(),
                "in-memory link store loses state on restart".to_string(),
            ));
        }

        if self.gateway_key.is_empty() {
            return Err(ConfigError::MissingEnvVar("LNURLW_GATEWAY_KEY".to_string()));
        }

        Ok(())
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== LNURL-withdraw Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Port: {}", self.port);
        println!("Public URL: {}", self.public_url);
        println!("Database: {}", self.database);
        println!("Gateway: {}", self.gateway_url);
        println!(
            "Gateway Key: {}",
            if self.gateway_key.is_empty() { "(not set)" } else { "****" }
        );
        println!("Transfer Timeout: {}s", self.transfer_timeout.as_secs());
        println!("Rate Limit: {}/min", self.rate_limit_per_min);
        println!("Trust Proxy Headers: {}", self.trust_proxy_headers);
        println!("Log Level: {}", self.log_level);
        println!("====================================");
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(name.to_string(), format!("cannot parse {:?}", value))
        }),
        None => Ok(default),
    }
}
