//! API Middleware - Rate Limiting, Request Logging, Security Headers
//!
//! - Per-client request budget (429 once exhausted)
//! - Correlation ID per request, logged on the way in and out
//! - Security headers on every response

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::common::logging::{
    generate_correlation_id, log_api_request, log_api_response, log_security_event,
};

/// Response header carrying the correlation ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window; 0 disables limiting
    pub max_requests: u32,
    pub window: Duration,
    /// Extra requests allowed temporarily
    pub burst: u32,
    /// Key clients by X-Forwarded-For / X-Real-IP; only safe behind a proxy that sets them
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(120)
    }
}

impl RateLimitConfig {
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            burst: max_requests / 5,
            trust_proxy_headers: false,
        }
    }

    pub fn trusting_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.max_requests == 0
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    burst_tokens: u32,
}

/// In-memory rate limiter keyed by client IP
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed for the given client ID
    pub async fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        if self.config.is_disabled() {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        let now = Instant::now();

        let entry = entries
            .entry(client_id.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
                burst_tokens: self.config.burst,
            });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
            // Burst refills slowly
            entry.burst_tokens = self.config.burst.min(entry.burst_tokens + 5);
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else if entry.burst_tokens > 0 {
            entry.burst_tokens -= 1;
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = self
                .config
                .window
                .as_secs()
                .saturating_sub(now.duration_since(entry.window_start).as_secs())
                .max(1);
            Err(RateLimitError::Exceeded { retry_after })
        }
    }

    /// Drop entries idle for two windows
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expiry = self.config.window * 2;

        entries.retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.entries.read().await.len()
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Key a request is throttled under
    pub fn client_key(&self, request: &Request) -> String {
        client_id(request, self.config.trust_proxy_headers)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RateLimitError {
    Exceeded { retry_after: u64 },
}

/// Shared rate limiter state
pub type RateLimitState = Arc<RateLimiter>;

pub fn create_rate_limiter(per_minute: u32, trust_proxy_headers: bool) -> RateLimitState {
    Arc::new(RateLimiter::new(
        RateLimitConfig::per_minute(per_minute).trusting_proxy_headers(trust_proxy_headers),
    ))
}

/// Extract client IP from proxy headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            // First hop is the original client
            return Some(value.split(',').next()?.trim().to_string());
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.to_string());
        }
    }

    None
}

/// Client IP of a request; proxy headers are client-controlled unless a proxy rewrites them
fn client_id(request: &Request, trust_proxy_headers: bool) -> String {
    let forwarded = if trust_proxy_headers {
        extract_client_ip(request.headers())
    } else {
        None
    };

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Throttled response body
#[derive(Debug, Serialize)]
pub struct RateLimitedBody {
    pub status: &'static str,
    pub reason: String,
    pub retry_after: u64,
}

impl IntoResponse for RateLimitedBody {
    fn into_response(self) -> Response {
        let retry_after = HeaderValue::from(self.retry_after);
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response();
        response.headers_mut().insert("retry-after", retry_after);
        response
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitedBody> {
    let client = rate_limiter.client_key(&request);

    match rate_limiter.check(&client).await {
        Ok(()) => Ok(next.run(request).await),
        Err(RateLimitError::Exceeded { retry_after }) => {
            log_security_event(
                "rate_limited",
                false,
                serde_json::json!({ "client_ip": client, "path": request.uri().path() }),
                None,
            );
            Err(RateLimitedBody {
                status: "ERROR",
                reason: "Too many requests.".to_string(),
                retry_after,
            })
        }
    }
}

// ============================================================================
// Request Logging
// ============================================================================

/// Assign a correlation ID and log request and response
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let correlation_id = generate_correlation_id();
    let method = request.method().to_string();
    // Query strings carry k1 and the claim; keep them out of logs
    let path = request.uri().path().to_string();
    let client = client_id(&request, false);
    let started = Instant::now();

    log_api_request(&method, &path, Some(&client), &correlation_id);

    let mut response = next.run(request).await;

    log_api_response(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_millis() as u64,
        &correlation_id,
    );

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

// ============================================================================
// Security Headers
// ============================================================================

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(60),
            burst: 1,
            trust_proxy_headers: false,
        });

        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());
        assert!(limiter.check("client1").await.is_ok());

        // 4th uses burst
        assert!(limiter.check("client1").await.is_ok());

        match limiter.check("client1").await {
            Err(RateLimitError::Exceeded { retry_after }) => {
                assert!(retry_after >= 1 && retry_after <= 60)
            }
            other => panic!("expected throttling, got {:?}", other),
        }

        // Budgets are per client
        assert!(limiter.check("client2").await.is_ok());
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_millis(30),
            burst: 0,
            trust_proxy_headers: false,
        });

        assert!(limiter.check("c").await.is_ok());
        assert!(limiter.check("c").await.is_err());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.check("c").await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_limiter() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(0));

        for _ in 0..1000 {
            assert!(limiter.check("c").await.is_ok());
        }
        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_clients() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_millis(10),
            burst: 0,
            trust_proxy_headers: false,
        });

        limiter.check("a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        limiter.cleanup().await;

        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[test]
    fn test_extract_client_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    fn request_from(peer: Option<&str>, forwarded_for: &str) -> Request {
        let mut request = axum::http::Request::builder()
            .uri("/api/health")
            .header("x-forwarded-for", forwarded_for)
            .body(axum::body::Body::empty())
            .unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_client_key_ignores_forwarded_for_by_default() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(10));

        let request = request_from(Some("192.0.2.9:41000"), "203.0.113.7");
        assert_eq!(limiter.client_key(&request), "192.0.2.9");

        let request = request_from(None, "203.0.113.7");
        assert_eq!(limiter.client_key(&request), "unknown");
    }

    #[test]
    fn test_client_key_behind_trusted_proxy() {
        let limiter =
            RateLimiter::new(RateLimitConfig::per_minute(10).trusting_proxy_headers(true));

        let request = request_from(Some("10.0.0.1:41000"), "203.0.113.7, 10.0.0.1");
        assert_eq!(limiter.client_key(&request), "203.0.113.7");
    }
}
