//! API Server Module
//!
//! Application state, router assembly and server startup.

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{
    handle_callback, handle_get_challenge, handle_get_slot_challenge, handle_health,
};
use super::middleware::{
    rate_limit_middleware, request_logging_middleware, security_headers_middleware,
    RateLimitState,
};
use crate::withdraw::{LookupService, RedemptionEngine};

/// State shared by all handlers
pub struct AppState {
    pub lookup: LookupService,
    pub engine: RedemptionEngine,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    pub fn new(lookup: LookupService, engine: RedemptionEngine) -> SharedAppState {
        Arc::new(Self { lookup, engine })
    }
}

/// Create the API router
///
/// Without a rate limiter every client is served unthrottled.
pub fn create_router(state: SharedAppState, rate_limiter: Option<RateLimitState>) -> Router {
    // LNURL wallets call from any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/v1/lnurl/cb/:link_hash", get(handle_callback))
        .route("/api/v1/lnurl/:link_hash", get(handle_get_challenge))
        .route(
            "/api/v1/lnurl/:link_hash/:slot_token",
            get(handle_get_slot_challenge),
        )
        .with_state(state);

    if let Some(limiter) = rate_limiter {
        router = router.layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    router
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
}

/// Start the API server
pub async fn start_server(
    state: SharedAppState,
    rate_limiter: Option<RateLimitState>,
    port: u16,
) -> Result<(), std::io::Error> {
    if let Some(limiter) = rate_limiter.clone() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.window());
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    let app = create_router(state, rate_limiter);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== LNURL-withdraw API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  GET  /api/v1/lnurl/:hash           - Withdraw challenge");
    println!("  GET  /api/v1/lnurl/:hash/:slot     - Withdraw challenge for one voucher");
    println!("  GET  /api/v1/lnurl/cb/:hash        - Redeem (k1, pr)");
    println!("  GET  /api/health                   - Health check");
    println!();

    tracing::info!(target: "lnurlw::api", %addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
