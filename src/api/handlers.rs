//! LNURL-withdraw Endpoints
//!
//! - GET /api/v1/lnurl/:link_hash - Challenge for a single-voucher link
//! - GET /api/v1/lnurl/:link_hash/:slot_token - Challenge for one printed voucher
//! - GET /api/v1/lnurl/cb/:link_hash?k1=..&pr=.. - Redeem one use
//! - GET /api/health - Health check
//!
//! Wallets read the `status` field; the HTTP status only separates "no such
//! link" and server faults from ordinary protocol rejections.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::server::SharedAppState;
use crate::types::lnurl::{CallbackQuery, CallbackStatus};
use crate::withdraw::{LookupError, WithdrawError};

const NOT_FOUND_REASON: &str = "LNURL-withdraw not found.";
const SPENT_REASON: &str = "Withdraw is spent.";
const INTERNAL_REASON: &str = "Internal error";

fn status_response(status: StatusCode, reason: impl Into<String>) -> Response {
    (status, Json(CallbackStatus::error(reason))).into_response()
}

/// GET /api/v1/lnurl/:link_hash
pub async fn handle_get_challenge(
    State(state): State<SharedAppState>,
    Path(link_hash): Path<String>,
) -> Response {
    match state.lookup.get_challenge(&link_hash).await {
        Ok(challenge) => (StatusCode::OK, Json(challenge)).into_response(),
        Err(LookupError::NotFound) => status_response(StatusCode::NOT_FOUND, NOT_FOUND_REASON),
        Err(LookupError::Spent) => status_response(StatusCode::GONE, SPENT_REASON),
        Err(LookupError::Storage(e)) => {
            tracing::error!(target: "lnurlw::api", error = %e, "challenge lookup failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_REASON)
        }
    }
}

/// GET /api/v1/lnurl/:link_hash/:slot_token
///
/// Stale or unknown vouchers answer 200 with an error body.
pub async fn handle_get_slot_challenge(
    State(state): State<SharedAppState>,
    Path((link_hash, slot_token)): Path<(String, String)>,
) -> Response {
    match state
        .lookup
        .get_challenge_for_slot(&link_hash, &slot_token)
        .await
    {
        Ok(challenge) => (StatusCode::OK, Json(challenge)).into_response(),
        Err(LookupError::NotFound) | Err(LookupError::Spent) => {
            status_response(StatusCode::OK, NOT_FOUND_REASON)
        }
        Err(LookupError::Storage(e)) => {
            tracing::error!(target: "lnurlw::api", error = %e, "slot lookup failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_REASON)
        }
    }
}

/// GET /api/v1/lnurl/cb/:link_hash
pub async fn handle_callback(
    State(state): State<SharedAppState>,
    Path(link_hash): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (k1, claim) = match (non_empty(query.k1), non_empty(query.pr)) {
        (Some(k1), Some(claim)) => (k1, claim),
        _ => return status_response(StatusCode::BAD_REQUEST, "Missing k1 or pr."),
    };

    match state.engine.redeem(&link_hash, &k1, &claim).await {
        Ok(redemption) => {
            tracing::info!(
                target: "lnurlw::api",
                link_id = %redemption.link_id,
                used_count = redemption.used_count,
                remaining_uses = redemption.remaining_uses,
                "withdraw paid"
            );
            (StatusCode::OK, Json(CallbackStatus::Ok)).into_response()
        }
        Err(e) => {
            let status = match &e {
                WithdrawError::NotFound => StatusCode::NOT_FOUND,
                e if e.is_rejection() => StatusCode::OK,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };

            if status.is_server_error() {
                tracing::error!(target: "lnurlw::api", code = e.code(), error = %e, "redemption failed");
            } else {
                tracing::info!(target: "lnurlw::api", code = e.code(), error = %e, "redemption rejected");
            }

            status_response(status, e.reason())
        }
    }
}

/// GET /api/health
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "lnurlw",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
