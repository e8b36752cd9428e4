//! Transfer Gateway
//!
//! The payment side of a redemption: pay the holder's claim from the link's
//! wallet, never more than the link's maximum. The service does not care how
//! the payment is made, only whether it succeeded.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Tag attached to every payment made for a withdraw link
pub const WITHDRAW_TAG: &str = "withdraw";

/// One payment to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Funding wallet
    pub wallet_id: String,
    /// Holder-supplied payment request
    pub claim: String,
    /// Upper bound on the amount paid
    pub max_sats: u64,
    pub tag: &'static str,
}

/// Successful payment
///
/// `payment_hash` is informational and may be empty when the backend does
/// not report one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub payment_hash: String,
}

/// Transfer errors
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The claim itself was refused (bad invoice, amount out of bounds)
    #[error("transfer rejected: {0}")]
    Rejected(String),

    /// The payment backend could not process it (liquidity, routing, outage)
    #[error("transfer backend unavailable: {0}")]
    Unavailable(String),

    #[error("transfer timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pays transfer claims
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError>;
}

/// Gateway backed by a wallet HTTP API
#[derive(Debug, Clone)]
pub struct HttpTransferGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
struct PaymentBody<'a> {
    out: bool,
    bolt11: &'a str,
    wallet: &'a str,
    max_sat: u64,
    extra: PaymentExtra<'a>,
}

#[derive(Serialize)]
struct PaymentExtra<'a> {
    tag: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    payment_hash: Option<String>,
    checking_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

impl HttpTransferGateway {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn payments_url(&self) -> String {
        format!("{}/api/v1/payments", self.base_url)
    }
}

#[async_trait]
impl TransferGateway for HttpTransferGateway {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        let body = PaymentBody {
            out: true,
            bolt11: &request.claim,
            wallet: &request.wallet_id,
            max_sat: request.max_sats,
            extra: PaymentExtra { tag: request.tag },
        };

        let resp = self
            .client
            .post(self.payments_url())
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        // Once the backend answers 2xx the money is gone; nothing below may fail
        let text = resp.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(parse_receipt(status, &text));
        }

        let detail = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or(text);

        Err(classify_failure(status, detail))
    }
}

fn parse_receipt(status: StatusCode, body: &str) -> TransferReceipt {
    let payment_hash = serde_json::from_str::<PaymentResponse>(body)
        .ok()
        .and_then(|r| r.payment_hash.or(r.checking_id));

    match payment_hash {
        Some(payment_hash) => TransferReceipt { payment_hash },
        None => {
            tracing::warn!(
                target: "lnurlw::transfer",
                status = status.as_u16(),
                "payment accepted without a payment hash"
            );
            TransferReceipt {
                payment_hash: String::new(),
            }
        }
    }
}

/// Client errors mean the claim is bad; anything else is the backend's fault
fn classify_failure(status: StatusCode, detail: String) -> TransferError {
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        TransferError::Rejected(detail)
    } else {
        TransferError::Unavailable(format!("{}: {}", status.as_u16(), detail))
    }
}
