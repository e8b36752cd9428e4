//! LNURL-withdraw Wire Types
//!
//! JSON shapes exchanged with wallets. Field names are fixed by the LNURL
//! protocol, so they are renamed explicitly rather than by a blanket rule.

use serde::{Deserialize, Serialize};

use super::link::WithdrawLink;
use super::units::sats_to_msats;

/// Tag of every withdraw challenge
pub const WITHDRAW_REQUEST_TAG: &str = "withdrawRequest";

/// Challenge returned by both lookup endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawChallenge {
    pub tag: String,
    pub callback: String,
    pub k1: String,
    #[serde(rename = "minWithdrawable")]
    pub min_withdrawable: u64,
    #[serde(rename = "maxWithdrawable")]
    pub max_withdrawable: u64,
    #[serde(rename = "defaultDescription")]
    pub default_description: String,
}

impl WithdrawChallenge {
    /// Build the challenge for `link` with an already resolved callback URL
    pub fn for_link(link: &WithdrawLink, callback: String) -> Self {
        Self {
            tag: WITHDRAW_REQUEST_TAG.to_string(),
            callback,
            k1: link.k1.clone(),
            min_withdrawable: sats_to_msats(link.min_sats),
            max_withdrawable: sats_to_msats(link.max_sats),
            default_description: link.description.clone(),
        }
    }
}

/// `{"status":"OK"}` / `{"status":"ERROR","reason":...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum CallbackStatus {
    Ok,
    Error { reason: String },
}

impl CallbackStatus {
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Query string of the redemption callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    /// Challenge token
    pub k1: Option<String>,
    /// Payment request (transfer claim)
    pub pr: Option<String>,
}
