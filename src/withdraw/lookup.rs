//! Lookup Service
//!
//! Builds the withdraw challenge a wallet sees when it opens a link. Lookups
//! never change link state; only the callback consumes a use.

use std::sync::Arc;

use crate::common::logging::log_security_event;
use crate::storage::{LinkStore, StorageError};
use crate::types::link::WithdrawLink;
use crate::types::lnurl::WithdrawChallenge;
use crate::withdraw::tokens::find_slot;

/// Lookup errors
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("withdraw link not found")]
    NotFound,

    #[error("withdraw link is spent")]
    Spent,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Resolves link hashes (and slot tokens) to withdraw challenges
#[derive(Clone)]
pub struct LookupService {
    store: Arc<dyn LinkStore>,
    /// Public base URL the callback path is appended to
    public_url: String,
}

impl LookupService {
    pub fn new(store: Arc<dyn LinkStore>, public_url: &str) -> Self {
        Self {
            store,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Callback URL wallets call to redeem `link_hash`
    pub fn callback_url(&self, link_hash: &str) -> String {
        format!("{}/api/v1/lnurl/cb/{}", self.public_url, link_hash)
    }

    /// Challenge for a single-voucher link
    pub async fn get_challenge(&self, link_hash: &str) -> Result<WithdrawChallenge, LookupError> {
        let link = self
            .store
            .get_by_hash(link_hash)
            .await?
            .ok_or(LookupError::NotFound)?;

        if link.is_exhausted() {
            return Err(LookupError::Spent);
        }

        Ok(self.challenge(&link))
    }

    /// Challenge for one printed voucher of a multi-use link
    ///
    /// Unknown, spent and unmatched slots all report `NotFound`: a stale
    /// voucher is an ordinary client condition.
    pub async fn get_challenge_for_slot(
        &self,
        link_hash: &str,
        slot_token: &str,
    ) -> Result<WithdrawChallenge, LookupError> {
        let link = match self.store.get_by_hash(link_hash).await? {
            Some(link) if !link.is_exhausted() => link,
            _ => return Err(LookupError::NotFound),
        };

        match find_slot(&link, slot_token) {
            Some(marker) => {
                tracing::debug!(
                    target: "lnurlw::lookup",
                    link_id = %link.id,
                    marker,
                    "slot token matched"
                );
                Ok(self.challenge(&link))
            }
            None => {
                log_security_event(
                    "unknown_slot_token",
                    false,
                    serde_json::json!({
                        "link_id": link.id,
                        "remaining_uses": link.remaining_uses(),
                    }),
                    None,
                );
                Err(LookupError::NotFound)
            }
        }
    }

    fn challenge(&self, link: &WithdrawLink) -> WithdrawChallenge {
        WithdrawChallenge::for_link(link, self.callback_url(&link.link_hash))
    }
}
