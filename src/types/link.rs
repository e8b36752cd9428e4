//! Withdraw Link Types
//!
//! A withdraw link is a voucher that authorizes a bounded number of
//! redemptions, each capped at `max_sats`. Only the [`UseState`] part of a
//! link ever changes after it is issued.

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

/// Mutable use accounting of a link.
///
/// Every store mutation swaps one whole `UseState` for another, so two
/// snapshots compare equal only if nothing touched the link in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseState {
    /// Redemptions consumed so far
    pub used_count: u32,
    /// Markers of the remaining uses, oldest first
    pub use_markers: Vec<u32>,
    /// Unix time (seconds) before which redemption is refused
    pub next_eligible_at: i64,
}

impl UseState {
    /// Render markers the way they are persisted ("1,2,3")
    pub fn markers_csv(&self) -> String {
        self.use_markers
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse persisted markers. An empty string means no remaining uses.
    pub fn parse_markers(csv: &str) -> Result<Vec<u32>, LinkError> {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>()
                    .map_err(|_| LinkError::InvalidMarkers(csv.to_string()))
            })
            .collect()
    }
}

/// Tentative advance of a link: the state to commit before paying, and the
/// state to restore if the payment fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub prior: UseState,
    pub forward: UseState,
}

/// Parameters for issuing a new link
#[derive(Debug, Clone)]
pub struct NewWithdrawLink {
    pub wallet_id: String,
    pub description: String,
    pub min_sats: u64,
    pub max_sats: u64,
    pub total_uses: u32,
    pub cooldown_secs: u64,
}

/// An issued withdraw link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawLink {
    /// Opaque unique identifier
    pub id: String,
    /// Public identifier embedded in LNURLs
    pub link_hash: String,
    /// Challenge token (k1) the holder must echo back on the callback
    pub k1: String,
    /// Wallet that funds the transfers
    pub wallet_id: String,
    /// Shown to the holder as the default invoice description
    pub description: String,
    pub min_sats: u64,
    pub max_sats: u64,
    pub total_uses: u32,
    /// Minimum gap between two successful redemptions
    pub cooldown_secs: u64,
    pub used_count: u32,
    pub use_markers: Vec<u32>,
    pub next_eligible_at: i64,
}

impl WithdrawLink {
    /// Issue a fresh link with random identifiers and markers `1..=total_uses`
    pub fn issue(params: NewWithdrawLink) -> Result<Self, LinkError> {
        let link = Self {
            id: random_token(22),
            link_hash: random_token(22),
            k1: random_token(22),
            wallet_id: params.wallet_id,
            description: params.description,
            min_sats: params.min_sats,
            max_sats: params.max_sats,
            total_uses: params.total_uses,
            cooldown_secs: params.cooldown_secs,
            used_count: 0,
            use_markers: (1..=params.total_uses).collect(),
            next_eligible_at: 0,
        };
        link.validate()?;
        Ok(link)
    }

    /// Check the structural invariants of a link
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.total_uses == 0 {
            return Err(LinkError::NoUses);
        }
        if self.min_sats > self.max_sats {
            return Err(LinkError::AmountRange {
                min: self.min_sats,
                max: self.max_sats,
            });
        }
        // Persisted and added to unix timestamps as i64
        if i64::try_from(self.cooldown_secs).is_err() {
            return Err(LinkError::OutOfRange {
                field: "cooldown_secs",
                value: self.cooldown_secs,
            });
        }
        if i64::try_from(self.max_sats).is_err() {
            return Err(LinkError::OutOfRange {
                field: "max_sats",
                value: self.max_sats,
            });
        }
        if self.used_count > self.total_uses {
            return Err(LinkError::Overused {
                used: self.used_count,
                total: self.total_uses,
            });
        }
        let remaining = (self.total_uses - self.used_count) as usize;
        if self.use_markers.len() != remaining {
            return Err(LinkError::MarkerCount {
                expected: remaining,
                got: self.use_markers.len(),
            });
        }
        Ok(())
    }

    /// Whether every permitted redemption has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.total_uses
    }

    pub fn remaining_uses(&self) -> u32 {
        self.total_uses.saturating_sub(self.used_count)
    }

    /// Seconds left until the cooldown expires, if it has not
    pub fn cooldown_remaining(&self, now: i64) -> Option<u64> {
        if now < self.next_eligible_at {
            Some((self.next_eligible_at - now) as u64)
        } else {
            None
        }
    }

    /// Snapshot of the mutable part
    pub fn state(&self) -> UseState {
        UseState {
            used_count: self.used_count,
            use_markers: self.use_markers.clone(),
            next_eligible_at: self.next_eligible_at,
        }
    }

    /// Overwrite the mutable part
    pub fn apply(&mut self, state: &UseState) {
        self.used_count = state.used_count;
        self.use_markers = state.use_markers.clone();
        self.next_eligible_at = state.next_eligible_at;
    }

    /// Plan consuming one use at `now`. `None` when exhausted.
    ///
    /// The oldest remaining marker is dropped; the rest keep their order.
    pub fn plan_advance(&self, now: i64) -> Option<Advance> {
        if self.is_exhausted() {
            return None;
        }

        let prior = self.state();
        let forward = UseState {
            used_count: self.used_count + 1,
            use_markers: self.use_markers.iter().skip(1).copied().collect(),
            next_eligible_at: now
                .saturating_add(i64::try_from(self.cooldown_secs).unwrap_or(i64::MAX)),
        };

        Some(Advance { prior, forward })
    }
}

/// Invalid link data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link must allow at least one use")]
    NoUses,

    #[error("min amount {min} exceeds max amount {max}")]
    AmountRange { min: u64, max: u64 },

    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("used count {used} exceeds total uses {total}")]
    Overused { used: u32, total: u32 },

    #[error("expected {expected} use markers, got {got}")]
    MarkerCount { expected: usize, got: usize },

    #[error("invalid use markers: {0:?}")]
    InvalidMarkers(String),
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
