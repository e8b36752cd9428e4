//! Shared Types Module
//!
//! Data types shared across the withdraw service.

pub mod link;
pub mod lnurl;
pub mod units;

// Re-exports for convenience
pub use link::{Advance, LinkError, NewWithdrawLink, UseState, WithdrawLink};
pub use lnurl::{CallbackQuery, CallbackStatus, WithdrawChallenge, WITHDRAW_REQUEST_TAG};
pub use units::{sats_to_display, sats_to_msats, MSATS_PER_SAT};
