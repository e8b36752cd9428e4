//! LNURL-withdraw
//!
//! - `lookup` turns a link hash (optionally with a slot token) into the
//!   challenge a wallet sees. Read-only.
//! - `engine` redeems one use: check, tentatively advance, pay, and
//!   compensate if the payment fails.
//! - `tokens` derives the per-voucher slot tokens.
//! - `locks` serializes attempts on one link within the process.
//! - `gateway` is the payment side.

pub mod engine;
pub mod gateway;
pub mod locks;
pub mod lookup;
pub mod tokens;

pub use engine::{Redemption, RedemptionEngine, WithdrawError, DEFAULT_TRANSFER_TIMEOUT};
pub use gateway::{
    HttpTransferGateway, TransferError, TransferGateway, TransferReceipt, TransferRequest,
};
pub use locks::{LinkGuard, LinkLocks};
pub use lookup::{LookupError, LookupService};
pub use tokens::{derive_slot_token, find_slot, slot_tokens};
