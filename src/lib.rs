//! LNURL-withdraw Service
//!
//! Redeems pre-funded withdraw vouchers over the LNURL-withdraw protocol.
//! A wallet scans a voucher, reads the challenge and calls back with a
//! payment request; each callback consumes at most one use of the link.
//!
//! ## Layout
//!
//! - `types` - Withdraw links, use state and LNURL wire payloads
//! - `storage` - Link stores (in-memory, SQLite) with compare-and-swap updates
//! - `withdraw` - Lookup, slot tokens, per-link locks, payment gateway and the
//!   redemption engine
//! - `api` - HTTP endpoints and middleware
//! - `common` - Configuration, logging and the root error type

pub mod api;
pub mod common;
pub mod storage;
pub mod types;
pub mod withdraw;

// Re-exports: link model
pub use types::{
    Advance, CallbackStatus, LinkError, NewWithdrawLink, UseState, WithdrawChallenge, WithdrawLink,
};

// Re-exports: storage
pub use storage::{LinkStore, MemoryLinkStore, SqliteLinkStore, StorageError};

// Re-exports: withdraw flow
pub use withdraw::{
    HttpTransferGateway, LookupError, LookupService, Redemption, RedemptionEngine,
    TransferGateway, WithdrawError,
};

// Re-exports: infrastructure
pub use common::{LnurlwError, Result, WithdrawConfig};
