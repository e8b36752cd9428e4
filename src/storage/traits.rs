//! Storage Trait Definitions
//!
//! Defines the abstract store for withdraw links.
//! Implementations can use SQLite (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::link::{UseState, WithdrawLink};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Withdraw link storage interface
///
/// Each call is atomic on its own; nothing is transactional across calls.
/// The only mutation after insert is [`LinkStore::compare_and_swap`].
///
/// Implementations:
/// - `SqliteLinkStore` - Production storage with SQLite
/// - `MemoryLinkStore` - In-memory storage for testing
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Insert a newly issued link
    async fn insert(&self, link: &WithdrawLink) -> StorageResult<()>;

    /// Get a link by its public hash
    async fn get_by_hash(&self, link_hash: &str) -> StorageResult<Option<WithdrawLink>>;

    /// Get a link by ID
    async fn get_by_id(&self, id: &str) -> StorageResult<Option<WithdrawLink>>;

    /// Replace the use state of link `id` with `next`, but only if it still
    /// equals `expected`.
    ///
    /// Returns `Ok(false)` when the stored state has moved on.
    async fn compare_and_swap(
        &self,
        id: &str,
        expected: &UseState,
        next: &UseState,
    ) -> StorageResult<bool>;
}
