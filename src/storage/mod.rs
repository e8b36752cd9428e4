//! Storage Layer Module
//!
//! Provides persistence for withdraw link records.
//!
//! This module contains:
//! - Storage trait definition for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryLinkStore;
pub use sqlite::SqliteLinkStore;
pub use traits::{LinkStore, StorageError, StorageResult};
