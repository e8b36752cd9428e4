//! In-Memory Storage Implementation
//!
//! Provides in-memory link storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{LinkStore, StorageError, StorageResult};
use crate::types::link::{UseState, WithdrawLink};

#[derive(Default)]
struct Tables {
    /// Links indexed by ID
    links: HashMap<String, WithdrawLink>,
    /// Index: link hash -> link ID
    by_hash: HashMap<String, String>,
}

/// In-memory withdraw link store
///
/// Both indexes live behind one lock so a swap can never observe one
/// index updated and the other not.
#[derive(Clone, Default)]
pub struct MemoryLinkStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryLinkStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored links
    pub async fn len(&self) -> usize {
        self.tables.read().await.links.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn insert(&self, link: &WithdrawLink) -> StorageResult<()> {
        link.validate()
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;

        let mut tables = self.tables.write().await;

        if tables.links.contains_key(&link.id) {
            return Err(StorageError::Duplicate(format!("ID: {}", link.id)));
        }

        if tables.by_hash.contains_key(&link.link_hash) {
            return Err(StorageError::Duplicate(format!("hash: {}", link.link_hash)));
        }

        tables
            .by_hash
            .insert(link.link_hash.clone(), link.id.clone());
        tables.links.insert(link.id.clone(), link.clone());

        Ok(())
    }

    async fn get_by_hash(&self, link_hash: &str) -> StorageResult<Option<WithdrawLink>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_hash
            .get(link_hash)
            .and_then(|id| tables.links.get(id))
            .cloned())
    }

    async fn get_by_id(&self, id: &str) -> StorageResult<Option<WithdrawLink>> {
        let tables = self.tables.read().await;
        Ok(tables.links.get(id).cloned())
    }

    async fn compare_and_swap(
        &self,
        id: &str,
        expected: &UseState,
        next: &UseState,
    ) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;

        let link = tables
            .links
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        if link.state() != *expected {
            return Ok(false);
        }

        link.apply(next);
        Ok(true)
    }
}
