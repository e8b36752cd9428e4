//! Per-Link Locks
//!
//! Serializes redemption attempts on the same link inside one process.
//! A guard is held across the whole attempt: fetch, tentative advance,
//! transfer and compensation. Attempts on different links never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a redemption on one link is in flight
pub struct LinkGuard {
    link_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl LinkGuard {
    pub fn link_id(&self) -> &str {
        &self.link_id
    }
}

/// Lock table keyed by link ID
#[derive(Default)]
pub struct LinkLocks {
    // The std mutex is only held to look up the entry, never across an await
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LinkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other attempt holds `link_id`, then hold it
    pub async fn acquire(&self, link_id: &str) -> LinkGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the table are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(link_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        LinkGuard {
            link_id: link_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of links with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_link_is_serialized() {
        let locks = Arc::new(LinkLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks.acquire("link").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_links_do_not_contend() {
        let locks = LinkLocks::new();

        let a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b"))
            .await
            .expect("second link should not wait");

        assert_eq!(a.link_id(), "a");
        assert_eq!(b.link_id(), "b");
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = LinkLocks::new();

        drop(locks.acquire("a").await);
        drop(locks.acquire("b").await);
        let _c = locks.acquire("c").await;

        assert_eq!(locks.tracked(), 1);
    }
}
