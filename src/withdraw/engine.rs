//! Redemption Engine
//!
//! The only place link state changes. A redemption runs as a two-phase
//! protocol under the link's lock:
//!
//! ```text
//!  fetch ──► checks ──► tentative advance (CAS prior → forward)
//!                              │
//!                              ▼
//!                         transfer ──► ok ──────────────► done
//!                              │
//!                              └─► failed ──► compensate (CAS forward → prior)
//! ```
//!
//! The advance is committed before paying so a retried payment cannot fire
//! twice. Until the transfer resolves, readers outside the lock (lookups)
//! observe the advanced state even if it is later compensated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::logging::{claim_fingerprint, log_redemption_event, log_security_event};
use crate::storage::{LinkStore, StorageError};
use crate::types::link::{Advance, WithdrawLink};
use crate::withdraw::gateway::{
    TransferError, TransferGateway, TransferReceipt, TransferRequest, WITHDRAW_TAG,
};
use crate::withdraw::locks::LinkLocks;

/// Default upper bound on one transfer
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub link_id: String,
    pub used_count: u32,
    pub remaining_uses: u32,
    pub next_eligible_at: i64,
    pub payment_hash: String,
}

/// Redemption failures
///
/// Everything except `Storage`, `RollbackFailed` and `Aborted` is a protocol
/// rejection: an expected client condition reported back as a status.
#[derive(Debug, thiserror::Error)]
pub enum WithdrawError {
    #[error("withdraw link not found")]
    NotFound,

    #[error("withdraw link is spent")]
    AlreadyRedeemed,

    #[error("challenge token does not match")]
    InvalidChallenge,

    #[error("link is cooling down for {remaining_secs}s")]
    RateLimited { remaining_secs: u64 },

    #[error("link state changed concurrently")]
    Conflict,

    #[error("transfer failed: {0}")]
    TransferFailed(#[source] TransferError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("could not restore link {link_id} after failed transfer: {detail}")]
    RollbackFailed { link_id: String, detail: String },

    #[error("redemption task aborted: {0}")]
    Aborted(String),
}

impl WithdrawError {
    /// Expected protocol outcome rather than an infrastructure fault
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            WithdrawError::Storage(_) | WithdrawError::RollbackFailed { .. } | WithdrawError::Aborted(_)
        )
    }

    /// Text shown to the wallet in the `reason` field
    pub fn reason(&self) -> String {
        match self {
            WithdrawError::NotFound => "LNURL-withdraw not found.".to_string(),
            WithdrawError::AlreadyRedeemed => "Withdraw is spent.".to_string(),
            WithdrawError::InvalidChallenge => "Bad request.".to_string(),
            WithdrawError::RateLimited { remaining_secs } => {
                format!("Wait {} seconds.", remaining_secs)
            }
            WithdrawError::Conflict => "Withdraw link is busy, try again.".to_string(),
            WithdrawError::TransferFailed(_) => "Link not working".to_string(),
            WithdrawError::Storage(_)
            | WithdrawError::RollbackFailed { .. }
            | WithdrawError::Aborted(_) => "Internal error".to_string(),
        }
    }

    /// Short code for logs
    pub fn code(&self) -> &'static str {
        match self {
            WithdrawError::NotFound => "NOT_FOUND",
            WithdrawError::AlreadyRedeemed => "ALREADY_REDEEMED",
            WithdrawError::InvalidChallenge => "INVALID_CHALLENGE",
            WithdrawError::RateLimited { .. } => "RATE_LIMITED",
            WithdrawError::Conflict => "CONFLICT",
            WithdrawError::TransferFailed(_) => "TRANSFER_FAILED",
            WithdrawError::Storage(_) => "STORAGE_ERROR",
            WithdrawError::RollbackFailed { .. } => "ROLLBACK_FAILED",
            WithdrawError::Aborted(_) => "ABORTED",
        }
    }
}

/// Redemption engine
#[derive(Clone)]
pub struct RedemptionEngine {
    store: Arc<dyn LinkStore>,
    gateway: Arc<dyn TransferGateway>,
    locks: Arc<LinkLocks>,
    transfer_timeout: Duration,
}

impl RedemptionEngine {
    pub fn new(store: Arc<dyn LinkStore>, gateway: Arc<dyn TransferGateway>) -> Self {
        Self {
            store,
            gateway,
            locks: Arc::new(LinkLocks::new()),
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Redeem one use of `link_hash` by paying `claim`
    pub async fn redeem(
        &self,
        link_hash: &str,
        k1: &str,
        claim: &str,
    ) -> Result<Redemption, WithdrawError> {
        let now = chrono::Utc::now().timestamp();
        self.redeem_at(link_hash, k1, claim, now).await
    }

    /// Redeem with an explicit clock reading (unix seconds)
    ///
    /// The attempt runs on its own task so a caller that goes away cannot
    /// leave a tentative advance without its transfer outcome.
    pub async fn redeem_at(
        &self,
        link_hash: &str,
        k1: &str,
        claim: &str,
        now: i64,
    ) -> Result<Redemption, WithdrawError> {
        let engine = self.clone();
        let (link_hash, k1, claim) = (link_hash.to_string(), k1.to_string(), claim.to_string());

        tokio::spawn(async move { engine.attempt(&link_hash, &k1, &claim, now).await })
            .await
            .map_err(|e| WithdrawError::Aborted(e.to_string()))?
    }

    async fn attempt(
        &self,
        link_hash: &str,
        k1: &str,
        claim: &str,
        now: i64,
    ) -> Result<Redemption, WithdrawError> {
        let found = self
            .store
            .get_by_hash(link_hash)
            .await?
            .ok_or(WithdrawError::NotFound)?;

        let _guard = self.locks.acquire(&found.id).await;

        // Re-read under the lock; the first read may predate another attempt
        let link = self
            .store
            .get_by_id(&found.id)
            .await?
            .ok_or(WithdrawError::NotFound)?;

        if link.is_exhausted() {
            return Err(WithdrawError::AlreadyRedeemed);
        }

        if k1 != link.k1 {
            log_security_event(
                "invalid_challenge",
                false,
                serde_json::json!({ "link_id": link.id }),
                None,
            );
            return Err(WithdrawError::InvalidChallenge);
        }

        if let Some(remaining_secs) = link.cooldown_remaining(now) {
            return Err(WithdrawError::RateLimited { remaining_secs });
        }

        let advance = link
            .plan_advance(now)
            .ok_or(WithdrawError::AlreadyRedeemed)?;

        if !self
            .store
            .compare_and_swap(&link.id, &advance.prior, &advance.forward)
            .await?
        {
            tracing::warn!(
                target: "lnurlw::redemption",
                link_id = %link.id,
                "tentative advance lost a race with another writer"
            );
            return Err(WithdrawError::Conflict);
        }

        let started = Instant::now();
        match self.pay(&link, claim).await {
            Ok(receipt) => {
                log_redemption_event(
                    "redeemed",
                    &link.id,
                    advance.forward.used_count,
                    &claim_fingerprint(claim),
                    started.elapsed().as_millis() as u64,
                    None,
                );

                Ok(Redemption {
                    link_id: link.id.clone(),
                    used_count: advance.forward.used_count,
                    remaining_uses: link.total_uses - advance.forward.used_count,
                    next_eligible_at: advance.forward.next_eligible_at,
                    payment_hash: receipt.payment_hash,
                })
            }
            Err(err) => {
                log_redemption_event(
                    "transfer_failed",
                    &link.id,
                    advance.forward.used_count,
                    &claim_fingerprint(claim),
                    started.elapsed().as_millis() as u64,
                    Some(&err.to_string()),
                );

                self.compensate(&link, &advance).await?;
                Err(WithdrawError::TransferFailed(err))
            }
        }
    }

    async fn pay(&self, link: &WithdrawLink, claim: &str) -> Result<TransferReceipt, TransferError> {
        let request = TransferRequest {
            wallet_id: link.wallet_id.clone(),
            claim: claim.to_string(),
            max_sats: link.max_sats,
            tag: WITHDRAW_TAG,
        };

        match tokio::time::timeout(self.transfer_timeout, self.gateway.transfer(&request)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout(self.transfer_timeout.as_secs())),
        }
    }

    /// Undo a tentative advance after a failed transfer
    async fn compensate(&self, link: &WithdrawLink, advance: &Advance) -> Result<(), WithdrawError> {
        let restored = self
            .store
            .compare_and_swap(&link.id, &advance.forward, &advance.prior)
            .await;

        match restored {
            Ok(true) => {
                tracing::info!(
                    target: "lnurlw::redemption",
                    link_id = %link.id,
                    used_count = advance.prior.used_count,
                    "tentative advance compensated"
                );
                Ok(())
            }
            Ok(false) => {
                tracing::error!(
                    target: "lnurlw::redemption",
                    link_id = %link.id,
                    expected = ?advance.forward,
                    restore = ?advance.prior,
                    "link changed during transfer; not restoring"
                );
                Err(WithdrawError::RollbackFailed {
                    link_id: link.id.clone(),
                    detail: "state changed during transfer".to_string(),
                })
            }
            Err(e) => {
                tracing::error!(
                    target: "lnurlw::redemption",
                    link_id = %link.id,
                    error = %e,
                    restore = ?advance.prior,
                    "failed to restore link after failed transfer"
                );
                Err(WithdrawError::RollbackFailed {
                    link_id: link.id.clone(),
                    detail: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryLinkStore, SqliteLinkStore, StorageResult};
    use crate::types::link::{NewWithdrawLink, UseState};
    use crate::withdraw::gateway::MockTransferGateway;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const CLAIM: &str = "lnbc100n1test";

    fn new_link(total_uses: u32, cooldown_secs: u64) -> WithdrawLink {
        WithdrawLink::issue(NewWithdrawLink {
            wallet_id: "wallet-1".to_string(),
            description: "Voucher".to_string(),
            min_sats: 10,
            max_sats: 100,
            total_uses,
            cooldown_secs,
        })
        .unwrap()
    }

    fn paying_gateway() -> MockTransferGateway {
        let mut gateway = MockTransferGateway::new();
        gateway.expect_transfer().returning(|_| {
            Ok(TransferReceipt {
                payment_hash: "hash".to_string(),
            })
        });
        gateway
    }

    fn failing_gateway() -> MockTransferGateway {
        let mut gateway = MockTransferGateway::new();
        gateway
            .expect_transfer()
            .returning(|_| Err(TransferError::Rejected("invoice expired".to_string())));
        gateway
    }

    fn idle_gateway() -> MockTransferGateway {
        let mut gateway = MockTransferGateway::new();
        gateway.expect_transfer().times(0);
        gateway
    }

    async fn setup(
        link: &WithdrawLink,
        gateway: impl TransferGateway + 'static,
    ) -> (RedemptionEngine, MemoryLinkStore) {
        let store = MemoryLinkStore::new();
        store.insert(link).await.unwrap();
        let engine = RedemptionEngine::new(Arc::new(store.clone()), Arc::new(gateway));
        (engine, store)
    }

    async fn stored(store: &MemoryLinkStore, link: &WithdrawLink) -> WithdrawLink {
        store.get_by_id(&link.id).await.unwrap().unwrap()
    }

    fn assert_invariants(link: &WithdrawLink) {
        assert!(link.used_count <= link.total_uses);
        assert_eq!(
            link.use_markers.len() as u32,
            link.total_uses - link.used_count
        );
    }

    #[tokio::test]
    async fn test_redeem_success_advances_state() {
        let link = new_link(3, 60);
        let mut gateway = MockTransferGateway::new();
        gateway
            .expect_transfer()
            .withf(|req| {
                req.wallet_id == "wallet-1"
                    && req.claim == CLAIM
                    && req.max_sats == 100
                    && req.tag == "withdraw"
            })
            .times(1)
            .returning(|_| {
                Ok(TransferReceipt {
                    payment_hash: "ph1".to_string(),
                })
            });
        let (engine, store) = setup(&link, gateway).await;

        let redemption = engine
            .redeem_at(&link.link_hash, &link.k1, CLAIM, 1_000)
            .await
            .unwrap();

        assert_eq!(redemption.used_count, 1);
        assert_eq!(redemption.remaining_uses, 2);
        assert_eq!(redemption.next_eligible_at, 1_060);
        assert_eq!(redemption.payment_hash, "ph1");

        let after = stored(&store, &link).await;
        assert_eq!(after.used_count, 1);
        assert_eq!(after.use_markers, vec![2, 3]);
        assert_eq!(after.next_eligible_at, 1_060);
    }

    #[tokio::test]
    async fn test_redeem_not_found() {
        let link = new_link(1, 0);
        let (engine, _) = setup(&link, idle_gateway()).await;

        let result = engine.redeem_at("missing", &link.k1, CLAIM, 0).await;
        assert!(matches!(result, Err(WithdrawError::NotFound)));
    }

    #[tokio::test]
    async fn test_exhausted_link_is_never_mutated() {
        let mut link = new_link(2, 0);
        link.used_count = 2;
        link.use_markers.clear();
        link.next_eligible_at = 5;
        let (engine, store) = setup(&link, idle_gateway()).await;

        let result = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 100).await;

        assert!(matches!(result, Err(WithdrawError::AlreadyRedeemed)));
        assert_eq!(stored(&store, &link).await, link);
    }

    #[tokio::test]
    async fn test_invalid_challenge() {
        let link = new_link(2, 0);
        let (engine, store) = setup(&link, idle_gateway()).await;

        let result = engine.redeem_at(&link.link_hash, "wrong-k1", CLAIM, 0).await;

        let err = result.unwrap_err();
        assert!(matches!(err, WithdrawError::InvalidChallenge));
        assert!(err.is_rejection());
        assert_eq!(err.reason(), "Bad request.");
        assert_eq!(stored(&store, &link).await, link);
    }

    #[tokio::test]
    async fn test_rate_limited_reports_exact_wait() {
        let mut link = new_link(2, 60);
        link.next_eligible_at = 1_060;
        let (engine, store) = setup(&link, idle_gateway()).await;

        let err = engine
            .redeem_at(&link.link_hash, &link.k1, CLAIM, 1_013)
            .await
            .unwrap_err();

        assert!(matches!(err, WithdrawError::RateLimited { remaining_secs: 47 }));
        assert_eq!(err.reason(), "Wait 47 seconds.");
        assert_eq!(stored(&store, &link).await, link);
    }

    #[tokio::test]
    async fn test_failed_transfer_restores_state_exactly() {
        let mut link = new_link(3, 60);
        link.used_count = 1;
        link.use_markers = vec![5, 9];
        link.next_eligible_at = 40;
        let (engine, store) = setup(&link, failing_gateway()).await;

        let err = engine
            .redeem_at(&link.link_hash, &link.k1, CLAIM, 500)
            .await
            .unwrap_err();

        assert!(matches!(err, WithdrawError::TransferFailed(TransferError::Rejected(_))));
        assert!(err.is_rejection());
        assert_eq!(err.reason(), "Link not working");
        assert_eq!(stored(&store, &link).await.state(), link.state());
    }

    /// Gateway that never answers in time
    struct HangingGateway;

    #[async_trait]
    impl TransferGateway for HangingGateway {
        async fn transfer(&self, _: &TransferRequest) -> Result<TransferReceipt, TransferError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(TransferError::Unavailable("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_transfer_timeout_is_compensated() {
        let link = new_link(1, 0);
        let store = MemoryLinkStore::new();
        store.insert(&link).await.unwrap();
        let engine = RedemptionEngine::new(Arc::new(store.clone()), Arc::new(HangingGateway))
            .with_transfer_timeout(Duration::from_millis(20));

        let err = engine
            .redeem_at(&link.link_hash, &link.k1, CLAIM, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, WithdrawError::TransferFailed(TransferError::Timeout(_))));
        assert_eq!(stored(&store, &link).await, link);
    }

    #[tokio::test]
    async fn test_two_use_cooldown_scenario() {
        let link = new_link(2, 60);
        let (engine, store) = setup(&link, paying_gateway()).await;
        let lookup =
            crate::withdraw::lookup::LookupService::new(Arc::new(store.clone()), "http://localhost");

        let first = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 0).await.unwrap();
        assert_eq!(first.used_count, 1);
        let after_first = stored(&store, &link).await;
        assert_eq!(after_first.used_count, 1);
        assert_eq!(after_first.next_eligible_at, 60);

        let early = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 10).await;
        assert!(matches!(early, Err(WithdrawError::RateLimited { remaining_secs: 50 })));

        let second = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 70).await.unwrap();
        assert_eq!(second.used_count, 2);
        assert_eq!(second.remaining_uses, 0);

        let spent = lookup.get_challenge(&link.link_hash).await;
        assert!(matches!(
            spent,
            Err(crate::withdraw::lookup::LookupError::Spent)
        ));

        let again = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 500).await;
        assert!(matches!(again, Err(WithdrawError::AlreadyRedeemed)));
        assert_invariants(&stored(&store, &link).await);
    }

    #[tokio::test]
    async fn test_invariants_hold_across_mixed_outcomes() {
        let link = new_link(4, 0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut gateway = MockTransferGateway::new();
        gateway.expect_transfer().returning(move |_| {
            // Every other transfer fails
            if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err(TransferError::Unavailable("no route".to_string()))
            } else {
                Ok(TransferReceipt {
                    payment_hash: "ok".to_string(),
                })
            }
        });
        let (engine, store) = setup(&link, gateway).await;

        let mut successes = 0;
        for t in 0..12 {
            let k1 = if t % 5 == 4 { "bad" } else { link.k1.as_str() };
            if engine.redeem_at(&link.link_hash, k1, CLAIM, t).await.is_ok() {
                successes += 1;
            }
            assert_invariants(&stored(&store, &link).await);
        }

        let after = stored(&store, &link).await;
        assert_eq!(successes, 4);
        assert_eq!(after.used_count, 4);
        assert!(after.is_exhausted());
    }

    /// Gateway that pays slowly and counts payments
    struct CountingGateway {
        paid: AtomicUsize,
    }

    #[async_trait]
    impl TransferGateway for CountingGateway {
        async fn transfer(&self, _: &TransferRequest) -> Result<TransferReceipt, TransferError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let n = self.paid.fetch_add(1, Ordering::SeqCst);
            Ok(TransferReceipt {
                payment_hash: format!("ph{}", n),
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_attempts_never_exceed_remaining_uses() {
        let mut link = new_link(5, 0);
        link.used_count = 2;
        link.use_markers = vec![3, 4, 5];
        let store = MemoryLinkStore::new();
        store.insert(&link).await.unwrap();
        let gateway = Arc::new(CountingGateway {
            paid: AtomicUsize::new(0),
        });
        let engine = RedemptionEngine::new(Arc::new(store.clone()), gateway.clone());

        let attempts = (0..10).map(|_| engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 0));
        let results = futures_util::future::join_all(attempts).await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let spent = results
            .iter()
            .filter(|r| matches!(r, Err(WithdrawError::AlreadyRedeemed)))
            .count();

        assert_eq!(ok, 3);
        assert_eq!(spent, 7);
        assert_eq!(gateway.paid.load(Ordering::SeqCst), 3);

        let after = stored(&store, &link).await;
        assert!(after.is_exhausted());
        assert_invariants(&after);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_separate_instances_are_guarded_by_the_store() {
        // Two engines = two lock tables, like two server processes
        let link = new_link(2, 0);
        let store = MemoryLinkStore::new();
        store.insert(&link).await.unwrap();
        let gateway = Arc::new(CountingGateway {
            paid: AtomicUsize::new(0),
        });
        let a = RedemptionEngine::new(Arc::new(store.clone()), gateway.clone());
        let b = RedemptionEngine::new(Arc::new(store.clone()), gateway.clone());

        let attempts = (0..8).map(|i| {
            let engine = if i % 2 == 0 { a.clone() } else { b.clone() };
            let hash = link.link_hash.clone();
            let k1 = link.k1.clone();
            async move { engine.redeem_at(&hash, &k1, CLAIM, 0).await }
        });
        let results = futures_util::future::join_all(attempts).await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let paid = gateway.paid.load(Ordering::SeqCst);
        let after = stored(&store, &link).await;

        assert!(ok <= 2);
        assert_eq!(paid, ok);
        assert_eq!(after.used_count as usize, ok);
        assert_invariants(&after);
    }

    /// Store whose first swap loses to an invisible writer
    struct RacingStore {
        inner: MemoryLinkStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl LinkStore for RacingStore {
        async fn insert(&self, link: &WithdrawLink) -> StorageResult<()> {
            self.inner.insert(link).await
        }

        async fn get_by_hash(&self, link_hash: &str) -> StorageResult<Option<WithdrawLink>> {
            self.inner.get_by_hash(link_hash).await
        }

        async fn get_by_id(&self, id: &str) -> StorageResult<Option<WithdrawLink>> {
            self.inner.get_by_id(id).await
        }

        async fn compare_and_swap(
            &self,
            id: &str,
            expected: &UseState,
            next: &UseState,
        ) -> StorageResult<bool> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                return Ok(false);
            }
            self.inner.compare_and_swap(id, expected, next).await
        }
    }

    #[tokio::test]
    async fn test_lost_race_is_a_conflict() {
        let link = new_link(1, 0);
        let store = RacingStore {
            inner: MemoryLinkStore::new(),
            raced: AtomicBool::new(false),
        };
        store.insert(&link).await.unwrap();
        let engine = RedemptionEngine::new(Arc::new(store), Arc::new(paying_gateway()));

        let first = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 0).await;
        assert!(matches!(first, Err(WithdrawError::Conflict)));

        let retry = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 0).await;
        assert!(retry.is_ok());
    }

    /// Store that accepts the advance but refuses the compensation
    struct StuckStore {
        inner: MemoryLinkStore,
        swaps: AtomicUsize,
    }

    #[async_trait]
    impl LinkStore for StuckStore {
        async fn insert(&self, link: &WithdrawLink) -> StorageResult<()> {
            self.inner.insert(link).await
        }

        async fn get_by_hash(&self, link_hash: &str) -> StorageResult<Option<WithdrawLink>> {
            self.inner.get_by_hash(link_hash).await
        }

        async fn get_by_id(&self, id: &str) -> StorageResult<Option<WithdrawLink>> {
            self.inner.get_by_id(id).await
        }

        async fn compare_and_swap(
            &self,
            id: &str,
            expected: &UseState,
            next: &UseState,
        ) -> StorageResult<bool> {
            if self.swaps.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(StorageError::Connection("database is locked".to_string()));
            }
            self.inner.compare_and_swap(id, expected, next).await
        }
    }

    #[tokio::test]
    async fn test_failed_compensation_is_a_hard_error() {
        let link = new_link(1, 0);
        let store = StuckStore {
            inner: MemoryLinkStore::new(),
            swaps: AtomicUsize::new(0),
        };
        store.insert(&link).await.unwrap();
        let engine = RedemptionEngine::new(Arc::new(store), Arc::new(failing_gateway()));

        let err = engine
            .redeem_at(&link.link_hash, &link.k1, CLAIM, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, WithdrawError::RollbackFailed { .. }));
        assert!(!err.is_rejection());
        assert_eq!(err.reason(), "Internal error");
    }

    #[tokio::test]
    async fn test_redeem_against_sqlite_store() {
        let link = new_link(2, 60);
        let store = SqliteLinkStore::in_memory().unwrap();
        store.insert(&link).await.unwrap();
        let store: Arc<dyn LinkStore> = Arc::new(store);
        let engine = RedemptionEngine::new(store.clone(), Arc::new(failing_gateway()));

        let result = engine.redeem_at(&link.link_hash, &link.k1, CLAIM, 0).await;
        assert!(matches!(result, Err(WithdrawError::TransferFailed(_))));

        let after = store.get_by_id(&link.id).await.unwrap().unwrap();
        assert_eq!(after, link);
    }
}
