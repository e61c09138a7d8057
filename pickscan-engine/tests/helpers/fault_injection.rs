//! Inventory wrapper with injectable failures and latency
//!
//! Wraps an [`InMemoryInventory`] and lets a test make lookups, activity
//! checks or commits fail, or delay lookups so two scans overlap.

use async_trait::async_trait;
use pickscan_common::{CommitJob, Product, RecentActivity};
use pickscan_engine::error::InventoryError;
use pickscan_engine::inventory::{InMemoryInventory, InventoryService};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FaultyInventory {
    inner: Arc<InMemoryInventory>,
    fail_lookups: AtomicBool,
    fail_activity: AtomicBool,
    /// Number of upcoming commits that fail with a transport error
    failing_commits: AtomicUsize,
    lookup_delay_ms: AtomicU64,
    commit_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl FaultyInventory {
    pub fn new(inner: Arc<InMemoryInventory>) -> Self {
        Self {
            inner,
            fail_lookups: AtomicBool::new(false),
            fail_activity: AtomicBool::new(false),
            failing_commits: AtomicUsize::new(0),
            lookup_delay_ms: AtomicU64::new(0),
            commit_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_activity_checks(&self, fail: bool) {
        self.fail_activity.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub fn delay_lookups(&self, delay: Duration) {
        self.lookup_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryService for FaultyInventory {
    async fn resolve_product(&self, code: &str) -> Result<Product, InventoryError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(InventoryError::Transport("lookup timed out".to_string()));
        }
        self.inner.resolve_product(code).await
    }

    async fn check_recent_activity(&self, code: &str) -> Result<RecentActivity, InventoryError> {
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(InventoryError::Transport("activity check timed out".to_string()));
        }
        self.inner.check_recent_activity(code).await
    }

    async fn commit_pick(&self, job: &CommitJob) -> Result<(), InventoryError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(InventoryError::Transport("connection reset".to_string()));
        }
        self.inner.commit_pick(job).await
    }

    async fn search_products_by_name(&self, name: &str) -> Result<Vec<Product>, InventoryError> {
        self.inner.search_products_by_name(name).await
    }
}
