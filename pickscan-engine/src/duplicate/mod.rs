//! Duplicate / cool-down guard
//!
//! A code added to the active job or fulfilled less than the cool-down window
//! ago is blocked. A block on the fulfilled axis is hard (no override); a block
//! on the added axis is soft and the operator may override it.
//!
//! The inventory reports times of day, not timestamps: a time later than now
//! is read as yesterday before differencing, so overnight shifts never see a
//! negative elapsed time.

mod verdict_cache;

pub use verdict_cache::VerdictCache;

use crate::inventory::InventoryService;
use chrono::NaiveDateTime;
use pickscan_common::config::DuplicateConfig;
use pickscan_common::events::{BlockReason, ErrorKind};
use pickscan_common::time::{minutes_since_time_of_day, Clock};
use pickscan_common::RecentActivity;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of a duplicate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateVerdict {
    Allow,
    Block {
        reason: BlockReason,
        minutes_elapsed: i64,
        is_already_fulfilled: bool,
    },
}

impl DuplicateVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DuplicateVerdict::Allow)
    }

    /// Hard blocks cannot be overridden until the cool-down elapses
    pub fn is_hard_block(&self) -> bool {
        matches!(
            self,
            DuplicateVerdict::Block {
                is_already_fulfilled: true,
                ..
            }
        )
    }

    pub fn classification(&self) -> Option<ErrorKind> {
        match self {
            DuplicateVerdict::Allow => None,
            DuplicateVerdict::Block {
                is_already_fulfilled: true,
                ..
            } => Some(ErrorKind::DuplicateBlockedHard),
            DuplicateVerdict::Block { .. } => Some(ErrorKind::DuplicateBlockedSoft),
        }
    }
}

pub struct DuplicateGuard {
    inventory: Arc<dyn InventoryService>,
    clock: Arc<dyn Clock>,
    cooldown_minutes: i64,
    cache: Mutex<VerdictCache>,
}

impl DuplicateGuard {
    pub fn new(
        inventory: Arc<dyn InventoryService>,
        clock: Arc<dyn Clock>,
        config: &DuplicateConfig,
    ) -> Self {
        Self {
            inventory,
            clock,
            cooldown_minutes: config.cooldown_minutes,
            cache: Mutex::new(VerdictCache::new(
                config.verdict_ttl(),
                config.verdict_cache_cap,
            )),
        }
    }

    fn cache(&self) -> MutexGuard<'_, VerdictCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check a code against the cool-down window
    ///
    /// A failed activity lookup fails open: the pick is allowed, nothing is
    /// cached, and a warning is logged.
    pub async fn check(&self, code: &str) -> DuplicateVerdict {
        if let Some(verdict) = self.cache().get(code, Instant::now()) {
            debug!("Duplicate verdict for {} served from cache: {:?}", code, verdict);
            return verdict;
        }

        match self.inventory.check_recent_activity(code).await {
            Ok(activity) => {
                let verdict = self.evaluate(&activity, self.clock.now_local());
                self.cache().insert(code, verdict.clone(), Instant::now());
                verdict
            }
            Err(e) => {
                warn!("Duplicate check for {} failed, allowing: {}", code, e);
                DuplicateVerdict::Allow
            }
        }
    }

    /// Apply the cool-down rule to an activity record at `now`
    pub fn evaluate(&self, activity: &RecentActivity, now: NaiveDateTime) -> DuplicateVerdict {
        if !activity.exists {
            return DuplicateVerdict::Allow;
        }

        // A recent add is reported before a recent fulfillment
        if let Some(added_at) = activity.added_at {
            let minutes = minutes_since_time_of_day(added_at, now);
            if minutes < self.cooldown_minutes {
                return DuplicateVerdict::Block {
                    reason: BlockReason::RecentlyAdded,
                    minutes_elapsed: minutes,
                    is_already_fulfilled: false,
                };
            }
        }

        if activity.fulfilled {
            if let Some(fulfilled_at) = activity.fulfilled_at {
                let minutes = minutes_since_time_of_day(fulfilled_at, now);
                if minutes < self.cooldown_minutes {
                    return DuplicateVerdict::Block {
                        reason: BlockReason::RecentlyFulfilled,
                        minutes_elapsed: minutes,
                        is_already_fulfilled: true,
                    };
                }
            }
        }

        DuplicateVerdict::Allow
    }

    /// Forget the cached verdict for a code (after a successful commit)
    pub fn invalidate(&self, code: &str) {
        self.cache().invalidate(code);
    }
}
