//! Commit executor
//!
//! Writes finished picks to the inventory service one at a time. A commit
//! carrying a correlation id that was already accepted is dropped as a double
//! invocation of the same cycle. A failed commit releases its id so the
//! preserved slot can be retried.

use crate::error::InventoryError;
use crate::inventory::InventoryService;
use pickscan_common::{CommitJob, CommitStatus, CorrelationId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Result of one commit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(CommitJob),
    /// Same cycle already committed or in flight; nothing was sent
    Duplicate(CommitJob),
    /// Inventory refused an inactive item; the slot is discarded
    Inactive(CommitJob),
    /// Transport or server failure; the slot is kept for retry
    Failed { job: CommitJob, message: String },
}

impl CommitOutcome {
    pub fn job(&self) -> &CommitJob {
        match self {
            CommitOutcome::Committed(job)
            | CommitOutcome::Duplicate(job)
            | CommitOutcome::Inactive(job)
            | CommitOutcome::Failed { job, .. } => job,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

pub struct CommitExecutor {
    inventory: Arc<dyn InventoryService>,
    /// Serializes writes so commits reach the inventory in flush order
    lane: tokio::sync::Mutex<()>,
    seen: Mutex<HashSet<CorrelationId>>,
}

impl CommitExecutor {
    pub fn new(inventory: Arc<dyn InventoryService>) -> Self {
        Self {
            inventory,
            lane: tokio::sync::Mutex::new(()),
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn seen(&self) -> MutexGuard<'_, HashSet<CorrelationId>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Commit a job, awaiting the inventory's answer
    pub async fn commit(&self, mut job: CommitJob) -> CommitOutcome {
        if !self.seen().insert(job.correlation_id.clone()) {
            debug!(
                "Dropping double commit of cycle {} ({} x{})",
                job.correlation_id, job.code, job.case_count
            );
            return CommitOutcome::Duplicate(job);
        }

        let _lane = self.lane.lock().await;
        match self.inventory.commit_pick(&job).await {
            Ok(()) => {
                job.status = CommitStatus::Committed;
                info!(
                    "Committed {} \"{}\": {} cases x {} units",
                    job.code, job.name, job.case_count, job.units_per_case
                );
                CommitOutcome::Committed(job)
            }
            Err(InventoryError::Inactive(_)) => {
                job.status = CommitStatus::Rejected;
                warn!("Commit of {} rejected: item inactive", job.code);
                CommitOutcome::Inactive(job)
            }
            Err(e) => {
                job.status = CommitStatus::Failed;
                self.seen().remove(&job.correlation_id);
                error!("Commit of {} failed: {}", job.code, e);
                CommitOutcome::Failed {
                    job,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Wait for any in-flight commit to finish
    pub async fn wait_idle(&self) {
        let _lane = self.lane.lock().await;
    }

    pub fn is_known(&self, correlation_id: &CorrelationId) -> bool {
        self.seen().contains(correlation_id)
    }
}
