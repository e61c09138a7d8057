//! Accumulation state machine
//!
//! `Idle -> Active(code) -> Idle`. Repeat scans of the active code merge into
//! one slot; the slot is flushed into a [`CommitJob`] on a code change, an
//! explicit commit, or a timer expiry. Each activation carries a monotonic
//! cycle number so a flush request can name the cycle it expects, and a
//! superseded cycle can never flush twice.
//!
//! This type holds no locks and does no I/O. The session owns it behind its
//! state mutex and drives the commit itself.

use chrono::{DateTime, Utc};
use pickscan_common::{CommitJob, CorrelationId, Product};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// One pending pick
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationSlot {
    /// Code as scanned
    pub code: String,
    /// Resolved product snapshot
    pub product: Product,
    pub case_count: u32,
    /// Explicit units-per-case, overriding the product's value
    pub units_override: Option<u32>,
    pub cycle: u64,
    pub cycle_started_at: DateTime<Utc>,
    pub last_activity: Instant,
}

impl AccumulationSlot {
    pub fn units_per_case(&self) -> u32 {
        self.units_override.unwrap_or(self.product.units_per_case)
    }

    pub fn correlation_id(&self) -> CorrelationId {
        CorrelationId {
            code: self.code.clone(),
            cycle: self.cycle,
            cycle_started_at: self.cycle_started_at,
        }
    }

    /// Commit job for this slot; a fresh job id on every call
    pub fn to_commit_job(&self) -> CommitJob {
        CommitJob::new(
            self.code.clone(),
            self.product.display_name(),
            self.case_count,
            self.units_per_case(),
            self.correlation_id(),
        )
    }
}

#[derive(Debug)]
pub struct AccumulationState {
    slot: Option<AccumulationSlot>,
    /// Slot whose commit failed, kept for a manual retry
    failed: Option<AccumulationSlot>,
    next_cycle: u64,
    last_committed: Option<(String, Instant)>,
    resubmit_guard: Duration,
}

impl AccumulationState {
    pub fn new(resubmit_guard: Duration) -> Self {
        Self {
            slot: None,
            failed: None,
            next_cycle: 1,
            last_committed: None,
            resubmit_guard,
        }
    }

    pub fn slot(&self) -> Option<&AccumulationSlot> {
        self.slot.as_ref()
    }

    pub fn active_code(&self) -> Option<&str> {
        self.slot.as_ref().map(|s| s.code.as_str())
    }

    pub fn is_idle(&self) -> bool {
        self.slot.is_none()
    }

    pub fn is_active_for(&self, code: &str) -> bool {
        self.active_code() == Some(code)
    }

    /// Start a new cycle for `product` with one case
    ///
    /// The caller flushes any previous slot first; opening over a live slot
    /// replaces it and is logged.
    pub fn open(&mut self, code: &str, product: Product, now: Instant) -> &AccumulationSlot {
        if let Some(previous) = &self.slot {
            debug!(
                "Replacing unflushed slot {} (cycle {}) with {}",
                previous.code, previous.cycle, code
            );
        }

        let cycle = self.next_cycle;
        self.next_cycle += 1;
        self.slot.insert(AccumulationSlot {
            code: code.to_string(),
            product,
            case_count: 1,
            units_override: None,
            cycle,
            cycle_started_at: Utc::now(),
            last_activity: now,
        })
    }

    /// Repeat scan of the active code; returns the new case count
    pub fn record_repeat(&mut self, now: Instant) -> Option<u32> {
        let slot = self.slot.as_mut()?;
        slot.case_count = slot.case_count.saturating_add(1);
        slot.last_activity = now;
        Some(slot.case_count)
    }

    /// Explicit case count (voice "set quantity")
    pub fn set_case_count(&mut self, case_count: u32, now: Instant) -> Option<u32> {
        let slot = self.slot.as_mut()?;
        slot.case_count = case_count;
        slot.last_activity = now;
        Some(slot.case_count)
    }

    pub fn set_units_override(&mut self, units: u32, now: Instant) -> bool {
        match self.slot.as_mut() {
            Some(slot) => {
                slot.units_override = Some(units);
                slot.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// Replace the product snapshot of the active slot if it is for `code`
    pub fn correct_product(&mut self, code: &str, product: Product) -> bool {
        match self.slot.as_mut() {
            Some(slot) if slot.code == code => {
                slot.product = product;
                true
            }
            _ => false,
        }
    }

    /// Remove the active slot for flushing
    ///
    /// With `expected_cycle` set, only that cycle is taken; a slot from a
    /// newer cycle is left alone.
    pub fn take_for_flush(&mut self, expected_cycle: Option<u64>) -> Option<AccumulationSlot> {
        match (&self.slot, expected_cycle) {
            (Some(slot), Some(expected)) if slot.cycle != expected => {
                debug!(
                    "Flush for cycle {} skipped, slot {} is on cycle {}",
                    expected, slot.code, slot.cycle
                );
                None
            }
            _ => self.slot.take(),
        }
    }

    /// True if `code` was committed within the resubmit guard
    pub fn should_suppress(&self, code: &str, now: Instant) -> bool {
        match &self.last_committed {
            Some((last, at)) => last == code && now.duration_since(*at) < self.resubmit_guard,
            None => false,
        }
    }

    pub fn mark_committed(&mut self, code: &str, now: Instant) {
        self.last_committed = Some((code.to_string(), now));
    }

    pub fn preserve_failed(&mut self, slot: AccumulationSlot) {
        if let Some(previous) = self.failed.replace(slot) {
            debug!(
                "Earlier failed slot {} (cycle {}) replaced",
                previous.code, previous.cycle
            );
        }
    }

    pub fn failed(&self) -> Option<&AccumulationSlot> {
        self.failed.as_ref()
    }

    pub fn take_failed(&mut self) -> Option<AccumulationSlot> {
        self.failed.take()
    }
}
