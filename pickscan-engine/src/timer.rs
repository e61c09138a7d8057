//! Debounced auto-commit timer
//!
//! Every arm bumps a generation counter and replaces the sleeping task. When
//! the quiet period elapses the fire callback is spawned on its own task with
//! a [`TimerTicket`]; the callback must check [`AutoCommitTimer::is_current`]
//! and the slot's code/cycle before acting, since a newer arm or a cancel may
//! land between the wake-up and the callback taking its locks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// What a timer fire was armed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTicket {
    pub generation: u64,
    pub code: String,
    pub cycle: u64,
}

pub struct AutoCommitTimer {
    quiet_period: Duration,
    generation: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoCommitTimer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            generation: AtomicU64::new(0),
            handle: Mutex::new(None),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// (Re)arm for the given slot; any earlier arm is superseded
    pub fn arm<F, Fut>(&self, code: &str, cycle: u64, fire: F) -> TimerTicket
    where
        F: FnOnce(TimerTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = TimerTicket {
            generation,
            code: code.to_string(),
            cycle,
        };

        let quiet_period = self.quiet_period;
        let fire_ticket = ticket.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            trace!(
                "Auto-commit timer fired for {} (generation {})",
                fire_ticket.code,
                fire_ticket.generation
            );
            // Detached so a cancel issued by the flush itself cannot abort it
            tokio::spawn(fire(fire_ticket));
        });

        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = handle.replace(task) {
            previous.abort();
        }
        ticket
    }

    /// Invalidate any armed timer
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    pub fn is_current(&self, ticket: &TimerTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }
}

impl Drop for AutoCommitTimer {
    fn drop(&mut self) {
        if let Some(task) = self
            .handle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
