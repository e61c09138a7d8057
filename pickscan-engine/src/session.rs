//! Pick session controller
//!
//! One `PickSession` per operator screen. It owns every piece of mutable
//! pipeline state (accumulation slot, caches, timers, gates) and wires the
//! stages together:
//!
//! ```text
//! keystrokes -> ScanBuffer ─┐
//!                           ├─> resolve -> duplicate check -> accumulate -> auto-commit -> commit
//! transcript -> router ─────┘
//! ```
//!
//! Every terminal outcome is returned as a tagged value and published once on
//! the session's [`EventBus`].

use crate::accumulation::{AccumulationSlot, AccumulationState};
use crate::commit::{CommitExecutor, CommitOutcome};
use crate::duplicate::{DuplicateGuard, DuplicateVerdict};
use crate::error::{Error, Result};
use crate::inventory::InventoryService;
use crate::product::{ProductResolver, Resolution};
use crate::scan::{BusyFlag, KeyPress, ModalGate, ScanBuffer, ScanSink};
use crate::timer::{AutoCommitTimer, TimerTicket};
use crate::voice::{IgnoreReason, RouteOutcome, VoiceCommand, VoiceCommandRouter};
use pickscan_common::events::{ErrorKind, EventBus, PickEvent};
use pickscan_common::time::Clock;
use pickscan_common::{CommitJob, EngineConfig, Product, ScanEvent};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// What happened to one scan
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A modal is open
    Ignored,
    /// Another scan is being processed
    DroppedBusy,
    /// Shorter than the minimum code length
    TooShort,
    /// New accumulation cycle opened with one case
    Opened { code: String, cycle: u64 },
    /// Repeat scan of the active code
    Incremented { code: String, case_count: u32 },
    NotFound { code: String },
    LookupFailed { code: String, message: String },
    Inactive { code: String },
    /// Parked until the operator overrides (soft) or dismisses
    Blocked { code: String, verdict: DuplicateVerdict },
}

impl ScanOutcome {
    /// True if the scan is now part of the active slot
    pub fn is_accumulated(&self) -> bool {
        matches!(
            self,
            ScanOutcome::Opened { .. } | ScanOutcome::Incremented { .. }
        )
    }
}

/// Result of flushing the active slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to flush
    Idle,
    /// The requested cycle was superseded
    Stale,
    /// Same code committed moments ago; the slot stays active and re-armed
    Suppressed { code: String },
    Commit(CommitOutcome),
}

impl FlushOutcome {
    pub fn committed_job(&self) -> Option<&CommitJob> {
        match self {
            FlushOutcome::Commit(CommitOutcome::Committed(job)) => Some(job),
            _ => None,
        }
    }
}

/// Result of one voice transcript
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    Ignored(IgnoreReason),
    Unrecognized(String),
    Scanned(ScanOutcome),
    FulfillRequested(String),
    CasesAdded {
        scan: ScanOutcome,
        flush: Option<FlushOutcome>,
    },
    NoMatch { name: String },
    SearchFailed { message: String },
}

/// A duplicate-blocked scan awaiting the operator's decision
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDuplicate {
    pub code: String,
    pub product: Product,
    pub verdict: DuplicateVerdict,
    /// Case count spoken with an "add N cases" command, applied on override
    pub explicit_case_count: Option<u32>,
}

struct SessionInner {
    config: EngineConfig,
    resolver: ProductResolver,
    guard: DuplicateGuard,
    executor: CommitExecutor,
    timer: AutoCommitTimer,
    router: VoiceCommandRouter,
    buffer: ScanBuffer,
    bus: EventBus,
    modal: ModalGate,
    busy: BusyFlag,
    state: tokio::sync::Mutex<AccumulationState>,
    pending: Mutex<Option<PendingDuplicate>>,
}

#[derive(Clone)]
pub struct PickSession {
    inner: Arc<SessionInner>,
}

impl PickSession {
    pub fn new(
        config: EngineConfig,
        inventory: Arc<dyn InventoryService>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let router = VoiceCommandRouter::new(&config.voice)?;
        let modal = ModalGate::new();

        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<SessionInner>| {
            let weak = weak.clone();
            let sink: ScanSink = Arc::new(move |event: ScanEvent| {
                if let Some(inner) = weak.upgrade() {
                    let session = PickSession { inner };
                    tokio::spawn(async move {
                        session.process_scan(event).await;
                    });
                }
            });

            SessionInner {
                resolver: ProductResolver::new(inventory.clone(), &config.products),
                guard: DuplicateGuard::new(inventory.clone(), clock, &config.duplicate),
                executor: CommitExecutor::new(inventory),
                timer: AutoCommitTimer::new(config.accumulation.quiet_period()),
                router,
                buffer: ScanBuffer::new(&config.scan, modal.clone(), sink),
                bus: EventBus::default(),
                modal,
                busy: BusyFlag::new(),
                state: tokio::sync::Mutex::new(AccumulationState::new(
                    config.accumulation.resubmit_guard(),
                )),
                pending: Mutex::new(None),
                config,
            }
        });

        Ok(Self { inner })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PickEvent> {
        self.inner.bus.subscribe()
    }

    pub(crate) fn publish(&self, event: PickEvent) {
        trace!("Publishing {}", event.event_type());
        self.inner.bus.emit_lossy(event);
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingDuplicate>> {
        self.inner.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---------------------------------------------------------------------
    // Keyboard input
    // ---------------------------------------------------------------------

    /// Scan field value changed
    pub fn input(&self, field_value: &str) {
        self.inner.buffer.append(field_value);
    }

    /// Key event from the screen; returns true if it finalized a scan
    pub fn key(&self, key: &KeyPress) -> bool {
        self.inner.buffer.key(key)
    }

    pub fn scan_buffer(&self) -> &ScanBuffer {
        &self.inner.buffer
    }

    // ---------------------------------------------------------------------
    // Scan pipeline
    // ---------------------------------------------------------------------

    /// Run one finalized scan through the pipeline
    pub async fn process_scan(&self, event: ScanEvent) -> ScanOutcome {
        if self.inner.modal.is_open() {
            trace!("Scan ignored, modal open");
            return ScanOutcome::Ignored;
        }
        let Some(_busy) = self.inner.busy.try_acquire() else {
            debug!("Scan '{}' dropped, session busy", event.code());
            return ScanOutcome::DroppedBusy;
        };

        let code = event.code();
        if code.chars().count() < self.inner.config.scan.min_code_len {
            debug!("Scan '{}' dropped: too short", code);
            return ScanOutcome::TooShort;
        }

        debug!("Processing {} scan {}", event.source, code);
        self.scan_code(code).await
    }

    async fn scan_code(&self, code: &str) -> ScanOutcome {
        if let Some(outcome) = self.repeat_active(code).await {
            return outcome;
        }

        let cached = self.inner.resolver.cached(code);
        let (product, verdict) = match cached {
            Some(cached) => {
                self.publish(PickEvent::ScanResolved {
                    code: code.to_string(),
                    product: cached.clone(),
                    optimistic: true,
                    timestamp: pickscan_common::time::now(),
                });

                let (resolution, verdict) = tokio::join!(
                    self.inner.resolver.resolve(code),
                    self.inner.guard.check(code)
                );
                let product = match resolution {
                    Resolution::Found(product) => {
                        if product != cached {
                            debug!("Inventory corrected cached product for {}", code);
                            self.publish(PickEvent::ScanResolved {
                                code: code.to_string(),
                                product: product.clone(),
                                optimistic: false,
                                timestamp: pickscan_common::time::now(),
                            });
                        }
                        product
                    }
                    Resolution::NotFound => return self.not_found(code),
                    Resolution::LookupError(message) => {
                        warn!("Keeping cached product for {}: {}", code, message);
                        cached
                    }
                };
                (product, verdict)
            }
            None => {
                let product = match self.inner.resolver.resolve(code).await {
                    Resolution::Found(product) => product,
                    Resolution::NotFound => return self.not_found(code),
                    Resolution::LookupError(message) => {
                        self.publish(PickEvent::error(
                            ErrorKind::LookupTransient,
                            Some(code),
                            message.clone(),
                        ));
                        return ScanOutcome::LookupFailed {
                            code: code.to_string(),
                            message,
                        };
                    }
                };
                self.publish(PickEvent::ScanResolved {
                    code: code.to_string(),
                    product: product.clone(),
                    optimistic: false,
                    timestamp: pickscan_common::time::now(),
                });
                let verdict = self.inner.guard.check(code).await;
                (product, verdict)
            }
        };

        if !product.active {
            info!("Scan of inactive item {} discarded", code);
            self.publish(PickEvent::error(
                ErrorKind::ItemInactive,
                Some(code),
                format!("{} is inactive", product.display_name()),
            ));
            return ScanOutcome::Inactive {
                code: code.to_string(),
            };
        }

        match verdict {
            DuplicateVerdict::Allow => self.open_slot(code, product).await,
            DuplicateVerdict::Block {
                reason,
                minutes_elapsed,
                is_already_fulfilled,
            } => {
                info!(
                    "Duplicate blocked {}: {} {} min ago",
                    code, reason, minutes_elapsed
                );
                *self.pending() = Some(PendingDuplicate {
                    code: code.to_string(),
                    product,
                    verdict: verdict.clone(),
                    explicit_case_count: None,
                });
                self.publish(PickEvent::DuplicateBlocked {
                    code: code.to_string(),
                    reason,
                    is_already_fulfilled,
                    minutes_elapsed,
                    timestamp: pickscan_common::time::now(),
                });
                ScanOutcome::Blocked {
                    code: code.to_string(),
                    verdict,
                }
            }
        }
    }

    fn not_found(&self, code: &str) -> ScanOutcome {
        self.publish(PickEvent::error(
            ErrorKind::NotFound,
            Some(code),
            format!("Code {} is not registered", code),
        ));
        ScanOutcome::NotFound {
            code: code.to_string(),
        }
    }

    /// Merge a scan of the active code into its slot
    async fn repeat_active(&self, code: &str) -> Option<ScanOutcome> {
        let mut state = self.inner.state.lock().await;
        if !state.is_active_for(code) {
            return None;
        }
        let case_count = state.record_repeat(Instant::now())?;
        self.rearm(&state);
        self.publish(PickEvent::SlotUpdated {
            code: code.to_string(),
            case_count,
            timestamp: pickscan_common::time::now(),
        });
        Some(ScanOutcome::Incremented {
            code: code.to_string(),
            case_count,
        })
    }

    /// Flush any superseded slot, then open a new cycle for `code`
    async fn open_slot(&self, code: &str, product: Product) -> ScanOutcome {
        let mut state = self.inner.state.lock().await;

        if state.is_active_for(code) {
            let case_count = state.record_repeat(Instant::now()).unwrap_or(1);
            self.rearm(&state);
            self.publish(PickEvent::SlotUpdated {
                code: code.to_string(),
                case_count,
                timestamp: pickscan_common::time::now(),
            });
            return ScanOutcome::Incremented {
                code: code.to_string(),
                case_count,
            };
        }

        if let Some(previous) = state.take_for_flush(None) {
            self.inner.timer.cancel();
            let outcome = self.commit_slot(&mut state, previous).await;
            debug!("Superseded slot flushed before {}: {:?}", code, outcome);
        }
        self.inner.executor.wait_idle().await;

        let cycle = state.open(code, product, Instant::now()).cycle;
        self.rearm(&state);
        self.publish(PickEvent::SlotUpdated {
            code: code.to_string(),
            case_count: 1,
            timestamp: pickscan_common::time::now(),
        });
        ScanOutcome::Opened {
            code: code.to_string(),
            cycle,
        }
    }

    // ---------------------------------------------------------------------
    // Flush and commit
    // ---------------------------------------------------------------------

    fn rearm(&self, state: &AccumulationState) {
        let Some(slot) = state.slot() else {
            return;
        };
        if self.inner.modal.is_open() {
            return;
        }
        let session = Arc::downgrade(&self.inner);
        self.inner
            .timer
            .arm(&slot.code, slot.cycle, move |ticket| async move {
                if let Some(inner) = session.upgrade() {
                    PickSession { inner }.on_timer_fired(ticket).await;
                }
            });
    }

    async fn on_timer_fired(&self, ticket: TimerTicket) {
        let mut state = self.inner.state.lock().await;
        if !self.inner.timer.is_current(&ticket) {
            debug!(
                "Stale auto-commit timer for {} (generation {}) ignored",
                ticket.code, ticket.generation
            );
            return;
        }
        match state.slot() {
            Some(slot) if slot.code == ticket.code && slot.cycle == ticket.cycle => {}
            _ => {
                debug!("Auto-commit timer for {} no longer matches the slot", ticket.code);
                return;
            }
        }

        debug!("Quiet period elapsed, flushing {}", ticket.code);
        self.flush_locked(&mut state, Some(ticket.cycle)).await;
    }

    /// Flush the active slot
    ///
    /// A slot whose code was committed inside the resubmit guard stays active
    /// and is re-armed, so it commits once the guard has passed.
    async fn flush_locked(
        &self,
        state: &mut AccumulationState,
        expected_cycle: Option<u64>,
    ) -> FlushOutcome {
        if let Some(slot) = state.slot() {
            let current = expected_cycle.map_or(true, |cycle| slot.cycle == cycle);
            if current && state.should_suppress(&slot.code, Instant::now()) {
                debug!("Flush of {} deferred, committed moments ago", slot.code);
                let code = slot.code.clone();
                self.rearm(state);
                return FlushOutcome::Suppressed { code };
            }
        }

        let Some(slot) = state.take_for_flush(expected_cycle) else {
            return if state.is_idle() {
                FlushOutcome::Idle
            } else {
                FlushOutcome::Stale
            };
        };
        self.inner.timer.cancel();
        self.commit_slot(state, slot).await
    }

    async fn commit_slot(&self, state: &mut AccumulationState, slot: AccumulationSlot) -> FlushOutcome {
        let outcome = self.inner.executor.commit(slot.to_commit_job()).await;
        self.settle(state, slot, &outcome);
        FlushOutcome::Commit(outcome)
    }

    fn settle(&self, state: &mut AccumulationState, slot: AccumulationSlot, outcome: &CommitOutcome) {
        match outcome {
            CommitOutcome::Committed(job) => {
                state.mark_committed(&slot.code, Instant::now());
                self.inner.guard.invalidate(&slot.code);
                self.publish(PickEvent::Committed {
                    job: job.clone(),
                    timestamp: pickscan_common::time::now(),
                });
            }
            CommitOutcome::Duplicate(_) => {}
            CommitOutcome::Inactive(job) => {
                self.inner.resolver.invalidate(&slot.code);
                self.publish(PickEvent::error(
                    ErrorKind::ItemInactive,
                    Some(&job.code),
                    format!("{} is inactive; pick discarded", job.name),
                ));
            }
            CommitOutcome::Failed { job, message } => {
                self.publish(PickEvent::error(
                    ErrorKind::CommitFailed,
                    Some(&job.code),
                    message.clone(),
                ));
                state.preserve_failed(slot);
            }
        }
    }

    /// Commit the active slot now
    pub async fn commit_now(&self) -> FlushOutcome {
        let mut state = self.inner.state.lock().await;
        self.flush_locked(&mut state, None).await
    }

    /// Commit the slot preserved by the last failed commit
    pub async fn retry_failed_commit(&self) -> Result<FlushOutcome> {
        let mut state = self.inner.state.lock().await;
        let slot = state
            .take_failed()
            .ok_or_else(|| Error::InvalidState("no failed commit to retry".to_string()))?;

        info!("Retrying commit of {} (cycle {})", slot.code, slot.cycle);
        Ok(self.commit_slot(&mut state, slot).await)
    }

    // ---------------------------------------------------------------------
    // Slot edits
    // ---------------------------------------------------------------------

    /// Set the active slot's case count explicitly
    pub async fn set_case_count(&self, case_count: u32) -> Result<u32> {
        if case_count == 0 {
            return Err(Error::InvalidInput("case count must be at least 1".to_string()));
        }
        let mut state = self.inner.state.lock().await;
        let case_count = state
            .set_case_count(case_count, Instant::now())
            .ok_or_else(|| Error::InvalidState("no active slot".to_string()))?;
        self.rearm(&state);
        if let Some(code) = state.active_code() {
            self.publish(PickEvent::SlotUpdated {
                code: code.to_string(),
                case_count,
                timestamp: pickscan_common::time::now(),
            });
        }
        Ok(case_count)
    }

    /// Override the units per case sent with the active slot's commit
    pub async fn set_units_per_case(&self, units: u32) -> Result<u32> {
        if units == 0 {
            return Err(Error::InvalidInput("units per case must be at least 1".to_string()));
        }
        let mut state = self.inner.state.lock().await;
        if !state.set_units_override(units, Instant::now()) {
            return Err(Error::InvalidState("no active slot".to_string()));
        }
        self.rearm(&state);
        Ok(units)
    }

    pub async fn active_slot(&self) -> Option<AccumulationSlot> {
        self.inner.state.lock().await.slot().cloned()
    }

    pub async fn failed_slot(&self) -> Option<AccumulationSlot> {
        self.inner.state.lock().await.failed().cloned()
    }

    // ---------------------------------------------------------------------
    // Gates and operator decisions
    // ---------------------------------------------------------------------

    /// Open or close the modal gate
    ///
    /// Opening cancels the auto-commit timer and drops pending scanner input;
    /// closing re-arms the timer for a still-active slot.
    pub async fn set_modal_open(&self, open: bool) {
        self.inner.modal.set_open(open);
        if open {
            self.inner.timer.cancel();
            self.inner.buffer.clear();
            debug!("Modal opened, input suspended");
        } else {
            let state = self.inner.state.lock().await;
            self.rearm(&state);
            debug!("Modal closed, input resumed");
        }
    }

    pub fn is_modal_open(&self) -> bool {
        self.inner.modal.is_open()
    }

    pub fn pending_duplicate(&self) -> Option<PendingDuplicate> {
        self.pending().clone()
    }

    /// Accept a soft-blocked scan anyway
    ///
    /// A blocked "add N cases" command resumes where it stopped: the slot
    /// takes the spoken count and is committed right away.
    pub async fn override_duplicate(&self) -> Result<ScanOutcome> {
        let pending = self
            .pending()
            .take()
            .ok_or_else(|| Error::InvalidState("no blocked scan awaiting a decision".to_string()))?;

        if pending.verdict.is_hard_block() {
            return Err(Error::InvalidState(format!(
                "{} was already fulfilled; override not allowed",
                pending.code
            )));
        }

        info!("Operator overrode duplicate block for {}", pending.code);
        let outcome = self.open_slot(&pending.code, pending.product).await;
        if let Some(count) = pending.explicit_case_count {
            if outcome.is_accumulated() {
                let flush = self.commit_with_count(count).await?;
                debug!("Overridden {} committed with {} cases: {:?}", pending.code, count, flush);
            }
        }
        Ok(outcome)
    }

    /// Drop a blocked scan; returns false if none was pending
    pub fn dismiss_duplicate(&self) -> bool {
        let dismissed = self.pending().take();
        if let Some(pending) = &dismissed {
            debug!("Duplicate block for {} dismissed", pending.code);
        }
        dismissed.is_some()
    }

    // ---------------------------------------------------------------------
    // Voice
    // ---------------------------------------------------------------------

    /// Route one final transcript from the recognizer
    pub async fn handle_transcript(&self, transcript: &str) -> VoiceOutcome {
        if self.inner.modal.is_open() {
            return VoiceOutcome::Ignored(IgnoreReason::ModalOpen);
        }

        match self.inner.router.route(transcript) {
            RouteOutcome::Ignored(reason) => VoiceOutcome::Ignored(reason),
            RouteOutcome::Unrecognized(text) => {
                debug!("Unrecognized voice command: '{}'", text);
                VoiceOutcome::Unrecognized(text)
            }
            RouteOutcome::Command(VoiceCommand::Register { code }) => {
                VoiceOutcome::Scanned(self.process_scan(ScanEvent::voice(code)).await)
            }
            RouteOutcome::Command(VoiceCommand::Fulfill { code }) => {
                info!("Voice fulfill request for {}", code);
                self.publish(PickEvent::FulfillRequested {
                    code: code.clone(),
                    timestamp: pickscan_common::time::now(),
                });
                VoiceOutcome::FulfillRequested(code)
            }
            RouteOutcome::Command(VoiceCommand::AddCases { count, name }) => {
                self.add_cases(count, &name).await
            }
        }
    }

    async fn add_cases(&self, count: u32, name: &str) -> VoiceOutcome {
        let products = match self.inner.resolver.search_by_name(name).await {
            Ok(products) => products,
            Err(e) => {
                warn!("Name search for '{}' failed: {}", name, e);
                let message = e.to_string();
                self.publish(PickEvent::error(ErrorKind::LookupTransient, None, message.clone()));
                return VoiceOutcome::SearchFailed { message };
            }
        };

        let Some(product) = products.into_iter().next() else {
            self.publish(PickEvent::error(
                ErrorKind::NotFound,
                None,
                format!("No product matches '{}'", name),
            ));
            return VoiceOutcome::NoMatch {
                name: name.to_string(),
            };
        };

        let scan = self.process_scan(ScanEvent::voice(product.code.clone())).await;
        if let ScanOutcome::Blocked { code, .. } = &scan {
            if let Some(pending) = self.pending().as_mut().filter(|p| p.code == *code) {
                pending.explicit_case_count = Some(count);
            }
        }
        if !scan.is_accumulated() {
            return VoiceOutcome::CasesAdded { scan, flush: None };
        }

        match self.commit_with_count(count).await {
            Ok(flush) => VoiceOutcome::CasesAdded {
                scan,
                flush: Some(flush),
            },
            Err(e) => {
                warn!("Could not set {} cases on {}: {}", count, product.code, e);
                VoiceOutcome::CasesAdded { scan, flush: None }
            }
        }
    }

    /// Set an explicit case count on the active slot and commit it
    async fn commit_with_count(&self, count: u32) -> Result<FlushOutcome> {
        self.set_case_count(count).await?;
        Ok(self.commit_now().await)
    }

    // ---------------------------------------------------------------------
    // Inventory notifications
    // ---------------------------------------------------------------------

    /// Best-effort inventory change notification
    ///
    /// Named codes are dropped from the product cache (all entries when the
    /// list is empty). An affected active slot is re-resolved and corrected
    /// in place.
    pub async fn apply_inventory_change(&self, codes: &[String]) {
        if codes.is_empty() {
            self.inner.resolver.clear();
            debug!("Inventory change: product cache cleared");
        } else {
            for code in codes {
                self.inner.resolver.invalidate(code);
            }
            debug!("Inventory change: {} cached products invalidated", codes.len());
        }

        let active = {
            let state = self.inner.state.lock().await;
            state
                .slot()
                .filter(|slot| {
                    codes.is_empty()
                        || codes
                            .iter()
                            .any(|c| *c == slot.code || *c == slot.product.principal_code)
                })
                .map(|slot| slot.code.clone())
        };
        let Some(code) = active else {
            return;
        };

        if let Resolution::Found(product) = self.inner.resolver.resolve(&code).await {
            let mut state = self.inner.state.lock().await;
            let changed = state.slot().is_some_and(|slot| slot.product != product);
            if changed && state.correct_product(&code, product.clone()) {
                info!("Active slot {} corrected after inventory change", code);
                self.publish(PickEvent::ScanResolved {
                    code,
                    product,
                    optimistic: false,
                    timestamp: pickscan_common::time::now(),
                });
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.is_busy()
    }
}
