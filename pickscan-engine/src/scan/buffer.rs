//! Scan buffer
//!
//! `append` receives the full value of the scan field on every change.
//! A terminator key on the scan field flushes immediately; otherwise the
//! buffer is finalized once no change has arrived for the idle window
//! (100ms desktop, 500ms for handheld integrations that may omit Enter).

use super::{KeyPress, InputTarget, ModalGate};
use pickscan_common::config::ScanConfig;
use pickscan_common::ScanEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

/// Receives every finalized code
pub type ScanSink = Arc<dyn Fn(ScanEvent) + Send + Sync>;

#[derive(Clone)]
pub struct ScanBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    value: Mutex<String>,
    generation: AtomicU64,
    idle_window: Duration,
    min_code_len: usize,
    modal: ModalGate,
    sink: ScanSink,
}

impl BufferInner {
    fn value(&self) -> MutexGuard<'_, String> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finalize(&self) -> Option<String> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let raw = std::mem::take(&mut *self.value());
        let code = raw.trim();
        if code.is_empty() {
            return None;
        }
        if self.modal.is_open() {
            trace!("Scan '{}' ignored, modal open", code);
            return None;
        }
        if code.chars().count() < self.min_code_len {
            debug!("Scan '{}' dropped: shorter than {}", code, self.min_code_len);
            return None;
        }

        let code = code.to_string();
        (self.sink)(ScanEvent::keyboard(code.clone()));
        Some(code)
    }
}

impl ScanBuffer {
    pub fn new(config: &ScanConfig, modal: ModalGate, sink: ScanSink) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                value: Mutex::new(String::new()),
                generation: AtomicU64::new(0),
                idle_window: config.idle_window(),
                min_code_len: config.min_code_len,
                modal,
                sink,
            }),
        }
    }

    /// Field value changed; restarts the idle window
    pub fn append(&self, field_value: &str) {
        if self.inner.modal.is_open() {
            self.clear();
            return;
        }

        *self.inner.value() = field_value.to_string();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let inner = Arc::downgrade(&self.inner);
        let idle_window = self.inner.idle_window;
        tokio::spawn(async move {
            tokio::time::sleep(idle_window).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if inner.generation.load(Ordering::SeqCst) == generation {
                trace!("Idle window elapsed, finalizing scan buffer");
                inner.finalize();
            }
        });
    }

    /// Key event; returns true if it finalized the buffer
    pub fn key(&self, key: &KeyPress) -> bool {
        if key.target != InputTarget::ScanField || !key.is_terminator() {
            return false;
        }
        if self.inner.modal.is_open() {
            self.clear();
            return false;
        }
        self.flush().is_some()
    }

    /// Finalize now; returns the code handed to the sink, if any
    pub fn flush(&self) -> Option<String> {
        self.inner.finalize()
    }

    /// Drop pending input and any armed idle timer
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.value().clear();
    }

    pub fn pending(&self) -> String {
        self.inner.value().clone()
    }
}
