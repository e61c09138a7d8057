//! Scanner input handling
//!
//! Keyboard-wedge scanners type a code into the focused field as a fast burst
//! of keystrokes, usually followed by Enter. [`ScanBuffer`] turns that stream
//! into discrete codes. [`ModalGate`] and [`BusyFlag`] are the only two gates
//! on the scan path.

mod buffer;

pub use buffer::{ScanBuffer, ScanSink};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Element a key event was delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    ScanField,
    Other,
}

/// One key event from the screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub key_code: u32,
    pub target: InputTarget,
}

impl KeyPress {
    pub fn enter() -> Self {
        Self {
            key: "Enter".to_string(),
            key_code: 13,
            target: InputTarget::ScanField,
        }
    }

    /// Enter, Return or key code 13
    pub fn is_terminator(&self) -> bool {
        self.key == "Enter" || self.key == "Return" || self.key_code == 13
    }
}

/// Set while any modal or dialog is open; input is ignored entirely
#[derive(Debug, Clone, Default)]
pub struct ModalGate(Arc<AtomicBool>);

impl ModalGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open(&self, open: bool) {
        self.0.store(open, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Serializes scan processing; a scan that finds it held is dropped
#[derive(Debug, Default)]
pub struct BusyFlag(AtomicBool);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag, or `None` if a scan is already being processed
    pub fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Releases the busy flag when dropped
pub struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
