//! Voice input
//!
//! Transcripts become the same primitives as scans: a register command is one
//! scan, an add-cases command is a scan plus an explicit case count.

pub mod listener;
pub mod router;

pub use listener::{ListenerExit, Recognizer, RecognizerError, RecognizerSignal, VoiceListener};
pub use router::{IgnoreReason, RouteOutcome, VoiceCommand, VoiceCommandRouter};
