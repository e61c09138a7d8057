//! # Pickscan engine
//!
//! Scan ingestion and commit engine for warehouse pick terminals.
//!
//! **Purpose:** Turn scanner keystrokes and voice transcripts into picks,
//! merge repeated scans of one code, guard against re-picking inside the
//! cool-down window, and commit each pick to the inventory exactly once.
//!
//! **Architecture:** One [`PickSession`] per operator screen owns the
//! pipeline: [`scan::ScanBuffer`] / [`voice::VoiceCommandRouter`] ->
//! [`product::ProductResolver`] -> [`duplicate::DuplicateGuard`] ->
//! [`accumulation::AccumulationState`] -> [`timer::AutoCommitTimer`] ->
//! [`commit::CommitExecutor`] -> [`inventory::InventoryService`].

pub mod accumulation;
pub mod commit;
pub mod duplicate;
pub mod error;
pub mod inventory;
pub mod product;
pub mod scan;
pub mod session;
pub mod text;
pub mod timer;
pub mod voice;

pub use error::{Error, Result};
pub use session::{FlushOutcome, PendingDuplicate, PickSession, ScanOutcome, VoiceOutcome};
