//! # Pickscan Common Library
//!
//! Shared code for the pickscan crates including:
//! - Data model (products, scan events, commit jobs)
//! - Event types (PickEvent enum) and the EventBus
//! - Configuration loading
//! - Wall-clock and time-of-day utilities

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::{CommitJob, CommitStatus, CorrelationId, Product, RecentActivity, ScanEvent, ScanSource};
