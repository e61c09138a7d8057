//! Test helper modules for pickscan-engine integration tests
//!
//! - Harness: a session over a fixed catalog with a manual wall clock
//! - FaultyInventory: inventory wrapper with injectable failures

#![allow(dead_code)]

pub mod fault_injection;
pub mod harness;

pub use fault_injection::FaultyInventory;
pub use harness::*;
