//! Error types for pickscan-engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Failure reported by the inventory service seam
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Code (or alias) unknown to the inventory
    #[error("Product not found: {0}")]
    NotFound(String),

    /// Item exists but is marked inactive (out of stock)
    #[error("Item inactive: {0}")]
    Inactive(String),

    /// Request rejected for another business reason
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Network or server failure
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Main error type for pickscan-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Shared configuration/IO errors
    #[error(transparent)]
    Common(#[from] pickscan_common::Error),

    /// Inventory service errors
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Catalog file could not be parsed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Voice grammar could not be built
    #[error("Voice grammar error: {0}")]
    Grammar(#[from] regex::Error),

    /// Speech recognizer could not be started
    #[error("Recognizer error: {0}")]
    Recognizer(String),

    /// Operator input rejected
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using pickscan-engine Error
pub type Result<T> = std::result::Result<T, Error>;
