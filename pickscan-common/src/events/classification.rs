//! Outcome classifications consumed by the screen
//!
//! The screen maps each classification to its own toast text and audio cue.

use serde::{Deserialize, Serialize};

/// Terminal outcome taxonomy of the scan pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Code shorter than the minimum length; dropped without feedback
    InputTooShort,
    /// Code unknown to the inventory; offers the external alias flow
    NotFound,
    /// Lookup failed in transit; the caller may retry
    LookupTransient,
    /// Inside the cool-down window, the operator may override
    DuplicateBlockedSoft,
    /// Already fulfilled inside the cool-down window, no override
    DuplicateBlockedHard,
    /// Item is inactive; the accumulation is discarded
    ItemInactive,
    /// Commit failed; the accumulation is kept for manual retry
    CommitFailed,
}

impl ErrorKind {
    /// True when the classification ends the current pick for good
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::DuplicateBlockedHard | ErrorKind::ItemInactive
        )
    }

    /// True when the operator or the caller can retry
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::LookupTransient | ErrorKind::CommitFailed | ErrorKind::DuplicateBlockedSoft
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InputTooShort => "input_too_short",
            ErrorKind::NotFound => "not_found",
            ErrorKind::LookupTransient => "lookup_transient",
            ErrorKind::DuplicateBlockedSoft => "duplicate_blocked_soft",
            ErrorKind::DuplicateBlockedHard => "duplicate_blocked_hard",
            ErrorKind::ItemInactive => "item_inactive",
            ErrorKind::CommitFailed => "commit_failed",
        };
        write!(f, "{}", s)
    }
}

/// Which cool-down axis blocked a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Added to the active job too recently
    RecentlyAdded,
    /// Fulfilled too recently
    RecentlyFulfilled,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::RecentlyAdded => write!(f, "recently added"),
            BlockReason::RecentlyFulfilled => write!(f, "recently fulfilled"),
        }
    }
}
