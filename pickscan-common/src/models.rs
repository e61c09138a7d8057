//! Shared data model for the scan ingestion pipeline
//!
//! These types cross the boundary between the engine, the inventory service
//! seam and the screen that consumes [`crate::events::PickEvent`]s.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a scan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Keyboard,
    Voice,
}

impl std::fmt::Display for ScanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanSource::Keyboard => write!(f, "keyboard"),
            ScanSource::Voice => write!(f, "voice"),
        }
    }
}

/// One finalized chunk of input, discarded once the pipeline has classified it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub text: String,
    pub source: ScanSource,
    pub timestamp: DateTime<Utc>,
}

impl ScanEvent {
    pub fn keyboard(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: ScanSource::Keyboard,
            timestamp: Utc::now(),
        }
    }

    pub fn voice(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: ScanSource::Voice,
            timestamp: Utc::now(),
        }
    }

    /// Scanned code with surrounding whitespace removed
    pub fn code(&self) -> &str {
        self.text.trim()
    }
}

/// Product metadata as resolved by the inventory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Code the product was resolved under (may be an alias)
    pub code: String,
    /// Canonical code of the product
    pub principal_code: String,
    pub name: String,
    #[serde(default)]
    pub presentation: String,
    #[serde(default)]
    pub units_per_case: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Product {
    /// True when `code` is a secondary barcode of this product
    pub fn is_alias(&self) -> bool {
        self.code != self.principal_code
    }

    /// Name shown on the screen and sent with the commit
    pub fn display_name(&self) -> String {
        compose_display_name(&self.name, &self.presentation)
    }

    /// Same product re-keyed under the code the operator scanned
    pub fn as_scanned(&self, scanned_code: &str) -> Product {
        Product {
            code: scanned_code.to_string(),
            ..self.clone()
        }
    }
}

/// Join a product name with its presentation without repeating it
///
/// `"Vitamina C" + "100 tabs"` gives `"Vitamina C - 100 tabs"`. A name that
/// already ends with the presentation is returned as is, and an earlier
/// `" - "` suffix is replaced rather than stacked.
pub fn compose_display_name(name: &str, presentation: &str) -> String {
    let name = name.trim();
    let presentation = presentation.trim();
    if name.is_empty() {
        return String::new();
    }
    if presentation.is_empty() {
        return name.to_string();
    }

    let name_lower = name.to_lowercase();
    let presentation_lower = presentation.to_lowercase();
    if name_lower.ends_with(&presentation_lower) {
        return name.to_string();
    }

    if let Some((base, _)) = name.split_once(" - ") {
        let base = base.trim();
        if base.to_lowercase().ends_with(&presentation_lower) {
            return base.to_string();
        }
        return format!("{} - {}", base, presentation);
    }

    format!("{} - {}", name, presentation)
}

/// Identity of one accumulation cycle
///
/// Two commits carrying the same id are the same logical pick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId {
    pub code: String,
    /// Monotonic cycle number within the session
    pub cycle: u64,
    pub cycle_started_at: DateTime<Utc>,
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.code,
            self.cycle_started_at.timestamp_millis(),
            self.cycle
        )
    }
}

/// Lifecycle of a commit job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    Pending,
    Committed,
    /// Refused by the inventory service because the item is inactive
    Rejected,
    /// Transport or server failure; the slot is kept for manual retry
    Failed,
}

/// Final write of one accumulation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitJob {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub case_count: u32,
    pub units_per_case: u32,
    pub correlation_id: CorrelationId,
    pub status: CommitStatus,
}

impl CommitJob {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        case_count: u32,
        units_per_case: u32,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
            case_count,
            units_per_case,
            correlation_id,
            status: CommitStatus::Pending,
        }
    }

    /// Total units picked (cases times units per case)
    pub fn total_units(&self) -> u64 {
        u64::from(self.case_count) * u64::from(self.units_per_case)
    }
}

/// Server-side record of a code already on today's job
///
/// Times are wall-clock times of day as the server stores them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub exists: bool,
    #[serde(default)]
    pub added_at: Option<NaiveTime>,
    #[serde(default)]
    pub fulfilled: bool,
    #[serde(default)]
    pub fulfilled_at: Option<NaiveTime>,
}

impl RecentActivity {
    pub fn none() -> Self {
        Self::default()
    }
}
