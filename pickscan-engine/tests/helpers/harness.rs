//! Session harness
//!
//! Builds a [`PickSession`] over a small catalog with a manual wall clock,
//! and collects the events it publishes.

use super::fault_injection::FaultyInventory;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pickscan_common::events::PickEvent;
use pickscan_common::time::ManualClock;
use pickscan_common::{CommitJob, EngineConfig};
use pickscan_engine::inventory::{CatalogItem, InMemoryInventory};
use pickscan_engine::PickSession;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const VITAMINA_C: &str = "100200300";
pub const VITAMINA_C_ALIAS: &str = "7501000111";
pub const PARACETAMOL: &str = "200300400";
pub const OMEPRAZOL: &str = "300400500";
pub const DISCONTINUED: &str = "900900900";

pub fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 14)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn item(code: &str, name: &str, presentation: &str, units: u32) -> CatalogItem {
    CatalogItem {
        code: code.to_string(),
        name: name.to_string(),
        presentation: presentation.to_string(),
        units_per_case: units,
        active: true,
        aliases: vec![],
    }
}

pub fn catalog() -> Vec<CatalogItem> {
    vec![
        CatalogItem {
            aliases: vec![VITAMINA_C_ALIAS.to_string()],
            ..item(VITAMINA_C, "Vitamina C", "100 tabs", 12)
        },
        item(PARACETAMOL, "Paracetamol 500mg", "", 24),
        item(OMEPRAZOL, "Omeprazol", "20 caps", 6),
        CatalogItem {
            active: false,
            ..item(DISCONTINUED, "Jarabe descontinuado", "", 10)
        },
    ]
}

pub struct Harness {
    pub session: PickSession,
    pub inventory: Arc<InMemoryInventory>,
    pub faults: Arc<FaultyInventory>,
    pub clock: ManualClock,
    pub events: broadcast::Receiver<PickEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = ManualClock::new(noon());
        let inventory = Arc::new(InMemoryInventory::new(Arc::new(clock.clone())));
        for item in catalog() {
            inventory.insert(item);
        }
        let faults = Arc::new(FaultyInventory::new(inventory.clone()));
        let session = PickSession::new(config, faults.clone(), Arc::new(clock.clone()))
            .expect("session should build with a valid config");
        let events = session.subscribe();

        Self {
            session,
            inventory,
            faults,
            clock,
            events,
        }
    }

    /// Everything published since the last drain
    pub fn drain(&mut self) -> Vec<PickEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn committed(events: &[PickEvent]) -> Vec<CommitJob> {
    events
        .iter()
        .filter_map(|e| match e {
            PickEvent::Committed { job, .. } => Some(job.clone()),
            _ => None,
        })
        .collect()
}

pub fn event_types(events: &[PickEvent]) -> Vec<&'static str> {
    events.iter().map(PickEvent::event_type).collect()
}
