//! In-memory inventory service
//!
//! Backs the CLI driver and the integration tests. Holds a product catalog
//! with alias codes, today's pick records (time of day added / fulfilled) and
//! the list of committed jobs.

use super::InventoryService;
use crate::error::{Error, InventoryError, Result};
use crate::text::normalize;
use async_trait::async_trait;
use chrono::NaiveTime;
use pickscan_common::time::Clock;
use pickscan_common::{CommitJob, CommitStatus, Product, RecentActivity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Maximum results returned by a name search
const MAX_SEARCH_RESULTS: usize = 10;

/// One catalog entry, keyed by its principal code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub presentation: String,
    #[serde(default)]
    pub units_per_case: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Secondary barcodes resolving to `code`
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl CatalogItem {
    fn to_product(&self, scanned_code: &str) -> Product {
        Product {
            code: scanned_code.to_string(),
            principal_code: self.code.clone(),
            name: self.name.clone(),
            presentation: self.presentation.clone(),
            units_per_case: self.units_per_case,
            active: self.active,
        }
    }
}

/// Product catalog as stored in TOML
///
/// ```toml
/// [[product]]
/// code = "100200300"
/// name = "Vitamina C"
/// presentation = "100 tabs"
/// units_per_case = 12
/// aliases = ["7501000111"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "product", default)]
    pub products: Vec<CatalogItem>,
}

impl Catalog {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Catalog(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Clone)]
struct PickRecord {
    added_at: NaiveTime,
    fulfilled_at: Option<NaiveTime>,
}

#[derive(Default)]
struct InventoryData {
    items: HashMap<String, CatalogItem>,
    aliases: HashMap<String, String>,
    picks: HashMap<String, PickRecord>,
    committed: Vec<CommitJob>,
}

impl InventoryData {
    fn principal_of<'a>(&'a self, code: &'a str) -> &'a str {
        self.aliases.get(code).map(String::as_str).unwrap_or(code)
    }
}

/// Inventory service holding everything in process memory
pub struct InMemoryInventory {
    data: Mutex<InventoryData>,
    clock: Arc<dyn Clock>,
}

impl InMemoryInventory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Mutex::new(InventoryData::default()),
            clock,
        }
    }

    pub fn from_catalog(catalog: Catalog, clock: Arc<dyn Clock>) -> Self {
        let inventory = Self::new(clock);
        for item in catalog.products {
            inventory.insert(item);
        }
        inventory
    }

    fn data(&self) -> MutexGuard<'_, InventoryData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add or replace a catalog entry and register its aliases
    pub fn insert(&self, item: CatalogItem) {
        let mut data = self.data();
        for alias in &item.aliases {
            data.aliases.insert(alias.clone(), item.code.clone());
        }
        data.items.insert(item.code.clone(), item);
    }

    /// Mark an item active or inactive (out of stock)
    pub fn set_active(&self, code: &str, active: bool) -> bool {
        let mut data = self.data();
        let principal = data.principal_of(code).to_string();
        match data.items.get_mut(&principal) {
            Some(item) => {
                item.active = active;
                true
            }
            None => false,
        }
    }

    /// Record a pick added at a given time of day
    pub fn record_pick(&self, code: &str, added_at: NaiveTime) {
        let mut data = self.data();
        let principal = data.principal_of(code).to_string();
        data.picks.insert(
            principal,
            PickRecord {
                added_at,
                fulfilled_at: None,
            },
        );
    }

    /// Mark today's pick for a code as fulfilled now
    pub fn mark_fulfilled(&self, code: &str) -> bool {
        let now = self.clock.now_local().time();
        let mut data = self.data();
        let principal = data.principal_of(code).to_string();
        match data.picks.get_mut(&principal) {
            Some(record) => {
                record.fulfilled_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Jobs committed so far, oldest first
    pub fn committed(&self) -> Vec<CommitJob> {
        self.data().committed.clone()
    }
}

#[async_trait]
impl InventoryService for InMemoryInventory {
    async fn resolve_product(&self, code: &str) -> std::result::Result<Product, InventoryError> {
        let data = self.data();
        let principal = data.principal_of(code);
        data.items
            .get(principal)
            .map(|item| item.to_product(code))
            .ok_or_else(|| InventoryError::NotFound(code.to_string()))
    }

    async fn check_recent_activity(
        &self,
        code: &str,
    ) -> std::result::Result<RecentActivity, InventoryError> {
        let data = self.data();
        let principal = data.principal_of(code);
        Ok(match data.picks.get(principal) {
            Some(record) => RecentActivity {
                exists: true,
                added_at: Some(record.added_at),
                fulfilled: record.fulfilled_at.is_some(),
                fulfilled_at: record.fulfilled_at,
            },
            None => RecentActivity::none(),
        })
    }

    async fn commit_pick(&self, job: &CommitJob) -> std::result::Result<(), InventoryError> {
        let now = self.clock.now_local().time();
        let mut data = self.data();
        let principal = data.principal_of(&job.code).to_string();

        let item = data
            .items
            .get(&principal)
            .ok_or_else(|| InventoryError::NotFound(job.code.clone()))?;
        if !item.active {
            return Err(InventoryError::Inactive(principal));
        }

        data.picks.insert(
            principal.clone(),
            PickRecord {
                added_at: now,
                fulfilled_at: None,
            },
        );
        let mut stored = job.clone();
        stored.status = CommitStatus::Committed;
        data.committed.push(stored);

        info!(
            "Pick recorded: {} (principal {}) x{} cases",
            job.code, principal, job.case_count
        );
        Ok(())
    }

    async fn search_products_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<Vec<Product>, InventoryError> {
        let query = normalize(name);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.data();
        let ranked = rank_by_name(&query, data.items.values());
        debug!("Name search '{}' matched {} products", query, ranked.len());
        Ok(ranked
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|item| item.to_product(&item.code))
            .collect())
    }
}

/// Rank catalog items against a normalized query
///
/// Items whose name contains the whole query (or is contained by it) come
/// first, shortest name first. Otherwise items are ranked by how many query
/// words longer than two characters they contain, then by name length.
fn rank_by_name<'a>(
    query: &str,
    items: impl Iterator<Item = &'a CatalogItem>,
) -> Vec<&'a CatalogItem> {
    let words: Vec<&str> = query.split(' ').filter(|w| w.chars().count() > 2).collect();

    let candidates: Vec<(&CatalogItem, String)> =
        items.map(|item| (item, normalize(&item.name))).collect();

    let mut whole: Vec<(&CatalogItem, usize)> = candidates
        .iter()
        .filter(|(_, name)| name.contains(query) || query.contains(name.as_str()))
        .map(|(item, name)| (*item, name.len()))
        .collect();
    if !whole.is_empty() {
        whole.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.code.cmp(&b.0.code)));
        return whole.into_iter().map(|(item, _)| item).collect();
    }

    let mut partial: Vec<(&CatalogItem, usize, usize)> = candidates
        .iter()
        .map(|(item, name)| {
            let hits = words.iter().filter(|w| name.contains(*w)).count();
            (*item, hits, name.len())
        })
        .filter(|(_, hits, _)| *hits > 0)
        .collect();
    partial.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.2.cmp(&b.2))
            .then_with(|| a.0.code.cmp(&b.0.code))
    });
    partial.into_iter().map(|(item, _, _)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pickscan_common::time::ManualClock;
    use pickscan_common::CorrelationId;

    fn item(code: &str, name: &str, aliases: &[&str]) -> CatalogItem {
        CatalogItem {
            code: code.to_string(),
            name: name.to_string(),
            presentation: String::new(),
            units_per_case: 12,
            active: true,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn inventory() -> (InMemoryInventory, ManualClock) {
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let inv = InMemoryInventory::new(Arc::new(clock.clone()));
        inv.insert(item("100200300", "Vitamina C", &["7501000111"]));
        inv.insert(item("100200301", "Vitamina C Masticable Naranja", &[]));
        inv.insert(item("100200400", "Omega 3 Aceite de Pescado", &[]));
        (inv, clock)
    }

    fn job(code: &str) -> CommitJob {
        CommitJob::new(
            code,
            "x",
            1,
            12,
            CorrelationId {
                code: code.to_string(),
                cycle: 1,
                cycle_started_at: chrono::Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_alias_to_principal() {
        let (inv, _) = inventory();
        let product = inv.resolve_product("7501000111").await.unwrap();
        assert_eq!(product.code, "7501000111");
        assert_eq!(product.principal_code, "100200300");
        assert!(product.is_alias());
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_not_found() {
        let (inv, _) = inventory();
        assert_eq!(
            inv.resolve_product("999").await,
            Err(InventoryError::NotFound("999".to_string()))
        );
    }

    #[tokio::test]
    async fn test_commit_records_activity_for_alias_and_principal() {
        let (inv, clock) = inventory();
        inv.commit_pick(&job("7501000111")).await.unwrap();

        let activity = inv.check_recent_activity("100200300").await.unwrap();
        assert!(activity.exists);
        assert_eq!(activity.added_at, Some(clock.now_local().time()));
        assert!(!activity.fulfilled);

        assert!(inv.mark_fulfilled("7501000111"));
        let activity = inv.check_recent_activity("7501000111").await.unwrap();
        assert!(activity.fulfilled);
        assert_eq!(inv.committed().len(), 1);
        assert_eq!(inv.committed()[0].status, CommitStatus::Committed);
    }

    #[tokio::test]
    async fn test_commit_inactive_item_rejected() {
        let (inv, _) = inventory();
        assert!(inv.set_active("100200400", false));
        let result = inv.commit_pick(&job("100200400")).await;
        assert!(matches!(result, Err(InventoryError::Inactive(_))));
        assert!(inv.committed().is_empty());
    }

    #[tokio::test]
    async fn test_search_prefers_whole_phrase_shortest_first() {
        let (inv, _) = inventory();
        let found = inv.search_products_by_name("vitamina c").await.unwrap();
        assert_eq!(found[0].code, "100200300");
        assert_eq!(found[1].code, "100200301");
    }

    #[tokio::test]
    async fn test_search_falls_back_to_word_hits() {
        let (inv, _) = inventory();
        let found = inv.search_products_by_name("aceite omega").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].code, "100200400");

        assert!(inv.search_products_by_name("zzz").await.unwrap().is_empty());
        assert!(inv.search_products_by_name("  ").await.unwrap().is_empty());
    }

    #[test]
    fn test_catalog_from_toml() {
        let catalog = Catalog::from_toml_str(
            r#"
[[product]]
code = "100200300"
name = "Vitamina C"
presentation = "100 tabs"
units_per_case = 12
aliases = ["7501000111"]

[[product]]
code = "100200400"
name = "Omega 3"
active = false
"#,
        )
        .unwrap();
        assert_eq!(catalog.products.len(), 2);
        assert_eq!(catalog.products[0].aliases, vec!["7501000111"]);
        assert!(!catalog.products[1].active);
        assert_eq!(catalog.products[1].units_per_case, 0);
    }

    #[tokio::test]
    async fn test_catalog_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            "[[product]]\ncode = \"300400500\"\nname = \"Omeprazol\"\nunits_per_case = 6\n",
        )
        .unwrap();

        let catalog = Catalog::load(&path).unwrap();
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let inv = InMemoryInventory::from_catalog(catalog, Arc::new(clock));
        assert_eq!(inv.resolve_product("300400500").await.unwrap().units_per_case, 6);

        let missing = Catalog::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(Error::Catalog(_))));
    }
}
