//! Inventory service seam
//!
//! The pipeline talks to the inventory only through [`InventoryService`]; the
//! transport behind it (REST, socket, in-memory) is not the engine's concern.

mod memory;

pub use memory::{Catalog, CatalogItem, InMemoryInventory};

use crate::error::InventoryError;
use async_trait::async_trait;
use pickscan_common::{CommitJob, Product, RecentActivity};

/// Remote inventory operations consumed by the pipeline
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Resolve a code (principal or alias) to its product
    ///
    /// # Returns
    /// * `Ok(Product)` - keyed under the scanned code, with `principal_code` set
    /// * `Err(InventoryError::NotFound)` - code unknown
    /// * `Err(InventoryError::Transport)` - lookup failed, may be retried
    async fn resolve_product(&self, code: &str) -> Result<Product, InventoryError>;

    /// Report whether the code is already on today's job, and when
    async fn check_recent_activity(&self, code: &str) -> Result<RecentActivity, InventoryError>;

    /// Write one pick
    ///
    /// `Err(InventoryError::Inactive)` means the item must not be picked and
    /// the accumulation is discarded; any other error keeps it for retry.
    async fn commit_pick(&self, job: &CommitJob) -> Result<(), InventoryError>;

    /// Products whose name matches, best match first
    async fn search_products_by_name(&self, name: &str) -> Result<Vec<Product>, InventoryError>;
}
