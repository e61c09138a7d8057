//! Product resolution: cache first, inventory to confirm
//!
//! The session shows [`ProductResolver::cached`] immediately for a snappy
//! screen, then awaits [`ProductResolver::resolve`] and corrects the live slot
//! if the inventory disagrees.

use super::cache::ProductCache;
use crate::error::InventoryError;
use crate::inventory::InventoryService;
use pickscan_common::config::ProductCacheConfig;
use pickscan_common::Product;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Outcome of a remote lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Product metadata (may be inactive; the caller classifies that)
    Found(Product),
    /// Terminal for this scan
    NotFound,
    /// Transient; the caller may retry
    LookupError(String),
}

pub struct ProductResolver {
    inventory: Arc<dyn InventoryService>,
    cache: Mutex<ProductCache>,
}

impl ProductResolver {
    pub fn new(inventory: Arc<dyn InventoryService>, config: &ProductCacheConfig) -> Self {
        Self {
            inventory,
            cache: Mutex::new(ProductCache::new(config.cache_capacity, config.cache_retain)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, ProductCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached product for a code, without touching the network
    pub fn cached(&self, code: &str) -> Option<Product> {
        self.cache().get(code)
    }

    /// Ask the inventory, refreshing the cache with the answer
    pub async fn resolve(&self, code: &str) -> Resolution {
        match self.inventory.resolve_product(code).await {
            Ok(product) => {
                debug!(
                    "Resolved {} -> {} ({})",
                    code, product.principal_code, product.name
                );
                self.cache().insert(product.clone());
                Resolution::Found(product)
            }
            Err(InventoryError::NotFound(_)) => {
                self.cache().invalidate(code);
                Resolution::NotFound
            }
            Err(e) => {
                warn!("Product lookup for {} failed: {}", code, e);
                Resolution::LookupError(e.to_string())
            }
        }
    }

    /// Name search; results are cached under their codes
    pub async fn search_by_name(&self, name: &str) -> Result<Vec<Product>, InventoryError> {
        let products = self.inventory.search_products_by_name(name).await?;
        let mut cache = self.cache();
        for product in &products {
            cache.insert(product.clone());
        }
        Ok(products)
    }

    /// Drop one cached product (inventory change notification)
    pub fn invalidate(&self, code: &str) -> bool {
        self.cache().invalidate(code)
    }

    pub fn clear(&self) {
        self.cache().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache().len()
    }
}
