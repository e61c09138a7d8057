//! Bounded product cache with alias resolution
//!
//! Entries are keyed by principal code. Alias codes map to their principal so
//! a scan of any barcode of a product hits the same entry. When an insert
//! pushes the cache past its capacity it is trimmed down to the most recently
//! inserted `retain` entries.

use pickscan_common::Product;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
pub struct ProductCache {
    entries: HashMap<String, Product>,
    /// Principal codes, oldest insert at the front
    order: VecDeque<String>,
    /// Alias code -> principal code
    aliases: HashMap<String, String>,
    capacity: usize,
    retain: usize,
}

impl ProductCache {
    pub fn new(capacity: usize, retain: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            aliases: HashMap::new(),
            capacity,
            retain: retain.min(capacity),
        }
    }

    fn principal_of<'a>(&'a self, code: &'a str) -> &'a str {
        self.aliases.get(code).map(String::as_str).unwrap_or(code)
    }

    /// Look a code up, following aliases; the result is keyed by `code`
    pub fn get(&self, code: &str) -> Option<Product> {
        let principal = self.principal_of(code);
        self.entries.get(principal).map(|p| p.as_scanned(code))
    }

    /// Insert or refresh a product; refreshing counts as the newest insert
    pub fn insert(&mut self, product: Product) {
        let principal = product.principal_code.clone();
        if product.is_alias() {
            self.aliases.insert(product.code.clone(), principal.clone());
        }

        if self.entries.contains_key(&principal) {
            self.order.retain(|c| c != &principal);
        }
        self.order.push_back(principal.clone());
        self.entries.insert(principal.clone(), product.as_scanned(&principal));

        if self.entries.len() > self.capacity {
            self.trim();
        }
    }

    fn trim(&mut self) {
        while self.entries.len() > self.retain {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.aliases.retain(|_, principal| principal != &oldest);
        }
    }

    /// Drop the entry a code resolves to, along with its aliases
    pub fn invalidate(&mut self, code: &str) -> bool {
        let principal = self.principal_of(code).to_string();
        let removed = self.entries.remove(&principal).is_some();
        if removed {
            self.order.retain(|c| c != &principal);
            self.aliases.retain(|_, p| p != &principal);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.aliases.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
