//! Product resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::ProductCache;
pub use resolver::{ProductResolver, Resolution};
