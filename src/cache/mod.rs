//! Cache Module
//!
//! In-memory asset cache keyed by canonical path, without eviction.

mod asset;
mod stats;
mod store;

// Re-export public types
pub use asset::{base_name, CachedAsset};
pub use stats::{CacheStats, StatsCounters};
pub use store::FileCache;
