//! Two-tier response cache.
//!
//! Responses are stored under opaque [`CacheKey`]s in a memory tier, a disk
//! tier, or both, as chosen per entry by its [`Policy`]. Each tier has its own
//! byte capacity; inserting past it, or lowering it, evicts the oldest entries
//! of that tier in insertion order.
//!
//! # Example
//!
//! ```
//! use pulith_cache::{Cache, CacheEntry, CacheKey, Policy, ResponseMeta};
//!
//! let cache = Cache::in_memory(1024);
//! let key = CacheKey::new("https://example.com/index.html");
//! let meta = ResponseMeta::new(200, vec![("cache-control".into(), "max-age=60".into())]);
//!
//! cache.set(CacheEntry::new(meta, &b"<html></html>"[..], Policy::MEMORY), &key).unwrap();
//! assert!(cache.get(&key, Policy::ALL).is_some());
//! ```

mod cache;
mod entry;
mod error;
mod key;
mod policy;
mod registry;
mod tier;

pub use cache::{
    Cache, CacheConfig, CacheStats, DEFAULT_DISK_CAPACITY, DEFAULT_MEMORY_CAPACITY, TierStats,
};
pub use entry::{CacheControl, CacheEntry, ResponseMeta};
pub use error::{CacheError, Result};
pub use key::{CacheKey, MAX_ENCODED_STEM};
pub use policy::{Policy, Tier};
pub use registry::CacheRegistry;
