//! Shared caches keyed by their resolved storage directory.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::cache::{Cache, CacheConfig};
use crate::error::{Result, io_at};

static GLOBAL: Lazy<CacheRegistry> = Lazy::new(CacheRegistry::new);

/// Hands out one [`Cache`] per storage directory, so that every user of a
/// directory shares the same in-memory index and locks.
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<PathBuf, Arc<Cache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self { Self::default() }

    /// Process-wide registry.
    pub fn global() -> &'static CacheRegistry { &GLOBAL }

    /// Returns the cache for `config.directory`, opening it on first use.
    ///
    /// The directory is created if needed and canonicalized, so different
    /// spellings of one path resolve to the same cache. Later calls for an
    /// already-open directory ignore the capacities in `config`. A config
    /// without a directory always yields a fresh memory-only cache.
    pub fn open(&self, config: CacheConfig) -> Result<Arc<Cache>> {
        let Some(directory) = config.directory.clone() else {
            return Ok(Arc::new(Cache::open(config)?));
        };

        fs::create_dir_all(&directory).map_err(io_at(&directory))?;
        let resolved = fs::canonicalize(&directory).map_err(io_at(&directory))?;

        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(&resolved) {
            tracing::debug!(cache = %cache.label(), directory = %resolved.display(), "reusing");
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(Cache::open(CacheConfig {
            directory: Some(resolved.clone()),
            ..config
        })?);
        caches.insert(resolved, Arc::clone(&cache));
        Ok(cache)
    }

    /// Forgets the cache for a directory. Holders of the `Arc` keep using it.
    pub fn release(&self, directory: &std::path::Path) -> Option<Arc<Cache>> {
        let resolved = fs::canonicalize(directory).ok()?;
        self.caches.lock().remove(&resolved)
    }

    pub fn len(&self) -> usize { self.caches.lock().len() }

    pub fn is_empty(&self) -> bool { self.caches.lock().is_empty() }
}
