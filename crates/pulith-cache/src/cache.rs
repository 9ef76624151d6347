use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::CacheKey;
use crate::policy::{Policy, Tier};
use crate::tier::{DiskBacking, MemoryBacking, Stored, TierStore};

pub const DEFAULT_MEMORY_CAPACITY: u64 = 4 * 1024 * 1024;
pub const DEFAULT_DISK_CAPACITY: u64 = 64 * 1024 * 1024;

/// Configuration for a [`Cache`].
///
/// # Examples
///
/// ```
/// use pulith_cache::CacheConfig;
///
/// let config = CacheConfig::default()
///     .label("responses")
///     .memory_capacity(1024 * 1024)
///     .directory("/tmp/pulith-cache");
/// assert_eq!(config.memory_capacity, 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name used in log lines.
    pub label: String,

    /// Directory of the disk tier. Without one the cache is memory-only and
    /// disk writes are skipped.
    pub directory: Option<PathBuf>,

    /// Byte ceiling of the memory tier.
    ///
    /// Default: 4 MiB
    pub memory_capacity: u64,

    /// Byte ceiling of the disk tier.
    ///
    /// Default: 64 MiB
    pub disk_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            label:           "default".to_owned(),
            directory:       None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            disk_capacity:   DEFAULT_DISK_CAPACITY,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    #[must_use]
    pub fn memory_capacity(mut self, bytes: u64) -> Self {
        self.memory_capacity = bytes;
        self
    }

    #[must_use]
    pub fn disk_capacity(mut self, bytes: u64) -> Self {
        self.disk_capacity = bytes;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierStats {
    pub entries:  usize,
    pub bytes:    u64,
    pub capacity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub memory: TierStats,
    pub disk:   Option<TierStats>,
}

/// Two-tier response cache.
///
/// Each tier has its own lock; every mutation (including the eviction pass it
/// triggers) happens under that tier's lock. When both tiers are locked, the
/// memory tier is always taken first.
pub struct Cache {
    label:  String,
    memory: Mutex<TierStore<MemoryBacking>>,
    disk:   Option<Mutex<TierStore<DiskBacking>>>,
}

impl Cache {
    /// Opens a cache, indexing any entries already present in the disk tier's
    /// directory.
    pub fn open(config: CacheConfig) -> Result<Self> {
        let memory = TierStore::new(
            Tier::Memory,
            &config.label,
            config.memory_capacity,
            MemoryBacking::default(),
        );

        let disk = match &config.directory {
            Some(directory) => Some(Mutex::new(Self::open_disk(&config, directory)?)),
            None => None,
        };

        tracing::debug!(
            cache = %config.label,
            memory_capacity = config.memory_capacity,
            disk_capacity = config.disk_capacity,
            directory = ?config.directory,
            "initialized"
        );

        Ok(Self {
            label: config.label,
            memory: Mutex::new(memory),
            disk,
        })
    }

    /// Memory-only cache.
    pub fn in_memory(capacity: u64) -> Self {
        Self {
            label:  "memory".to_owned(),
            memory: Mutex::new(TierStore::new(
                Tier::Memory,
                "memory",
                capacity,
                MemoryBacking::default(),
            )),
            disk:   None,
        }
    }

    fn open_disk(config: &CacheConfig, directory: &Path) -> Result<TierStore<DiskBacking>> {
        let backing = DiskBacking::open(directory, &config.label)?;
        let existing = backing.scan()?;
        let mut tier = TierStore::new(Tier::Disk, &config.label, config.disk_capacity, backing);

        let restored = existing.len();
        for (key, size, stored_at) in existing {
            tier.restore(key, size, stored_at);
        }
        // The directory may have been written with a larger capacity.
        tier.set_capacity(config.disk_capacity);

        if restored > 0 {
            tracing::debug!(
                cache = %config.label,
                restored,
                kept = tier.len(),
                bytes = tier.used(),
                "indexed disk tier"
            );
        }
        Ok(tier)
    }

    pub fn label(&self) -> &str { &self.label }

    /// Directory of the disk tier, if there is one.
    pub fn directory(&self) -> Option<PathBuf> {
        self.disk
            .as_ref()
            .map(|disk| disk.lock().backing().root().to_path_buf())
    }

    /// Looks the key up in the tiers named by `policy`, memory first.
    ///
    /// Expired entries count as misses and are removed from both tiers.
    pub fn get(&self, key: &CacheKey, policy: Policy) -> Option<CacheEntry> {
        let now = Utc::now();

        for tier in policy.tiers() {
            let Some(stored) = self.get_from(tier, key) else {
                continue;
            };

            if stored.meta.is_expired_at(now) {
                tracing::debug!(cache = %self.label, %key, %tier, "expired");
                self.remove(key);
                return None;
            }

            tracing::debug!(cache = %self.label, %key, %tier, "hit");
            return Some(CacheEntry {
                meta:   stored.meta,
                body:   stored.body,
                policy: Policy::from(tier),
            });
        }

        tracing::debug!(cache = %self.label, %key, "miss");
        None
    }

    fn get_from(&self, tier: Tier, key: &CacheKey) -> Option<Stored> {
        match tier {
            Tier::Memory => self.memory.lock().get(key),
            Tier::Disk => self.disk.as_ref()?.lock().get(key),
        }
    }

    pub fn contains(&self, key: &CacheKey, policy: Policy) -> bool {
        policy.tiers().any(|tier| match tier {
            Tier::Memory => self.memory.lock().contains(key),
            Tier::Disk => self
                .disk
                .as_ref()
                .is_some_and(|disk| disk.lock().contains(key)),
        })
    }

    /// Writes the entry into every tier named by its policy, evicting older
    /// entries of a tier as needed to stay within its capacity.
    ///
    /// Entries larger than a tier's capacity are skipped for that tier.
    /// Errors only come from disk I/O.
    pub fn set(&self, entry: CacheEntry, key: &CacheKey) -> Result<()> {
        let stored = Stored {
            meta: entry.meta,
            body: entry.body,
        };

        if entry.policy.includes(Tier::Memory) {
            self.memory.lock().insert(key, &stored)?;
        }

        if entry.policy.includes(Tier::Disk) {
            match &self.disk {
                Some(disk) => {
                    disk.lock().insert(key, &stored)?;
                }
                None => {
                    tracing::debug!(cache = %self.label, %key, "no disk tier, skipping disk write");
                }
            }
        }

        Ok(())
    }

    /// Deletes the key from both tiers. Returns whether anything was removed.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let from_memory = self.memory.lock().remove(key);
        let from_disk = self
            .disk
            .as_ref()
            .is_some_and(|disk| disk.lock().remove(key));

        if from_memory || from_disk {
            tracing::debug!(cache = %self.label, %key, "removed");
        }
        from_memory || from_disk
    }

    /// Deletes entries of both tiers stored before `cutoff`. Returns the
    /// number of tier entries removed.
    pub fn remove_all_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = self.memory.lock().remove_before(cutoff);
        if let Some(disk) = &self.disk {
            removed += disk.lock().remove_before(cutoff);
        }

        tracing::debug!(cache = %self.label, %cutoff, removed, "purged by age");
        removed
    }

    pub fn clear(&self) {
        self.memory.lock().clear();
        if let Some(disk) = &self.disk {
            disk.lock().clear();
        }
    }

    pub fn memory_capacity(&self) -> u64 { self.memory.lock().capacity() }

    pub fn disk_capacity(&self) -> Option<u64> {
        self.disk.as_ref().map(|disk| disk.lock().capacity())
    }

    /// Changes the memory ceiling, evicting down to it before returning.
    pub fn set_memory_capacity(&self, bytes: u64) {
        self.memory.lock().set_capacity(bytes);
        tracing::debug!(cache = %self.label, capacity = bytes, "memory capacity changed");
    }

    /// Changes the disk ceiling, evicting down to it before returning.
    pub fn set_disk_capacity(&self, bytes: u64) {
        if let Some(disk) = &self.disk {
            disk.lock().set_capacity(bytes);
            tracing::debug!(cache = %self.label, capacity = bytes, "disk capacity changed");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let memory = {
            let tier = self.memory.lock();
            TierStats {
                entries:  tier.len(),
                bytes:    tier.used(),
                capacity: tier.capacity(),
            }
        };
        let disk = self.disk.as_ref().map(|disk| {
            let tier = disk.lock();
            TierStats {
                entries:  tier.len(),
                bytes:    tier.used(),
                capacity: tier.capacity(),
            }
        });
        CacheStats { memory, disk }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("label", &self.label)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ResponseMeta;

    fn entry(len: usize, policy: Policy) -> CacheEntry {
        CacheEntry::new(ResponseMeta::new(200, Vec::new()), vec![1u8; len], policy)
    }

    #[test]
    fn test_memory_only_cache_skips_disk_policy() {
        let cache = Cache::in_memory(1024);
        let key = CacheKey::new("k");

        cache.set(entry(10, Policy::DISK), &key).unwrap();
        assert!(cache.get(&key, Policy::ALL).is_none());

        cache.set(entry(10, Policy::ALL), &key).unwrap();
        let hit = cache.get(&key, Policy::ALL).unwrap();
        assert_eq!(hit.policy, Policy::MEMORY);
        assert!(cache.stats().disk.is_none());
    }

    #[test]
    fn test_get_respects_policy_filter() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::open(CacheConfig::default().directory(dir.path())).unwrap();
        let key = CacheKey::new("k");

        cache.set(entry(10, Policy::DISK), &key).unwrap();
        assert!(cache.get(&key, Policy::MEMORY).is_none());
        assert_eq!(cache.get(&key, Policy::DISK).unwrap().policy, Policy::DISK);
        assert!(cache.contains(&key, Policy::DISK));
        assert!(!cache.contains(&key, Policy::MEMORY));
    }
}
