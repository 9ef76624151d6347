//! Capacity-bounded storage shared by both cache tiers.
//!
//! A [`TierStore`] owns the bookkeeping (byte usage, insertion order) and
//! delegates the bytes themselves to a [`Backing`]. Eviction is strictly in
//! insertion order: re-inserting a key moves it to the back of the queue,
//! lookups do not.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::entry::ResponseMeta;
use crate::error::{CacheError, Result, io_at};
use crate::key::CacheKey;
use crate::policy::Tier;

const BODY_SUFFIX: &str = ".body";
const META_SUFFIX: &str = ".meta.json";

/// A payload as held by a tier.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stored {
    pub meta: ResponseMeta,
    pub body: Bytes,
}

pub(crate) trait Backing {
    fn read(&self, key: &CacheKey) -> Option<Stored>;
    fn write(&mut self, key: &CacheKey, stored: &Stored) -> Result<()>;
    fn delete(&mut self, key: &CacheKey);
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    seq:       u64,
    size:      u64,
    stored_at: DateTime<Utc>,
}

pub(crate) struct TierStore<B> {
    tier:     Tier,
    label:    String,
    capacity: u64,
    used:     u64,
    next_seq: u64,
    order:    BTreeMap<u64, CacheKey>,
    slots:    HashMap<CacheKey, Slot>,
    backing:  B,
}

impl<B: Backing> TierStore<B> {
    pub fn new(tier: Tier, label: &str, capacity: u64, backing: B) -> Self {
        Self {
            tier,
            label: label.to_owned(),
            capacity,
            used: 0,
            next_seq: 0,
            order: BTreeMap::new(),
            slots: HashMap::new(),
            backing,
        }
    }

    pub fn backing(&self) -> &B { &self.backing }

    pub fn capacity(&self) -> u64 { self.capacity }

    pub fn used(&self) -> u64 { self.used }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn contains(&self, key: &CacheKey) -> bool { self.slots.contains_key(key) }

    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> { self.order.values() }

    pub fn get(&self, key: &CacheKey) -> Option<Stored> {
        if !self.slots.contains_key(key) {
            return None;
        }
        self.backing.read(key)
    }

    /// Stores `stored` under `key`, evicting the oldest entries first if the
    /// tier would otherwise exceed its capacity.
    ///
    /// Returns `Ok(false)` when the payload alone is larger than the tier; any
    /// previous value for the key is dropped in that case.
    pub fn insert(&mut self, key: &CacheKey, stored: &Stored) -> Result<bool> {
        let size = stored.body.len() as u64;
        self.forget(key);

        if size > self.capacity {
            self.backing.delete(key);
            tracing::warn!(
                cache = %self.label,
                tier = %self.tier,
                %key,
                size,
                capacity = self.capacity,
                "value larger than tier capacity, not stored"
            );
            return Ok(false);
        }

        self.evict_to(self.capacity - size);

        if let Err(err) = self.backing.write(key, stored) {
            self.backing.delete(key);
            return Err(err);
        }
        self.track(key.clone(), size, stored.meta.stored_at);

        tracing::debug!(
            cache = %self.label,
            tier = %self.tier,
            %key,
            size,
            used = self.used,
            capacity = self.capacity,
            "stored"
        );
        Ok(true)
    }

    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let removed = self.forget(key);
        if removed {
            self.backing.delete(key);
        }
        removed
    }

    /// Removes every entry stored strictly before `cutoff`.
    pub fn remove_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let stale: Vec<CacheKey> = self
            .order
            .values()
            .filter(|key| self.slots[*key].stored_at < cutoff)
            .cloned()
            .collect();

        for key in &stale {
            self.remove(key);
        }
        stale.len()
    }

    pub fn set_capacity(&mut self, capacity: u64) {
        self.capacity = capacity;
        self.evict_to(capacity);
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.slots.clear();
        self.used = 0;
        self.backing.clear();
    }

    /// Registers an entry that already exists in the backing. Callers restore
    /// in the order the entries were originally stored.
    pub fn restore(&mut self, key: CacheKey, size: u64, stored_at: DateTime<Utc>) {
        self.forget(&key);
        self.track(key, size, stored_at);
    }

    fn evict_to(&mut self, target: u64) {
        while self.used > target {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(slot) = self.slots.remove(&key) {
                self.used -= slot.size;
                self.backing.delete(&key);
                tracing::debug!(
                    cache = %self.label,
                    tier = %self.tier,
                    %key,
                    size = slot.size,
                    "evicted"
                );
            }
        }
        debug_assert!(self.used <= target || self.slots.is_empty());
    }

    fn track(&mut self, key: CacheKey, size: u64, stored_at: DateTime<Utc>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.slots.insert(key, Slot { seq, size, stored_at });
        self.used += size;
    }

    fn forget(&mut self, key: &CacheKey) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.order.remove(&slot.seq);
                self.used -= slot.size;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryBacking {
    entries: HashMap<CacheKey, Stored>,
}

impl Backing for MemoryBacking {
    fn read(&self, key: &CacheKey) -> Option<Stored> { self.entries.get(key).cloned() }

    fn write(&mut self, key: &CacheKey, stored: &Stored) -> Result<()> {
        self.entries.insert(key.clone(), stored.clone());
        Ok(())
    }

    fn delete(&mut self, key: &CacheKey) { self.entries.remove(key); }

    fn clear(&mut self) { self.entries.clear(); }
}

/// Contents of a `.meta.json` file. File stems of long keys are hashed, so
/// the key itself is only recoverable from here.
#[derive(Debug, Serialize, Deserialize)]
struct MetaFile {
    key:  String,
    meta: ResponseMeta,
}

/// One `<stem>.body` file plus one `<stem>.meta.json` file per entry, where
/// the stem is [`CacheKey::file_stem`]. The metadata file is written last, so
/// its presence marks a complete entry.
#[derive(Debug)]
pub(crate) struct DiskBacking {
    root:  PathBuf,
    label: String,
}

impl DiskBacking {
    pub fn open(root: &Path, label: &str) -> Result<Self> {
        fs::create_dir_all(root).map_err(io_at(root))?;
        if !root.is_dir() {
            return Err(CacheError::NotADirectory(root.to_path_buf()));
        }
        Ok(Self {
            root:  root.to_path_buf(),
            label: label.to_owned(),
        })
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Lists the complete entries found on disk, oldest first.
    pub fn scan(&self) -> Result<Vec<(CacheKey, u64, DateTime<Utc>)>> {
        let mut found = Vec::new();

        for dir_entry in fs::read_dir(&self.root).map_err(io_at(&self.root))? {
            let path = dir_entry.map_err(io_at(&self.root))?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(META_SUFFIX))
            else {
                continue;
            };

            let file = match Self::load_meta(&path) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(cache = %self.label, path = %path.display(), %err, "dropping unreadable metadata");
                    let _ = fs::remove_file(&path);
                    let _ = fs::remove_file(self.root.join(format!("{stem}{BODY_SUFFIX}")));
                    continue;
                }
            };
            let key = CacheKey::new(file.key);
            if key.file_stem() != stem {
                tracing::warn!(cache = %self.label, path = %path.display(), %key, "skipping foreign file");
                continue;
            }

            let size = match fs::metadata(self.body_path(&key)) {
                Ok(metadata) => metadata.len(),
                Err(_) => {
                    tracing::warn!(cache = %self.label, %key, "dropping metadata without body");
                    let _ = fs::remove_file(&path);
                    continue;
                }
            };

            found.push((key, size, file.meta.stored_at));
        }

        found.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.0.cmp(&b.0)));
        Ok(found)
    }

    fn body_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}{BODY_SUFFIX}", key.file_stem()))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}{META_SUFFIX}", key.file_stem()))
    }

    fn load_meta(path: &Path) -> Result<MetaFile> {
        let raw = fs::read(path).map_err(io_at(path))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn read_meta(&self, key: &CacheKey) -> Result<ResponseMeta> {
        let file = Self::load_meta(&self.meta_path(key))?;
        if file.key != key.as_str() {
            return Err(CacheError::InvalidKey(format!(
                "{key}: stem is taken by {}",
                file.key
            )));
        }
        Ok(file.meta)
    }

    fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(io_at(&self.root))?;
        tmp.write_all(content).map_err(io_at(tmp.path()))?;
        tmp.persist(path).map_err(|e| CacheError::Io {
            path:   path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }

    fn remove_files(&self, key: &CacheKey) {
        let _ = fs::remove_file(self.meta_path(key));
        let _ = fs::remove_file(self.body_path(key));
    }
}

impl Backing for DiskBacking {
    fn read(&self, key: &CacheKey) -> Option<Stored> {
        let meta = match self.read_meta(key) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(cache = %self.label, %key, %err, "failed to read metadata");
                return None;
            }
        };
        let path = self.body_path(key);
        match fs::read(&path) {
            Ok(body) => Some(Stored {
                meta,
                body: Bytes::from(body),
            }),
            Err(err) => {
                tracing::warn!(cache = %self.label, %key, %err, "failed to read body");
                None
            }
        }
    }

    fn write(&mut self, key: &CacheKey, stored: &Stored) -> Result<()> {
        let meta = serde_json::to_vec(&MetaFile {
            key:  key.as_str().to_owned(),
            meta: stored.meta.clone(),
        })?;
        self.write_atomic(&self.body_path(key), &stored.body)?;
        self.write_atomic(&self.meta_path(key), &meta)
    }

    fn delete(&mut self, key: &CacheKey) { self.remove_files(key); }

    fn clear(&mut self) {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return;
        };
        for path in entries.filter_map(|entry| entry.ok()).map(|entry| entry.path()) {
            let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
            if name.ends_with(META_SUFFIX) || name.ends_with(BODY_SUFFIX) {
                let _ = fs::remove_file(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(len: usize) -> Stored {
        Stored {
            meta: ResponseMeta::new(200, Vec::new()),
            body: Bytes::from(vec![7u8; len]),
        }
    }

    fn memory_tier(capacity: u64) -> TierStore<MemoryBacking> {
        TierStore::new(Tier::Memory, "test", capacity, MemoryBacking::default())
    }

    #[test]
    fn test_evicts_in_insertion_order() {
        let mut tier = memory_tier(10);
        let (a, b, c) = (CacheKey::new("a"), CacheKey::new("b"), CacheKey::new("c"));

        assert!(tier.insert(&a, &stored(4)).unwrap());
        assert!(tier.insert(&b, &stored(4)).unwrap());
        // Reading does not refresh position.
        assert!(tier.get(&a).is_some());
        assert!(tier.insert(&c, &stored(4)).unwrap());

        assert!(!tier.contains(&a));
        assert!(tier.contains(&b));
        assert!(tier.contains(&c));
        assert_eq!(tier.used(), 8);
    }

    #[test]
    fn test_reinsert_moves_to_back() {
        let mut tier = memory_tier(10);
        let (a, b, c) = (CacheKey::new("a"), CacheKey::new("b"), CacheKey::new("c"));

        tier.insert(&a, &stored(4)).unwrap();
        tier.insert(&b, &stored(4)).unwrap();
        tier.insert(&a, &stored(4)).unwrap();
        tier.insert(&c, &stored(4)).unwrap();

        assert!(tier.contains(&a));
        assert!(!tier.contains(&b));
        assert_eq!(tier.keys().cloned().collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn test_oversized_value_is_rejected_and_replaces_nothing() {
        let mut tier = memory_tier(10);
        let key = CacheKey::new("k");
        tier.insert(&key, &stored(5)).unwrap();

        assert!(!tier.insert(&key, &stored(11)).unwrap());
        assert!(!tier.contains(&key));
        assert!(tier.get(&key).is_none());
        assert_eq!(tier.used(), 0);
    }

    #[test]
    fn test_lowering_capacity_evicts_immediately() {
        let mut tier = memory_tier(100);
        for name in ["a", "b", "c", "d"] {
            tier.insert(&CacheKey::new(name), &stored(20)).unwrap();
        }

        tier.set_capacity(45);
        assert_eq!(tier.used(), 40);
        assert_eq!(tier.len(), 2);
        assert!(tier.contains(&CacheKey::new("c")));
        assert!(tier.contains(&CacheKey::new("d")));

        tier.set_capacity(0);
        assert_eq!(tier.len(), 0);
        assert_eq!(tier.used(), 0);
    }

    #[test]
    fn test_disk_backing_round_trip_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mut backing = DiskBacking::open(dir.path(), "test").unwrap();
        let key = CacheKey::new("https://example.com/x?y=1");

        backing.write(&key, &stored(3)).unwrap();
        assert_eq!(backing.read(&key).unwrap().body.len(), 3);

        let scanned = backing.scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].0, key);
        assert_eq!(scanned[0].1, 3);

        backing.delete(&key);
        assert!(backing.read(&key).is_none());
        assert!(backing.scan().unwrap().is_empty());
    }

    #[test]
    fn test_disk_backing_stores_long_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut backing = DiskBacking::open(dir.path(), "test").unwrap();
        let key = CacheKey::new(format!("https://example.com/{}", "a".repeat(300)));

        backing.write(&key, &stored(5)).unwrap();
        assert_eq!(backing.read(&key).unwrap().body.len(), 5);

        for entry in fs::read_dir(dir.path()).unwrap() {
            assert!(entry.unwrap().file_name().len() < 255);
        }

        let scanned = backing.scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].0, key);
        assert_eq!(scanned[0].1, 5);
    }

    #[test]
    fn test_scan_drops_unreadable_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let backing = DiskBacking::open(dir.path(), "test").unwrap();
        fs::write(dir.path().join(format!("stale{META_SUFFIX}")), b"not json").unwrap();
        fs::write(dir.path().join(format!("stale{BODY_SUFFIX}")), b"x").unwrap();

        assert!(backing.scan().unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_scan_drops_orphan_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut backing = DiskBacking::open(dir.path(), "test").unwrap();
        let key = CacheKey::new("orphan");
        backing.write(&key, &stored(3)).unwrap();
        fs::remove_file(backing.body_path(&key)).unwrap();

        assert!(backing.scan().unwrap().is_empty());
        assert!(!backing.meta_path(&key).exists());
    }
}
