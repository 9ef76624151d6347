use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use pulith_cache::{Cache, CacheEntry, CacheKey, Policy, ResponseMeta};

use crate::data::ResponseHead;

/// Copies a completed download into a [`Cache`].
///
/// Body fragments are collected as they arrive; their concatenation equals
/// the concatenation of the published records. On completion the body is
/// stored only if the final head is a 2xx response whose headers allow
/// caching. Collection stops once the body outgrows every tier the policy
/// names, and such a response is not stored.
#[derive(Debug)]
pub struct CacheMirror {
    cache:      Arc<Cache>,
    key:        CacheKey,
    policy:     Policy,
    head:       Option<ResponseHead>,
    body:       BytesMut,
    limit:      u64,
    overflowed: bool,
}

impl CacheMirror {
    pub fn new(cache: Arc<Cache>, key: CacheKey, policy: Policy) -> Self {
        Self {
            cache,
            key,
            policy,
            head: None,
            body: BytesMut::new(),
            limit: 0,
            overflowed: false,
        }
    }

    /// Largest capacity among the tiers the policy writes to.
    fn tier_limit(&self) -> u64 {
        let memory = Some(self.cache.memory_capacity()).filter(|_| self.policy.contains(Policy::MEMORY));
        let disk = self.cache.disk_capacity().filter(|_| self.policy.contains(Policy::DISK));
        memory.unwrap_or(0).max(disk.unwrap_or(0))
    }

    pub fn key(&self) -> &CacheKey { &self.key }

    /// Later heads replace earlier ones; only the final head decides.
    pub(crate) fn head(&mut self, head: &ResponseHead) {
        self.head = Some(head.clone());
        self.body.clear();
        self.limit = self.tier_limit();
        self.overflowed = false;
    }

    pub(crate) fn extend(&mut self, fragment: &Bytes) {
        if self.overflowed {
            return;
        }
        if (self.body.len() + fragment.len()) as u64 > self.limit {
            tracing::debug!(key = %self.key, limit = self.limit, "response outgrows cache, not mirroring");
            self.overflowed = true;
            self.body = BytesMut::new();
            return;
        }
        self.body.extend_from_slice(fragment);
    }

    /// Stores the collected body. Returns whether an entry was written.
    pub(crate) fn finish(self) -> bool {
        let Some(head) = self.head else {
            return false;
        };
        if self.overflowed {
            return false;
        }

        let meta = ResponseMeta::new(head.status, head.headers);
        if !meta.is_cacheable() {
            tracing::debug!(key = %self.key, status = meta.status, "response not cacheable");
            return false;
        }

        let entry = CacheEntry::new(meta, self.body.freeze(), self.policy);
        match self.cache.set(entry, &self.key) {
            Ok(()) => {
                tracing::debug!(key = %self.key, "mirrored response into cache");
                true
            }
            Err(err) => {
                tracing::warn!(key = %self.key, %err, "failed to mirror response into cache");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Version;

    fn head(status: u16, cache_control: &str) -> ResponseHead {
        ResponseHead::new(
            status,
            vec![("Cache-Control".into(), cache_control.into())],
            Version::HTTP_11,
        )
    }

    #[test]
    fn test_stores_concatenated_body() {
        let cache = Arc::new(Cache::in_memory(1024));
        let key = CacheKey::new("GET https://example.com/a");
        let mut mirror = CacheMirror::new(Arc::clone(&cache), key.clone(), Policy::MEMORY);

        mirror.head(&head(200, "max-age=60"));
        mirror.extend(&Bytes::from_static(b"ab"));
        mirror.extend(&Bytes::from_static(b"cd"));
        assert!(mirror.finish());

        let entry = cache.get(&key, Policy::MEMORY).unwrap();
        assert_eq!(entry.body, "abcd");
        assert_eq!(entry.meta.status, 200);
    }

    #[test]
    fn test_skips_uncacheable_responses() {
        let cache = Arc::new(Cache::in_memory(1024));

        for head in [head(200, "no-store"), head(404, "max-age=60")] {
            let key = CacheKey::new(format!("k{}", head.status));
            let mut mirror = CacheMirror::new(Arc::clone(&cache), key.clone(), Policy::MEMORY);
            mirror.head(&head);
            mirror.extend(&Bytes::from_static(b"body"));
            assert!(!mirror.finish());
            assert!(!cache.contains(&key, Policy::ALL));
        }
    }

    #[test]
    fn test_stops_collecting_past_tier_capacity() {
        let cache = Arc::new(Cache::in_memory(8));
        let key = CacheKey::new("big");
        let mut mirror = CacheMirror::new(Arc::clone(&cache), key.clone(), Policy::MEMORY);

        mirror.head(&head(200, "max-age=60"));
        mirror.extend(&Bytes::from_static(b"01234567"));
        mirror.extend(&Bytes::from_static(b"89abcdef"));
        assert!(mirror.body.is_empty());
        mirror.extend(&Bytes::from_static(b"x"));
        assert!(mirror.body.is_empty());
        assert!(!mirror.finish());
        assert!(!cache.contains(&key, Policy::ALL));
    }

    #[test]
    fn test_new_head_resets_overflow() {
        let cache = Arc::new(Cache::in_memory(8));
        let key = CacheKey::new("retry");
        let mut mirror = CacheMirror::new(Arc::clone(&cache), key.clone(), Policy::MEMORY);

        mirror.head(&head(200, "max-age=60"));
        mirror.extend(&Bytes::from_static(b"far too large"));
        mirror.head(&head(200, "max-age=60"));
        mirror.extend(&Bytes::from_static(b"fits"));
        assert!(mirror.finish());
        assert_eq!(cache.get(&key, Policy::MEMORY).unwrap().body, "fits");
    }
}
