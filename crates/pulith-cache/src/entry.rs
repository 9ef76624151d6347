//! Cached responses and their freshness metadata.
//!
//! Freshness follows the response's `Cache-Control` directives, falling back
//! to `Expires`. A response without either never expires by time; it leaves
//! the cache only through removal, age purges or eviction.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Policy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    pub max_age:         Option<u64>,
    pub s_maxage:        Option<u64>,
    pub no_cache:        bool,
    pub no_store:        bool,
    pub must_revalidate: bool,
    pub private:         bool,
    pub public:          bool,
}

impl CacheControl {
    pub fn parse(header: &str) -> Self {
        let mut control = Self::default();

        for directive in header.split(',') {
            let directive = directive.trim().to_ascii_lowercase();

            match directive.as_str() {
                "no-cache" => control.no_cache = true,
                "no-store" => control.no_store = true,
                "must-revalidate" => control.must_revalidate = true,
                "private" => control.private = true,
                "public" => control.public = true,
                _ => {
                    if let Some(seconds) = directive.strip_prefix("max-age=") {
                        control.max_age = seconds.trim_matches('"').parse().ok();
                    } else if let Some(seconds) = directive.strip_prefix("s-maxage=") {
                        control.s_maxage = seconds.trim_matches('"').parse().ok();
                    }
                }
            }
        }

        control
    }

    pub fn is_cacheable(&self) -> bool { !self.no_store && !self.no_cache }

    /// Freshness lifetime granted by the directives, if any. Values past
    /// what a `Duration` can hold saturate to `Duration::MAX`.
    pub fn lifetime(&self) -> Option<Duration> {
        self.s_maxage.or(self.max_age).map(|seconds| {
            i64::try_from(seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX)
        })
    }
}

/// Response metadata stored next to the cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status:     u16,
    pub headers:    Vec<(String, String)>,
    pub stored_at:  DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResponseMeta {
    /// Metadata for a response received now.
    pub fn new(status: u16, headers: Vec<(String, String)>) -> Self {
        Self::from_headers(status, headers, Utc::now())
    }

    /// Metadata for a response received at `now`, with expiry computed
    /// from `Cache-Control` (preferred) or `Expires`.
    pub fn from_headers(status: u16, headers: Vec<(String, String)>, now: DateTime<Utc>) -> Self {
        let mut meta = Self {
            status,
            headers,
            stored_at: now,
            expires_at: None,
        };
        meta.expires_at = meta.compute_expiry(now);
        meta
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cache_control(&self) -> CacheControl {
        self.header("cache-control")
            .map(CacheControl::parse)
            .unwrap_or_default()
    }

    /// Whether a response with this metadata may be stored at all.
    pub fn is_cacheable(&self) -> bool {
        (200..300).contains(&self.status) && self.cache_control().is_cacheable()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool { self.is_expired_at(Utc::now()) }

    /// Re-validation: merge the new headers over the stored ones and restart
    /// the freshness clock.
    pub fn refresh(&mut self, headers: Vec<(String, String)>, now: DateTime<Utc>) {
        for (name, value) in headers {
            match self
                .headers
                .iter_mut()
                .find(|(key, _)| key.eq_ignore_ascii_case(&name))
            {
                Some(slot) => slot.1 = value,
                None => self.headers.push((name, value)),
            }
        }
        self.stored_at = now;
        self.expires_at = self.compute_expiry(now);
    }

    fn compute_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(lifetime) = self.cache_control().lifetime() {
            return now.checked_add_signed(lifetime);
        }

        self.header("expires").map(|value| {
            DateTime::parse_from_rfc2822(value.trim())
                .map(|date| date.with_timezone(&Utc))
                // Unparseable Expires means "already expired".
                .unwrap_or(now)
        })
    }
}

/// A response payload plus metadata, and the tiers it should populate.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub meta:   ResponseMeta,
    pub body:   Bytes,
    pub policy: Policy,
}

impl CacheEntry {
    pub fn new(meta: ResponseMeta, body: impl Into<Bytes>, policy: Policy) -> Self {
        Self {
            meta,
            body: body.into(),
            policy,
        }
    }

    /// Bytes charged against a tier's capacity.
    pub fn size(&self) -> u64 { self.body.len() as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cache_control_parsing() {
        let control = CacheControl::parse("max-age=3600, public");
        assert_eq!(control.max_age, Some(3600));
        assert!(control.public);
        assert!(!control.no_cache);

        let control = CacheControl::parse("No-Cache, must-revalidate");
        assert!(control.no_cache);
        assert!(control.must_revalidate);
        assert!(control.max_age.is_none());
        assert!(!control.is_cacheable());
    }

    #[test]
    fn test_s_maxage_wins_over_max_age() {
        let control = CacheControl::parse("max-age=10, s-maxage=20");
        assert_eq!(control.lifetime(), Some(Duration::seconds(20)));
    }

    #[test]
    fn test_out_of_range_max_age_saturates() {
        let control = CacheControl::parse("max-age=9223372036854776");
        assert_eq!(control.lifetime(), Some(Duration::MAX));

        let meta = ResponseMeta::new(200, headers(&[("cache-control", "max-age=9223372036854776")]));
        assert!(meta.expires_at.is_none());
        assert!(!meta.is_expired());

        let control = CacheControl::parse("s-maxage=18446744073709551615");
        assert_eq!(control.lifetime(), Some(Duration::MAX));
    }

    #[test]
    fn test_expiry_from_max_age() {
        let now = Utc::now();
        let meta = ResponseMeta::from_headers(200, headers(&[("Cache-Control", "max-age=60")]), now);
        assert_eq!(meta.expires_at, Some(now + Duration::seconds(60)));
        assert!(!meta.is_expired_at(now + Duration::seconds(59)));
        assert!(meta.is_expired_at(now + Duration::seconds(60)));
    }

    #[test]
    fn test_expiry_from_expires_header() {
        let now = DateTime::parse_from_rfc2822("Sun, 06 Nov 1994 08:49:37 GMT")
            .unwrap()
            .with_timezone(&Utc);
        let meta = ResponseMeta::from_headers(
            200,
            headers(&[("Expires", "Sun, 06 Nov 1994 09:49:37 GMT")]),
            now,
        );
        assert_eq!(meta.expires_at, Some(now + Duration::hours(1)));
    }

    #[test]
    fn test_invalid_expires_is_already_expired() {
        let now = Utc::now();
        let meta = ResponseMeta::from_headers(200, headers(&[("Expires", "0")]), now);
        assert!(meta.is_expired_at(now));
    }

    #[test]
    fn test_no_freshness_information_never_expires() {
        let meta = ResponseMeta::new(200, Vec::new());
        assert!(meta.expires_at.is_none());
        assert!(!meta.is_expired());
    }

    #[test]
    fn test_cacheability() {
        assert!(ResponseMeta::new(200, Vec::new()).is_cacheable());
        assert!(!ResponseMeta::new(500, Vec::new()).is_cacheable());
        assert!(!ResponseMeta::new(200, headers(&[("cache-control", "no-store")])).is_cacheable());
    }

    #[test]
    fn test_refresh_restarts_clock() {
        let then = Utc::now() - Duration::hours(2);
        let mut meta =
            ResponseMeta::from_headers(200, headers(&[("Cache-Control", "max-age=60")]), then);
        assert!(meta.is_expired());

        let now = Utc::now();
        meta.refresh(headers(&[("cache-control", "max-age=120"), ("ETag", "\"v2\"")]), now);
        assert_eq!(meta.stored_at, now);
        assert_eq!(meta.expires_at, Some(now + Duration::seconds(120)));
        assert_eq!(meta.header("etag"), Some("\"v2\""));
        assert_eq!(meta.headers.len(), 2);
    }
}
