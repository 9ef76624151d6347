//! Cache keys and their on-disk encoding.
//!
//! Keys are opaque to the cache. The disk tier names each entry's files after
//! [`CacheKey::file_stem`]: the URL-safe base64 form of short keys, a SHA-256
//! digest of long ones. The stem never exceeds [`MAX_ENCODED_STEM`] bytes, so
//! file names stay within the common 255-byte limit. The original key is kept
//! in the entry's metadata file.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Longest base64 stem used as is. Longer keys are hashed.
pub const MAX_ENCODED_STEM: usize = 200;

/// Marks hashed stems. `~` is outside the URL-safe base64 alphabet, so a
/// hashed stem never equals an encoded one.
const HASHED_STEM_PREFIX: &str = "~sha256-";

/// Opaque cache key supplied by the request-building layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    /// Canonical key for a request: SHA-256 over the method, the URL and
    /// the request header values named by the response's `Vary` header.
    ///
    /// Header names are compared case-insensitively and sorted, so the
    /// order in which the caller lists them does not change the key.
    pub fn fingerprint(method: &str, url: &str, vary: &[(&str, &str)]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b" ");
        hasher.update(url.as_bytes());

        let mut vary: Vec<(String, &str)> = vary
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), *value))
            .collect();
        vary.sort();
        for (name, value) in vary {
            hasher.update(b"\n");
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
        }

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Reversible filesystem-safe form of the key.
    pub fn encode(&self) -> String { URL_SAFE_NO_PAD.encode(self.0.as_bytes()) }

    /// File name stem for the disk tier, at most [`MAX_ENCODED_STEM`] bytes.
    pub fn file_stem(&self) -> String {
        let encoded = self.encode();
        if encoded.len() <= MAX_ENCODED_STEM {
            return encoded;
        }
        format!("{HASHED_STEM_PREFIX}{}", hex::encode(Sha256::digest(self.0.as_bytes())))
    }

    /// Inverse of [`CacheKey::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CacheError::InvalidKey(format!("{encoded}: {e}")))?;
        String::from_utf8(raw)
            .map(Self)
            .map_err(|e| CacheError::InvalidKey(format!("{encoded}: {e}")))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self { Self::new(key) }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self { Self(key) }
}
