/// Smallest derived chunk size for payloads larger than it.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Largest derived chunk size.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Chunk size for a payload of `total_bytes` when the caller did not pick one.
///
/// Aims for about 16 chunks, bounded by [`DEFAULT_MIN_CHUNK_SIZE`] and
/// [`DEFAULT_MAX_CHUNK_SIZE`], and never larger than the payload itself.
/// Returns 0 only for an empty payload.
pub fn default_chunk_size(total_bytes: u64) -> usize {
    let target = (total_bytes / 16).clamp(DEFAULT_MIN_CHUNK_SIZE as u64, DEFAULT_MAX_CHUNK_SIZE as u64);
    // `target` fits in usize: it is bounded by DEFAULT_MAX_CHUNK_SIZE.
    target.min(total_bytes) as usize
}
