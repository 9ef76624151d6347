use bytes::{Bytes, BytesMut};

use super::buffer::Buffer;
use crate::core::default_chunk_size;

/// Upload payload split into fixed-size chunks.
///
/// Each call to [`iter`](ChunkedBody::iter) starts a fresh pass over the
/// readable bytes of every source, in order. Sources are read through
/// [`Buffer::get_bytes`], so passes do not consume them.
#[derive(Debug)]
pub struct ChunkedBody {
    sources:    Vec<Buffer>,
    chunk_size: usize,
}

impl ChunkedBody {
    /// `chunk_size` of `None` (or zero) is derived from the payload length.
    pub fn new(sources: Vec<Buffer>, chunk_size: Option<usize>) -> Self {
        let total: usize = sources.iter().map(Buffer::readable_bytes).sum();
        let chunk_size = match chunk_size {
            Some(size) if size > 0 => size,
            _ => default_chunk_size(total as u64),
        };
        Self {
            sources,
            chunk_size,
        }
    }

    pub fn empty() -> Self { Self::new(Vec::new(), None) }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    /// Readable bytes across all sources at construction time of the pass.
    pub fn estimated_bytes(&self) -> usize { self.sources.iter().map(Buffer::readable_bytes).sum() }

    pub fn is_empty(&self) -> bool { self.estimated_bytes() == 0 }

    pub fn sources(&self) -> &[Buffer] { &self.sources }

    pub fn into_sources(self) -> Vec<Buffer> { self.sources }

    pub fn iter(&self) -> Chunks<'_> {
        Chunks {
            sources: &self.sources,
            index:   0,
            offset:  self.sources.first().map_or(0, Buffer::reader_index),
            size:    self.chunk_size,
        }
    }
}

impl<'a> IntoIterator for &'a ChunkedBody {
    type Item = Bytes;
    type IntoIter = Chunks<'a>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

/// One pass over a [`ChunkedBody`].
#[derive(Debug)]
pub struct Chunks<'a> {
    sources: &'a [Buffer],
    index:   usize,
    offset:  usize,
    size:    usize,
}

impl Chunks<'_> {
    fn advance_source(&mut self) {
        self.index += 1;
        self.offset = self.sources.get(self.index).map_or(0, Buffer::reader_index);
    }
}

impl Iterator for Chunks<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.size == 0 {
            return None;
        }

        let mut chunk: Option<BytesMut> = None;
        while let Some(source) = self.sources.get(self.index) {
            let filled = chunk.as_ref().map_or(0, BytesMut::len);
            let want = self.size - filled;

            match source.get_bytes(self.offset, want) {
                Some(bytes) => {
                    self.offset += bytes.len();
                    // A whole chunk from one source needs no copy.
                    if filled == 0 && bytes.len() == self.size {
                        return Some(bytes);
                    }
                    chunk
                        .get_or_insert_with(|| BytesMut::with_capacity(self.size))
                        .extend_from_slice(&bytes);
                    if filled + bytes.len() == self.size {
                        break;
                    }
                }
                None => self.advance_source(),
            }
        }

        chunk.filter(|c| !c.is_empty()).map(BytesMut::freeze)
    }
}
