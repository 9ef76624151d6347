use bytes::{Bytes, BytesMut};

use crate::data::ReadingMode;

/// Splits a byte stream into records according to a [`ReadingMode`].
///
/// Pure: the framer only buffers and slices. Publishing the records is the
/// job of [`Reassembler`](crate::Reassembler).
#[derive(Debug)]
pub struct Framer {
    mode:    ReadingMode,
    pending: BytesMut,
    /// Separator mode: no match starts before this offset of `pending`.
    scanned: usize,
}

impl Framer {
    pub fn new(mode: ReadingMode) -> Self {
        let mode = match mode {
            ReadingMode::FixedLength(0) => ReadingMode::Fragment,
            ReadingMode::Separator(sep) if sep.is_empty() => ReadingMode::Fragment,
            mode => mode,
        };
        Self {
            mode,
            pending: BytesMut::new(),
            scanned: 0,
        }
    }

    pub fn mode(&self) -> &ReadingMode { &self.mode }

    /// Bytes buffered towards the next record.
    pub fn pending_len(&self) -> usize { self.pending.len() }

    /// Feeds one fragment, appending every record it completes to `out`.
    pub fn push(&mut self, fragment: Bytes, out: &mut Vec<Bytes>) {
        if fragment.is_empty() {
            return;
        }

        match &self.mode {
            ReadingMode::Fragment => out.push(fragment),
            ReadingMode::FixedLength(n) => {
                let n = *n;
                self.push_fixed(n, fragment, out);
            }
            ReadingMode::Separator(sep) => {
                let sep = sep.clone();
                self.pending.extend_from_slice(&fragment);
                self.drain_separated(&sep, out);
            }
        }
    }

    /// Flushes the partial record, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        Some(self.pending.split().freeze())
    }

    /// Drops the partial record.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.scanned = 0;
    }

    fn push_fixed(&mut self, n: usize, mut fragment: Bytes, out: &mut Vec<Bytes>) {
        if !self.pending.is_empty() {
            let take = (n - self.pending.len()).min(fragment.len());
            self.pending.extend_from_slice(&fragment.split_to(take));
            if self.pending.len() < n {
                return;
            }
            out.push(self.pending.split().freeze());
        }

        // Whole records straight out of the fragment, without copying.
        while fragment.len() >= n {
            out.push(fragment.split_to(n));
        }
        if !fragment.is_empty() {
            self.pending.extend_from_slice(&fragment);
        }
    }

    fn drain_separated(&mut self, sep: &[u8], out: &mut Vec<Bytes>) {
        loop {
            let found = self.pending[self.scanned..]
                .windows(sep.len())
                .position(|window| window == sep);

            match found {
                Some(offset) => {
                    let end = self.scanned + offset + sep.len();
                    out.push(self.pending.split_to(end).freeze());
                    self.scanned = 0;
                }
                None => {
                    // A match may still start in the last `sep.len() - 1` bytes.
                    self.scanned = self.pending.len().saturating_sub(sep.len() - 1);
                    return;
                }
            }
        }
    }
}
