use bytes::Bytes;

use super::stream::Queue;
use crate::core::Framer;
use crate::data::ReadingMode;
use crate::error::TransportError;

/// Regroups incoming body fragments into records and publishes them.
#[derive(Debug)]
pub struct Reassembler {
    framer:  Framer,
    output:  Queue<Bytes>,
    records: Vec<Bytes>,
}

impl Reassembler {
    pub fn new(mode: ReadingMode, output: Queue<Bytes>) -> Self {
        Self {
            framer: Framer::new(mode),
            output,
            records: Vec::new(),
        }
    }

    pub fn mode(&self) -> &ReadingMode { self.framer.mode() }

    /// Publishes every record the fragment completes and returns how many.
    pub fn append(&mut self, fragment: Bytes) -> usize {
        self.framer.push(fragment, &mut self.records);
        let count = self.records.len();
        for record in self.records.drain(..) {
            self.output.append(record);
        }
        count
    }

    /// Flushes the partial record, then ends the stream.
    pub fn close(&mut self) {
        if let Some(rest) = self.framer.finish() {
            tracing::debug!(bytes = rest.len(), "flushing partial record");
            self.output.append(rest);
        }
        self.output.close();
    }

    /// Drops the partial record and fails the stream.
    pub fn failed(&mut self, err: TransportError) {
        self.framer.reset();
        self.output.fail(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_length_records_and_flush() {
        let (queue, mut reader) = Queue::new();
        let mut reassembler = Reassembler::new(ReadingMode::FixedLength(4), queue);

        assert_eq!(reassembler.append(Bytes::from_static(b"abcdefghij")), 2);
        reassembler.close();

        assert_eq!(reader.next().await.unwrap().unwrap(), "abcd");
        assert_eq!(reader.next().await.unwrap().unwrap(), "efgh");
        assert_eq!(reader.next().await.unwrap().unwrap(), "ij");
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_discards_partial_record() {
        let (queue, mut reader) = Queue::new();
        let mut reassembler = Reassembler::new(ReadingMode::lines(), queue);

        reassembler.append(Bytes::from_static(b"done\npartial"));
        reassembler.failed(TransportError::Cancelled);

        assert_eq!(reader.next().await.unwrap().unwrap(), "done\n");
        assert!(matches!(reader.next().await, Some(Err(TransportError::Cancelled))));
        assert!(reader.next().await.is_none());
    }
}
