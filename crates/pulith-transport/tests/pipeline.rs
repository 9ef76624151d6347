use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use pulith_transport::{
    Buffer, ChunkedBody, FileBuffer, MemoryBuffer, Multicast, Queue, ReadingMode, Reassembler,
    StreamEvent,
};
use tempfile::tempdir;

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn test_ten_buffers_of_a_thousand_bytes() {
    let sources: Vec<Buffer> = (0..10).map(|i| payload(100, i).into()).collect();
    let body = ChunkedBody::new(sources, Some(128));

    let lengths: Vec<usize> = body.iter().map(|chunk| chunk.len()).collect();
    assert_eq!(lengths.len(), 8);
    assert!(lengths[..7].iter().all(|&len| len == 128));
    assert_eq!(lengths[7], 104);
}

/// Alternates memory and file sources, including empty ones.
fn mixed_sources(dir: &Path, tag: usize) -> (Vec<Buffer>, Vec<u8>) {
    let mut expected = Vec::new();
    let mut sources = Vec::new();
    for (i, size) in [0usize, 1, 7, 300, 64, 0, 999].into_iter().enumerate() {
        let bytes = payload(size, i as u8);
        expected.extend_from_slice(&bytes);
        if i % 2 == 0 {
            sources.push(Buffer::from(bytes));
        } else {
            let mut file = FileBuffer::new(dir.join(format!("part-{tag}-{i}")));
            file.write(&bytes);
            sources.push(Buffer::from(file));
        }
    }
    (sources, expected)
}

#[test]
fn test_chunks_concatenate_to_the_sources() {
    let dir = tempdir().unwrap();

    for chunk_size in [1usize, 2, 3, 64, 100, 128, 1000, 5000] {
        let (sources, expected) = mixed_sources(dir.path(), chunk_size);
        let body = ChunkedBody::new(sources, Some(chunk_size));
        let chunks: Vec<Bytes> = body.iter().collect();

        let (last, full) = chunks.split_last().unwrap();
        assert!(full.iter().all(|chunk| chunk.len() == chunk_size));
        assert!(!last.is_empty() && last.len() <= chunk_size);
        assert_eq!(chunks.concat(), expected, "chunk size {chunk_size}");
    }
}

#[test]
fn test_buffer_round_trip_for_both_media() {
    let dir = tempdir().unwrap();
    let bytes = payload(10_000, 3);

    let mut memory = MemoryBuffer::new();
    memory.write(&bytes);
    assert_eq!(memory.read(usize::MAX).unwrap(), bytes);

    let mut file = FileBuffer::new(dir.path().join("round-trip"));
    file.write(&bytes[..4_000]).write(&bytes[4_000..]);
    assert_eq!(file.read(usize::MAX).unwrap(), bytes);
    assert!(file.read(1).is_none());
}

#[test]
fn test_uploading_a_file_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("upload.bin");
    let bytes = payload(1_000, 9);
    std::fs::write(&path, &bytes).unwrap();

    let source = FileBuffer::open(&path).unwrap();
    let body = ChunkedBody::new(vec![Buffer::from(source), "trailer".into()], Some(256));

    let sent: Vec<u8> = body.iter().flat_map(|chunk| chunk.to_vec()).collect();
    assert_eq!(&sent[..1_000], &bytes[..]);
    assert_eq!(&sent[1_000..], b"trailer");

    drop(body);
    assert!(path.exists());
}

#[tokio::test]
async fn test_separator_records_across_fragments() {
    let (queue, mut reader) = Queue::new();
    let mut reassembler = Reassembler::new(ReadingMode::lines(), queue);
    for fragment in ["AB", "CD\n", "EF\n"] {
        reassembler.append(Bytes::from_static(fragment.as_bytes()));
    }
    reassembler.close();

    assert_eq!(reader.next().await.unwrap().unwrap(), "ABCD\n");
    assert_eq!(reader.next().await.unwrap().unwrap(), "EF\n");
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_close_twice_gives_one_terminal() {
    let (queue, reader) = Queue::<u8>::new();
    let terminals = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&terminals);
    reader.observe(move |event| {
        if event.is_terminal() {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });

    assert!(queue.close());
    assert!(!queue.close());
    assert_eq!(terminals.load(Ordering::SeqCst), 1);

    let progress = Multicast::<u64>::new();
    let mut subscription = progress.subscribe();
    progress.close();
    progress.close();
    assert!(subscription.next().await.is_none());
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn test_detached_subscriber_does_not_affect_others() {
    let progress = Multicast::new();
    let detached = progress.subscribe();
    let mut kept = progress.subscribe();

    progress.append(1u64);
    drop(detached);
    assert!(progress.append(2));
    progress.close();

    assert_eq!(kept.next().await.unwrap().unwrap(), 1);
    assert_eq!(kept.next().await.unwrap().unwrap(), 2);
    assert!(kept.next().await.is_none());

    let late = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&late);
    progress.observe(move |event| {
        if let StreamEvent::Value(value) = event {
            sink.lock().push(value);
        }
    });
    assert_eq!(*late.lock(), vec![1, 2]);
}
