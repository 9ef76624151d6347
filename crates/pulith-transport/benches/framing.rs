use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pulith_transport::{Buffer, ChunkedBody, Framer, ReadingMode};

const TOTAL: usize = 4 * 1024 * 1024;

fn bench_chunk_encoder(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_encoder");
    group.throughput(Throughput::Bytes(TOTAL as u64));

    for chunk_size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let body = ChunkedBody::new(sources(), Some(chunk_size));
        group.bench_with_input(BenchmarkId::new("memory", chunk_size), &body, |b, body| {
            b.iter(|| {
                let mut sent = 0;
                for chunk in body {
                    sent += black_box(chunk).len();
                }
                assert_eq!(sent, TOTAL);
            });
        });
    }

    group.finish();
}

// Payload split across 64 in-memory sources.
fn sources() -> Vec<Buffer> { (0..64).map(|_| Buffer::from(vec![0x5Au8; TOTAL / 64])).collect() }

fn fragments(fragment_size: usize) -> Vec<Bytes> {
    let line = b"GET /index.html 200 1532\n";
    let data: Vec<u8> = line.iter().copied().cycle().take(TOTAL).collect();
    data.chunks(fragment_size).map(Bytes::copy_from_slice).collect()
}

fn bench_framer(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer");
    group.throughput(Throughput::Bytes(TOTAL as u64));

    let modes = [
        ("lines", ReadingMode::lines()),
        ("crlf", ReadingMode::separator("\r\n")),
        ("fixed_512", ReadingMode::FixedLength(512)),
    ];

    for fragment_size in [1500, 16 * 1024] {
        let input = fragments(fragment_size);
        for (name, mode) in &modes {
            group.bench_with_input(BenchmarkId::new(*name, fragment_size), &input, |b, input| {
                b.iter(|| {
                    let mut framer = Framer::new(mode.clone());
                    let mut records = Vec::new();
                    for fragment in input {
                        framer.push(fragment.clone(), &mut records);
                    }
                    records.extend(framer.finish());
                    black_box(records.len())
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_encoder, bench_framer);
criterion_main!(benches);
