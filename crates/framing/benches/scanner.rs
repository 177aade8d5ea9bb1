//! Scanner benchmark suite
//!
//! Run with: `cargo bench -p strand-framing --bench scanner`
//!
//! # What we measure
//!
//! - Framing throughput of plain key/value lines
//! - Cost of quoted values containing newlines
//! - Channel buffer overhead on top of the bare scanner

use std::hint::black_box;
use std::time::Duration;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use strand_framing::{ChannelBuffer, ChannelConfig, Scanner, ScannerConfig};

const BUDGET: Duration = Duration::from_secs(10);

// =============================================================================
// Test Data
// =============================================================================

fn kv_line(fields: usize) -> String {
    let mut line = String::from("ts=1700000000");
    for i in 0..fields {
        line.push_str(&format!(",field{i}=value{i}"));
    }
    line.push_str(",$EventCategory=LTM\n");
    line
}

/// `num_lines` lines cut into chunks of `chunk_size` bytes
fn chunked(line: &str, num_lines: usize, chunk_size: usize) -> Vec<Bytes> {
    let data = line.repeat(num_lines).into_bytes();
    data.chunks(chunk_size).map(Bytes::copy_from_slice).collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_scanner_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner_lines");

    for fields in [4, 16, 64] {
        let line = kv_line(fields);
        let chunks = chunked(&line, 100, 4096);
        let total: usize = chunks.iter().map(Bytes::len).sum();

        group.throughput(Throughput::Bytes(total as u64));
        group.bench_with_input(BenchmarkId::new("fields", fields), &chunks, |b, chunks| {
            b.iter(|| {
                let mut scanner = Scanner::<Bytes>::new(
                    ScannerConfig::default(),
                    Box::new(|msg| {
                        black_box(msg);
                    }),
                );
                for chunk in chunks {
                    if let Err(chunk) = scanner.try_push(chunk.clone()) {
                        scanner.process(BUDGET, false);
                        let _ = scanner.try_push(chunk);
                    }
                }
                black_box(scanner.process(BUDGET, true))
            });
        });
    }

    group.finish();
}

fn bench_scanner_quoted(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner_quoted");
    let line = "msg=\"first line\nsecond line\",user='o\\'brien',n=1\n";
    let chunks = chunked(line, 500, 1024);
    let total: usize = chunks.iter().map(Bytes::len).sum();

    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("quoted_newlines", |b| {
        b.iter(|| {
            let mut scanner = Scanner::<Bytes>::new(
                ScannerConfig::default(),
                Box::new(|msg| {
                    black_box(msg);
                }),
            );
            for chunk in &chunks {
                if let Err(chunk) = scanner.try_push(chunk.clone()) {
                    scanner.process(BUDGET, false);
                    let _ = scanner.try_push(chunk);
                }
            }
            black_box(scanner.process(BUDGET, true))
        });
    });

    group.finish();
}

fn bench_channel_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_buffer");
    let chunks = chunked(&kv_line(16), 200, 1500);
    let total: usize = chunks.iter().map(Bytes::len).sum();

    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("push_process", |b| {
        b.iter(|| {
            let mut channel = ChannelBuffer::<Bytes>::new(
                ChannelConfig::default(),
                Box::new(|msg| {
                    black_box(msg);
                }),
            );
            for chunk in &chunks {
                channel.push(chunk.clone());
            }
            black_box(channel.process(BUDGET, true))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_scanner_lines,
    bench_scanner_quoted,
    bench_channel_buffer
);
criterion_main!(benches);
