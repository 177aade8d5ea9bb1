//! Scheduler benchmark suite
//!
//! Benchmarks for ticking many channel buffers into one consumer.
//!
//! Run with: `cargo bench -p strand-pipeline`

use std::cell::Cell;
use std::hint::black_box;
use std::net::SocketAddr;
use std::rc::Rc;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use strand_pipeline::{FramedMessage, Scheduler, SchedulerConfig, consumer_fn};
use strand_sources::{ChannelFactory, ConnectionInfo, IngressChannel, Transport};

const LINES_PER_CHANNEL: usize = 200;

fn payload() -> Bytes {
    let line = "ts=1700000000,host=web-01,level=info,msg=\"request done\",$EventCategory=HTTP\n";
    Bytes::from(line.repeat(LINES_PER_CHANNEL))
}

/// Benchmark draining N channels through the scheduler
fn bench_tick_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_channels");
    let data = payload();

    for num_channels in [1, 10, 100] {
        group.throughput(Throughput::Elements((num_channels * LINES_PER_CHANNEL) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_channels),
            &num_channels,
            |b, &num_channels| {
                b.iter(|| {
                    let seen = Rc::new(Cell::new(0usize));
                    let counter = Rc::clone(&seen);
                    let mut scheduler = Scheduler::new(
                        SchedulerConfig::default(),
                        consumer_fn(move |batch: Vec<FramedMessage>| {
                            counter.set(counter.get() + black_box(batch).len());
                        }),
                    );
                    let handle = scheduler.handle();

                    for i in 0..num_channels {
                        let info = ConnectionInfo::new(
                            Transport::Tcp,
                            SocketAddr::from(([10, 0, 0, 1], 10_000 + i as u16)),
                            6514,
                        );
                        let channel = handle.open(&info);
                        let _ = channel.push(data.clone());
                    }

                    while scheduler.tick().has_more_work {}
                    seen.get()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_tick_channels);
criterion_main!(benches);
