use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use queue_adapters::{
    BoundedRing, FaaArrayQueue, Lcrq, Lprq, QueueBackend, QueueHandle, QueueSettings,
    SegmentQueue, SpinningSession,
};
use std::thread;

// Queue capacity for benchmarks
const CAPACITY: usize = 1024;
// Number of ping-pong operations per benchmark
const PING_PONGS: usize = 100_000;

/// Bounces one item between two threads through two queues
fn ping_pong<Q: QueueBackend<Item = u32>>() {
    let settings = QueueSettings::default().capacity(CAPACITY).max_threads(2);
    let q1 = QueueHandle::<Q>::with_settings(settings).unwrap();
    let q2 = QueueHandle::<Q>::with_settings(settings).unwrap();

    let mut ping_out = q1.session().unwrap();
    let mut ping_in = q2.session().unwrap();
    let mut pong_in = q1.session().unwrap();
    let mut pong_out = q2.session().unwrap();

    thread::scope(|s| {
        // Ping thread
        s.spawn(move || {
            for i in 0..PING_PONGS {
                ping_out.push_spin(black_box(i as u32));
                black_box(ping_in.pop_spin());
            }
        });

        // Pong thread
        s.spawn(move || {
            for _ in 0..PING_PONGS {
                let val = pong_in.pop_spin();
                pong_out.push_spin(black_box(val));
            }
        });
    });
}

fn bench_latency(c: &mut Criterion) {
    if num_cpus::get() < 2 {
        return;
    }

    let mut group = c.benchmark_group("latency");
    group.sample_size(10);

    group.bench_function(BenchmarkId::new("bounded_ring", "ping-pong"), |b| {
        b.iter(ping_pong::<BoundedRing<u32>>)
    });
    group.bench_function(BenchmarkId::new("segment_queue", "ping-pong"), |b| {
        b.iter(ping_pong::<SegmentQueue<u32>>)
    });
    group.bench_function(BenchmarkId::new("lcrq", "ping-pong"), |b| {
        b.iter(ping_pong::<Lcrq<u32>>)
    });
    group.bench_function(BenchmarkId::new("lprq", "ping-pong"), |b| {
        b.iter(ping_pong::<Lprq<u32>>)
    });
    group.bench_function(BenchmarkId::new("faa_array", "ping-pong"), |b| {
        b.iter(ping_pong::<FaaArrayQueue<u32>>)
    });

    group.finish();
}

criterion_group!(benches, bench_latency);
criterion_main!(benches);
