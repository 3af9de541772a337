use queue_adapters::stress::{self, StressPlan};
use queue_adapters::{
    Backend, BackendVisitor, QueueBackend, QueueHandle, QueueSettings, SpinningSession,
};
use std::thread;
use std::time::{Duration, Instant};

// Queue capacity
const CAPACITY: usize = 1024;
// Number of messages to send per producer
const MESSAGES_PER_PRODUCER: u64 = 1_000_000;
// Warmup runs
const WARMUP_RUNS: usize = 1;
// Timing runs
const TIMING_RUNS: usize = 5;
// Ping-pong iterations
const PING_PONG_ITERATIONS: usize = 100_000;

// Benchmark results
struct BenchmarkResult {
    name: &'static str,
    throughput_mpmc: Vec<f64>, // Million operations per second
    latency_ns: Vec<f64>,      // Nanoseconds per round-trip
}

/// One verified producer/consumer run, in Mops/s
struct Throughput {
    producers_consumers: usize,
}

impl BackendVisitor<u64> for Throughput {
    type Output = f64;

    fn visit<Q: QueueBackend<Item = u64>>(self, queue: QueueHandle<Q>) -> f64 {
        let plan = StressPlan::new(
            self.producers_consumers,
            self.producers_consumers,
            MESSAGES_PER_PRODUCER / self.producers_consumers as u64,
        );
        let report = stress::run(&*queue, &plan).expect("enough thread slots");
        report.verify().expect("every item delivered once");
        report.throughput() / 1_000_000.0
    }
}

/// Round-trip time of one item bounced between two threads
struct PingPong {
    settings: QueueSettings,
}

impl BackendVisitor<u64> for PingPong {
    type Output = f64;

    fn visit<Q: QueueBackend<Item = u64>>(self, q1: QueueHandle<Q>) -> f64 {
        let q2 = QueueHandle::<Q>::with_settings(self.settings).expect("valid settings");
        let mut ping_out = q1.session().expect("free thread id");
        let mut ping_in = q2.session().expect("free thread id");
        let mut pong_in = q1.session().expect("free thread id");
        let mut pong_out = q2.session().expect("free thread id");

        let start = Instant::now();
        thread::scope(|s| {
            s.spawn(move || {
                for i in 0..PING_PONG_ITERATIONS {
                    ping_out.push_spin(i as u64);
                    ping_in.pop_spin();
                }
            });
            s.spawn(move || {
                for _ in 0..PING_PONG_ITERATIONS {
                    let val = pong_in.pop_spin();
                    pong_out.push_spin(val);
                }
            });
        });
        start.elapsed().as_nanos() as f64 / PING_PONG_ITERATIONS as f64
    }
}

fn benchmark_backend(backend: Backend) -> BenchmarkResult {
    println!("\nBenchmarking {}", backend);
    let producers_consumers = (num_cpus::get() / 2).max(1);
    let settings = QueueSettings::default()
        .capacity(CAPACITY)
        .max_threads(producers_consumers * 2);

    let mut throughput_mpmc = Vec::new();
    for run in 0..(WARMUP_RUNS + TIMING_RUNS) {
        let mops = backend
            .open(settings, Throughput { producers_consumers })
            .expect("valid settings");
        if run >= WARMUP_RUNS {
            println!(
                "  MPMC throughput with {} producers & consumers: {:.2} Mops/s",
                producers_consumers, mops
            );
            throughput_mpmc.push(mops);
        }
        // Let the system cool down a bit between runs
        thread::sleep(Duration::from_millis(100));
    }

    let mut latency_ns = Vec::new();
    for run in 0..(WARMUP_RUNS + TIMING_RUNS) {
        let ns = backend.open(settings, PingPong { settings }).expect("valid settings");
        if run >= WARMUP_RUNS {
            println!("  Ping-pong latency: {:.2} ns", ns);
            latency_ns.push(ns);
        }
        thread::sleep(Duration::from_millis(100));
    }

    BenchmarkResult { name: backend.name(), throughput_mpmc, latency_ns }
}

fn main() {
    println!("queue_adapters benchmarks");
    println!("-------------------------\n");
    println!("Number of CPUs: {}", num_cpus::get());

    let results: Vec<_> = Backend::ALL.into_iter().map(benchmark_backend).collect();

    println!("\nSummary Results:");
    println!("{:<16} {:>20} {:>15}", "Queue Type", "Throughput (Mops/s)", "Latency (ns)");
    println!("{:<16} {:>20} {:>15}", "----------", "-------------------", "------------");
    for result in results {
        let avg_throughput =
            result.throughput_mpmc.iter().sum::<f64>() / result.throughput_mpmc.len() as f64;
        let avg_latency = result.latency_ns.iter().sum::<f64>() / result.latency_ns.len() as f64;
        println!("{:<16} {:>20.2} {:>15.2}", result.name, avg_throughput, avg_latency);
    }
}
