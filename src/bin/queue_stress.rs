use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{error, info};

use queue_adapters::stress::{MixedPlan, PairPlan, StressPlan, StressReport, Workload};
use queue_adapters::{Backend, BackendVisitor, QueueBackend, QueueError, QueueHandle, QueueSettings};

/// Verified stress runs over the queue backends
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Backend to run (bounded_ring, segment_queue, lcrq, lprq, faa_array) or `all`
    #[arg(short, long, default_value = "all", value_parser = parse_selection, global = true)]
    backend: Selection,
    /// Operations per thread (items per producer for prod-con)
    #[arg(short = 'n', long, default_value_t = 100_000, global = true)]
    items: u64,
    /// Items pushed before the workers start
    #[arg(long, default_value_t = 0, global = true)]
    prefill: u64,
    /// Capacity of the bounded ring
    #[arg(long, default_value_t = queue_adapters::DEFAULT_CAPACITY, global = true)]
    capacity: usize,
    /// Thread slots of the thread-indexed backends; at least one per worker by default
    #[arg(short, long, global = true)]
    max_threads: Option<usize>,
    /// Cells per ring (LCRQ, LPRQ) or slots per node (FAAArrayQueue)
    #[arg(long, default_value_t = queue_adapters::DEFAULT_RING_SIZE, global = true)]
    ring_size: usize,
    /// How many times each backend is run
    #[arg(short, long, default_value_t = 1, global = true)]
    iterations: u32,
    /// Workload to run; prod-con with 8 producers and 8 consumers if omitted
    #[command(subcommand)]
    workload: Option<WorkloadArgs>,
}

#[derive(Subcommand, Debug, Clone)]
enum WorkloadArgs {
    /// Dedicated producers and consumers
    ProdCon(ProdConArgs),
    /// Every thread pushes or pops at random, weighted by `--spread`
    EnqDeq(EnqDeqArgs),
    /// Every thread repeats push-then-pop
    EnqDeqPairs(EnqDeqPairsArgs),
}

#[derive(ClapArgs, Debug, Clone)]
struct ProdConArgs {
    /// Number of producer threads
    #[arg(short, long, default_value_t = 8)]
    producers: usize,
    /// Number of consumer threads
    #[arg(short, long, default_value_t = 8)]
    consumers: usize,
}

#[derive(ClapArgs, Debug, Clone)]
struct EnqDeqArgs {
    #[arg(short, long = "thread-count", default_value_t = 16)]
    thread_count: usize,
    /// Share of operations that are pushes; 0.3 means 30% push, 70% pop
    #[arg(short, long, default_value_t = 0.5)]
    spread: f64,
}

#[derive(ClapArgs, Debug, Clone)]
struct EnqDeqPairsArgs {
    #[arg(short, long = "thread-count", default_value_t = 16)]
    thread_count: usize,
}

impl Args {
    fn workload(&self) -> Workload {
        let workload = self
            .workload
            .clone()
            .unwrap_or(WorkloadArgs::ProdCon(ProdConArgs { producers: 8, consumers: 8 }));
        match workload {
            WorkloadArgs::ProdCon(a) => {
                StressPlan::new(a.producers, a.consumers, self.items).prefill(self.prefill).into()
            }
            WorkloadArgs::EnqDeq(a) => {
                MixedPlan::new(a.thread_count, self.items, a.spread).prefill(self.prefill).into()
            }
            WorkloadArgs::EnqDeqPairs(a) => {
                PairPlan::new(a.thread_count, self.items).prefill(self.prefill).into()
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Selection(Vec<Backend>);

fn parse_selection(s: &str) -> Result<Selection, QueueError> {
    if s.eq_ignore_ascii_case("all") {
        return Ok(Selection(Backend::ALL.to_vec()));
    }
    s.split(',').map(str::parse).collect::<Result<Vec<_>, _>>().map(Selection)
}

struct RunStress {
    workload: Workload,
}

impl BackendVisitor<u64> for RunStress {
    type Output = Result<StressReport, QueueError>;

    fn visit<Q: QueueBackend<Item = u64>>(self, queue: QueueHandle<Q>) -> Self::Output {
        let report = self.workload.run(&*queue)?;
        queue.destroy();
        Ok(report)
    }
}

fn print_report(report: &StressReport, iteration: u32) {
    println!(
        "{:<14} {:<13} run {:>2}: {:>10} items in {:>10.3?}  {:>14.0} ops/s  full {:>10}  empty {:>10}",
        report.backend.name(),
        report.workload.name(),
        iteration,
        report.received(),
        report.elapsed,
        report.throughput(),
        report.full_pushes,
        report.empty_pops,
    );
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let workload = args.workload();
    let defaults = QueueSettings::default();
    let settings = QueueSettings::default()
        .capacity(args.capacity)
        .max_threads(args.max_threads.unwrap_or(defaults.max_threads.max(workload.threads())))
        .ring_size(args.ring_size);
    info!("starting {} runs with {:?}", workload.name(), settings);

    let mut failed = false;
    for &backend in &args.backend.0 {
        for iteration in 1..=args.iterations {
            let outcome = backend
                .open(settings, RunStress { workload })
                .and_then(|report| report)
                .and_then(|report| report.verify().map(|()| report));
            match outcome {
                Ok(report) => print_report(&report, iteration),
                Err(e) => {
                    error!("{} run {} failed: {}", backend, iteration, e);
                    eprintln!("{} run {} failed: {}", backend, iteration, e);
                    failed = true;
                }
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
