//! Tagged multi-threaded runs with multiset verification
//!
//! Every pushed item is a unique tag `(producer << 32) | seq`, and each
//! producer numbers its accepted pushes `0, 1, 2, ..`. Three workloads are
//! supported:
//!
//! - [`StressPlan`]: dedicated producers and consumers; consumers pop until
//!   every item has been received.
//! - [`MixedPlan`]: every thread pushes or pops at random, weighted by a
//!   spread.
//! - [`PairPlan`]: every thread pushes one item, then pops one.
//!
//! Each can prefill the queue before the workers start. Afterwards
//! [`StressReport::verify`] checks that the received multiset equals the
//! pushed set: nothing lost, nothing duplicated.

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::Rng;

use crate::arch::spin_loop_pause;
use crate::backend::Backend;
use crate::common::{ordering, QueueBackend, Session};
use crate::error::QueueError;

/// Items one producer can number before its tags would alias
pub const MAX_ITEMS_PER_PRODUCER: u64 = 1 << 32;

/// The tag of item `seq` pushed by `producer`
#[inline]
pub fn tag(producer: usize, seq: u64) -> u64 {
    ((producer as u64) << 32) | (seq & 0xffff_ffff)
}

/// Splits a tag back into `(producer, seq)`
#[inline]
pub fn untag(tag: u64) -> (usize, u64) {
    ((tag >> 32) as usize, tag & 0xffff_ffff)
}

fn check_items(items: u64) -> Result<(), QueueError> {
    if items > MAX_ITEMS_PER_PRODUCER {
        return Err(QueueError::TooManyItems { items, max: MAX_ITEMS_PER_PRODUCER });
    }
    Ok(())
}

/// Dedicated producers and consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressPlan {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
    /// Items pushed before the workers start
    pub prefill: u64,
}

impl StressPlan {
    pub fn new(producers: usize, consumers: usize, items_per_producer: u64) -> Self {
        Self { producers, consumers, items_per_producer, prefill: 0 }
    }

    pub fn prefill(mut self, prefill: u64) -> Self {
        self.prefill = prefill;
        self
    }

    /// Items the consumers must receive, prefill included
    pub fn total(&self) -> u64 {
        self.producers as u64 * self.items_per_producer + self.prefill
    }

    /// Sessions the run opens at once
    pub fn threads(&self) -> usize {
        self.producers + self.consumers
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        check_items(self.items_per_producer)?;
        check_items(self.prefill)
    }
}

impl Default for StressPlan {
    fn default() -> Self {
        Self::new(8, 8, 100_000)
    }
}

/// Every thread pushes with probability `spread`, otherwise pops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixedPlan {
    pub threads: usize,
    pub ops_per_thread: u64,
    /// Share of operations that are pushes, in `[0, 1]`
    pub spread: f64,
    pub prefill: u64,
}

impl MixedPlan {
    pub fn new(threads: usize, ops_per_thread: u64, spread: f64) -> Self {
        Self { threads, ops_per_thread, spread, prefill: 0 }
    }

    pub fn prefill(mut self, prefill: u64) -> Self {
        self.prefill = prefill;
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if !(0.0..=1.0).contains(&self.spread) {
            return Err(QueueError::SpreadOutOfRange);
        }
        check_items(self.ops_per_thread)?;
        check_items(self.prefill)
    }
}

/// Every thread repeats push-then-pop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairPlan {
    pub threads: usize,
    pub pairs_per_thread: u64,
    pub prefill: u64,
}

impl PairPlan {
    pub fn new(threads: usize, pairs_per_thread: u64) -> Self {
        Self { threads, pairs_per_thread, prefill: 0 }
    }

    pub fn prefill(mut self, prefill: u64) -> Self {
        self.prefill = prefill;
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        check_items(self.pairs_per_thread)?;
        check_items(self.prefill)
    }
}

/// Any one of the three workloads
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Workload {
    ProdCon(StressPlan),
    Mixed(MixedPlan),
    Pairs(PairPlan),
}

impl Workload {
    pub fn name(&self) -> &'static str {
        match self {
            Workload::ProdCon(_) => "prod-con",
            Workload::Mixed(_) => "enq-deq",
            Workload::Pairs(_) => "enq-deq-pairs",
        }
    }

    /// Sessions the run opens at once
    pub fn threads(&self) -> usize {
        match self {
            Workload::ProdCon(plan) => plan.threads(),
            Workload::Mixed(plan) => plan.threads,
            Workload::Pairs(plan) => plan.threads,
        }
    }

    pub fn run<Q>(&self, queue: &Q) -> Result<StressReport, QueueError>
    where
        Q: QueueBackend<Item = u64>,
    {
        match self {
            Workload::ProdCon(plan) => run(queue, plan),
            Workload::Mixed(plan) => run_mixed(queue, plan),
            Workload::Pairs(plan) => run_pairs(queue, plan),
        }
    }
}

impl From<StressPlan> for Workload {
    fn from(plan: StressPlan) -> Self {
        Workload::ProdCon(plan)
    }
}

impl From<MixedPlan> for Workload {
    fn from(plan: MixedPlan) -> Self {
        Workload::Mixed(plan)
    }
}

impl From<PairPlan> for Workload {
    fn from(plan: PairPlan) -> Self {
        Workload::Pairs(plan)
    }
}

/// What one run observed
#[derive(Debug, Clone)]
pub struct StressReport {
    pub backend: Backend,
    pub workload: Workload,
    pub elapsed: Duration,
    /// Pushes rejected because the queue was full
    pub full_pushes: u64,
    /// Pops that found the queue empty
    pub empty_pops: u64,
    /// Accepted pushes per producer id; prefill uses the last id
    pushed: Vec<u64>,
    /// Successful pushes plus pops while the workers ran
    ops: u64,
    received: Vec<u64>,
}

impl StressReport {
    pub fn received(&self) -> usize {
        self.received.len()
    }

    /// Accepted pushes, prefill included
    pub fn pushed(&self) -> u64 {
        self.pushed.iter().sum()
    }

    /// Received tags, grouped per worker in pop order
    pub fn tags(&self) -> &[u64] {
        &self.received
    }

    /// Successful operations (pushes plus pops) per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.ops as f64 / secs
        } else {
            f64::INFINITY
        }
    }

    /// Checks that every pushed tag was received exactly once
    pub fn verify(&self) -> Result<(), QueueError> {
        let mut tags = self.received.clone();
        tags.sort_unstable();
        if let Some(pair) = tags.windows(2).find(|w| w[0] == w[1]) {
            return Err(QueueError::DuplicateItem { tag: pair[0] });
        }

        let expected = self.pushed() as usize;
        let was_pushed = |t: &u64| {
            let (producer, seq) = untag(*t);
            self.pushed.get(producer).is_some_and(|&count| seq < count)
        };
        if tags.len() != expected || !tags.iter().all(was_pushed) {
            return Err(QueueError::MissingItems { expected, received: tags.len() });
        }
        Ok(())
    }
}

/// Raises the abort flag if the owning worker unwinds
struct AbortOnPanic<'a>(&'a AtomicBool);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, ordering::X);
        }
    }
}

/// Pushes `count` tags of `producer` through a short-lived session
fn prefill<Q>(queue: &Q, producer: usize, count: u64) -> Result<(), QueueError>
where
    Q: QueueBackend<Item = u64>,
{
    if count == 0 {
        return Ok(());
    }
    debug!("prefilling {} queue with {} items", Q::BACKEND, count);
    let mut session = queue.session()?;
    for seq in 0..count {
        session
            .push(tag(producer, seq))
            .map_err(|_| QueueError::PrefillRejected { accepted: seq })?;
    }
    Ok(())
}

/// Runs `plan` against `queue` and collects what the consumers saw
///
/// Sessions are opened on the calling thread before any worker starts, so
/// a thread-indexed queue with too few slots fails here with
/// `ThreadsExhausted` instead of inside a worker. If any worker panics the
/// others stop early and the run returns `WorkerPanicked`.
pub fn run<Q>(queue: &Q, plan: &StressPlan) -> Result<StressReport, QueueError>
where
    Q: QueueBackend<Item = u64>,
{
    plan.validate()?;
    prefill(queue, plan.producers, plan.prefill)?;

    let total = plan.total();
    let mut producer_sessions = Vec::with_capacity(plan.producers);
    for _ in 0..plan.producers {
        producer_sessions.push(queue.session()?);
    }
    let mut consumer_sessions = Vec::with_capacity(plan.consumers);
    for _ in 0..plan.consumers {
        consumer_sessions.push(queue.session()?);
    }

    info!(
        "stress {}: {} producers x {} items, {} consumers, {} prefilled",
        Q::BACKEND,
        plan.producers,
        plan.items_per_producer,
        plan.consumers,
        plan.prefill
    );

    let barrier = Barrier::new(plan.threads() + 1);
    let popped = AtomicU64::new(0);
    let abort = AtomicBool::new(false);

    let outcome = thread::scope(|s| {
        let barrier = &barrier;
        let popped = &popped;
        let abort = &abort;

        let producers: Vec<_> = producer_sessions
            .into_iter()
            .enumerate()
            .map(|(id, mut session)| {
                s.spawn(move || {
                    let _guard = AbortOnPanic(abort);
                    let mut full = 0u64;
                    barrier.wait();
                    'items: for seq in 0..plan.items_per_producer {
                        let mut item = tag(id, seq);
                        while let Err(rejected) = session.push(item) {
                            if abort.load(ordering::X) {
                                break 'items;
                            }
                            item = rejected;
                            full += 1;
                            spin_loop_pause();
                        }
                    }
                    full
                })
            })
            .collect();

        let consumers: Vec<_> = consumer_sessions
            .into_iter()
            .map(|mut session| {
                s.spawn(move || {
                    let _guard = AbortOnPanic(abort);
                    let mut got = Vec::new();
                    let mut empty = 0u64;
                    barrier.wait();
                    while popped.load(ordering::X) < total && !abort.load(ordering::X) {
                        match session.pop() {
                            Some(item) => {
                                got.push(item);
                                popped.fetch_add(1, ordering::X);
                            }
                            None => {
                                empty += 1;
                                spin_loop_pause();
                            }
                        }
                    }
                    (got, empty)
                })
            })
            .collect();

        barrier.wait();
        let start = Instant::now();

        let mut full_pushes = 0;
        let mut panicked = false;
        for handle in producers {
            match handle.join() {
                Ok(full) => full_pushes += full,
                Err(_) => panicked = true,
            }
        }
        // a dead producer means the total will never be reached
        if panicked {
            abort.store(true, ordering::X);
        }
        let mut received = Vec::with_capacity(total as usize);
        let mut empty_pops = 0;
        for handle in consumers {
            match handle.join() {
                Ok((got, empty)) => {
                    received.extend(got);
                    empty_pops += empty;
                }
                Err(_) => panicked = true,
            }
        }
        let elapsed = start.elapsed();

        if panicked {
            Err(QueueError::WorkerPanicked)
        } else {
            Ok((received, full_pushes, empty_pops, elapsed))
        }
    });

    let (received, full_pushes, empty_pops, elapsed) = outcome?;
    debug!(
        "stress {} finished in {:?} ({} full pushes, {} empty pops)",
        Q::BACKEND,
        elapsed,
        full_pushes,
        empty_pops
    );
    let mut pushed = vec![plan.items_per_producer; plan.producers];
    pushed.push(plan.prefill);
    Ok(StressReport {
        backend: Q::BACKEND,
        workload: Workload::ProdCon(*plan),
        elapsed,
        full_pushes,
        empty_pops,
        pushed,
        ops: plan.producers as u64 * plan.items_per_producer + received.len() as u64,
        received,
    })
}

/// Runs `plan`: each thread flips a weighted coin per operation
///
/// Items left in the queue when the workers finish are drained and counted
/// as received.
pub fn run_mixed<Q>(queue: &Q, plan: &MixedPlan) -> Result<StressReport, QueueError>
where
    Q: QueueBackend<Item = u64>,
{
    plan.validate()?;
    info!(
        "stress {}: {} threads x {} ops, spread {}, {} prefilled",
        Q::BACKEND,
        plan.threads,
        plan.ops_per_thread,
        plan.spread,
        plan.prefill
    );
    run_symmetric(
        queue,
        Workload::Mixed(*plan),
        plan.threads,
        plan.ops_per_thread,
        plan.prefill,
        Step::Random { spread: plan.spread },
    )
}

/// Runs `plan`: each thread pushes one item, then pops one
pub fn run_pairs<Q>(queue: &Q, plan: &PairPlan) -> Result<StressReport, QueueError>
where
    Q: QueueBackend<Item = u64>,
{
    plan.validate()?;
    info!(
        "stress {}: {} threads x {} push/pop pairs, {} prefilled",
        Q::BACKEND,
        plan.threads,
        plan.pairs_per_thread,
        plan.prefill
    );
    run_symmetric(
        queue,
        Workload::Pairs(*plan),
        plan.threads,
        plan.pairs_per_thread,
        plan.prefill,
        Step::PushThenPop,
    )
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Random { spread: f64 },
    PushThenPop,
}

/// One worker's counters in a symmetric run
#[derive(Default)]
struct Tally {
    pushed: u64,
    full: u64,
    empty: u64,
    got: Vec<u64>,
}

impl Tally {
    fn push<S: Session<Item = u64>>(&mut self, session: &mut S, id: usize) {
        match session.push(tag(id, self.pushed)) {
            Ok(()) => self.pushed += 1,
            Err(_) => self.full += 1,
        }
    }

    fn pop<S: Session<Item = u64>>(&mut self, session: &mut S) {
        match session.pop() {
            Some(item) => self.got.push(item),
            None => self.empty += 1,
        }
    }
}

/// Every thread runs `rounds` of `step`; nobody waits on a full or empty queue
fn run_symmetric<Q>(
    queue: &Q,
    workload: Workload,
    threads: usize,
    rounds: u64,
    prefilled: u64,
    step: Step,
) -> Result<StressReport, QueueError>
where
    Q: QueueBackend<Item = u64>,
{
    prefill(queue, threads, prefilled)?;

    let mut sessions = Vec::with_capacity(threads);
    for _ in 0..threads {
        sessions.push(queue.session()?);
    }

    let barrier = Barrier::new(threads + 1);
    let abort = AtomicBool::new(false);

    let outcome = thread::scope(|s| {
        let barrier = &barrier;
        let abort = &abort;

        let workers: Vec<_> = sessions
            .into_iter()
            .enumerate()
            .map(|(id, mut session)| {
                s.spawn(move || {
                    let _guard = AbortOnPanic(abort);
                    let mut rng = rand::rng();
                    let mut tally = Tally::default();
                    barrier.wait();
                    for _ in 0..rounds {
                        if abort.load(ordering::X) {
                            break;
                        }
                        match step {
                            Step::Random { spread } => {
                                if rng.random_bool(spread) {
                                    tally.push(&mut session, id);
                                } else {
                                    tally.pop(&mut session);
                                }
                            }
                            Step::PushThenPop => {
                                tally.push(&mut session, id);
                                tally.pop(&mut session);
                            }
                        }
                    }
                    tally
                })
            })
            .collect();

        barrier.wait();
        let start = Instant::now();
        let mut tallies = Vec::with_capacity(threads);
        let mut panicked = false;
        for handle in workers {
            match handle.join() {
                Ok(tally) => tallies.push(tally),
                Err(_) => panicked = true,
            }
        }
        let elapsed = start.elapsed();

        if panicked {
            Err(QueueError::WorkerPanicked)
        } else {
            Ok((tallies, elapsed))
        }
    });

    let (tallies, elapsed) = outcome?;
    let mut pushed = Vec::with_capacity(threads + 1);
    let mut received = Vec::new();
    let (mut full_pushes, mut empty_pops) = (0, 0);
    for tally in tallies {
        pushed.push(tally.pushed);
        full_pushes += tally.full;
        empty_pops += tally.empty;
        received.extend(tally.got);
    }
    pushed.push(prefilled);
    let ops = pushed[..threads].iter().sum::<u64>() + received.len() as u64;

    let mut session = queue.session()?;
    let leftover = drain(&mut session);
    debug!(
        "stress {} finished in {:?} ({} full pushes, {} empty pops, {} left over)",
        Q::BACKEND,
        elapsed,
        full_pushes,
        empty_pops,
        leftover.len()
    );
    received.extend(leftover);

    Ok(StressReport {
        backend: Q::BACKEND,
        workload,
        elapsed,
        full_pushes,
        empty_pops,
        pushed,
        ops,
        received,
    })
}

/// Pops until the queue reports empty
pub fn drain<S: Session>(session: &mut S) -> Vec<S::Item> {
    std::iter::from_fn(|| session.pop()).collect()
}

/// True if, for every producer, its tags appear in increasing `seq` order
pub fn in_producer_order(tags: &[u64]) -> bool {
    let mut last: Vec<Option<u64>> = Vec::new();
    for &t in tags {
        let (producer, seq) = untag(t);
        if producer >= last.len() {
            last.resize(producer + 1, None);
        }
        if matches!(last[producer], Some(prev) if prev >= seq) {
            return false;
        }
        last[producer] = Some(seq);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded::BoundedRing;
    use crate::common::{Capacity, IdentityFreeQueue, SharedSession};
    use crate::config::BoundedConfig;
    use crate::segment::SegmentQueue;
    use std::sync::mpsc;

    #[test]
    fn tags_split_back() {
        let t = tag(7, 123_456);
        assert_eq!(untag(t), (7, 123_456));
        assert_eq!(t, 0x7_0001_e240);
    }

    fn report(producers: usize, per_producer: u64, received: Vec<u64>) -> StressReport {
        let mut pushed = vec![per_producer; producers];
        pushed.push(0);
        StressReport {
            backend: Backend::SegmentQueue,
            workload: Workload::ProdCon(StressPlan::new(producers, 1, per_producer)),
            elapsed: Duration::from_millis(1),
            full_pushes: 0,
            empty_pops: 0,
            pushed,
            ops: 0,
            received,
        }
    }

    #[test]
    fn verify_flags_duplicates_and_losses() {
        let ok = report(2, 2, vec![tag(1, 0), tag(0, 1), tag(0, 0), tag(1, 1)]);
        assert_eq!(ok.verify(), Ok(()));

        let dup = report(2, 2, vec![tag(1, 0), tag(0, 1), tag(0, 1), tag(1, 1)]);
        assert_eq!(dup.verify(), Err(QueueError::DuplicateItem { tag: tag(0, 1) }));

        let short = report(2, 2, vec![tag(1, 0), tag(0, 1), tag(1, 1)]);
        assert_eq!(short.verify(), Err(QueueError::MissingItems { expected: 4, received: 3 }));

        let foreign = report(2, 2, vec![tag(1, 0), tag(0, 1), tag(5, 0), tag(1, 1)]);
        assert_eq!(foreign.verify(), Err(QueueError::MissingItems { expected: 4, received: 4 }));
    }

    #[test]
    fn producer_order_check() {
        assert!(in_producer_order(&[tag(0, 0), tag(1, 0), tag(0, 1), tag(1, 5)]));
        assert!(!in_producer_order(&[tag(0, 1), tag(1, 0), tag(0, 0)]));
    }

    #[test]
    fn oversized_plans_are_rejected() {
        let last = MAX_ITEMS_PER_PRODUCER - 1;
        assert_eq!(untag(tag(3, last)), (3, last));
        let queue = SegmentQueue::new();
        let too_many = QueueError::TooManyItems {
            items: MAX_ITEMS_PER_PRODUCER + 1,
            max: MAX_ITEMS_PER_PRODUCER,
        };
        let plan = StressPlan::new(1, 1, MAX_ITEMS_PER_PRODUCER + 1);
        assert_eq!(run(&queue, &plan).unwrap_err(), too_many);
        let plan = PairPlan::new(1, 1).prefill(MAX_ITEMS_PER_PRODUCER + 1);
        assert_eq!(run_pairs(&queue, &plan).unwrap_err(), too_many);
        assert_eq!(StressPlan::new(1, 1, MAX_ITEMS_PER_PRODUCER).validate(), Ok(()));

        let plan = MixedPlan::new(2, 10, 1.5);
        assert_eq!(run_mixed(&queue, &plan).unwrap_err(), QueueError::SpreadOutOfRange);
        let plan = MixedPlan::new(2, 10, f64::NAN);
        assert_eq!(plan.validate(), Err(QueueError::SpreadOutOfRange));
        // nothing was pushed by the rejected runs
        assert!(queue.is_empty());
    }

    #[test]
    fn small_run_on_a_tiny_ring() {
        let queue = BoundedRing::new(2).unwrap();
        let report = run(&queue, &StressPlan::new(3, 2, 2_000)).unwrap();
        assert_eq!(report.verify(), Ok(()));
        assert_eq!(report.received(), 6_000);
        assert!(report.throughput() > 0.0);
    }

    #[test]
    fn prefilled_items_are_consumed_too() {
        let queue = BoundedRing::new(64).unwrap();
        let report = run(&queue, &StressPlan::new(2, 2, 500).prefill(40)).unwrap();
        assert_eq!(report.verify(), Ok(()));
        assert_eq!(report.received(), 1_040);
        assert_eq!(report.pushed(), 1_040);
        assert!(queue.is_empty());
    }

    #[test]
    fn prefill_past_capacity_is_an_error() {
        let queue = BoundedRing::new(8).unwrap();
        let err = run(&queue, &StressPlan::new(1, 1, 10).prefill(9)).unwrap_err();
        assert_eq!(err, QueueError::PrefillRejected { accepted: 8 });
    }

    #[test]
    fn mixed_and_pair_runs_account_for_everything() {
        let queue = BoundedRing::new(16).unwrap();
        for spread in [0.0, 0.3, 0.5, 1.0] {
            let plan = MixedPlan::new(4, 5_000, spread).prefill(8);
            let report = run_mixed(&queue, &plan).unwrap();
            assert_eq!(report.verify(), Ok(()), "spread {}", spread);
            assert!(queue.is_empty());
        }

        let report = run_mixed(&queue, &MixedPlan::new(2, 100, 1.0)).unwrap();
        assert_eq!(report.pushed(), 16);
        assert_eq!(report.full_pushes, 200 - 16);

        let queue = SegmentQueue::new();
        let report = run_pairs(&queue, &PairPlan::new(4, 5_000).prefill(3)).unwrap();
        assert_eq!(report.verify(), Ok(()));
        assert_eq!(report.pushed(), 20_003);
        assert_eq!(report.full_pushes, 0);
    }

    #[test]
    fn workload_dispatch() {
        let queue = SegmentQueue::new();
        let workloads: [Workload; 3] = [
            StressPlan::new(2, 2, 100).into(),
            MixedPlan::new(3, 100, 0.6).into(),
            PairPlan::new(3, 100).into(),
        ];
        for workload in workloads {
            let report = workload.run(&queue).unwrap();
            assert_eq!(report.workload, workload);
            assert_eq!(report.verify(), Ok(()), "{}", workload.name());
        }
        assert_eq!(workloads[1].threads(), 3);
    }

    /// A bounded ring whose pops always panic
    struct PanickingPops(BoundedRing<u64>);

    impl QueueBackend for PanickingPops {
        type Item = u64;
        type Config = BoundedConfig;
        type Session<'q> = SharedSession<'q, Self>;

        const BACKEND: Backend = Backend::BoundedRing;

        fn create(config: BoundedConfig) -> Result<Self, QueueError> {
            BoundedRing::create(config).map(PanickingPops)
        }

        fn capacity(&self) -> Capacity {
            QueueBackend::capacity(&self.0)
        }

        fn session(&self) -> Result<Self::Session<'_>, QueueError> {
            Ok(SharedSession::new(self))
        }
    }

    impl IdentityFreeQueue for PanickingPops {
        fn try_push(&self, item: u64) -> Result<(), u64> {
            self.0.push(item)
        }

        fn try_pop(&self) -> Option<u64> {
            panic!("pop failed");
        }
    }

    #[test]
    fn consumer_panic_stops_blocked_producers() {
        let (done, finished) = mpsc::channel();
        thread::spawn(move || {
            let queue = PanickingPops::create(BoundedConfig::new(4)).unwrap();
            let _ = done.send(run(&queue, &StressPlan::new(2, 1, 100)));
        });
        let outcome = finished
            .recv_timeout(Duration::from_secs(10))
            .expect("run returned after its consumer panicked");
        assert_eq!(outcome.unwrap_err(), QueueError::WorkerPanicked);
    }

    #[test]
    fn drain_empties_a_queue() {
        let queue = SegmentQueue::new();
        for i in 0..10u64 {
            queue.push(i);
        }
        let mut session = queue.session().unwrap();
        assert_eq!(drain(&mut session), (0..10).collect::<Vec<_>>());
        assert_eq!(session.pop(), None);
    }
}
