//! Multi-threaded runs verified by multiset equality

use std::sync::Barrier;
use std::thread;

use queue_adapters::stress::{
    drain, in_producer_order, tag, MixedPlan, PairPlan, StressPlan, StressReport, Workload,
    MAX_ITEMS_PER_PRODUCER,
};
use queue_adapters::{
    Backend, BackendVisitor, QueueBackend, QueueError, QueueHandle, QueueSettings, Session,
    SpinningSession,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Run(Workload);

impl BackendVisitor<u64> for Run {
    type Output = Result<StressReport, QueueError>;

    fn visit<Q: QueueBackend<Item = u64>>(self, queue: QueueHandle<Q>) -> Self::Output {
        self.0.run(&*queue)
    }
}

#[test]
fn eight_by_eight_every_backend() {
    init_logging();
    let settings = QueueSettings::default().max_threads(16);
    for backend in Backend::ALL {
        let report = backend.open(settings, Run(StressPlan::default().into())).unwrap().unwrap();
        assert_eq!(report.verify(), Ok(()), "{}", backend);
        assert_eq!(report.received(), 800_000);
    }
}

#[test]
fn small_rings_under_contention() {
    init_logging();
    let settings = QueueSettings::default().capacity(4).max_threads(12).ring_size(4);
    for backend in Backend::ALL {
        let plan = StressPlan::new(6, 6, 20_000);
        let report = backend.open(settings, Run(plan.into())).unwrap().unwrap();
        assert_eq!(report.verify(), Ok(()), "{}", backend);
    }
}

#[test]
fn single_consumer_sees_producer_order() {
    let settings = QueueSettings::default().capacity(16).max_threads(8).ring_size(16);
    for backend in Backend::ALL {
        let report = backend.open(settings, Run(StressPlan::new(4, 1, 20_000).into())).unwrap().unwrap();
        assert_eq!(report.verify(), Ok(()), "{}", backend);
        assert!(in_producer_order(report.tags()), "{} reordered a producer", backend);
    }
}

#[test]
fn too_few_thread_slots_is_an_error() {
    let settings = QueueSettings::default().max_threads(3);
    let err = Backend::Lcrq.open(settings, Run(StressPlan::new(2, 2, 10).into())).unwrap().unwrap_err();
    assert_eq!(err, QueueError::ThreadsExhausted { max_threads: 3 });
}

#[test]
fn mixed_workloads_at_several_spreads() {
    init_logging();
    let settings = QueueSettings::default().capacity(32).max_threads(8).ring_size(32);
    for backend in Backend::ALL {
        for spread in [0.2, 0.5, 0.8] {
            let plan = MixedPlan::new(8, 50_000, spread).prefill(16);
            let report = backend.open(settings, Run(plan.into())).unwrap().unwrap();
            assert_eq!(report.verify(), Ok(()), "{} at spread {}", backend, spread);
        }
    }
}

#[test]
fn push_pop_pairs_every_backend() {
    let settings = QueueSettings::default().capacity(16).max_threads(8).ring_size(8);
    for backend in Backend::ALL {
        let plan = PairPlan::new(8, 20_000).prefill(8);
        let report = backend.open(settings, Run(plan.into())).unwrap().unwrap();
        assert_eq!(report.verify(), Ok(()), "{}", backend);
        assert!(report.pushed() >= 8, "{}", backend);
    }
}

/// Producers push concurrently and join; one thread then pops everything back
struct DrainAfterJoin {
    producers: usize,
    per_producer: u64,
}

impl BackendVisitor<u64> for DrainAfterJoin {
    type Output = ();

    fn visit<Q: QueueBackend<Item = u64>>(self, queue: QueueHandle<Q>) {
        let sessions: Vec<_> = (0..self.producers).map(|_| queue.session().unwrap()).collect();
        let barrier = Barrier::new(self.producers);
        thread::scope(|s| {
            for (id, mut session) in sessions.into_iter().enumerate() {
                let barrier = &barrier;
                let per_producer = self.per_producer;
                s.spawn(move || {
                    barrier.wait();
                    for seq in 0..per_producer {
                        session.push_spin(tag(id, seq));
                    }
                });
            }
        });

        let mut session = queue.session().unwrap();
        let mut drained = drain(&mut session);
        assert_eq!(session.pop(), None, "{}", Q::BACKEND);
        let expected = self.producers as u64 * self.per_producer;
        assert_eq!(drained.len() as u64, expected, "{}", Q::BACKEND);
        drained.sort_unstable();
        drained.dedup();
        assert_eq!(drained.len() as u64, expected, "{}", Q::BACKEND);
    }
}

#[test]
fn drain_after_producers_join_is_complete() {
    init_logging();
    let settings = QueueSettings::default().capacity(80_000).max_threads(16).ring_size(4);
    for _ in 0..20 {
        for backend in Backend::ALL {
            backend.open(settings, DrainAfterJoin { producers: 16, per_producer: 5_000 }).unwrap();
        }
    }
}

#[test]
fn oversized_plan_is_rejected_before_running() {
    let plan = StressPlan::new(1, 1, MAX_ITEMS_PER_PRODUCER + 1);
    let err = Backend::SegmentQueue.open(QueueSettings::default(), Run(plan.into())).unwrap().unwrap_err();
    assert!(matches!(err, QueueError::TooManyItems { .. }));
}
