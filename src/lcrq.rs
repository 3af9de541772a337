//! LCRQ: a linked list of concurrent ring queues
//!
//! Each CRQ is a ring of `ring_size` cells driven by fetch-and-add on its
//! head and tail. A cell is 128 bits wide and updated with one double-width
//! CAS:
//!
//! ```text
//!   high 64 bits            low 64 bits
//!   [ value word      ] [ safe:1 | idx:63 ]
//! ```
//!
//! `value` is `EMPTY` or a boxed item, `idx` is the position the cell is
//! currently serving, and `safe` is cleared when a dequeuer gave up on a
//! cell that still held an older item. An enqueuer that finds its ring full
//! or keeps losing races closes the ring (high bit of `tail`) and appends a
//! fresh one holding its item. Drained rings are unlinked by dequeuers and
//! handed to the hazard-pointer domain.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64};

use crossbeam_utils::CachePadded;
use log::{debug, trace};
use portable_atomic::AtomicU128;

use crate::backend::Backend;
use crate::common::{ordering, Capacity, IdentityIndexedQueue, QueueBackend};
use crate::config::ThreadIndexedConfig;
use crate::error::QueueError;
use crate::hazard::HazardDomain;
use crate::payload::{self, EMPTY};
use crate::thread_slots::{ThreadRegistry, ThreadSession};

/// Set in `tail` once a ring takes no more items
const CLOSED: u64 = 1 << 63;

/// Set in a cell's low word while the cell may be used by enqueuers
const SAFE: u64 = 1 << 63;

/// Failed enqueue attempts on one ring before closing it
const PATIENCE: usize = 10;

#[inline(always)]
fn pack(safe: bool, idx: u64, value: usize) -> u128 {
    let meta = if safe { SAFE | idx } else { idx };
    ((value as u128) << 64) | meta as u128
}

#[inline(always)]
fn unpack(cell: u128) -> (bool, u64, usize) {
    let meta = cell as u64;
    (meta & SAFE != 0, meta & !SAFE, (cell >> 64) as usize)
}

struct Crq {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    next: CachePadded<AtomicPtr<Crq>>,
    ring: Box<[CachePadded<AtomicU128>]>,
}

impl Crq {
    /// A ring whose first cell already holds `first` (or nothing, for `EMPTY`)
    fn new(size: usize, first: usize) -> Self {
        let ring: Box<[CachePadded<AtomicU128>]> = (0..size as u64)
            .map(|i| {
                let value = if i == 0 { first } else { EMPTY };
                CachePadded::new(AtomicU128::new(pack(true, i, value)))
            })
            .collect();
        let tail = if first == EMPTY { 0 } else { 1 };
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(tail)),
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            ring,
        }
    }

    #[inline(always)]
    fn size(&self) -> u64 {
        self.ring.len() as u64
    }

    #[inline(always)]
    fn cell(&self, pos: u64) -> &AtomicU128 {
        &self.ring[(pos & (self.size() - 1)) as usize]
    }

    /// Returns `false` once the ring is closed; the item is then still ours
    fn enqueue(&self, word: usize) -> bool {
        let mut attempts = 0;
        loop {
            let t = self.tail.fetch_add(1, ordering::SC);
            if t & CLOSED != 0 {
                return false;
            }
            let cell = self.cell(t);
            let current = cell.load(ordering::SC);
            let (safe, idx, value) = unpack(current);
            if value == EMPTY
                && idx <= t
                && (safe || self.head.load(ordering::SC) <= t)
                && cell
                    .compare_exchange(current, pack(true, t, word), ordering::SC, ordering::SC)
                    .is_ok()
            {
                return true;
            }

            let h = self.head.load(ordering::SC);
            attempts += 1;
            if (t >= h && t - h >= self.size()) || attempts >= PATIENCE {
                self.tail.fetch_or(CLOSED, ordering::SC);
                trace!("lcrq: closed ring at tail {} (head {}, attempts {})", t, h, attempts);
                return false;
            }
        }
    }

    fn dequeue(&self) -> Option<usize> {
        loop {
            let h = self.head.fetch_add(1, ordering::SC);
            let cell = self.cell(h);
            loop {
                let current = cell.load(ordering::SC);
                let (safe, idx, value) = unpack(current);
                if idx > h {
                    break;
                }
                if value != EMPTY {
                    if idx == h {
                        let emptied = pack(safe, h + self.size(), EMPTY);
                        if cell
                            .compare_exchange(current, emptied, ordering::SC, ordering::SC)
                            .is_ok()
                        {
                            return Some(value);
                        }
                    } else {
                        // an item from an earlier lap still waits for its
                        // dequeuer: keep enqueuers off this cell
                        let unsafe_cell = pack(false, idx, value);
                        if cell
                            .compare_exchange(current, unsafe_cell, ordering::SC, ordering::SC)
                            .is_ok()
                        {
                            break;
                        }
                    }
                } else {
                    // nothing here for us: advance the cell past our lap
                    let skipped = pack(safe, h + self.size(), EMPTY);
                    if cell
                        .compare_exchange(current, skipped, ordering::SC, ordering::SC)
                        .is_ok()
                    {
                        break;
                    }
                }
            }

            let t = self.tail.load(ordering::SC) & !CLOSED;
            if t <= h + 1 {
                self.fix_state();
                return None;
            }
        }
    }

    /// Pulls `tail` up to `head` after dequeuers overshot an empty ring
    fn fix_state(&self) {
        loop {
            let t = self.tail.load(ordering::SC);
            let h = self.head.load(ordering::SC);
            if self.tail.load(ordering::SC) != t {
                continue;
            }
            if h <= t & !CLOSED {
                return;
            }
            if self
                .tail
                .compare_exchange(t, h | (t & CLOSED), ordering::SC, ordering::SC)
                .is_ok()
            {
                return;
            }
        }
    }
}

/// Unbounded thread-indexed queue built from CRQ rings
pub struct Lcrq<T> {
    head: CachePadded<AtomicPtr<Crq>>,
    tail: CachePadded<AtomicPtr<Crq>>,
    hazards: HazardDomain<Crq>,
    threads: ThreadRegistry,
    ring_size: usize,
    _marker: PhantomData<T>,
}

// Safety: items cross threads as owned boxes; all shared state is atomic or
// partitioned by thread id.
unsafe impl<T: Send> Send for Lcrq<T> {}
unsafe impl<T: Send> Sync for Lcrq<T> {}

impl<T> Lcrq<T> {
    pub fn new(config: ThreadIndexedConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let first = Box::into_raw(Box::new(Crq::new(config.ring_size, EMPTY)));
        Ok(Self {
            head: CachePadded::new(AtomicPtr::new(first)),
            tail: CachePadded::new(AtomicPtr::new(first)),
            hazards: HazardDomain::new(config.max_threads),
            threads: ThreadRegistry::new(config.max_threads),
            ring_size: config.ring_size,
            _marker: PhantomData,
        })
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    unsafe fn enqueue(&self, word: usize, tid: usize) {
        loop {
            let crq_ptr = self.hazards.protect(&self.tail, tid);
            let crq = &*crq_ptr;

            let next = crq.next.load(ordering::SC);
            if !next.is_null() {
                let _ = self.tail.compare_exchange(crq_ptr, next, ordering::SC, ordering::SC);
                continue;
            }

            if crq.enqueue(word) {
                return;
            }

            let fresh = Box::into_raw(Box::new(Crq::new(self.ring_size, word)));
            if crq
                .next
                .compare_exchange(ptr::null_mut(), fresh, ordering::SC, ordering::SC)
                .is_ok()
            {
                let _ = self.tail.compare_exchange(crq_ptr, fresh, ordering::SC, ordering::SC);
                debug!("lcrq: appended a ring of {} cells", self.ring_size);
                return;
            }
            // never published, so `word` is still owned by us
            drop(Box::from_raw(fresh));
        }
    }

    unsafe fn dequeue(&self, tid: usize) -> Option<usize> {
        loop {
            let crq_ptr = self.hazards.protect(&self.head, tid);
            let crq = &*crq_ptr;

            if let Some(word) = crq.dequeue() {
                return Some(word);
            }
            let next = crq.next.load(ordering::SC);
            if next.is_null() {
                return None;
            }
            // an enqueue may have landed before the ring was closed
            if let Some(word) = crq.dequeue() {
                return Some(word);
            }

            // tail leaves the ring first so a retired ring is never the tail
            let _ = self.tail.compare_exchange(crq_ptr, next, ordering::SC, ordering::SC);
            if self
                .head
                .compare_exchange(crq_ptr, next, ordering::SC, ordering::SC)
                .is_ok()
            {
                self.hazards.clear(tid);
                self.hazards.retire(crq_ptr, tid);
                trace!("lcrq: retired a drained ring");
            }
        }
    }
}

impl<T> Drop for Lcrq<T> {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            let crq = unsafe { Box::from_raw(node) };
            for cell in crq.ring.iter() {
                let (_, _, value) = unpack(cell.load(ordering::X));
                if value != EMPTY {
                    unsafe { payload::drop_word::<T>(value) };
                }
            }
            node = crq.next.load(ordering::X);
        }
    }
}

impl<T: Send> QueueBackend for Lcrq<T> {
    type Item = T;
    type Config = ThreadIndexedConfig;
    type Session<'q> = ThreadSession<'q, Self> where Self: 'q;

    const BACKEND: Backend = Backend::Lcrq;

    fn create(config: ThreadIndexedConfig) -> Result<Self, QueueError> {
        Self::new(config)
    }

    fn capacity(&self) -> Capacity {
        Capacity::Unbounded
    }

    fn session(&self) -> Result<Self::Session<'_>, QueueError> {
        self.register()
    }
}

impl<T: Send> IdentityIndexedQueue for Lcrq<T> {
    fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    unsafe fn push_as(&self, item: T, tid: usize) -> Result<(), T> {
        self.threads.check(tid);
        let word = payload::into_word(item);
        self.enqueue(word, tid);
        self.hazards.clear(tid);
        Ok(())
    }

    unsafe fn pop_as(&self, tid: usize) -> Option<T> {
        self.threads.check(tid);
        let word = self.dequeue(tid);
        self.hazards.clear(tid);
        word.map(|w| payload::from_word(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Session;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn small(max_threads: usize) -> Lcrq<u64> {
        Lcrq::new(ThreadIndexedConfig::new(max_threads).ring_size(8)).unwrap()
    }

    #[test]
    fn test_cell_packing() {
        let cell = pack(true, 42, 0x1000);
        assert_eq!(unpack(cell), (true, 42, 0x1000));
        assert_eq!(unpack(pack(false, 7, EMPTY)), (false, 7, EMPTY));
    }

    #[test]
    fn test_fifo_across_rings() {
        let q = small(2);
        let mut s = q.register().unwrap();
        for i in 0..100 {
            s.push(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(s.pop(), Some(i));
        }
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn test_interleaved_empty_pops() {
        let q = small(1);
        let mut s = q.register().unwrap();
        for round in 0..50u64 {
            assert_eq!(s.pop(), None);
            s.push(round).unwrap();
            s.push(round + 1000).unwrap();
            assert_eq!(s.pop(), Some(round));
            assert_eq!(s.pop(), Some(round + 1000));
        }
    }

    #[test]
    #[should_panic(expected = "thread id 3 is outside [0, 3)")]
    fn test_raw_tid_out_of_range_is_fatal() {
        let q = small(3);
        unsafe {
            let _ = q.push_as(1, 3);
        }
    }

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_releases_items_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let q: Lcrq<Counted> =
                Lcrq::new(ThreadIndexedConfig::new(1).ring_size(4)).unwrap();
            let mut s = q.register().unwrap();
            for _ in 0..20 {
                assert!(s.push(Counted(drops.clone())).is_ok());
            }
            for _ in 0..5 {
                drop(s.pop());
            }
            assert_eq!(drops.load(Ordering::SeqCst), 5);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_concurrent_producers_consumers() {
        const PER_THREAD: u64 = 10_000;
        let q = Arc::new(small(8));
        let popped = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    let mut s = q.register().unwrap();
                    for i in 0..PER_THREAD {
                        s.push(p * PER_THREAD + i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                let popped = popped.clone();
                thread::spawn(move || {
                    let mut s = q.register().unwrap();
                    let mut got = Vec::new();
                    while popped.load(Ordering::Relaxed) < (4 * PER_THREAD) as usize {
                        if let Some(v) = s.pop() {
                            got.push(v);
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    got
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        let mut all: Vec<u64> = consumers.into_iter().flat_map(|c| c.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..4 * PER_THREAD).collect::<Vec<_>>());
    }
}
