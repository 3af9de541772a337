//! LPRQ: a linked list of PRQ rings using only single-word CAS
//!
//! A PRQ cell holds two words that are updated separately:
//!
//! ```text
//!   safe_epoch: [ safe:1 | epoch:63 ]      value: EMPTY | item | token
//! ```
//!
//! Position `p` of a ring of size `R` belongs to cycle `p / R + 1`; a fresh
//! cell sits at epoch 0, below every cycle. An enqueuer cannot swap item and
//! epoch in one step, so it first parks its thread token (an odd word) in
//! `value`, then moves the epoch to its cycle, then swaps the token for the
//! item. A dequeuer that meets a token may withdraw it, which makes the
//! enqueuer retry at a new position. Closing, appending and unlinking of
//! rings work as in LCRQ; unlinked rings go to an epoch domain.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize};

use crossbeam_utils::CachePadded;
use log::{debug, trace};

use crate::backend::Backend;
use crate::common::{ordering, Capacity, IdentityIndexedQueue, QueueBackend};
use crate::config::ThreadIndexedConfig;
use crate::epoch::EpochDomain;
use crate::error::QueueError;
use crate::payload::{self, EMPTY};
use crate::thread_slots::{ThreadRegistry, ThreadSession};

const CLOSED: u64 = 1 << 63;
const SAFE: u64 = 1 << 63;

/// Failed enqueue attempts on one ring before closing it
const PATIENCE: usize = 10;

#[inline(always)]
fn join(safe: bool, epoch: u64) -> u64 {
    if safe {
        SAFE | epoch
    } else {
        epoch
    }
}

#[inline(always)]
fn split(safe_epoch: u64) -> (bool, u64) {
    (safe_epoch & SAFE != 0, safe_epoch & !SAFE)
}

/// The reservation marker of thread `tid`
#[inline(always)]
fn token(tid: usize) -> usize {
    (tid << 1) | 1
}

#[inline(always)]
fn is_token(word: usize) -> bool {
    word & 1 == 1
}

struct Cell {
    safe_epoch: AtomicU64,
    value: AtomicUsize,
}

struct Prq {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    next: CachePadded<AtomicPtr<Prq>>,
    ring: Box<[CachePadded<Cell>]>,
    shift: u32,
}

impl Prq {
    fn new(size: usize, first: usize) -> Self {
        let ring: Box<[CachePadded<Cell>]> = (0..size)
            .map(|i| {
                let (epoch, value) = if i == 0 && first != EMPTY { (1, first) } else { (0, EMPTY) };
                CachePadded::new(Cell {
                    safe_epoch: AtomicU64::new(join(true, epoch)),
                    value: AtomicUsize::new(value),
                })
            })
            .collect();
        let tail = if first == EMPTY { 0 } else { 1 };
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(tail)),
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            ring,
            shift: size.trailing_zeros(),
        }
    }

    #[inline(always)]
    fn size(&self) -> u64 {
        self.ring.len() as u64
    }

    #[inline(always)]
    fn cycle(&self, pos: u64) -> u64 {
        (pos >> self.shift) + 1
    }

    #[inline(always)]
    fn cell(&self, pos: u64) -> &Cell {
        &self.ring[(pos & (self.size() - 1)) as usize]
    }

    fn enqueue(&self, word: usize, token: usize) -> bool {
        let mut attempts = 0;
        loop {
            let t = self.tail.fetch_add(1, ordering::SC);
            if t & CLOSED != 0 {
                return false;
            }
            let cycle = self.cycle(t);
            let cell = self.cell(t);
            let safe_epoch = cell.safe_epoch.load(ordering::SC);
            let (safe, epoch) = split(safe_epoch);
            let value = cell.value.load(ordering::SC);

            if value == EMPTY
                && epoch < cycle
                && (safe || self.head.load(ordering::SC) <= t)
                && cell
                    .value
                    .compare_exchange(EMPTY, token, ordering::SC, ordering::SC)
                    .is_ok()
            {
                if cell
                    .safe_epoch
                    .compare_exchange(safe_epoch, join(true, cycle), ordering::SC, ordering::SC)
                    .is_ok()
                {
                    if cell
                        .value
                        .compare_exchange(token, word, ordering::SC, ordering::SC)
                        .is_ok()
                    {
                        return true;
                    }
                    // a dequeuer withdrew the reservation
                } else {
                    let _ = cell.value.compare_exchange(token, EMPTY, ordering::SC, ordering::SC);
                }
            }

            let h = self.head.load(ordering::SC);
            attempts += 1;
            if (t >= h && t - h >= self.size()) || attempts >= PATIENCE {
                self.tail.fetch_or(CLOSED, ordering::SC);
                trace!("lprq: closed ring at tail {} (head {}, attempts {})", t, h, attempts);
                return false;
            }
        }
    }

    fn dequeue(&self) -> Option<usize> {
        loop {
            let h = self.head.fetch_add(1, ordering::SC);
            let cycle = self.cycle(h);
            let cell = self.cell(h);
            loop {
                let safe_epoch = cell.safe_epoch.load(ordering::SC);
                let value = cell.value.load(ordering::SC);
                if cell.safe_epoch.load(ordering::SC) != safe_epoch {
                    continue;
                }
                let (safe, epoch) = split(safe_epoch);

                if epoch > cycle {
                    break;
                }
                if is_token(value) {
                    let _ = cell.value.compare_exchange(value, EMPTY, ordering::SC, ordering::SC);
                    continue;
                }
                if epoch == cycle {
                    if value == EMPTY {
                        break;
                    }
                    // only this dequeuer may take an item of this cycle
                    cell.value.store(EMPTY, ordering::SC);
                    return Some(value);
                }
                let moved = if value == EMPTY {
                    join(safe, cycle)
                } else {
                    // an older item still waits here: keep enqueuers off
                    join(false, epoch)
                };
                if cell
                    .safe_epoch
                    .compare_exchange(safe_epoch, moved, ordering::SC, ordering::SC)
                    .is_ok()
                {
                    break;
                }
            }

            let t = self.tail.load(ordering::SC) & !CLOSED;
            if t <= h + 1 {
                self.fix_state();
                return None;
            }
        }
    }

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

/// Unbounded thread-indexed queue built from PRQ rings
pub struct Lprq<T> {
    head: CachePadded<AtomicPtr<Prq>>,
    tail: CachePadded<AtomicPtr<Prq>>,
    epochs: EpochDomain<Prq>,
    threads: ThreadRegistry,
    ring_size: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for Lprq<T> {}
unsafe impl<T: Send> Sync for Lprq<T> {}

impl<T> Lprq<T> {
    pub fn new(config: ThreadIndexedConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let first = Box::into_raw(Box::new(Prq::new(config.ring_size, EMPTY)));
        Ok(Self {
            head: CachePadded::new(AtomicPtr::new(first)),
            tail: CachePadded::new(AtomicPtr::new(first)),
            epochs: EpochDomain::new(config.max_threads),
            threads: ThreadRegistry::new(config.max_threads),
            ring_size: config.ring_size,
            _marker: PhantomData,
        })
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    unsafe fn enqueue(&self, word: usize, tid: usize) {
        let _pin = self.epochs.pin(tid);
        let token = token(tid);
        loop {
            let prq_ptr = self.tail.load(ordering::SC);
            let prq = &*prq_ptr;

            let next = prq.next.load(ordering::SC);
            if !next.is_null() {
                let _ = self.tail.compare_exchange(prq_ptr, next, ordering::SC, ordering::SC);
                continue;
            }

            if prq.enqueue(word, token) {
                return;
            }

            let fresh = Box::into_raw(Box::new(Prq::new(self.ring_size, word)));
            if prq
                .next
                .compare_exchange(ptr::null_mut(), fresh, ordering::SC, ordering::SC)
                .is_ok()
            {
                let _ = self.tail.compare_exchange(prq_ptr, fresh, ordering::SC, ordering::SC);
                debug!("lprq: appended a ring of {} cells", self.ring_size);
                return;
            }
            drop(Box::from_raw(fresh));
        }
    }

    unsafe fn dequeue(&self, tid: usize) -> Option<usize> {
        let _pin = self.epochs.pin(tid);
        loop {
            let prq_ptr = self.head.load(ordering::SC);
            let prq = &*prq_ptr;

            if let Some(word) = prq.dequeue() {
                return Some(word);
            }
            let next = prq.next.load(ordering::SC);
            if next.is_null() {
                return None;
            }
            if let Some(word) = prq.dequeue() {
                return Some(word);
            }

            let _ = self.tail.compare_exchange(prq_ptr, next, ordering::SC, ordering::SC);
            if self
                .head
                .compare_exchange(prq_ptr, next, ordering::SC, ordering::SC)
                .is_ok()
            {
                self.epochs.retire(prq_ptr, tid);
                trace!("lprq: retired a drained ring");
            }
        }
    }
}

impl<T> Drop for Lprq<T> {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            let prq = unsafe { Box::from_raw(node) };
            for cell in prq.ring.iter() {
                let value = cell.value.load(ordering::X);
                if payload::is_item(value) {
                    unsafe { payload::drop_word::<T>(value) };
                }
            }
            node = prq.next.load(ordering::X);
        }
    }
}

impl<T: Send> QueueBackend for Lprq<T> {
    type Item = T;
    type Config = ThreadIndexedConfig;
    type Session<'q> = ThreadSession<'q, Self> where Self: 'q;

    const BACKEND: Backend = Backend::Lprq;

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

impl<T: Send> IdentityIndexedQueue for Lprq<T> {
    fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    unsafe fn push_as(&self, item: T, tid: usize) -> Result<(), T> {
        self.threads.check(tid);
        self.enqueue(payload::into_word(item), tid);
        Ok(())
    }

    unsafe fn pop_as(&self, tid: usize) -> Option<T> {
        self.threads.check(tid);
        self.dequeue(tid).map(|w| payload::from_word(w))
    }
}
