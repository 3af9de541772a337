//! Thread identities for the thread-indexed backends
//!
//! A [`ThreadRegistry`] owns `max_threads` slots. Claiming a slot yields a
//! [`ThreadSession`], which is the only safe way to call a thread-indexed
//! queue: it holds its id exclusively and gives it back on drop, so two live
//! sessions can never share an id.

use std::sync::atomic::AtomicBool;

use crossbeam_utils::CachePadded;
use log::debug;

use crate::common::{ordering, IdentityIndexedQueue, Session};
use crate::error::QueueError;

/// Occupancy table of thread ids `[0, max_threads)`
pub struct ThreadRegistry {
    slots: Box<[CachePadded<AtomicBool>]>,
}

impl ThreadRegistry {
    pub fn new(max_threads: usize) -> Self {
        let slots = (0..max_threads)
            .map(|_| CachePadded::new(AtomicBool::new(false)))
            .collect();
        Self { slots }
    }

    pub fn max_threads(&self) -> usize {
        self.slots.len()
    }

    /// Number of ids currently claimed (a snapshot)
    pub fn registered(&self) -> usize {
        self.slots.iter().filter(|s| s.load(ordering::X)).count()
    }

    /// Fatal check used by the raw `push_as`/`pop_as` entry points
    #[inline(always)]
    pub(crate) fn check(&self, tid: usize) {
        assert!(
            tid < self.slots.len(),
            "thread id {} is outside [0, {})",
            tid,
            self.slots.len()
        );
    }

    fn try_claim(&self, tid: usize) -> bool {
        let slot = &self.slots[tid];
        !slot.load(ordering::X)
            && slot.compare_exchange(false, true, ordering::A, ordering::X).is_ok()
    }

    pub(crate) fn claim(&self) -> Result<usize, QueueError> {
        for tid in 0..self.slots.len() {
            if self.try_claim(tid) {
                debug!("registered thread id {}", tid);
                return Ok(tid);
            }
        }
        Err(QueueError::ThreadsExhausted { max_threads: self.slots.len() })
    }

    pub(crate) fn claim_as(&self, tid: usize) -> Result<usize, QueueError> {
        if tid >= self.slots.len() {
            return Err(QueueError::ThreadIdOutOfRange { tid, max_threads: self.slots.len() });
        }
        if !self.try_claim(tid) {
            return Err(QueueError::ThreadIdInUse { tid });
        }
        debug!("registered thread id {}", tid);
        Ok(tid)
    }

    /// Release pairs with the acquire in `try_claim`: everything the old
    /// owner did under this id is visible to the next owner.
    pub(crate) fn release(&self, tid: usize) {
        self.slots[tid].store(false, ordering::R);
        debug!("released thread id {}", tid);
    }
}

/// Exclusive use of one thread id on one thread-indexed queue
pub struct ThreadSession<'q, Q: IdentityIndexedQueue> {
    queue: &'q Q,
    tid: usize,
}

impl<'q, Q: IdentityIndexedQueue> ThreadSession<'q, Q> {
    pub(crate) fn claim(queue: &'q Q) -> Result<Self, QueueError> {
        let tid = queue.threads().claim()?;
        Ok(Self { queue, tid })
    }

    pub(crate) fn claim_as(queue: &'q Q, tid: usize) -> Result<Self, QueueError> {
        let tid = queue.threads().claim_as(tid)?;
        Ok(Self { queue, tid })
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    pub fn queue(&self) -> &'q Q {
        self.queue
    }
}

impl<Q: IdentityIndexedQueue> Session for ThreadSession<'_, Q> {
    type Item = Q::Item;

    #[inline]
    fn push(&mut self, item: Q::Item) -> Result<(), Q::Item> {
        // SAFETY: the registry hands each id to at most one live session.
        unsafe { self.queue.push_as(item, self.tid) }
    }

    #[inline]
    fn pop(&mut self) -> Option<Q::Item> {
        // SAFETY: as above.
        unsafe { self.queue.pop_as(self.tid) }
    }
}

impl<Q: IdentityIndexedQueue> Drop for ThreadSession<'_, Q> {
    fn drop(&mut self) {
        self.queue.threads().release(self.tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_lowest_free_id() {
        let registry = ThreadRegistry::new(3);
        assert_eq!(registry.claim(), Ok(0));
        assert_eq!(registry.claim(), Ok(1));
        registry.release(0);
        assert_eq!(registry.claim(), Ok(0));
        assert_eq!(registry.claim(), Ok(2));
        assert_eq!(registry.claim(), Err(QueueError::ThreadsExhausted { max_threads: 3 }));
        assert_eq!(registry.registered(), 3);
    }

    #[test]
    fn claim_as_checks_bounds_and_ownership() {
        let registry = ThreadRegistry::new(2);
        assert_eq!(registry.claim_as(1), Ok(1));
        assert_eq!(registry.claim_as(1), Err(QueueError::ThreadIdInUse { tid: 1 }));
        assert_eq!(
            registry.claim_as(2),
            Err(QueueError::ThreadIdOutOfRange { tid: 2, max_threads: 2 })
        );
    }

    #[test]
    #[should_panic(expected = "thread id 4 is outside [0, 4)")]
    fn check_is_fatal_out_of_range() {
        ThreadRegistry::new(4).check(4);
    }

    #[test]
    fn concurrent_claims_are_unique() {
        let registry = ThreadRegistry::new(64);
        let mut ids: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..64).map(|_| s.spawn(|| registry.claim().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        ids.sort_unstable();
        assert_eq!(ids, (0..64).collect::<Vec<_>>());
    }
}
