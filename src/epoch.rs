//! Epoch-based reclamation indexed by thread id
//!
//! A global epoch counter plus one announcement per thread id. An operation
//! pins itself by announcing the epoch it observed; the epoch advances only
//! when every pinned thread has caught up with it. A node retired during
//! epoch `e` is freed once the global epoch reaches `e + 2`, at which point
//! no pinned thread can still hold a reference obtained before the unlink.

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU64;

use crossbeam_utils::CachePadded;
use log::trace;

use crate::common::ordering;

/// Announcement of a thread outside any operation
const QUIESCENT: u64 = u64::MAX;

/// Retired nodes held per thread before trying to collect
const COLLECT_THRESHOLD: usize = 4;

pub(crate) struct EpochDomain<N> {
    global: CachePadded<AtomicU64>,
    announced: Box<[CachePadded<AtomicU64>]>,
    limbo: Box<[CachePadded<UnsafeCell<Vec<(u64, *mut N)>>>]>,
}

// Safety: `limbo[tid]` is only touched by the exclusive holder of `tid`.
unsafe impl<N: Send> Send for EpochDomain<N> {}
unsafe impl<N: Send> Sync for EpochDomain<N> {}

/// Keeps thread `tid` pinned until dropped
pub(crate) struct EpochGuard<'d, N> {
    domain: &'d EpochDomain<N>,
    tid: usize,
}

impl<N> Drop for EpochGuard<'_, N> {
    fn drop(&mut self) {
        self.domain.announced[self.tid].store(QUIESCENT, ordering::SC);
    }
}

impl<N> EpochDomain<N> {
    pub(crate) fn new(max_threads: usize) -> Self {
        Self {
            global: CachePadded::new(AtomicU64::new(0)),
            announced: (0..max_threads)
                .map(|_| CachePadded::new(AtomicU64::new(QUIESCENT)))
                .collect(),
            limbo: (0..max_threads)
                .map(|_| CachePadded::new(UnsafeCell::new(Vec::new())))
                .collect(),
        }
    }

    /// Announces the current epoch for `tid`
    pub(crate) fn pin(&self, tid: usize) -> EpochGuard<'_, N> {
        let slot = &self.announced[tid];
        let mut epoch = self.global.load(ordering::SC);
        loop {
            slot.store(epoch, ordering::SC);
            let now = self.global.load(ordering::SC);
            if now == epoch {
                break;
            }
            epoch = now;
        }
        EpochGuard { domain: self, tid }
    }

    /// Defers freeing `node` until no pinned thread can reach it
    ///
    /// # Safety
    ///
    /// `node` must come from `Box::into_raw`, already be unlinked from the
    /// queue, and be retired once. The caller must hold `tid` exclusively.
    pub(crate) unsafe fn retire(&self, node: *mut N, tid: usize) {
        let epoch = self.global.load(ordering::SC);
        let limbo = &mut *self.limbo[tid].get();
        limbo.push((epoch, node));
        if limbo.len() >= COLLECT_THRESHOLD {
            let now = self.try_advance();
            Self::collect(limbo, now);
        }
    }

    /// Bumps the global epoch if every pinned thread has observed it
    fn try_advance(&self) -> u64 {
        let epoch = self.global.load(ordering::SC);
        for slot in self.announced.iter() {
            let seen = slot.load(ordering::SC);
            if seen != QUIESCENT && seen != epoch {
                return epoch;
            }
        }
        match self.global.compare_exchange(epoch, epoch + 1, ordering::SC, ordering::SC) {
            Ok(_) => {
                trace!("epoch advanced to {}", epoch + 1);
                epoch + 1
            }
            Err(current) => current,
        }
    }

    unsafe fn collect(limbo: &mut Vec<(u64, *mut N)>, now: u64) {
        limbo.retain(|&(retired, node)| {
            if retired + 2 <= now {
                drop(Box::from_raw(node));
                false
            } else {
                true
            }
        });
    }

    #[cfg(test)]
    fn pending(&self, tid: usize) -> usize {
        unsafe { (*self.limbo[tid].get()).len() }
    }
}

impl<N> Drop for EpochDomain<N> {
    fn drop(&mut self) {
        for limbo in self.limbo.iter_mut() {
            for (_, node) in limbo.get_mut().drain(..) {
                unsafe { drop(Box::from_raw(node)) };
            }
        }
    }
}
