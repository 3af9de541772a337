//! Hazard pointers indexed by thread id
//!
//! One hazard slot and one retired list per thread id. A thread publishes the
//! node it is about to dereference in its slot; a retired node is freed only
//! once no slot names it. The retired list of `tid` is touched only by the
//! holder of `tid`, which is why the thread-indexed queues need ids at all.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::AtomicPtr;

use crossbeam_utils::CachePadded;
use log::trace;

use crate::common::ordering;

/// Retired nodes accumulated per thread before a scan
const SCAN_THRESHOLD: usize = 2;

pub(crate) struct HazardDomain<N> {
    hazards: Box<[CachePadded<AtomicPtr<N>>]>,
    retired: Box<[CachePadded<UnsafeCell<Vec<*mut N>>>]>,
}

// Safety: `retired[tid]` is only accessed by the exclusive holder of `tid`;
// everything else is atomic.
unsafe impl<N: Send> Send for HazardDomain<N> {}
unsafe impl<N: Send> Sync for HazardDomain<N> {}

impl<N> HazardDomain<N> {
    pub(crate) fn new(max_threads: usize) -> Self {
        Self {
            hazards: (0..max_threads)
                .map(|_| CachePadded::new(AtomicPtr::new(ptr::null_mut())))
                .collect(),
            retired: (0..max_threads)
                .map(|_| CachePadded::new(UnsafeCell::new(Vec::new())))
                .collect(),
        }
    }

    /// Loads `src` and publishes it as `tid`'s hazard, retrying until the
    /// published value is still current
    #[inline]
    pub(crate) fn protect(&self, src: &AtomicPtr<N>, tid: usize) -> *mut N {
        let hazard = &self.hazards[tid];
        let mut node = src.load(ordering::SC);
        loop {
            hazard.store(node, ordering::SC);
            let current = src.load(ordering::SC);
            if current == node {
                return node;
            }
            node = current;
        }
    }

    #[inline]
    pub(crate) fn clear(&self, tid: usize) {
        self.hazards[tid].store(ptr::null_mut(), ordering::R);
    }

    /// Hands an unlinked node over for deferred freeing
    ///
    /// # Safety
    ///
    /// `node` must come from `Box::into_raw`, be unreachable from the queue
    /// for any thread that protects afterwards, and be retired once. The
    /// caller must hold `tid` exclusively.
    pub(crate) unsafe fn retire(&self, node: *mut N, tid: usize) {
        let retired = &mut *self.retired[tid].get();
        retired.push(node);
        if retired.len() >= SCAN_THRESHOLD {
            self.scan(retired);
        }
    }

    unsafe fn scan(&self, retired: &mut Vec<*mut N>) {
        let protected: Vec<*mut N> = self
            .hazards
            .iter()
            .map(|h| h.load(ordering::SC))
            .filter(|p| !p.is_null())
            .collect();
        let before = retired.len();
        retired.retain(|&node| {
            if protected.contains(&node) {
                true
            } else {
                drop(Box::from_raw(node));
                false
            }
        });
        trace!("hazard scan freed {} of {} retired nodes", before - retired.len(), before);
    }

    #[cfg(test)]
    fn pending(&self, tid: usize) -> usize {
        unsafe { (*self.retired[tid].get()).len() }
    }
}

impl<N> Drop for HazardDomain<N> {
    fn drop(&mut self) {
        for list in self.retired.iter_mut() {
            for node in list.get_mut().drain(..) {
                unsafe { drop(Box::from_raw(node)) };
            }
        }
    }
}
