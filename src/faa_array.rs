//! FAAArrayQueue: linked array nodes indexed by fetch-and-add
//!
//! Each node has `ring_size` slots and its own enqueue/dequeue counters. An
//! enqueuer takes a slot index with fetch-and-add and CASes its item into
//! the slot; a dequeuer takes an index and swaps `TAKEN` in, which also
//! shuts out an enqueuer that has not written yet. When a node's enqueue
//! index runs past the end, the next enqueuer appends a node holding its
//! item in slot 0. Drained nodes are unlinked by dequeuers and retired
//! through hazard pointers.

use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize};

use crossbeam_utils::CachePadded;
use log::{debug, trace};

use crate::backend::Backend;
use crate::common::{ordering, Capacity, IdentityIndexedQueue, QueueBackend};
use crate::config::ThreadIndexedConfig;
use crate::error::QueueError;
use crate::hazard::HazardDomain;
use crate::payload::{self, EMPTY};
use crate::thread_slots::{ThreadRegistry, ThreadSession};

/// Left in a slot by a dequeuer; odd, so never an item
const TAKEN: usize = 1;

struct Node {
    enqueue_index: CachePadded<AtomicUsize>,
    dequeue_index: CachePadded<AtomicUsize>,
    next: CachePadded<AtomicPtr<Node>>,
    slots: Box<[AtomicUsize]>,
}

impl Node {
    fn new(size: usize, first: usize) -> Self {
        let slots: Box<[AtomicUsize]> = (0..size)
            .map(|i| AtomicUsize::new(if i == 0 { first } else { EMPTY }))
            .collect();
        Self {
            enqueue_index: CachePadded::new(AtomicUsize::new(if first == EMPTY { 0 } else { 1 })),
            dequeue_index: CachePadded::new(AtomicUsize::new(0)),
            next: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            slots,
        }
    }
}

/// Unbounded thread-indexed queue of fetch-and-add array nodes
pub struct FaaArrayQueue<T> {
    head: CachePadded<AtomicPtr<Node>>,
    tail: CachePadded<AtomicPtr<Node>>,
    hazards: HazardDomain<Node>,
    threads: ThreadRegistry,
    node_size: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for FaaArrayQueue<T> {}
unsafe impl<T: Send> Sync for FaaArrayQueue<T> {}

impl<T> FaaArrayQueue<T> {
    pub fn new(config: ThreadIndexedConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let first = Box::into_raw(Box::new(Node::new(config.ring_size, EMPTY)));
        Ok(Self {
            head: CachePadded::new(AtomicPtr::new(first)),
            tail: CachePadded::new(AtomicPtr::new(first)),
            hazards: HazardDomain::new(config.max_threads),
            threads: ThreadRegistry::new(config.max_threads),
            node_size: config.ring_size,
            _marker: PhantomData,
        })
    }

    /// Slots per node
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    unsafe fn enqueue(&self, word: usize, tid: usize) {
        loop {
            let tail_ptr = self.hazards.protect(&self.tail, tid);
            let tail = &*tail_ptr;

            let idx = tail.enqueue_index.fetch_add(1, ordering::SC);
            if idx >= self.node_size {
                if tail_ptr != self.tail.load(ordering::SC) {
                    continue;
                }
                let next = tail.next.load(ordering::SC);
                if next.is_null() {
                    let fresh = Box::into_raw(Box::new(Node::new(self.node_size, word)));
                    if tail
                        .next
                        .compare_exchange(ptr::null_mut(), fresh, ordering::SC, ordering::SC)
                        .is_ok()
                    {
                        let _ = self.tail.compare_exchange(tail_ptr, fresh, ordering::SC, ordering::SC);
                        debug!("faa_array: appended a node of {} slots", self.node_size);
                        return;
                    }
                    drop(Box::from_raw(fresh));
                } else {
                    let _ = self.tail.compare_exchange(tail_ptr, next, ordering::SC, ordering::SC);
                }
                continue;
            }

            if tail.slots[idx]
                .compare_exchange(EMPTY, word, ordering::SC, ordering::SC)
                .is_ok()
            {
                return;
            }
        }
    }

    unsafe fn dequeue(&self, tid: usize) -> Option<usize> {
        loop {
            let head_ptr = self.hazards.protect(&self.head, tid);
            let head = &*head_ptr;

            if head.dequeue_index.load(ordering::SC) >= head.enqueue_index.load(ordering::SC)
                && head.next.load(ordering::SC).is_null()
            {
                return None;
            }

            let idx = head.dequeue_index.fetch_add(1, ordering::SC);
            if idx >= self.node_size {
                let next = head.next.load(ordering::SC);
                if next.is_null() {
                    return None;
                }
                let _ = self.tail.compare_exchange(head_ptr, next, ordering::SC, ordering::SC);
                if self
                    .head
                    .compare_exchange(head_ptr, next, ordering::SC, ordering::SC)
                    .is_ok()
                {
                    self.hazards.clear(tid);
                    self.hazards.retire(head_ptr, tid);
                    trace!("faa_array: retired a drained node");
                }
                continue;
            }

            let word = head.slots[idx].swap(TAKEN, ordering::SC);
            if word == EMPTY {
                // beat the enqueuer to this slot; it will retry elsewhere
                continue;
            }
            return Some(word);
        }
    }
}

impl<T> Drop for FaaArrayQueue<T> {
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();
        while !node.is_null() {
            let current = unsafe { Box::from_raw(node) };
            for slot in current.slots.iter() {
                let word = slot.load(ordering::X);
                if payload::is_item(word) {
                    unsafe { payload::drop_word::<T>(word) };
                }
            }
            node = current.next.load(ordering::X);
        }
    }
}

impl<T: Send> QueueBackend for FaaArrayQueue<T> {
    type Item = T;
    type Config = ThreadIndexedConfig;
    type Session<'q> = ThreadSession<'q, Self> where Self: 'q;

    const BACKEND: Backend = Backend::FaaArray;

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

impl<T: Send> IdentityIndexedQueue for FaaArrayQueue<T> {
    fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    unsafe fn push_as(&self, item: T, tid: usize) -> Result<(), T> {
        self.threads.check(tid);
        self.enqueue(payload::into_word(item), tid);
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
