//! The uniform operation contract
//!
//! Every backend implements [`QueueBackend`] (create, capacity, sessions)
//! plus exactly one of the two capability traits:
//!
//! * [`IdentityFreeQueue`]: any thread may push or pop with no further
//!   ceremony (bounded ring, segment queue).
//! * [`IdentityIndexedQueue`]: every operation names the calling thread's
//!   slot in `[0, max_threads)` (LCRQ, LPRQ, FAAArrayQueue).
//!
//! Code that wants to treat all five alike goes through [`Session`]s, which
//! is what the stress harness and the benches do.

use crate::arch::spin_loop_pause;
use crate::backend::Backend;
use crate::config::QueueSettings;
use crate::error::QueueError;
use crate::thread_slots::ThreadSession;
use crate::thread_slots::ThreadRegistry;

/// Memory ordering constants for atomic operations
///
/// Short aliases for the standard library's orderings.
pub mod ordering {
    pub use std::sync::atomic::Ordering::AcqRel as AR;
    pub use std::sync::atomic::Ordering::Acquire as A;
    pub use std::sync::atomic::Ordering::Relaxed as X;
    pub use std::sync::atomic::Ordering::Release as R;
    pub use std::sync::atomic::Ordering::SeqCst as SC;
}

/// Whether a queue can reject pushes for lack of room
///
/// This is part of the contract callers must branch on: a bounded queue
/// hands items back when full, an unbounded one never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Bounded(usize),
    Unbounded,
}

impl Capacity {
    pub fn is_bounded(&self) -> bool {
        matches!(self, Capacity::Bounded(_))
    }

    /// The bound, if there is one
    pub fn limit(&self) -> Option<usize> {
        match *self {
            Capacity::Bounded(n) => Some(n),
            Capacity::Unbounded => None,
        }
    }
}

/// A per-thread view of a queue that hides whether the backend needs a
/// thread identity
pub trait Session {
    type Item;

    /// Attempts to enqueue `item`; hands it back if the queue is full
    fn push(&mut self, item: Self::Item) -> Result<(), Self::Item>;

    /// Attempts to dequeue one item; `None` when the queue is empty
    fn pop(&mut self) -> Option<Self::Item>;
}

/// Caller-side busy-waiting on top of any [`Session`]
///
/// The backends never retry a full push or an empty pop themselves; this
/// is where a caller opts into doing so.
pub trait SpinningSession: Session {
    /// Pushes an element, busy-waiting while the queue is full
    fn push_spin(&mut self, item: Self::Item) {
        let mut item = item;
        loop {
            match self.push(item) {
                Ok(()) => return,
                Err(rejected) => {
                    item = rejected;
                    spin_loop_pause();
                }
            }
        }
    }

    /// Pops an element, busy-waiting while the queue is empty
    fn pop_spin(&mut self) -> Self::Item {
        loop {
            if let Some(item) = self.pop() {
                return item;
            }
            spin_loop_pause();
        }
    }

    /// Pops an element, giving up after `attempts` empty pops
    fn pop_within(&mut self, attempts: usize) -> Option<Self::Item> {
        for _ in 0..attempts {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            spin_loop_pause();
        }
        None
    }
}

impl<S: Session + ?Sized> SpinningSession for S {}

/// Construction and identity shared by all backends
pub trait QueueBackend: Sized + Send + Sync {
    /// Payload type transported by the queue
    type Item: Send;

    /// Backend-specific creation parameters
    type Config: From<QueueSettings>;

    /// Per-thread access object handed out by [`session`](Self::session)
    type Session<'q>: Session<Item = Self::Item> + Send
    where
        Self: 'q;

    /// Which of the five backends this is
    const BACKEND: Backend;

    /// Creates an empty queue
    ///
    /// Fails only on an invalid config; allocation failure aborts.
    fn create(config: Self::Config) -> Result<Self, QueueError>;

    /// Bounded or unbounded, fixed at creation
    fn capacity(&self) -> Capacity;

    /// Opens a session for the calling thread
    ///
    /// Identity-free backends always succeed. Thread-indexed backends claim
    /// a free thread slot and fail once all `max_threads` are taken.
    fn session(&self) -> Result<Self::Session<'_>, QueueError>;
}

/// Backends callable from any thread without a thread identity
pub trait IdentityFreeQueue: QueueBackend {
    /// Attempts to enqueue `item`; `Err(item)` means full (bounded only)
    fn try_push(&self, item: Self::Item) -> Result<(), Self::Item>;

    /// Attempts to dequeue one item; `None` means empty
    fn try_pop(&self) -> Option<Self::Item>;
}

/// Backends whose operations are indexed by a caller-supplied thread id
///
/// The safe entry points are [`register`](Self::register) and
/// [`register_as`](Self::register_as), which hand out a [`ThreadSession`]
/// owning one id until it is dropped. The raw `push_as`/`pop_as` exist for
/// callers that manage ids themselves.
pub trait IdentityIndexedQueue: QueueBackend {
    /// The slot table the ids index into
    fn threads(&self) -> &ThreadRegistry;

    /// Exclusive upper bound of accepted thread ids
    fn max_threads(&self) -> usize {
        self.threads().max_threads()
    }

    /// Enqueues `item` as thread `tid`
    ///
    /// Unbounded: always returns `Ok`.
    ///
    /// # Panics
    ///
    /// Panics if `tid >= max_threads()`.
    ///
    /// # Safety
    ///
    /// No other thread may be running an operation on this queue with the
    /// same `tid` for as long as this call lasts. Two live threads sharing an
    /// id corrupt the per-thread reclamation state.
    unsafe fn push_as(&self, item: Self::Item, tid: usize) -> Result<(), Self::Item>;

    /// Dequeues one item as thread `tid`
    ///
    /// # Panics
    ///
    /// Panics if `tid >= max_threads()`.
    ///
    /// # Safety
    ///
    /// Same obligation as [`push_as`](Self::push_as).
    unsafe fn pop_as(&self, tid: usize) -> Option<Self::Item>;

    /// Claims the lowest free thread id
    fn register(&self) -> Result<ThreadSession<'_, Self>, QueueError> {
        ThreadSession::claim(self)
    }

    /// Claims a specific thread id
    fn register_as(&self, tid: usize) -> Result<ThreadSession<'_, Self>, QueueError> {
        ThreadSession::claim_as(self, tid)
    }
}

/// [`Session`] over an identity-free backend: just a shared reference
pub struct SharedSession<'q, Q> {
    queue: &'q Q,
}

impl<'q, Q: IdentityFreeQueue> SharedSession<'q, Q> {
    pub fn new(queue: &'q Q) -> Self {
        Self { queue }
    }
}

impl<Q: IdentityFreeQueue> Session for SharedSession<'_, Q> {
    type Item = Q::Item;

    #[inline]
    fn push(&mut self, item: Q::Item) -> Result<(), Q::Item> {
        self.queue.try_push(item)
    }

    #[inline]
    fn pop(&mut self) -> Option<Q::Item> {
        self.queue.try_pop()
    }
}
