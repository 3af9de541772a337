//! Unbounded lock-free queue built from linked fixed-size segments
//!
//! Thin adapter over `crossbeam_queue::SegQueue`: segments are allocated as
//! the queue grows and freed once drained, so a push never reports full.

use crossbeam_queue::SegQueue;

use crate::backend::Backend;
use crate::common::{Capacity, IdentityFreeQueue, QueueBackend, SharedSession};
use crate::config::UnboundedConfig;
use crate::error::QueueError;

/// An unbounded MPMC queue usable from any thread
pub struct SegmentQueue<T> {
    inner: SegQueue<T>,
}

impl<T> SegmentQueue<T> {
    pub fn new() -> Self {
        Self { inner: SegQueue::new() }
    }

    /// Enqueues `value`; never fails
    #[inline]
    pub fn push(&self, value: T) {
        self.inner.push(value);
    }

    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T> Default for SegmentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> QueueBackend for SegmentQueue<T> {
    type Item = T;
    type Config = UnboundedConfig;
    type Session<'q> = SharedSession<'q, Self> where Self: 'q;

    const BACKEND: Backend = Backend::SegmentQueue;

    fn create(_config: UnboundedConfig) -> Result<Self, QueueError> {
        Ok(Self::new())
    }

    fn capacity(&self) -> Capacity {
        Capacity::Unbounded
    }

    fn session(&self) -> Result<Self::Session<'_>, QueueError> {
        Ok(SharedSession::new(self))
    }
}

impl<T: Send> IdentityFreeQueue for SegmentQueue<T> {
    #[inline]
    fn try_push(&self, item: T) -> Result<(), T> {
        self.inner.push(item);
        Ok(())
    }

    #[inline]
    fn try_pop(&self) -> Option<T> {
        self.inner.pop()
    }
}
