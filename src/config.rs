//! Construction parameters for each backend family
//!
//! Bounded backends take a capacity, thread-indexed backends take
//! `max_threads` (and a ring size), the unbounded backend takes nothing.
//! [`QueueSettings`] carries all of them at once so generic code can build
//! whichever backend it was instantiated with.

use crate::arch::is_ring_size;
use crate::error::QueueError;

/// Default capacity of the bounded ring
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default number of cells per CRQ/PRQ ring and slots per FAA node
pub const DEFAULT_RING_SIZE: usize = 1024;

/// Smallest default thread-slot count, whatever the machine
const MIN_DEFAULT_THREADS: usize = 16;

fn default_max_threads() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cpus * 2).max(MIN_DEFAULT_THREADS)
}

/// Configuration of [`BoundedRing`](crate::BoundedRing)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedConfig {
    pub capacity: usize,
}

impl BoundedConfig {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for BoundedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Configuration of [`SegmentQueue`](crate::SegmentQueue); there is nothing to set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnboundedConfig;

/// Configuration shared by the thread-indexed backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadIndexedConfig {
    /// Upper bound (exclusive) of the thread ids the queue accepts
    pub max_threads: usize,
    /// Cells per ring (LCRQ/LPRQ) or slots per node (FAAArrayQueue)
    pub ring_size: usize,
}

impl ThreadIndexedConfig {
    pub fn new(max_threads: usize) -> Self {
        Self { max_threads, ring_size: DEFAULT_RING_SIZE }
    }

    pub fn ring_size(mut self, ring_size: usize) -> Self {
        self.ring_size = ring_size;
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_threads == 0 {
            return Err(QueueError::ZeroThreads);
        }
        if !is_ring_size(self.ring_size) {
            return Err(QueueError::InvalidRingSize(self.ring_size));
        }
        Ok(())
    }
}

impl Default for ThreadIndexedConfig {
    fn default() -> Self {
        Self::new(default_max_threads())
    }
}

/// Every knob of every backend, for code that picks the backend generically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub capacity: usize,
    pub max_threads: usize,
    pub ring_size: usize,
}

impl QueueSettings {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn ring_size(mut self, ring_size: usize) -> Self {
        self.ring_size = ring_size;
        self
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_threads: default_max_threads(),
            ring_size: DEFAULT_RING_SIZE,
        }
    }
}

impl From<QueueSettings> for BoundedConfig {
    fn from(settings: QueueSettings) -> Self {
        Self::new(settings.capacity)
    }
}

impl From<QueueSettings> for UnboundedConfig {
    fn from(_: QueueSettings) -> Self {
        UnboundedConfig
    }
}

impl From<QueueSettings> for ThreadIndexedConfig {
    fn from(settings: QueueSettings) -> Self {
        Self::new(settings.max_threads).ring_size(settings.ring_size)
    }
}
