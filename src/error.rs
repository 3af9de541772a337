//! Errors raised by queue construction, thread registration and stress checks
//!
//! A full push or an empty pop is never a `QueueError`: those come back as
//! `Err(item)` and `None`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("bounded queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("max_threads must be at least 1")]
    ZeroThreads,

    #[error("ring size {0} is not a power of two >= 2")]
    InvalidRingSize(usize),

    #[error("thread id {tid} is outside [0, {max_threads})")]
    ThreadIdOutOfRange { tid: usize, max_threads: usize },

    #[error("thread id {tid} is already registered")]
    ThreadIdInUse { tid: usize },

    #[error("all {max_threads} thread slots are registered")]
    ThreadsExhausted { max_threads: usize },

    #[error("unknown backend `{0}`")]
    UnknownBackend(String),

    #[error("item {tag:#x} was delivered more than once")]
    DuplicateItem { tag: u64 },

    #[error("expected {expected} items, received {received}")]
    MissingItems { expected: usize, received: usize },

    #[error("a stress worker panicked")]
    WorkerPanicked,

    #[error("{items} items per thread exceeds the tag limit of {max}")]
    TooManyItems { items: u64, max: u64 },

    #[error("push/pop spread must lie in [0, 1]")]
    SpreadOutOfRange,

    #[error("queue refused prefill after {accepted} items")]
    PrefillRejected { accepted: u64 },
}
