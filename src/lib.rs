//! # queue_adapters
//!
//! One push/pop contract over five lock-free multiple-producer
//! multiple-consumer queues:
//!
//! | backend           | capacity  | thread id | reclamation      |
//! |-------------------|-----------|-----------|------------------|
//! | [`BoundedRing`]   | bounded   | no        | none needed      |
//! | [`SegmentQueue`]  | unbounded | no        | internal         |
//! | [`Lcrq`]          | unbounded | yes       | hazard pointers  |
//! | [`Lprq`]          | unbounded | yes       | epochs           |
//! | [`FaaArrayQueue`] | unbounded | yes       | hazard pointers  |
//!
//! A full push hands the item back as `Err(item)`, an empty pop returns
//! `None`; neither blocks nor retries. Thread-indexed backends are driven
//! through a [`ThreadSession`], which owns one thread id until dropped.
//!
//! ```
//! use queue_adapters::{IdentityIndexedQueue, Lcrq, Session, ThreadIndexedConfig};
//!
//! let queue = Lcrq::new(ThreadIndexedConfig::new(4)).unwrap();
//! let mut session = queue.register().unwrap();
//! session.push("hello").unwrap();
//! assert_eq!(session.pop(), Some("hello"));
//! assert_eq!(session.pop(), None);
//! ```

mod arch;
mod epoch;
mod hazard;
mod payload;

pub mod backend;
pub mod bounded;
pub mod common;
pub mod config;
pub mod error;
pub mod faa_array;
pub mod handle;
pub mod lcrq;
pub mod lprq;
pub mod segment;
pub mod stress;
pub mod thread_slots;

// Re-exports for convenience
pub use arch::spin_loop_pause;
pub use backend::{Backend, BackendVisitor};
pub use bounded::BoundedRing;
pub use common::{
    Capacity, IdentityFreeQueue, IdentityIndexedQueue, QueueBackend, Session, SharedSession,
    SpinningSession,
};
pub use config::{
    BoundedConfig, QueueSettings, ThreadIndexedConfig, UnboundedConfig, DEFAULT_CAPACITY,
    DEFAULT_RING_SIZE,
};
pub use error::QueueError;
pub use faa_array::FaaArrayQueue;
pub use handle::{InstanceId, QueueHandle};
pub use lcrq::Lcrq;
pub use lprq::Lprq;
pub use segment::SegmentQueue;
pub use thread_slots::{ThreadRegistry, ThreadSession};
