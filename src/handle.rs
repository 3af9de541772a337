//! Owned queue instances with a process-unique identity
//!
//! A [`QueueHandle`] is what the rest of a program passes around: it owns one
//! backend instance, reports which backend it wraps, and destroys the queue
//! (dropping any items still inside) when it goes away. Sessions borrow the
//! handle, so the borrow checker guarantees no operation is in flight when
//! [`QueueHandle::destroy`] runs.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::AtomicU64;

use log::debug;

use crate::backend::Backend;
use crate::common::{ordering, QueueBackend};
use crate::config::QueueSettings;
use crate::error::QueueError;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Identifies one live queue instance; never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        InstanceId(NEXT_INSTANCE.fetch_add(1, ordering::X))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An owned, created queue of backend `Q`
pub struct QueueHandle<Q: QueueBackend> {
    id: InstanceId,
    queue: Box<Q>,
}

impl<Q: QueueBackend> QueueHandle<Q> {
    /// Creates an empty queue from its backend-specific config
    pub fn create(config: Q::Config) -> Result<Self, QueueError> {
        let queue = Box::new(Q::create(config)?);
        let id = InstanceId::next();
        debug!("created {} queue {} ({:?})", Q::BACKEND, id, queue.capacity());
        Ok(Self { id, queue })
    }

    /// Creates an empty queue, taking whichever knobs `Q` understands
    pub fn with_settings(settings: QueueSettings) -> Result<Self, QueueError> {
        Self::create(Q::Config::from(settings))
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn backend(&self) -> Backend {
        Q::BACKEND
    }

    /// Drops the queue and every item still in it
    pub fn destroy(self) {
        drop(self);
    }
}

impl<Q: QueueBackend> Deref for QueueHandle<Q> {
    type Target = Q;

    fn deref(&self) -> &Q {
        &self.queue
    }
}

impl<Q: QueueBackend> Drop for QueueHandle<Q> {
    fn drop(&mut self) {
        debug!("destroying {} queue {}", Q::BACKEND, self.id);
    }
}

impl<Q: QueueBackend> fmt::Debug for QueueHandle<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("id", &self.id)
            .field("backend", &Q::BACKEND)
            .field("capacity", &self.queue.capacity())
            .finish()
    }
}
