//! Names and static properties of the five backends
//!
//! Selecting a backend by name happens once, at construction: parse a
//! [`Backend`], then `match` on it into code generic over the concrete queue
//! type. A live queue never changes backend.

use std::fmt;
use std::str::FromStr;

use crate::bounded::BoundedRing;
use crate::common::QueueBackend;
use crate::config::QueueSettings;
use crate::error::QueueError;
use crate::faa_array::FaaArrayQueue;
use crate::handle::QueueHandle;
use crate::lcrq::Lcrq;
use crate::lprq::Lprq;
use crate::segment::SegmentQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Fixed-capacity lock-free ring
    BoundedRing,
    /// Unbounded segment-chained lock-free queue
    SegmentQueue,
    /// Linked concurrent ring queues with double-width CAS cells
    Lcrq,
    /// Linked PRQ rings, single-width CAS with per-thread reservation tokens
    Lprq,
    /// Linked fetch-and-add array nodes
    FaaArray,
}

impl Backend {
    pub const ALL: [Backend; 5] = [
        Backend::BoundedRing,
        Backend::SegmentQueue,
        Backend::Lcrq,
        Backend::Lprq,
        Backend::FaaArray,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Backend::BoundedRing => "bounded_ring",
            Backend::SegmentQueue => "segment_queue",
            Backend::Lcrq => "lcrq",
            Backend::Lprq => "lprq",
            Backend::FaaArray => "faa_array",
        }
    }

    /// Whether operations must carry a thread id
    pub const fn requires_thread_id(self) -> bool {
        matches!(self, Backend::Lcrq | Backend::Lprq | Backend::FaaArray)
    }

    /// Whether pushes can be rejected for lack of room
    pub const fn is_bounded(self) -> bool {
        matches!(self, Backend::BoundedRing)
    }

    /// Creates a queue of this backend and hands it to `visitor`
    ///
    /// This is the single place where a runtime backend choice turns into a
    /// concrete queue type.
    pub fn open<T, V>(self, settings: QueueSettings, visitor: V) -> Result<V::Output, QueueError>
    where
        T: Send,
        V: BackendVisitor<T>,
    {
        Ok(match self {
            Backend::BoundedRing => visitor.visit(QueueHandle::<BoundedRing<T>>::with_settings(settings)?),
            Backend::SegmentQueue => visitor.visit(QueueHandle::<SegmentQueue<T>>::with_settings(settings)?),
            Backend::Lcrq => visitor.visit(QueueHandle::<Lcrq<T>>::with_settings(settings)?),
            Backend::Lprq => visitor.visit(QueueHandle::<Lprq<T>>::with_settings(settings)?),
            Backend::FaaArray => visitor.visit(QueueHandle::<FaaArrayQueue<T>>::with_settings(settings)?),
        })
    }
}

/// Code that runs against whichever queue type [`Backend::open`] picked
pub trait BackendVisitor<T: Send> {
    type Output;

    fn visit<Q: QueueBackend<Item = T>>(self, queue: QueueHandle<Q>) -> Self::Output;
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Backend::ALL
            .into_iter()
            .find(|b| b.name() == wanted)
            .ok_or_else(|| QueueError::UnknownBackend(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>(), Ok(backend));
        }
        assert_eq!("FAA-Array".parse::<Backend>(), Ok(Backend::FaaArray));
        assert_eq!(
            "boost".parse::<Backend>(),
            Err(QueueError::UnknownBackend("boost".to_string()))
        );
    }

    struct Describe;

    impl BackendVisitor<u32> for Describe {
        type Output = (Backend, bool);

        fn visit<Q: QueueBackend<Item = u32>>(self, queue: QueueHandle<Q>) -> (Backend, bool) {
            (queue.backend(), queue.capacity().is_bounded())
        }
    }

    #[test]
    fn open_builds_the_named_backend() {
        let settings = QueueSettings::default().max_threads(4);
        for backend in Backend::ALL {
            let (opened, bounded) = backend.open(settings, Describe).unwrap();
            assert_eq!(opened, backend);
            assert_eq!(bounded, backend.is_bounded());
        }
        let err = Backend::Lcrq.open(settings.max_threads(0), Describe).unwrap_err();
        assert_eq!(err, QueueError::ZeroThreads);
    }

    #[test]
    fn capability_flags() {
        let indexed: Vec<_> = Backend::ALL.into_iter().filter(|b| b.requires_thread_id()).collect();
        assert_eq!(indexed, vec![Backend::Lcrq, Backend::Lprq, Backend::FaaArray]);
        let bounded: Vec<_> = Backend::ALL.into_iter().filter(|b| b.is_bounded()).collect();
        assert_eq!(bounded, vec![Backend::BoundedRing]);
    }
}
