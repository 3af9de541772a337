//! Fixed-capacity lock-free ring
//!
//! Every slot carries a stamp that says which lap of the ring it belongs to
//! and whether it is full. A producer claims position `tail` by CAS-ing the
//! tail forward, writes the value, then publishes it by bumping the slot's
//! stamp; a consumer does the mirror image on `head`. Capacity is exact: a
//! ring created with capacity 3 holds exactly 3 items.
//!
//! Positions pack `(lap, index)` into one word: `index` lives in the low
//! bits, below `one_lap`, the smallest power of two strictly greater than
//! the capacity.

use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{self as atomic, AtomicUsize};

use crossbeam_utils::{Backoff, CachePadded};

use crate::arch::round_up_to_power_of_2;
use crate::backend::Backend;
use crate::common::{ordering, Capacity, IdentityFreeQueue, QueueBackend, SharedSession};
use crate::config::BoundedConfig;
use crate::error::QueueError;

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded MPMC queue of arbitrary `T`
pub struct BoundedRing<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,

    /// `capacity` cache-padded slots
    slots: *mut CachePadded<Slot<T>>,

    capacity: usize,
    one_lap: usize,

    _marker: PhantomData<Box<[CachePadded<Slot<T>>]>>,
}

// Safety: slots are handed between threads only through the stamp protocol,
// which transfers ownership of the value along with the release/acquire pair.
unsafe impl<T: Send> Send for BoundedRing<T> {}
unsafe impl<T: Send> Sync for BoundedRing<T> {}

fn slots_layout<T>(capacity: usize) -> Layout {
    match Layout::array::<CachePadded<Slot<T>>>(capacity) {
        Ok(layout) => layout,
        Err(_) => panic!("bounded ring capacity {} overflows the address space", capacity),
    }
}

impl<T> BoundedRing<T> {
    /// Creates an empty ring holding at most `capacity` items
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        let config = BoundedConfig::new(capacity);
        config.validate()?;

        let one_lap = round_up_to_power_of_2(capacity + 1);
        let layout = slots_layout::<T>(capacity);
        let slots = unsafe {
            let ptr = alloc::alloc(layout) as *mut CachePadded<Slot<T>>;
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            // slot i starts out empty on lap 0
            for i in 0..capacity {
                ptr::write(
                    ptr.add(i),
                    CachePadded::new(Slot {
                        stamp: AtomicUsize::new(i),
                        value: UnsafeCell::new(MaybeUninit::uninit()),
                    }),
                );
            }
            ptr
        };

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots,
            capacity,
            one_lap,
            _marker: PhantomData,
        })
    }

    #[inline(always)]
    fn slot(&self, index: usize) -> &Slot<T> {
        debug_assert!(index < self.capacity);
        unsafe { &*self.slots.add(index) }
    }

    /// Position that follows `pos`, wrapping onto the next lap
    #[inline(always)]
    fn advance(&self, pos: usize) -> usize {
        let index = pos & (self.one_lap - 1);
        let lap = pos & !(self.one_lap - 1);
        if index + 1 < self.capacity {
            pos + 1
        } else {
            lap.wrapping_add(self.one_lap)
        }
    }

    /// Attempts to enqueue `value`; hands it back if the ring is full
    pub fn push(&self, value: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(ordering::X);

        loop {
            let index = tail & (self.one_lap - 1);
            let slot = self.slot(index);
            let stamp = slot.stamp.load(ordering::A);

            if tail == stamp {
                // the slot is empty on our lap: try to claim it
                let next = self.advance(tail);
                match self.tail.compare_exchange_weak(tail, next, ordering::SC, ordering::X) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.stamp.store(tail + 1, ordering::R);
                        return Ok(());
                    }
                    Err(current) => {
                        tail = current;
                        backoff.spin();
                    }
                }
            } else if stamp.wrapping_add(self.one_lap) == tail + 1 {
                // the slot still holds last lap's value: full unless head moved
                atomic::fence(ordering::SC);
                let head = self.head.load(ordering::X);
                if head.wrapping_add(self.one_lap) == tail {
                    return Err(value);
                }
                backoff.spin();
                tail = self.tail.load(ordering::X);
            } else {
                // a producer of this lap has claimed but not yet published
                backoff.snooze();
                tail = self.tail.load(ordering::X);
            }
        }
    }

    /// Attempts to dequeue the oldest item; `None` if the ring is empty
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.load(ordering::X);

        loop {
            let index = head & (self.one_lap - 1);
            let slot = self.slot(index);
            let stamp = slot.stamp.load(ordering::A);

            if head + 1 == stamp {
                let next = self.advance(head);
                match self.head.compare_exchange_weak(head, next, ordering::SC, ordering::X) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp.store(head.wrapping_add(self.one_lap), ordering::R);
                        return Some(value);
                    }
                    Err(current) => {
                        head = current;
                        backoff.spin();
                    }
                }
            } else if stamp == head {
                atomic::fence(ordering::SC);
                let tail = self.tail.load(ordering::X);
                if tail == head {
                    return None;
                }
                backoff.spin();
                head = self.head.load(ordering::X);
            } else {
                backoff.snooze();
                head = self.head.load(ordering::X);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items, as of some instant during the call
    pub fn len(&self) -> usize {
        loop {
            let tail = self.tail.load(ordering::SC);
            let head = self.head.load(ordering::SC);
            if self.tail.load(ordering::SC) == tail {
                return self.distance(head, tail);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let head = self.head.load(ordering::SC);
        let tail = self.tail.load(ordering::SC);
        tail == head
    }

    pub fn is_full(&self) -> bool {
        let tail = self.tail.load(ordering::SC);
        let head = self.head.load(ordering::SC);
        head.wrapping_add(self.one_lap) == tail
    }

    fn distance(&self, head: usize, tail: usize) -> usize {
        let hix = head & (self.one_lap - 1);
        let tix = tail & (self.one_lap - 1);
        if hix < tix {
            tix - hix
        } else if hix > tix {
            self.capacity - hix + tix
        } else if tail == head {
            0
        } else {
            self.capacity
        }
    }
}

impl<T> Drop for BoundedRing<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let len = self.distance(head, tail);
        let hix = head & (self.one_lap - 1);

        unsafe {
            for i in 0..len {
                let index = if hix + i < self.capacity { hix + i } else { hix + i - self.capacity };
                let slot = &mut *self.slots.add(index);
                slot.value.get_mut().assume_init_drop();
            }
            for i in 0..self.capacity {
                ptr::drop_in_place(self.slots.add(i));
            }
            alloc::dealloc(self.slots as *mut u8, slots_layout::<T>(self.capacity));
        }
    }
}

impl<T: Send> QueueBackend for BoundedRing<T> {
    type Item = T;
    type Config = BoundedConfig;
    type Session<'q> = SharedSession<'q, Self> where Self: 'q;

    const BACKEND: Backend = Backend::BoundedRing;

    fn create(config: BoundedConfig) -> Result<Self, QueueError> {
        Self::new(config.capacity)
    }

    fn capacity(&self) -> Capacity {
        Capacity::Bounded(self.capacity)
    }

    fn session(&self) -> Result<Self::Session<'_>, QueueError> {
        Ok(SharedSession::new(self))
    }
}

impl<T: Send> IdentityFreeQueue for BoundedRing<T> {
    #[inline]
    fn try_push(&self, item: T) -> Result<(), T> {
        self.push(item)
    }

    #[inline]
    fn try_pop(&self) -> Option<T> {
        self.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_bounded_ring_basic() {
        let q = BoundedRing::<String>::new(16).unwrap();

        assert!(q.push("hello".to_string()).is_ok());
        assert!(q.push("world".to_string()).is_ok());
        assert!(q.push("rust".to_string()).is_ok());

        assert_eq!(q.pop().unwrap(), "hello");
        assert_eq!(q.pop().unwrap(), "world");
        assert_eq!(q.pop().unwrap(), "rust");
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_capacity_is_exact() {
        let q = BoundedRing::<String>::new(3).unwrap();

        assert!(q.push("one".to_string()).is_ok());
        assert!(q.push("two".to_string()).is_ok());
        assert!(q.push("three".to_string()).is_ok());
        assert!(q.is_full());

        // the rejected item comes back untouched
        assert_eq!(q.push("four".to_string()), Err("four".to_string()));

        assert_eq!(q.pop().unwrap(), "one");
        assert!(q.push("four".to_string()).is_ok());

        assert_eq!(q.pop().unwrap(), "two");
        assert_eq!(q.pop().unwrap(), "three");
        assert_eq!(q.pop().unwrap(), "four");
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_capacity_one() {
        let q = BoundedRing::new(1).unwrap();
        for round in 0..10u32 {
            assert_eq!(q.push(round), Ok(()));
            assert_eq!(q.push(round + 100), Err(round + 100));
            assert_eq!(q.len(), 1);
            assert_eq!(q.pop(), Some(round));
            assert_eq!(q.pop(), None);
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(BoundedRing::<u8>::new(0), Err(QueueError::ZeroCapacity)));
    }

    #[test]
    fn test_len_across_laps() {
        let q = BoundedRing::new(5).unwrap();
        for i in 0..23 {
            q.push(i).unwrap();
            q.push(i).unwrap();
            assert_eq!(q.len(), 2);
            q.pop().unwrap();
            q.pop().unwrap();
            assert_eq!(q.len(), 0);
        }
    }

    struct Counted(Arc<std::sync::atomic::AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_releases_remaining_items() {
        let drops = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let q = BoundedRing::new(4).unwrap();
            // wrap once so the live range straddles the end of the buffer
            for _ in 0..3 {
                assert!(q.push(Counted(drops.clone())).is_ok());
            }
            drop(q.pop());
            drop(q.pop());
            for _ in 0..3 {
                assert!(q.push(Counted(drops.clone())).is_ok());
            }
            assert_eq!(drops.load(Ordering::SeqCst), 2);
            assert_eq!(q.len(), 4);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_concurrent_sum() {
        const PER_THREAD: u64 = 20_000;
        let q = Arc::new(BoundedRing::<u64>::new(64).unwrap());
        let popped = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut handles = Vec::new();
        for p in 0..4u64 {
            let q = q.clone();
            handles.push(thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let mut item = p * PER_THREAD + i;
                    while let Err(back) = q.push(item) {
                        item = back;
                        thread::yield_now();
                    }
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            let popped = popped.clone();
            consumers.push(thread::spawn(move || {
                let mut sum = 0u64;
                while popped.load(Ordering::Relaxed) < 4 * PER_THREAD {
                    match q.pop() {
                        Some(v) => {
                            sum += v;
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                        None => thread::yield_now(),
                    }
                }
                sum
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        let total: u64 = consumers.into_iter().map(|h| h.join().unwrap()).sum();
        let n = 4 * PER_THREAD;
        assert_eq!(total, n * (n - 1) / 2);
        assert!(q.is_empty());
    }
}
