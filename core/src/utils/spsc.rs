//! Wait-free single-producer/single-consumer ring.
//!
//! The ring is the hand-off point between the capture thread and the worker.
//! One slot is reserved so that `head == tail` means empty and
//! `next(head) == tail` means full. `try_push` and `try_pop` never block;
//! back-pressure is handled by the caller (the capture callback spins with
//! short sleeps).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Creates a ring that can hold up to `capacity` elements and returns the
/// producer and consumer endpoints. The endpoints are `Send` but not `Clone`,
/// which pins the ring to exactly one producer and one consumer thread.
pub fn ring<T: Send>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    let shared = Arc::new(RingShared::new(capacity));
    (
        RingProducer {
            shared: Arc::clone(&shared),
        },
        RingConsumer { shared },
    )
}

struct RingShared<T> {
    /// `capacity + 1` slots; the extra slot disambiguates full from empty.
    storage: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Next slot the producer writes. Owned by the producer, read by the
    /// consumer with acquire ordering.
    head: AtomicUsize,
    /// Next slot the consumer reads. Owned by the consumer, read by the
    /// producer with acquire ordering.
    tail: AtomicUsize,
}

unsafe impl<T: Send> Send for RingShared<T> {}
unsafe impl<T: Send> Sync for RingShared<T> {}

impl<T> RingShared<T> {
    fn new(capacity: usize) -> Self {
        let storage = (0..capacity + 1)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        RingShared {
            storage,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn next(&self, index: usize) -> usize {
        (index + 1) % self.storage.len()
    }
}

impl<T> Drop for RingShared<T> {
    fn drop(&mut self) {
        // Both endpoints are gone, so plain loads are fine here.
        let mut tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        while tail != head {
            unsafe { (*self.storage[tail].get()).assume_init_drop() };
            tail = self.next(tail);
        }
    }
}

/// Producer endpoint of the ring.
pub struct RingProducer<T> {
    shared: Arc<RingShared<T>>,
}

impl<T: Send> RingProducer<T> {
    /// Attempts to enqueue `value`. Returns it back if the ring is full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let next = shared.next(head);
        if next == shared.tail.load(Ordering::Acquire) {
            return Err(value);
        }
        unsafe { (*shared.storage[head].get()).write(value) };
        shared.head.store(next, Ordering::Release);
        Ok(())
    }
}

/// Consumer endpoint of the ring.
pub struct RingConsumer<T> {
    shared: Arc<RingShared<T>>,
}

impl<T: Send> RingConsumer<T> {
    /// Attempts to dequeue the oldest element.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        if tail == shared.head.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { (*shared.storage[tail].get()).assume_init_read() };
        shared.tail.store(shared.next(tail), Ordering::Release);
        Some(value)
    }

    /// `true` if no elements are currently queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let shared = &*self.shared;
        shared.tail.load(Ordering::Acquire) == shared.head.load(Ordering::Acquire)
    }
}
