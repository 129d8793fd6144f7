//! Multi-producer/single-consumer intrusive queue.
//!
//! Producers exchange the head pointer and then publish the previous node's
//! `next` link; the single consumer chases `next` links from the tail. Pushes
//! are lock-free and never fail; `try_pop` returns immediately. Alerts from
//! all logical producers funnel through one of these queues to the sink
//! writer thread.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

/// Creates a queue and returns its endpoints. `Sender` is cheaply cloneable;
/// `Receiver` is unique, which enforces the single-consumer contract.
pub fn queue<T: Send>() -> (Sender<T>, Receiver<T>) {
    let stub = Box::into_raw(Box::new(Node {
        next: AtomicPtr::new(ptr::null_mut()),
        value: None,
    }));
    let shared = Arc::new(Shared {
        head: AtomicPtr::new(stub),
        tail: UnsafeCell::new(stub),
    });
    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    /// `None` only for the stub node.
    value: Option<T>,
}

struct Shared<T> {
    /// Most recently pushed node. Producers swap this.
    head: AtomicPtr<Node<T>>,
    /// Oldest node (initially the stub). Touched only by the consumer.
    tail: UnsafeCell<*mut Node<T>>,
}

unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Runs once both endpoints are gone, so the chain is quiescent.
        let mut cur = unsafe { *self.tail.get() };
        while !cur.is_null() {
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load(Ordering::Relaxed);
        }
    }
}

/// Producer endpoint.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send> Sender<T> {
    /// Enqueues `value`. Never blocks and never fails.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value: Some(value),
        }));
        let prev = self.shared.head.swap(node, Ordering::AcqRel);
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer endpoint.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send> Receiver<T> {
    /// Dequeues the oldest element, or returns `None` if the queue is
    /// currently empty.
    pub fn try_pop(&mut self) -> Option<T> {
        unsafe {
            let tail = *self.shared.tail.get();
            let next = (*tail).next.load(Ordering::Acquire);
            if next.is_null() {
                return None;
            }
            let value = (*next)
                .value
                .take()
                .expect("non-stub queue node holds a value");
            // The old tail (stub or already-consumed node) is retired here;
            // `next` becomes the new stub.
            drop(Box::from_raw(tail));
            *self.shared.tail.get() = next;
            Some(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn core_mpsc_fifo_single_producer() {
        let (tx, mut rx) = queue::<u32>();
        for i in 0..16 {
            tx.push(i);
        }
        for i in 0..16 {
            assert_eq!(rx.try_pop(), Some(i));
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn core_mpsc_many_producers_funnel() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 10_000;
        let (tx, mut rx) = queue::<u64>();
        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    tx.push(p * PER_PRODUCER + i);
                }
            }));
        }
        drop(tx);
        let mut seen = Vec::with_capacity((PRODUCERS * PER_PRODUCER) as usize);
        let mut last_per_producer = vec![None::<u64>; PRODUCERS as usize];
        while seen.len() < (PRODUCERS * PER_PRODUCER) as usize {
            if let Some(v) = rx.try_pop() {
                // Per-producer order must be preserved even when interleaved.
                let p = (v / PER_PRODUCER) as usize;
                if let Some(prev) = last_per_producer[p] {
                    assert!(v > prev);
                }
                last_per_producer[p] = Some(v);
                seen.push(v);
            } else {
                thread::yield_now();
            }
        }
        for handle in handles {
            handle.join().unwrap();
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);
    }

    #[test]
    fn core_mpsc_drops_unconsumed() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Probe;
        impl Drop for Probe {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }
        {
            let (tx, rx) = queue::<Probe>();
            tx.push(Probe);
            tx.push(Probe);
            tx.push(Probe);
            drop(tx);
            drop(rx);
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 3);
    }
}
