// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A bounded, lock-free multi-producer multi-consumer ring buffer (Vyukov's
//! queue: each cell carries its own sequence number, so producers and consumers never
//! need to agree on anything beyond a single fetch-and-increment of their own position).
//!
//! The queue never blocks and never allocates after construction. `push_back` and `pop`
//! report failure by return value; under contention between enqueue and dequeue the
//! queue is lock-free (some thread always makes progress), and under no contention it's
//! wait-free.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Cell<T> {
    sequence: AtomicUsize,
    data: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded MPMC ring buffer with a capacity fixed at construction.
///
/// `T` must be `Send` to move safely between the threads that push and the threads
/// that pop; the queue never produces more than one reference to an item at a time, so
/// an `UnsafeCell` per cell is sufficient without any locking.
pub struct BoundedQueue<T> {
    buffer: Box<[Cell<T>]>,
    mask: usize,
    // Separate cache lines: under contention, producers hammer `enqueue_pos` and
    // consumers hammer `dequeue_pos`; sharing a line would serialize the two groups
    // against each other for no reason.
    enqueue_pos: CachePadded<AtomicUsize>,
    dequeue_pos: CachePadded<AtomicUsize>,
}

// Safety: every cell is accessed by at most one thread at a time (the thread that won
// the CAS on the corresponding position), so `T: Send` is sufficient; the queue itself
// contributes no additional aliasing.
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Builds a queue with room for exactly `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a power of two; callers that want a
    /// recoverable error should validate with `capacity.is_power_of_two()` first (this
    /// is what [`crate::config::ExecutorConfig::validate`] does).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "BoundedQueue capacity must be a non-zero power of two, got {capacity}"
        );

        let buffer = (0..capacity)
            .map(|i| Cell {
                sequence: AtomicUsize::new(i),
                data: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer,
            mask: capacity - 1,
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// The fixed capacity this queue was constructed with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Attempts to enqueue `item`. Returns `Err(item)` if the queue is full; never
    /// blocks.
    pub fn push_back(&self, item: T) -> Result<(), T> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);

        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;

            match diff.cmp(&0) {
                std::cmp::Ordering::Equal => {
                    if self
                        .enqueue_pos
                        .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        // Safety: we won the CAS claiming slot `pos`; the sequence
                        // number proves no other producer or consumer touches this
                        // cell's data until we publish the release store below.
                        unsafe {
                            (*cell.data.get()).write(item);
                        }
                        cell.sequence.store(pos + 1, Ordering::Release);
                        return Ok(());
                    }
                }
                std::cmp::Ordering::Less => return Err(item),
                std::cmp::Ordering::Greater => pos = self.enqueue_pos.load(Ordering::Relaxed),
            }
        }
    }

    /// Attempts to dequeue the oldest item. Returns `None` if the queue is empty.
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);

        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as isize - (pos as isize + 1);

            match diff.cmp(&0) {
                std::cmp::Ordering::Equal => {
                    if self
                        .dequeue_pos
                        .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        // Safety: we won the CAS claiming slot `pos`; the producer that
                        // wrote it release-stored the sequence we just acquire-loaded,
                        // so its write happens-before this read.
                        let item = unsafe { (*cell.data.get()).assume_init_read() };
                        cell.sequence.store(pos + self.mask + 1, Ordering::Release);
                        return Some(item);
                    }
                }
                std::cmp::Ordering::Less => return None,
                std::cmp::Ordering::Greater => pos = self.dequeue_pos.load(Ordering::Relaxed),
            }
        }
    }

    /// `true` if the queue had no items at the moment of the check. Observational
    /// only: the result may be stale by the time the caller acts on it.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.approximate_len() == 0
    }

    /// An approximate item count, computed from the enqueue/dequeue positions.
    /// Observational only, like [`Self::is_empty`].
    #[must_use]
    pub fn approximate_len(&self) -> usize {
        let enq = self.enqueue_pos.load(Ordering::Relaxed);
        let deq = self.dequeue_pos.load(Ordering::Relaxed);
        enq.saturating_sub(deq)
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        // Drop any items still sitting between `dequeue_pos` and `enqueue_pos`.
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_producer_fifo() {
        let q = BoundedQueue::new(16);
        for i in 0..16 {
            q.push_back(i).unwrap();
        }
        for i in 0..16 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn bounded_capacity_invariant() {
        let q = BoundedQueue::new(4);
        for i in 0..4 {
            q.push_back(i).unwrap();
        }
        assert_eq!(q.push_back(99), Err(99));
        assert_eq!(q.pop(), Some(0));
        q.push_back(4).unwrap();
        assert_eq!(q.push_back(5), Err(5));
    }

    #[test]
    fn stress_no_loss_no_duplicates() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 50_000;

        let q = Arc::new(BoundedQueue::new(1024));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let item = p * PER_PRODUCER + i;
                        while q.push_back(item).is_err() {
                            std::hint::spin_loop();
                        }
                    }
                })
            })
            .collect();

        let popped = Arc::new(std::sync::Mutex::new(Vec::with_capacity(
            PRODUCERS * PER_PRODUCER,
        )));
        let remaining = Arc::new(AtomicUsize::new(PRODUCERS * PER_PRODUCER));

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let q = Arc::clone(&q);
                let popped = Arc::clone(&popped);
                let remaining = Arc::clone(&remaining);
                thread::spawn(move || {
                    let mut local = Vec::new();
                    loop {
                        if let Some(item) = q.pop() {
                            local.push(item);
                            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                break;
                            }
                        } else if remaining.load(Ordering::Acquire) == 0 {
                            break;
                        } else {
                            std::hint::spin_loop();
                        }
                    }
                    popped.lock().unwrap().extend(local);
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }

        let popped = popped.lock().unwrap();
        assert_eq!(popped.len(), PRODUCERS * PER_PRODUCER);
        let unique: HashSet<_> = popped.iter().copied().collect();
        assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER, "no duplicates");
    }

    #[test]
    fn per_producer_order_preserved() {
        let q = Arc::new(BoundedQueue::new(1024));
        const PRODUCERS: usize = 3;
        const COUNT: usize = 2000;

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..COUNT {
                        let tagged = p * COUNT + i;
                        while q.push_back(tagged).is_err() {
                            std::hint::spin_loop();
                        }
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut last_seen = vec![None; PRODUCERS];
        while let Some(item) = q.pop() {
            let producer = item / COUNT;
            let seq = item % COUNT;
            if let Some(last) = last_seen[producer] {
                assert!(seq > last, "producer {producer} subsequence out of order");
            }
            last_seen[producer] = Some(seq);
        }
    }
}
