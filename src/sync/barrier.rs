// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A one-shot async barrier: `set()` records one arrival, and once `parties` arrivals
//! have been recorded every awaiter currently suspended in `.wait()` resumes. `set()`
//! and `.wait()` are independent calls — a party can arrive without ever awaiting, and
//! an awaiter can enlist before or after any given arrival.

use parking_lot::Mutex as SyncMutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct WakeSlot {
    waker: SyncMutex<Option<Waker>>,
}

/// A rendezvous point for a fixed number of arrivals. Once the count is reached the
/// barrier stays open permanently — this is a one-shot latch, not a cyclic barrier:
/// a `.wait()` called after the count is already reached resolves immediately.
pub struct AsyncBarrier {
    parties: usize,
    arrivals: AtomicUsize,
    awaiters: SyncMutex<Vec<Arc<WakeSlot>>>,
}

impl AsyncBarrier {
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "AsyncBarrier requires at least one party");
        Self {
            parties,
            arrivals: AtomicUsize::new(0),
            awaiters: SyncMutex::new(Vec::new()),
        }
    }

    /// Records one arrival. Once the `parties`-th arrival is recorded, every awaiter
    /// currently suspended in [`Self::wait`] resumes.
    pub fn set(&self) {
        let count = self.arrivals.fetch_add(1, Ordering::AcqRel) + 1;
        if count >= self.parties {
            let waiters = std::mem::take(&mut *self.awaiters.lock());
            for slot in waiters {
                if let Some(waker) = slot.waker.lock().take() {
                    waker.wake();
                }
            }
        }
    }

    /// Returns an awaitable that resolves once `parties` arrivals have been recorded
    /// via [`Self::set`]. If that has already happened, resolves immediately.
    #[must_use]
    pub fn wait(&self) -> Wait<'_> {
        Wait { barrier: self, slot: None }
    }

    fn is_open(&self) -> bool {
        self.arrivals.load(Ordering::Acquire) >= self.parties
    }
}

/// The awaitable returned by [`AsyncBarrier::wait`].
pub struct Wait<'a> {
    barrier: &'a AsyncBarrier,
    slot: Option<Arc<WakeSlot>>,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if this.barrier.is_open() {
            return Poll::Ready(());
        }

        // Lock before the second check so it's ordered against `set`'s drain: either
        // our push below lands before `set` takes the list (and we get woken), or
        // `set`'s `fetch_add` already landed and this re-check sees it.
        let mut awaiters = this.barrier.awaiters.lock();
        if this.barrier.is_open() {
            return Poll::Ready(());
        }

        match &this.slot {
            Some(slot) => *slot.waker.lock() = Some(cx.waker().clone()),
            None => {
                let slot = Arc::new(WakeSlot {
                    waker: SyncMutex::new(Some(cx.waker().clone())),
                });
                awaiters.push(Arc::clone(&slot));
                this.slot = Some(slot);
            }
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, LocalPool};
    use crate::ExecutorConfig;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn waiters_resume_once_every_party_has_arrived() {
        const PARTIES: usize = 6;
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(4).queue_capacity(256));
        let barrier = Arc::new(AsyncBarrier::new(PARTIES));
        let resumed = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..PARTIES)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let resumed = Arc::clone(&resumed);
                exec.run(async move {
                    barrier.set();
                    barrier.wait().await;
                    resumed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for t in tasks {
            t.sync_wait();
        }
        assert_eq!(resumed.load(Ordering::SeqCst), PARTIES);
    }

    #[test]
    fn set_can_be_called_independently_of_wait() {
        let barrier = Arc::new(AsyncBarrier::new(2));
        barrier.set();
        barrier.set();
        assert!(barrier.is_open());
    }

    #[test]
    fn wait_resolves_immediately_once_already_open() {
        let barrier = AsyncBarrier::new(1);
        barrier.set();

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(barrier.wait());
        assert!(fut.as_mut().poll(&mut cx).is_ready());
    }

    fn noop_waker() -> Waker {
        use std::task::{RawWaker, RawWakerVTable};
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        // Safety: every function in `VTABLE` is a correctly-typed no-op; the data
        // pointer is never dereferenced.
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }
}
