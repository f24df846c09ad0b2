// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A FIFO-fair async mutex: `.lock().await` suspends the calling task rather than the
//! OS thread, and waiters are granted the lock in the order they first polled.

use parking_lot::Mutex as SyncMutex;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct WaiterSlot {
    granted: AtomicBool,
    waker: SyncMutex<Option<Waker>>,
}

struct State {
    locked: bool,
    waiters: VecDeque<Arc<WaiterSlot>>,
}

/// A mutex whose `lock().await` suspends the awaiting task instead of blocking a
/// thread, handing the lock to waiters in strict first-asked-first-served order.
pub struct AsyncMutex<T> {
    data: UnsafeCell<T>,
    state: SyncMutex<State>,
}

// Safety: `data` is only ever reachable through a `MutexGuard`, and `state` ensures at
// most one `MutexGuard` exists at a time.
unsafe impl<T: Send> Send for AsyncMutex<T> {}
unsafe impl<T: Send> Sync for AsyncMutex<T> {}

impl<T> AsyncMutex<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            data: UnsafeCell::new(value),
            state: SyncMutex::new(State {
                locked: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Returns an awaitable that resolves to a [`MutexGuard`] once this task reaches
    /// the front of the line.
    pub fn lock(&self) -> Lock<'_, T> {
        Lock { mutex: self, slot: None }
    }

    /// Locks by polling to completion on the current thread, without an executor.
    /// Only correct to call from a context where nothing else needs to make progress
    /// concurrently (tests, or a single-threaded caller that already owns the lock's
    /// only other contender's completion).
    #[must_use]
    pub fn blocking_lock(&self) -> MutexGuard<'_, T> {
        crate::task::block_on_immediate(self.lock())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        if let Some(next) = state.waiters.pop_front() {
            next.granted.store(true, Ordering::Release);
            let waker = next.waker.lock().take();
            drop(state);
            if let Some(waker) = waker {
                waker.wake();
            }
        } else {
            state.locked = false;
        }
    }
}

/// The awaitable returned by [`AsyncMutex::lock`].
pub struct Lock<'a, T> {
    mutex: &'a AsyncMutex<T>,
    slot: Option<Arc<WaiterSlot>>,
}

impl<'a, T> Future for Lock<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.mutex.state.lock();

        if let Some(slot) = &self.slot {
            if slot.granted.load(Ordering::Acquire) {
                return Poll::Ready(MutexGuard { mutex: self.mutex });
            }
            *slot.waker.lock() = Some(cx.waker().clone());
            return Poll::Pending;
        }

        if !state.locked && state.waiters.is_empty() {
            state.locked = true;
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        let slot = Arc::new(WaiterSlot {
            granted: AtomicBool::new(false),
            waker: SyncMutex::new(Some(cx.waker().clone())),
        });
        state.waiters.push_back(Arc::clone(&slot));
        self.slot = Some(slot);
        Poll::Pending
    }
}

impl<'a, T> Drop for Lock<'a, T> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        // A queued waiter that's dropped before its turn must be excised, or the
        // mutex could hand the lock to a slot nobody will ever turn into a guard and
        // deadlock forever. This is a correctness requirement specific to the mutex,
        // not the crate's general drop-abandons-the-primitive policy.
        let mut state = self.mutex.state.lock();
        if slot.granted.load(Ordering::Acquire) {
            // Granted but abandoned between grant and the next poll: pass it on.
            if let Some(next) = state.waiters.pop_front() {
                next.granted.store(true, Ordering::Release);
                let waker = next.waker.lock().take();
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
            } else {
                state.locked = false;
            }
        } else {
            state.waiters.retain(|s| !Arc::ptr_eq(s, &slot));
        }
    }
}

/// RAII access to an [`AsyncMutex`]'s data; releases the lock (and wakes the next
/// waiter, if any) on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a AsyncMutex<T>,
}

impl<T> std::ops::Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: holding a `MutexGuard` proves exclusive access.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> std::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: see `Deref`.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, LocalPool};
    use crate::ExecutorConfig;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn grants_lock_in_arrival_order() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(1).queue_capacity(64));
        let mutex = Arc::new(AsyncMutex::new(()));
        let order = Arc::new(StdMutex::new(Vec::new()));

        // Hold the lock first, from this thread directly, so the next three all queue
        // up behind it in the order spawned.
        let first_guard = mutex.blocking_lock();

        let mut tasks = Vec::new();
        for i in 0..3 {
            let mutex = Arc::clone(&mutex);
            let order = Arc::clone(&order);
            tasks.push(exec.run(async move {
                let _g = mutex.lock().await;
                order.lock().unwrap().push(i);
            }));
            // Give each spawn a chance to register its waiter before the next, so
            // "arrival order" is well defined for this test.
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        drop(first_guard);
        for t in tasks {
            t.sync_wait();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(4).queue_capacity(256));
        let mutex = Arc::new(AsyncMutex::new(0usize));
        let mut tasks = Vec::new();
        for _ in 0..200 {
            let mutex = Arc::clone(&mutex);
            tasks.push(exec.run(async move {
                let mut guard = mutex.lock().await;
                let seen = *guard;
                *guard = seen + 1;
            }));
        }
        for t in tasks {
            t.sync_wait();
        }
        assert_eq!(exec.run(async move { *mutex.lock().await }).sync_wait(), 200);
    }

    #[test]
    fn dropped_waiter_does_not_deadlock_the_mutex() {
        let mutex = AsyncMutex::new(());
        let held = mutex.blocking_lock();

        let mut pending = Box::pin(mutex.lock());
        let waker = futures_noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(pending.as_mut().poll(&mut cx).is_pending());
        drop(pending); // abandon while queued

        drop(held); // releases; must not hand off to the dropped waiter and hang
        let next = mutex.blocking_lock();
        drop(next);
    }

    fn futures_noop_waker() -> Waker {
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
