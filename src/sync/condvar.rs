// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An auto-reset async condition: a single latched flag, not coupled to any mutex.
//! `wait()` suspends until the flag is set, then clears it on its way out — so a
//! `set()` called with nobody currently waiting isn't lost, it's observed (and reset)
//! by whichever `wait()` comes next.

use parking_lot::Mutex as SyncMutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

struct WakeSlot {
    woken: AtomicBool,
    waker: SyncMutex<Option<Waker>>,
}

struct State {
    signaled: bool,
    waiters: VecDeque<Arc<WakeSlot>>,
}

/// A latched, auto-resetting condition, not paired with any mutex. `set()` always
/// resumes every awaiter enlisted in [`Self::wait`] at that moment; there is no
/// `notify_one`/`notify_all` distinction — a set that finds nobody waiting simply
/// leaves the flag for the next waiter to consume.
pub struct AsyncCondvar {
    state: SyncMutex<State>,
}

impl Default for AsyncCondvar {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncCondvar {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SyncMutex::new(State {
                signaled: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Returns an awaitable that resolves once the flag is set — either because it
    /// already is, or because a later [`Self::set`] resumes it. Resolving clears the
    /// flag.
    #[must_use]
    pub fn wait(&self) -> Wait<'_> {
        Wait { condvar: self, slot: None }
    }

    /// Sets the flag and resumes every awaiter currently enlisted in [`Self::wait`],
    /// exactly once each. If nobody is currently waiting, the flag stays set for the
    /// next [`Self::wait`] to observe and clear.
    pub fn set(&self) {
        let mut state = self.state.lock();
        state.signaled = true;
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);
        for slot in waiters {
            slot.woken.store(true, Ordering::Release);
            if let Some(waker) = slot.waker.lock().take() {
                waker.wake();
            }
        }
    }

    /// Clears the flag without waking anyone.
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }
}

/// The awaitable returned by [`AsyncCondvar::wait`].
pub struct Wait<'a> {
    condvar: &'a AsyncCondvar,
    slot: Option<Arc<WakeSlot>>,
}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            if slot.woken.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            *slot.waker.lock() = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let mut state = this.condvar.state.lock();
        if state.signaled {
            state.signaled = false;
            return Poll::Ready(());
        }

        let slot = Arc::new(WakeSlot {
            woken: AtomicBool::new(false),
            waker: SyncMutex::new(Some(cx.waker().clone())),
        });
        state.waiters.push_back(Arc::clone(&slot));
        this.slot = Some(slot);
        Poll::Pending
    }
}
