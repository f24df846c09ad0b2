// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The value-or-panic slot and continuation hook shared between a task's body and
//! whoever is awaiting it.

use parking_lot::Mutex;
use std::any::Any;
use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

enum Slot<T> {
    Empty,
    Value(T),
    Panic(Box<dyn Any + Send + 'static>),
}

/// The result-and-continuation cell backing [`super::Task`] and [`super::LazyTask`].
///
/// `claimed` is CAS'd exclusively by whichever completer wins the race to write
/// `slot`; `ready` is only flipped (with `Release`) *after* `slot` is written, and only
/// ever observed with `Acquire`, so a successful `poll_take` always sees the write that
/// made the state ready.
pub(crate) struct SharedState<T> {
    claimed: AtomicBool,
    ready: AtomicBool,
    slot: UnsafeCell<Slot<T>>,
    waker: Mutex<Option<Waker>>,
}

// Safety: `slot` is written at most once, by whichever thread wins the `claimed` CAS,
// strictly before `ready` is published; every other access is gated by `ready`'s
// Acquire load, so there is never more than one writer and readers only run after the
// write is visible.
unsafe impl<T: Send> Send for SharedState<T> {}
unsafe impl<T: Send> Sync for SharedState<T> {}

impl<T> SharedState<T> {
    pub(crate) fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            slot: UnsafeCell::new(Slot::Empty),
            waker: Mutex::new(None),
        }
    }

    #[must_use]
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Claims the right to complete this state, panicking if it was already claimed.
    /// This is the Rust realization of "double-completion is a programming error and
    /// aborts": `DoubleCompletion` never reaches application code as a `Result`.
    fn claim_or_panic(&self) {
        if self.claimed.swap(true, Ordering::AcqRel) {
            panic!("SharedState completed twice: a task's result was set more than once");
        }
    }

    fn publish(&self) {
        self.ready.store(true, Ordering::Release);
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }

    pub(crate) fn complete_value(&self, value: T) {
        self.claim_or_panic();
        // Safety: `claim_or_panic` proved we are the sole writer, and no reader can
        // observe `slot` until `publish` below makes `ready` true.
        unsafe {
            *self.slot.get() = Slot::Value(value);
        }
        self.publish();
    }

    pub(crate) fn complete_panic(&self, payload: Box<dyn Any + Send + 'static>) {
        self.claim_or_panic();
        // Safety: see `complete_value`.
        unsafe {
            *self.slot.get() = Slot::Panic(payload);
        }
        self.publish();
    }

    /// Runs `body`, completing this state with its return value or, if `body` panics,
    /// with the captured payload. Used by task drivers so a panicking task body never
    /// unwinds across the executor's poll loop.
    pub(crate) fn complete_with(&self, body: impl FnOnce() -> T) {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => self.complete_value(value),
            Err(payload) => self.complete_panic(payload),
        }
    }

    /// Polls for readiness, installing `cx`'s waker if not yet ready.
    ///
    /// Only one awaiter is ever expected to hold a [`super::Task`]/[`super::LazyTask`]
    /// at a time (they are move-only, single-consumer handles), so re-registering here
    /// on a spurious wake just refreshes the stored waker; it is not the "double
    /// install" the source's continuation-uniqueness invariant is about — that
    /// invariant is instead upheld structurally, by the borrow checker refusing to let
    /// two callers hold `&mut` access to the same handle at once.
    pub(crate) fn poll_take(&self, cx: &mut Context<'_>) -> Poll<T> {
        if self.is_ready() {
            return Poll::Ready(self.take());
        }

        *self.waker.lock() = Some(cx.waker().clone());

        // Re-check after installing: completion may have raced us between the first
        // check and the waker install, in which case `publish` already ran and found
        // no waker to wake — we must not suspend forever.
        if self.is_ready() {
            return Poll::Ready(self.take());
        }

        Poll::Pending
    }

    /// Busy-waits (yielding the thread between checks) until ready, then returns.
    pub(crate) fn spin_wait(&self) -> T {
        let mut spins = 0u32;
        while !self.is_ready() {
            if spins < 100 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
            spins = spins.saturating_add(1);
        }
        self.take()
    }

    /// Busy-waits until ready or `deadline`, returning `None` on timeout. On timeout,
    /// this state's slot is left untouched and a later `spin_wait`/`poll_take` will
    /// still observe the eventual result.
    pub(crate) fn spin_wait_until(&self, deadline: std::time::Instant) -> Option<T> {
        let mut spins = 0u32;
        while !self.is_ready() {
            if std::time::Instant::now() >= deadline {
                return None;
            }
            if spins < 100 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
            spins = spins.saturating_add(1);
        }
        Some(self.take())
    }

    fn take(&self) -> T {
        // Safety: `ready` was observed `true` with Acquire, which synchronizes-with
        // the Release store in `publish`, so the write to `slot` (which happened
        // before that Release) is visible here.
        let slot = unsafe { &mut *self.slot.get() };
        match std::mem::replace(slot, Slot::Empty) {
            Slot::Value(v) => v,
            Slot::Panic(payload) => panic::resume_unwind(payload),
            Slot::Empty => unreachable!("take() called on a SharedState that was never completed"),
        }
    }
}
