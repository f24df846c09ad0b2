// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Awaitable task handles: [`Task`] (begins running as soon as it's created) and
//! [`LazyTask`] (sits idle until first polled or explicitly [`LazyTask::force`]d).
//!
//! Neither type is parameterized over its driving executor: a task's body is advanced
//! through a type-erased reschedule hook captured at spawn time (see `Driver` below),
//! so `Task<T>` is always just `Task<T>` regardless of which of
//! [`crate::executor::InlineExecutor`], [`crate::executor::SingleThread`],
//! [`crate::executor::GlobalPool`] or [`crate::executor::LocalPool`] is driving it —
//! the same type erasure `core::task::Waker` itself uses.
//!
//! Flattening an inner awaitable (a callable that itself returns a `Task`/`LazyTask`)
//! falls out of this for free: `Task`/`LazyTask` implement `Future`, so a body that
//! wants to hand off to another task just writes `inner.await` — there is no separate
//! flattening step to implement.

mod shared_state;

use crate::callable::SmallCallable;
use shared_state::SharedState;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::time::{Duration, Instant};

/// A reschedule hook: given a ready-to-run unit of work, hand it to whichever executor
/// is driving this task. Captured once at spawn time so `Task`/`LazyTask` stay
/// executor-agnostic.
pub(crate) type Reschedule = Arc<dyn Fn(SmallCallable) + Send + Sync>;

/// Drives a single future to completion, one poll at a time, by rescheduling itself
/// onto its owning executor whenever it's woken.
struct Driver<F: Future> {
    future: Mutex<Option<Pin<Box<F>>>>,
    shared: Arc<SharedState<F::Output>>,
    reschedule: Reschedule,
    started: AtomicBool,
}

impl<F> Driver<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    /// Builds the driver and its shared state, returning both plus a `Starter` that
    /// kicks off the first poll the first time it's called (idempotent after that).
    fn new(future: F, reschedule: Reschedule) -> (Arc<SharedState<F::Output>>, Starter) {
        let shared = Arc::new(SharedState::new());
        let driver = Arc::new(Driver {
            future: Mutex::new(Some(Box::pin(future))),
            shared: Arc::clone(&shared),
            reschedule,
            started: AtomicBool::new(false),
        });
        let starter: Starter = Arc::new(move || driver.start_once());
        (shared, starter)
    }

    fn start_once(self: &Arc<Self>) {
        if !self.started.swap(true, Ordering::AcqRel) {
            self.reschedule_self();
        }
    }

    fn reschedule_self(self: &Arc<Self>) {
        let driver = Arc::clone(self);
        (driver.reschedule.clone())(SmallCallable::new(move || driver.poll_once()));
    }

    fn poll_once(self: Arc<Self>) {
        let mut guard = self.future.lock().unwrap_or_else(|p| p.into_inner());
        let Some(fut) = guard.as_mut() else {
            // Already completed (or being torn down by a racing wake); nothing to do.
            return;
        };

        let waker: Waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx)));
        match outcome {
            Ok(Poll::Ready(value)) => {
                *guard = None;
                drop(guard);
                self.shared.complete_value(value);
            }
            Ok(Poll::Pending) => {
                // The future is responsible for arranging its own future `wake()`
                // call (typically by stashing `cx.waker()` in whatever it awaited).
            }
            Err(payload) => {
                *guard = None;
                drop(guard);
                self.shared.complete_panic(payload);
            }
        }
    }
}

impl<F> Wake for Driver<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn wake(self: Arc<Self>) {
        self.reschedule_self();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.reschedule_self();
    }
}

struct ThreadWaker(std::thread::Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Polls `future` to completion on the calling thread, parking between polls instead
/// of busy-spinning. Used by the synchronous primitive wrappers (`AsyncMutex::blocking_lock`
/// and friends) that need to drive a single awaitable without a full executor.
pub(crate) fn block_on_immediate<F: Future>(future: F) -> F::Output {
    let waker = Waker::from(Arc::new(ThreadWaker(std::thread::current())));
    let mut cx = Context::from_waker(&waker);
    let mut future = Box::pin(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => return value,
            Poll::Pending => std::thread::park(),
        }
    }
}

/// Triggers a task body's first poll, exactly once, no matter how many times it's
/// called. `LazyTask` holds one of these and invokes it from every `poll`/`force`;
/// `Task` invokes it once, synchronously, at spawn time.
type Starter = Arc<dyn Fn() + Send + Sync>;

/// An eagerly-started, single-result asynchronous computation.
///
/// Created by [`crate::executor::Executor::run`]; begins executing immediately — its
/// first poll is queued before this handle is ever awaited. Dropping a `Task` before
/// it completes abandons it: the body keeps running to completion on its executor, but
/// the result is discarded once the last reference to its shared state goes away.
pub struct Task<T> {
    shared: Arc<SharedState<T>>,
}

impl<T: Send + 'static> Task<T> {
    pub(crate) fn spawn<F>(future: F, reschedule: Reschedule) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (shared, start) = Driver::new(future, reschedule);
        start();
        Self { shared }
    }

    /// `true` if the result is already available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// Blocks the calling thread until the result is ready, then returns it. The
    /// calling thread must not be the (only) worker driving this task's executor, or
    /// this deadlocks — exactly as blocking synchronously inside an async body would.
    ///
    /// # Panics
    ///
    /// Re-panics with the task body's own payload if the body panicked.
    #[must_use]
    pub fn sync_wait(self) -> T {
        self.shared.spin_wait()
    }

    /// Like [`Self::sync_wait`], but gives up after `timeout` and hands `self` back so
    /// the caller can retry or drop it (dropping abandons the still-running task).
    pub fn sync_wait_for(self, timeout: Duration) -> Result<T, Self> {
        self.sync_wait_until(Instant::now() + timeout)
    }

    /// Like [`Self::sync_wait_for`], but with an absolute deadline.
    pub fn sync_wait_until(self, deadline: Instant) -> Result<T, Self> {
        match self.shared.spin_wait_until(deadline) {
            Some(value) => Ok(value),
            None => Err(self),
        }
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.shared.poll_take(cx)
    }
}

impl<T: Send + 'static> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("ready", &self.is_ready()).finish()
    }
}

/// A deferred, single-result asynchronous computation: the body does not begin
/// executing until this handle is first awaited or explicitly [`Self::force`]d.
///
/// Created by [`crate::executor::Executor::lazy_run`]. A `LazyTask` dropped before
/// being forced never runs its body at all — matching "a lazy task with no awaiter is
/// simply destroyed, with no side effects."
pub struct LazyTask<T> {
    shared: Arc<SharedState<T>>,
    start: Starter,
}

impl<T: Send + 'static> LazyTask<T> {
    pub(crate) fn spawn<F>(future: F, reschedule: Reschedule) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (shared, start) = Driver::new(future, reschedule);
        Self { shared, start }
    }

    /// `true` if the result is already available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.is_ready()
    }

    /// Schedules this task's first poll if it hasn't started yet; idempotent.
    /// Awaiting a `LazyTask` calls this implicitly, so most callers never need it
    /// directly — it exists for "start this in the background but don't await it yet."
    pub fn force(&self) {
        (self.start)();
    }

    /// [`Self::force`]s the task, then blocks the calling thread until it completes.
    ///
    /// # Panics
    ///
    /// Re-panics with the task body's own payload if the body panicked.
    #[must_use]
    pub fn sync_wait(self) -> T {
        self.force();
        self.shared.spin_wait()
    }

    /// Like [`Self::sync_wait`], but gives up after `timeout`.
    pub fn sync_wait_for(self, timeout: Duration) -> Result<T, Self> {
        self.sync_wait_until(Instant::now() + timeout)
    }

    /// Like [`Self::sync_wait_for`], but with an absolute deadline.
    pub fn sync_wait_until(self, deadline: Instant) -> Result<T, Self> {
        self.force();
        match self.shared.spin_wait_until(deadline) {
            Some(value) => Ok(value),
            None => Err(self),
        }
    }
}

impl<T: Send + 'static> Future for LazyTask<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        self.force();
        self.shared.poll_take(cx)
    }
}

impl<T: Send + 'static> std::fmt::Debug for LazyTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTask").field("ready", &self.is_ready()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// A reschedule hook that runs work inline, synchronously, on whichever thread
    /// calls it — enough to drive a task to completion without a real executor.
    fn inline_reschedule() -> Reschedule {
        Arc::new(|callable: SmallCallable| callable.invoke())
    }

    #[test]
    fn eager_task_has_already_started_before_first_poll() {
        let started = Arc::new(AtomicBool::new(false));
        let s = Arc::clone(&started);
        let task = Task::spawn(
            async move {
                s.store(true, Ordering::SeqCst);
                42
            },
            inline_reschedule(),
        );
        // The inline reschedule hook ran synchronously inside `spawn`, so by the time
        // we get a `Task` back the body has already executed to completion.
        assert!(started.load(Ordering::SeqCst));
        assert_eq!(task.sync_wait(), 42);
    }

    #[test]
    fn lazy_task_does_not_start_until_forced() {
        let started = Arc::new(AtomicBool::new(false));
        let s = Arc::clone(&started);
        let task = LazyTask::spawn(
            async move {
                s.store(true, Ordering::SeqCst);
                7
            },
            inline_reschedule(),
        );
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(task.sync_wait(), 7);
        assert!(started.load(Ordering::SeqCst));
    }

    #[test]
    fn lazy_task_dropped_unforced_never_runs_body() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let task = LazyTask::spawn(
            async move {
                r.fetch_add(1, Ordering::SeqCst);
            },
            inline_reschedule(),
        );
        drop(task);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn panicking_body_propagates_through_sync_wait() {
        let task: Task<()> = Task::spawn(
            async { panic!("boom") },
            inline_reschedule(),
        );
        task.sync_wait();
    }

    #[test]
    fn task_await_flattens_inner_task() {
        // `inner.await` inside the outer body is the whole story: no special
        // flattening machinery needed beyond `Future` composition.
        let reschedule = inline_reschedule();
        let r2 = Reschedule::clone(&reschedule);
        let outer = Task::spawn(
            async move {
                let inner = Task::spawn(async { 5 }, r2);
                inner.await + 1
            },
            reschedule,
        );
        assert_eq!(outer.sync_wait(), 6);
    }
}
