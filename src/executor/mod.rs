// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The [`Executor`] trait and its implementations.
//!
//! Every executor ultimately reduces to one primitive operation — `dispatch_raw`, hand
//! a type-erased unit of work to some worker — and the trait's default methods
//! (`run`, `lazy_run`, `resume_on`) build `Task`/`LazyTask`/a context-switch awaitable
//! on top of that. This mirrors the source's `executor` base class, which implements
//! `run`/`lazy_run`/`switch_awaitable` once in terms of a derived class's
//! `derived_execute`.

mod global_pool;
mod inline;
mod local_pool;
mod park;
mod single_thread;

pub use global_pool::GlobalPool;
pub use inline::InlineExecutor;
pub use local_pool::LocalPool;
pub use single_thread::SingleThread;

use crate::callable::SmallCallable;
use crate::sync::resume_on::ResumeOn;
use crate::task::{LazyTask, Reschedule, Task};
use crate::Result;
use std::future::Future;
use std::sync::Arc;

/// Something that can run work: a raw `FnOnce`, an awaitable `Future`, or another
/// executor's result (via `Future` composition — see [`crate::task`]'s module docs).
///
/// Implementors only need to provide `dispatch_raw`, `thread_count`, `shutdown` and
/// `name`; the rest follow from those four. `Clone` is required because a spawned
/// task's driver needs to hold its own independent handle back to the executor that's
/// driving it (see [`crate::task::Reschedule`]).
pub trait Executor: Clone + Send + Sync + 'static {
    /// Hands `callable` to a worker. Never blocks; returns
    /// [`crate::Error::QueueFull`] if the executor's backing queue is at capacity and
    /// [`crate::Error::ShuttingDown`] if [`Self::shutdown`] has already been called.
    fn dispatch_raw(&self, callable: SmallCallable) -> Result<()>;

    /// Like [`Self::dispatch_raw`], but biased to run before already-queued work where
    /// the implementation supports it (used to resume a just-woken continuation with
    /// lower latency). Executors that don't distinguish the two just forward here.
    fn dispatch_hot_raw(&self, callable: SmallCallable) -> Result<()> {
        self.dispatch_raw(callable)
    }

    /// Number of worker threads backing this executor. Always `>= 1`; for
    /// [`InlineExecutor`], which has no workers of its own, this counts the calling
    /// thread that every dispatched task actually runs on.
    fn thread_count(&self) -> usize;

    /// Signals every worker to stop after draining work already queued, without
    /// blocking for them to finish. Idempotent: calling this more than once is a no-op.
    fn shutdown(&self);

    /// A human-readable label used in `tracing` spans and panic messages.
    fn name(&self) -> &str;

    /// Dispatches a plain, non-awaitable unit of work.
    fn dispatch<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch_raw(SmallCallable::new(f))
    }

    fn reschedule_hook(&self) -> Reschedule {
        let executor = self.clone();
        Arc::new(move |callable: SmallCallable| {
            if let Err(err) = executor.dispatch_raw(callable) {
                tracing::warn!(executor = executor.name(), %err, "dropping a woken task: executor rejected resume");
            }
        })
    }

    /// Spawns `future`, returning a [`Task`] whose first poll is already queued.
    ///
    /// If the callable you want to run is a plain `FnOnce() -> T` rather than a
    /// `Future`, wrap it: `executor.run(async move { f() })`. If it's itself
    /// awaitable (another `Task`/`LazyTask`), write `executor.run(async move {
    /// inner.await })` — the flattening is just an `.await`, see [`crate::task`].
    fn run<F>(&self, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn(future, self.reschedule_hook())
    }

    /// Like [`Self::run`], but `future` does not begin executing until the returned
    /// [`LazyTask`] is first polled or [`LazyTask::force`]d.
    fn lazy_run<F>(&self, future: F) -> LazyTask<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        LazyTask::spawn(future, self.reschedule_hook())
    }

    /// An awaitable that, when polled, dispatches the continuation onto this executor
    /// and suspends — so the `.await` point after `resume_on` always resumes on one of
    /// this executor's workers, regardless of which thread drove the `await` up to
    /// that point. This is the source's context-hop (`switch_awaitable`) primitive.
    fn resume_on(&self) -> ResumeOn<Self> {
        ResumeOn::new(self.clone())
    }
}
