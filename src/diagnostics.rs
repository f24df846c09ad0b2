// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `tracing` glue and the optional `this_thread` worker-identity query.
//!
//! None of this is required for correctness; it exists purely so a worker thread can
//! report who it is in logs and panics. The identity is process-wide state scoped to
//! the lifetime of the worker thread it was set on, mirroring the "thread-local current
//! executor pointer" described as optional diagnostics in the design notes.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GLOBAL_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static CURRENT: Cell<Option<CurrentWorker>> = const { Cell::new(None) };
}

/// A snapshot of "which worker, on which executor, am I" for the calling thread.
#[derive(Copy, Clone, Debug)]
pub struct CurrentWorker {
    /// The name of the executor that owns this worker, interned as a `&'static str`
    /// (executors are long-lived, so leaking their name once is acceptable).
    pub executor_name: &'static str,
    /// This worker's index within its executor (`0..thread_count`).
    pub worker_index: usize,
    /// A monotonic id unique across every worker thread ever started in this process.
    pub global_id: u64,
}

/// Returns the identity of the worker thread currently executing, or `None` if the
/// calling thread is not a worker (for example, the thread that called `sync_wait`).
#[must_use]
pub fn current() -> Option<CurrentWorker> {
    CURRENT.with(|c| c.get())
}

/// Binds `CurrentWorker` diagnostics for the calling thread's lifetime. Called once by
/// each executor's worker bootstrap; not part of the public API because calling it
/// twice on one thread would just silently clobber the previous binding.
pub(crate) fn bind(executor_name: &'static str, worker_index: usize) -> CurrentWorker {
    let global_id = NEXT_GLOBAL_ID.fetch_add(1, Ordering::Relaxed);
    let worker = CurrentWorker {
        executor_name,
        worker_index,
        global_id,
    };
    CURRENT.with(|c| c.set(Some(worker)));
    tracing::trace!(executor = executor_name, worker_index, global_id, "worker bound");
    worker
}
