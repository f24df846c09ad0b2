// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The degenerate executor: runs everything synchronously on whichever thread calls
//! `dispatch`/`run`/`lazy_run`. Useful as a baseline for tests and for composition
//! primitives that don't need real parallelism.

use crate::callable::SmallCallable;
use crate::error::Error;
use crate::executor::Executor;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    stopped: AtomicBool,
}

/// Runs dispatched work immediately, inline, on the calling thread. Has no worker
/// threads of its own — [`Executor::thread_count`] reports `1`, counting the calling
/// thread itself, since that's the thread every dispatched task actually runs on. A
/// task spawned here that suspends (awaits something not yet ready) blocks the calling
/// thread at that await point until it's rescheduled, also inline.
#[derive(Clone)]
pub struct InlineExecutor {
    inner: Arc<Inner>,
}

impl InlineExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for InlineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for InlineExecutor {
    fn dispatch_raw(&self, callable: SmallCallable) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        callable.invoke();
        Ok(())
    }

    fn thread_count(&self) -> usize {
        1
    }

    fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "inline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_runs_before_returning() {
        let exec = InlineExecutor::new();
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        exec.dispatch(move || r.store(true, Ordering::SeqCst)).unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn run_completes_synchronously() {
        let exec = InlineExecutor::new();
        let task = exec.run(async { 1 + 1 });
        assert!(task.is_ready());
        assert_eq!(task.sync_wait(), 2);
    }

    #[test]
    fn shutdown_rejects_further_dispatch() {
        let exec = InlineExecutor::new();
        exec.shutdown();
        assert!(matches!(exec.dispatch(|| ()), Err(Error::ShuttingDown)));
        // Idempotent.
        exec.shutdown();
    }
}
