// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single dedicated worker thread draining a bounded queue.

use super::park::Parker;
use crate::callable::SmallCallable;
use crate::error::Error;
use crate::queue::BoundedQueue;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

struct Inner {
    queue: BoundedQueue<SmallCallable>,
    stopped: AtomicBool,
    parker: OnceLock<Parker>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// One dedicated background thread, fed by a single bounded queue.
#[derive(Clone)]
pub struct SingleThread {
    inner: Arc<Inner>,
}

impl SingleThread {
    /// Spawns the worker thread. `queue_capacity` must be a non-zero power of two.
    ///
    /// # Panics
    ///
    /// Panics if `queue_capacity` is not a non-zero power of two, or if the OS refuses
    /// to spawn the worker thread.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        let inner = Arc::new(Inner {
            queue: BoundedQueue::new(queue_capacity),
            stopped: AtomicBool::new(false),
            parker: OnceLock::new(),
            join: Mutex::new(None),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("weave-single".to_string())
            .spawn(move || worker_loop(&worker_inner))
            .expect("failed to spawn weave-single worker thread");

        *inner.join.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        Self { inner }
    }
}

fn worker_loop(inner: &Arc<Inner>) {
    let _worker = crate::diagnostics::bind("single-thread", 0);
    let parker = Parker::for_current();
    // Safe to set once: this is the only thread that ever calls `worker_loop`.
    let _ = inner.parker.set(parker);

    loop {
        if let Some(callable) = inner.queue.pop() {
            callable.invoke();
            continue;
        }
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        inner.parker.get().expect("parker set before first park").park();
    }
}

impl super::Executor for SingleThread {
    fn dispatch_raw(&self, callable: SmallCallable) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        self.inner
            .queue
            .push_back(callable)
            .map_err(|_| Error::QueueFull)?;
        if let Some(parker) = self.inner.parker.get() {
            parker.unpark();
        }
        Ok(())
    }

    fn thread_count(&self) -> usize {
        1
    }

    fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        if let Some(parker) = self.inner.parker.get() {
            parker.unpark();
        }
    }

    fn name(&self) -> &str {
        "single-thread"
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(parker) = self.parker.get() {
            parker.unpark();
        }
        if let Some(handle) = self.join.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Executor;
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dispatched_work_runs_on_worker() {
        let exec = SingleThread::new(16);
        let main_id = std::thread::current().id();
        let (tx, rx) = std::sync::mpsc::channel();
        exec.dispatch(move || {
            tx.send(std::thread::current().id() != main_id).unwrap();
        })
        .unwrap();
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn run_executes_and_resolves() {
        let exec = SingleThread::new(16);
        let task = exec.run(async { 21 * 2 });
        assert_eq!(task.sync_wait(), 42);
    }

    #[test]
    fn many_dispatches_all_run() {
        let exec = SingleThread::new(64);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..1000 {
            let c = Arc::clone(&counter);
            exec.dispatch(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        let done = exec.run(async { () });
        done.sync_wait();
        // The completion task was queued after the 1000 dispatches, on the same
        // single-threaded FIFO worker, so by the time it resolves they've all run.
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let exec = SingleThread::new(16);
        exec.shutdown();
        exec.shutdown();
        assert!(matches!(exec.dispatch(|| ()), Err(Error::ShuttingDown)));
    }
}
