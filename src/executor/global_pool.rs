// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A pool of worker threads sharing one bounded queue (the "global-queue" variant:
//! there is no per-worker affinity, so there is nothing to steal).

use super::park::Parker;
use crate::callable::SmallCallable;
use crate::config::ExecutorConfig;
use crate::error::Error;
use crate::queue::BoundedQueue;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

struct Inner {
    name: String,
    queue: BoundedQueue<SmallCallable>,
    stopped: AtomicBool,
    worker_count: usize,
    parkers: Mutex<Vec<Parker>>,
    join: Mutex<Vec<JoinHandle<()>>>,
}

/// `worker_count` threads all popping from the same bounded queue.
#[derive(Clone)]
pub struct GlobalPool {
    inner: Arc<Inner>,
}

impl GlobalPool {
    /// # Panics
    ///
    /// Panics if `config.queue_capacity` is not a non-zero power of two, or if the OS
    /// refuses to spawn a worker thread.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        let config = config.validate().expect("invalid ExecutorConfig");
        let inner = Arc::new(Inner {
            name: config.name.clone(),
            queue: BoundedQueue::new(config.queue_capacity),
            stopped: AtomicBool::new(false),
            worker_count: config.worker_count,
            parkers: Mutex::new(Vec::with_capacity(config.worker_count)),
            join: Mutex::new(Vec::with_capacity(config.worker_count)),
        });

        let mut handles = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count {
            let worker_inner = Arc::clone(&inner);
            let name = format!("{}-global-{id}", config.name);
            handles.push(
                std::thread::Builder::new()
                    .name(name)
                    .spawn(move || worker_loop(id, &worker_inner))
                    .expect("failed to spawn global pool worker thread"),
            );
        }
        *inner.join.lock().unwrap_or_else(|p| p.into_inner()) = handles;

        Self { inner }
    }
}

fn worker_loop(id: usize, inner: &Arc<Inner>) {
    let leaked_name: &'static str = Box::leak(inner.name.clone().into_boxed_str());
    let _worker = crate::diagnostics::bind(leaked_name, id);
    let parker = Parker::for_current();
    inner
        .parkers
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .push(parker.clone());

    loop {
        if let Some(callable) = inner.queue.pop() {
            callable.invoke();
            continue;
        }
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        parker.park_timeout(std::time::Duration::from_millis(20));
    }
}

impl super::Executor for GlobalPool {
    fn dispatch_raw(&self, callable: SmallCallable) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        self.inner
            .queue
            .push_back(callable)
            .map_err(|_| Error::QueueFull)?;
        for parker in self.inner.parkers.lock().unwrap_or_else(|p| p.into_inner()).iter() {
            parker.unpark();
        }
        Ok(())
    }

    fn thread_count(&self) -> usize {
        self.inner.worker_count
    }

    fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        for parker in self.inner.parkers.lock().unwrap_or_else(|p| p.into_inner()).iter() {
            parker.unpark();
        }
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        for parker in self.parkers.lock().unwrap_or_else(|p| p.into_inner()).iter() {
            parker.unpark();
        }
        for handle in self.join.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            let _ = handle.join();
        }
    }
}
