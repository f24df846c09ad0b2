// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A pool of worker threads, each with its own bounded queue, optionally stealing from
//! each other when idle (the "local-queue" and "work-stealing local-queue" variants —
//! the only difference between them is [`StealPolicy::None`] vs. a real policy).

use super::park::Parker;
use crate::callable::SmallCallable;
use crate::config::{ExecutorConfig, StealPolicy};
use crate::error::Error;
use crate::queue::BoundedQueue;
use crate::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;

struct WorkerSlot {
    queue: BoundedQueue<SmallCallable>,
    // A single-item fast lane ahead of `queue`, checked by the worker loop before it
    // pops from the queue proper. This is what gives `dispatch_hot_raw` genuine
    // front-of-line placement without needing a `push_front` on the ring buffer.
    hot: parking_lot::Mutex<Option<SmallCallable>>,
    parker: OnceLock<Parker>,
}

struct Inner {
    name: String,
    workers: Vec<WorkerSlot>,
    stopped: AtomicBool,
    next: AtomicUsize,
    steal_policy: StealPolicy,
    hot_bias: bool,
    join: Mutex<Vec<JoinHandle<()>>>,
}

/// `worker_count` threads, each with a private bounded queue, round-robin-fed and
/// (depending on [`StealPolicy`]) stealing from peers before parking.
#[derive(Clone)]
pub struct LocalPool {
    inner: Arc<Inner>,
}

impl LocalPool {
    /// # Panics
    ///
    /// Panics if `config.queue_capacity` is not a non-zero power of two, or if the OS
    /// refuses to spawn a worker thread.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        let config = config.validate().expect("invalid ExecutorConfig");
        let workers = (0..config.worker_count)
            .map(|_| WorkerSlot {
                queue: BoundedQueue::new(config.queue_capacity),
                hot: parking_lot::Mutex::new(None),
                parker: OnceLock::new(),
            })
            .collect();

        let inner = Arc::new(Inner {
            name: config.name.clone(),
            workers,
            stopped: AtomicBool::new(false),
            next: AtomicUsize::new(0),
            steal_policy: config.steal_policy,
            hot_bias: config.hot_bias,
            join: Mutex::new(Vec::with_capacity(config.worker_count)),
        });

        let mut handles = Vec::with_capacity(config.worker_count);
        for id in 0..config.worker_count {
            let worker_inner = Arc::clone(&inner);
            let name = format!("{}-local-{id}", config.name);
            handles.push(
                std::thread::Builder::new()
                    .name(name)
                    .spawn(move || worker_loop(id, &worker_inner))
                    .expect("failed to spawn local pool worker thread"),
            );
        }
        *inner.join.lock().unwrap_or_else(|p| p.into_inner()) = handles;

        Self { inner }
    }

    /// Number of workers in this pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.workers.len()
    }
}

fn steal_order(policy: StealPolicy, id: usize, count: usize) -> Vec<usize> {
    match policy {
        StealPolicy::None => Vec::new(),
        StealPolicy::Sequential => (1..count).map(|offset| (id + offset) % count).collect(),
        StealPolicy::Neighbor => {
            let mut order = Vec::with_capacity(count.saturating_sub(1));
            for distance in 1..count {
                if distance % 2 == 1 {
                    order.push((id + distance.div_ceil(2)) % count);
                } else {
                    order.push((id + count - distance / 2) % count);
                }
            }
            order
        }
    }
}

fn worker_loop(id: usize, inner: &Arc<Inner>) {
    let leaked_name: &'static str = Box::leak(inner.name.clone().into_boxed_str());
    let _worker = crate::diagnostics::bind(leaked_name, id);
    let parker = Parker::for_current();
    let _ = inner.workers[id].parker.set(parker.clone());

    let order = steal_order(inner.steal_policy, id, inner.workers.len());

    loop {
        if let Some(callable) = inner.workers[id].hot.lock().take() {
            callable.invoke();
            continue;
        }

        if let Some(callable) = inner.workers[id].queue.pop() {
            callable.invoke();
            continue;
        }

        let stolen = order
            .iter()
            .find_map(|&victim| inner.workers[victim].queue.pop());
        if let Some(callable) = stolen {
            callable.invoke();
            continue;
        }

        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        parker.park_timeout(std::time::Duration::from_millis(20));
    }
}

impl LocalPool {
    fn worker_for_hot_dispatch(&self) -> Option<usize> {
        let current = crate::diagnostics::current()?;
        if current.executor_name != self.inner.name {
            return None;
        }
        (current.worker_index < self.inner.workers.len()).then_some(current.worker_index)
    }
}

impl super::Executor for LocalPool {
    fn dispatch_raw(&self, callable: SmallCallable) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        let index = self.inner.next.fetch_add(1, Ordering::Relaxed) % self.inner.workers.len();
        self.inner.workers[index]
            .queue
            .push_back(callable)
            .map_err(|_| Error::QueueFull)?;
        if let Some(parker) = self.inner.workers[index].parker.get() {
            parker.unpark();
        }
        Ok(())
    }

    fn dispatch_hot_raw(&self, callable: SmallCallable) -> Result<()> {
        let Some(index) = self.worker_for_hot_dispatch() else {
            return self.dispatch_raw(callable);
        };
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        if !self.inner.hot_bias {
            return self.inner.workers[index]
                .queue
                .push_back(callable)
                .map_err(|_| Error::QueueFull);
        }
        let mut hot = self.inner.workers[index].hot.lock();
        if hot.is_none() {
            *hot = Some(callable);
            return Ok(());
        }
        // Hot slot already occupied by an earlier hot dispatch still waiting to run;
        // don't displace it, fall this one back to the ordinary queue instead.
        drop(hot);
        self.inner.workers[index]
            .queue
            .push_back(callable)
            .map_err(|_| Error::QueueFull)
    }

    fn thread_count(&self) -> usize {
        self.inner.workers.len()
    }

    fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        for worker in &self.inner.workers {
            if let Some(parker) = worker.parker.get() {
                parker.unpark();
            }
        }
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        for worker in &self.workers {
            if let Some(parker) = worker.parker.get() {
                parker.unpark();
            }
        }
        for handle in self.join.lock().unwrap_or_else(|p| p.into_inner()).drain(..) {
            let _ = handle.join();
        }
    }
}
