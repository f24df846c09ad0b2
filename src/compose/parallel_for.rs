// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Partitions a range into contiguous chunks and runs each chunk concurrently.

use super::wait_all::wait_all;
use crate::executor::Executor;
use crate::task::Task;
use std::ops::Range;
use std::sync::Arc;

/// Splits `range` into up to `chunk_count` contiguous sub-ranges, runs `body(i)` for
/// every index in each sub-range on its own task, and returns a [`Task`] that
/// resolves once every chunk has finished.
///
/// `chunk_count` is clamped to `range.len()`: there is never a chunk with no work.
/// `body` must be `Sync` because the same instance is shared (via `Arc`) across every
/// chunk's task.
pub fn parallel_for<E, F>(executor: &E, range: Range<usize>, chunk_count: usize, body: F) -> Task<()>
where
    E: Executor,
    F: Fn(usize) + Send + Sync + 'static,
{
    let len = range.end.saturating_sub(range.start);
    let body = Arc::new(body);

    if len == 0 {
        return executor.run(async {});
    }

    let chunk_count = chunk_count.clamp(1, len);
    let chunk_size = len.div_ceil(chunk_count);

    let mut chunks: Vec<Task<()>> = Vec::with_capacity(chunk_count);
    let mut start = range.start;
    while start < range.end {
        let end = (start + chunk_size).min(range.end);
        let body = Arc::clone(&body);
        chunks.push(executor.run(async move {
            for i in start..end {
                body(i);
            }
        }));
        start = end;
    }

    executor.run(async move {
        wait_all(chunks).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LocalPool;
    use crate::ExecutorConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn visits_every_index_exactly_once() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(4).queue_capacity(256));
        const N: usize = 10_000;
        let seen = Arc::new((0..N).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
        let s = Arc::clone(&seen);
        parallel_for(&exec, 0..N, 8, move |i| {
            s[i].fetch_add(1, Ordering::SeqCst);
        })
        .sync_wait();
        assert!(seen.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn sum_matches_sequential_reference() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(4).queue_capacity(256));
        const N: usize = 2000;
        let sum = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&sum);
        parallel_for(&exec, 0..N, 16, move |i| {
            s.fetch_add(i, Ordering::SeqCst);
        })
        .sync_wait();
        assert_eq!(sum.load(Ordering::SeqCst), (0..N).sum::<usize>());
    }

    #[test]
    fn chunk_count_is_clamped_to_range_length() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(2).queue_capacity(64));
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        parallel_for(&exec, 0..3, 100, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .sync_wait();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
