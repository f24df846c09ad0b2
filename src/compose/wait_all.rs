// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Waits for a batch of already-running tasks, collecting their results.

use crate::task::Task;

/// Awaits every task in `tasks`, in list order, returning their results in the same
/// order. Since each `Task` begins running at spawn time, the tasks all make
/// progress concurrently regardless of the order this function observes them in —
/// awaiting them sequentially here only fixes the order results (and a propagated
/// panic) are *observed* in, not the order they *run* in.
///
/// If more than one task panicked, only the first one encountered (in list order) is
/// propagated; the others are silently dropped, matching this crate's first-observed
/// exception policy for composed work.
pub async fn wait_all<T>(tasks: Vec<Task<T>>) -> Vec<T> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, LocalPool};
    use crate::ExecutorConfig;

    #[test]
    fn collects_results_in_order() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(4).queue_capacity(64));
        let tasks: Vec<_> = (0..10).map(|i| exec.run(async move { i * i })).collect();
        let gathered = exec.run(wait_all(tasks)).sync_wait();
        assert_eq!(gathered, (0..10).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic(expected = "first task blew up")]
    fn first_panic_in_list_order_propagates() {
        let exec = LocalPool::new(ExecutorConfig::new().worker_count(4).queue_capacity(64));
        let tasks = vec![
            exec.run(async {
                panic!("first task blew up");
            }),
            exec.run(async {
                panic!("second task blew up");
            }),
        ];
        exec.run(wait_all(tasks)).sync_wait();
    }
}
