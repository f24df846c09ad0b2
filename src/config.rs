// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Construction options shared by the pool executors (§6 of the design doc).

use crate::error::{Error, Result};

/// How a worker with an empty local queue looks for more work before parking.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum StealPolicy {
    /// Never steal; a worker with an empty queue parks immediately. Only meaningful
    /// for [`crate::executor::GlobalPool`], which has no concept of "local" work.
    #[default]
    None,
    /// Scan every peer in index order starting just past `self`.
    Sequential,
    /// Scan immediate neighbors first (`id-1`, `id+1`, ...) before wrapping around.
    Neighbor,
}

/// Construction options for [`crate::executor::LocalPool`] and
/// [`crate::executor::GlobalPool`].
///
/// ```
/// use weave::ExecutorConfig;
///
/// let cfg = ExecutorConfig::new()
///     .worker_count(4)
///     .queue_capacity(256)
///     .name("io-pool");
/// assert_eq!(cfg.worker_count, 4);
/// ```
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Number of worker threads. Defaults to the logical CPU count.
    pub worker_count: usize,
    /// Per-worker (or, for the global-queue pool, shared) queue capacity. Must be a
    /// power of two.
    pub queue_capacity: usize,
    /// How idle workers look for more work in a [`crate::executor::LocalPool`].
    pub steal_policy: StealPolicy,
    /// When set, [`crate::executor::Executor::dispatch_hot_raw`] places a resumed
    /// continuation into a single-slot fast lane that the owning worker drains before
    /// its ordinary queue, instead of enqueuing it at the back like regular work. Only
    /// takes effect in [`crate::executor::LocalPool`], and only when the dispatching
    /// thread is itself one of that pool's workers — see
    /// [`crate::executor::Executor::resume_on`].
    pub hot_bias: bool,
    /// Human-readable label used in `tracing` spans and panics.
    pub name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            queue_capacity: 1024,
            steal_policy: StealPolicy::Neighbor,
            hot_bias: false,
            name: "weave".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Start from the defaults (`worker_count` = logical CPU count, `queue_capacity` =
    /// 1024, `steal_policy` = [`StealPolicy::Neighbor`], `hot_bias` = `false`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the worker count.
    #[must_use]
    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    /// Override the queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Override the steal policy.
    #[must_use]
    pub fn steal_policy(mut self, policy: StealPolicy) -> Self {
        self.steal_policy = policy;
        self
    }

    /// Enable or disable front-of-queue submission for hot (recently-resumed) work.
    #[must_use]
    pub fn hot_bias(mut self, enabled: bool) -> Self {
        self.hot_bias = enabled;
        self
    }

    /// Override the diagnostic name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Validate this configuration, clamping `worker_count` to at least 1 and
    /// rejecting a non-power-of-two `queue_capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when `queue_capacity` is zero or not a power
    /// of two.
    pub(crate) fn validate(mut self) -> Result<Self> {
        if self.worker_count == 0 {
            self.worker_count = 1;
        }
        if self.queue_capacity == 0 || !self.queue_capacity.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "queue_capacity must be a non-zero power of two, got {}",
                self.queue_capacity
            )));
        }
        Ok(self)
    }
}
