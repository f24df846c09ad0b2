// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The crate-wide error taxonomy.
//!
//! `DoubleCompletion` and double-installing a continuation are programming errors, not
//! members of this enum: they panic immediately (see [`crate::task`]'s shared state)
//! rather than being reported through a `Result`. `Timeout` likewise isn't here —
//! `sync_wait_for` and `sync_wait_until` report it by handing the task back, never as
//! an error.

use std::any::Any;
use std::fmt;

/// Errors produced by the synchronous, non-blocking entry points of this crate.
#[derive(thiserror::Error)]
pub enum Error {
    /// A range, capacity, or other constructor argument violated its contract (for
    /// example `from >= to`, a zero queue capacity, or a non-power-of-two capacity).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The executor's `shutdown` has begun (or completed); new work is rejected.
    #[error("executor is shutting down")]
    ShuttingDown,

    /// The bounded queue backing this executor is saturated. This crate's executors
    /// never silently block a caller of `dispatch`/`run`/`lazy_run`; saturation is
    /// always reported synchronously.
    #[error("queue is full")]
    QueueFull,

    /// The user-supplied callable panicked. The payload is preserved so it can be
    /// re-raised with [`std::panic::resume_unwind`] from `await`/`get`.
    #[error("task panicked")]
    TaskPanicked(#[source] PanicPayload),

    /// `get`/`await` observed a shared state that will never become ready (its owning
    /// task was dropped before completion).
    #[error("task result is unavailable: the task was dropped before completing")]
    EmptyResult,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `thiserror`'s Display already renders a useful message; Debug just reuses it
        // so `.unwrap()` on a `Result<_, Error>` in tests prints something readable.
        write!(f, "{self}")
    }
}

/// A type-erased panic payload, wrapped so it can carry a `source` in [`Error`].
pub struct PanicPayload(pub Box<dyn Any + Send + 'static>);

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(describe_panic(&self.0))
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(describe_panic(&self.0))
    }
}

impl std::error::Error for PanicPayload {}

fn describe_panic<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
