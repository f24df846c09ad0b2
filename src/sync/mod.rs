// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Async-aware synchronization: a FIFO-fair mutex, an auto-reset condition variable,
//! a barrier, and the executor context-switch awaitable.
//!
//! These primitives suspend the calling `Future` instead of blocking an OS thread, the
//! same way the source's `async_lock`/`async_condition_variable`/`async_barrier`
//! suspend a coroutine. The waiter queue behind each one is a plain
//! [`parking_lot::Mutex`]-guarded `VecDeque`, not a lock-free structure — see
//! `DESIGN.md` for why that tradeoff was made deliberately rather than by omission.

pub mod barrier;
pub mod condvar;
pub mod mutex;
pub mod resume_on;

pub use barrier::AsyncBarrier;
pub use condvar::AsyncCondvar;
pub use mutex::{AsyncMutex, MutexGuard};
pub use resume_on::ResumeOn;
