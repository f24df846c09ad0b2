// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The context-switch awaitable returned by [`crate::executor::Executor::resume_on`].

use crate::callable::SmallCallable;
use crate::executor::Executor;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Awaiting this dispatches the current continuation onto `E` and suspends; the next
/// poll after that always happens on one of `E`'s workers.
pub struct ResumeOn<E> {
    executor: E,
    dispatched: bool,
}

impl<E: Executor> ResumeOn<E> {
    pub(crate) fn new(executor: E) -> Self {
        Self {
            executor,
            dispatched: false,
        }
    }
}

// No field is ever pinned in place; this future holds no self-referential pointers.
impl<E> Unpin for ResumeOn<E> {}

impl<E: Executor> Future for ResumeOn<E> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.dispatched {
            return Poll::Ready(());
        }

        let waker = cx.waker().clone();
        self.dispatched = true;
        match self.executor.dispatch_hot_raw(SmallCallable::new(move || waker.wake())) {
            Ok(()) => Poll::Pending,
            Err(_) => {
                // The executor rejected the hop (shutting down or full); resuming
                // inline on the current thread is preferable to hanging forever.
                Poll::Ready(())
            }
        }
    }
}
