// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Runs a fixed, heterogeneous pack of closures concurrently and collects their
//! results in declaration order.

use super::wait_all::wait_all;
use crate::executor::Executor;
use crate::task::Task;

/// Spawns every closure in `sections` as its own task and returns a [`Task`] resolving
/// to their results, in the same order `sections` was given in.
///
/// Unlike [`super::parallel_for::parallel_for`], each section can have a distinct
/// return type at the closure level, but the returned vector is necessarily
/// homogeneous — callers whose sections produce different types should have each
/// closure return a common enum rather than trying to mix `T`s.
pub fn parallel_sections<E, T>(executor: &E, sections: Vec<Box<dyn FnOnce() -> T + Send>>) -> Task<Vec<T>>
where
    E: Executor,
    T: Send + 'static,
{
    let tasks: Vec<Task<T>> = sections
        .into_iter()
        .map(|section| executor.run(async move { section() }))
        .collect();
    executor.run(wait_all(tasks))
}
