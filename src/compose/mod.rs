// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Structured composition over [`crate::executor::Executor`] and [`crate::task::Task`]:
//! partition-and-run (`parallel_for`), a fixed closure pack (`parallel_sections`), and
//! gather-with-first-observed-failure (`wait_all`).

pub mod parallel_for;
pub mod parallel_sections;
pub mod wait_all;

pub use parallel_for::parallel_for;
pub use parallel_sections::parallel_sections;
pub use wait_all::wait_all;
