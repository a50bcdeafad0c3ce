//! A small cooperative task runtime. This crate provides a single-threaded event loop, lazily
//! started tasks that suspend on timers or on each other, and two combinators for composing many
//! tasks into one.
//!
//! # Tasks and the loop
//! A [`Task`] wraps a future and does nothing until it is driven. Tasks are driven either by
//! awaiting them from another task, or by handing them to a [`Loop`]:
//! ```
//! use std::time::Duration;
//! use coloop::{sleep_for, Loop, Task};
//!
//! let lp = Loop::new();
//! let handle = lp.spawn(Task::new(async {
//!     let a = Task::new(async { 20 }).await;
//!     sleep_for(Duration::from_millis(1)).await;
//!     a + 22
//! }));
//! lp.run();
//! assert_eq!(handle.result().unwrap(), 42);
//! ```
//!
//! [`Loop::run`] keeps going until the ready queue and the timer set are both empty. The only
//! place it blocks is waiting for the earliest timer when nothing else is ready.
//!
//! # Failures
//! A panic inside a task is captured into that task's result instead of unwinding through the
//! loop. Reading the result returns [`TaskError::Panicked`]; awaiting the task re-raises the
//! failure in the awaiting task, which captures it in turn.
//!
//! # Combinators
//! [`when_all`] completes once every child has, with the children's values in input order.
//! [`when_any`] completes with the first child to finish, tagged by position, and then discards
//! every timer still pending on the loop. Neither forwards child failures: a failed child is only
//! visible through its own [`TaskHandle`].
//!
//! # Time
//! Timers read the loop's [`Clock`]. The default [`SystemClock`] sleeps the thread;
//! [`ManualClock`] jumps straight to the next deadline, which keeps timed tests instant.

mod cell;
mod clock;
mod error;
mod exec;
mod relay;
mod task;
mod timer;
mod when_all;
mod when_any;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Failure, TaskError};
pub use exec::{Builder, Loop, TimerKey};
pub use task::{State, Task, TaskHandle};
pub use timer::{sleep_for, sleep_until, Timer};
pub use when_all::{when_all, WhenAll};
pub use when_any::{
    when_any, AnyOf1, AnyOf2, AnyOf3, AnyOf4, AnyOf5, AnyOf6, AnyOf7, AnyOf8, WhenAny,
};
