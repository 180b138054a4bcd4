//! Promises with `then`/`catch`/`finally` chaining and the `all`,
//! `all_settled` and `race` combinators.
//!
//! A [`Promise`] starts pending and settles exactly once, either fulfilled
//! with a `T` or rejected with an `E`. Continuations attached with
//! [`Promise::then`] never run inside the registering call: they are handed
//! to the promise's [`Scheduler`] and run on a later turn, in the order they
//! were registered.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Promise, Resolution, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let promise = Promise::<i32, String>::new(&queue.scheduler(), |resolver| {
//!     resolver.resolve(20);
//!     Ok(())
//! });
//! let doubled = promise.and_then(|v| Resolution::Value(v * 2));
//!
//! // Nothing runs until the queue is drained.
//! assert!(doubled.peek().is_none());
//! queue.run_until_idle();
//! assert_eq!(doubled.peek(), Some(Ok(40)));
//! ```
mod chain;
mod combinators;
pub mod promise;
pub mod scheduler;
pub mod worker;

pub use combinators::Settled;
pub use promise::{Input, Promise, PromiseState, Resolution, Resolver, Wait};
pub use scheduler::{Schedule, Scheduler, Task, TaskQueue};
pub use worker::WorkerBuilder;

use thiserror::Error;

/// Errors raised by the scheduling layer. Failures of user computations are
/// never reported here: they travel as the `E` of a rejected [`Promise`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("The scheduler has shut down")]
    SchedulerClosed,
    #[error("Failed to spawn the worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
