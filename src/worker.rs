//! A scheduler backed by a dedicated thread.
//!
//! Tasks travel over a multi-producer, single-consumer channel to one worker
//! thread, which runs them in the order they were sent. The thread exits once
//! every [`Scheduler`] clone pointing at it has been dropped.
use crate::{Error, Schedule, Scheduler, Task};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    mpsc::{channel, Sender},
    Mutex, PoisonError,
};
use std::thread;

/// Configures and spawns a worker-thread [`Scheduler`].
///
/// # Examples
///
/// ```
/// use promise_chain::{Input, Promise, Resolution, WorkerBuilder};
/// use futures::executor::block_on;
///
/// let scheduler = WorkerBuilder::new().name("promises").spawn().unwrap();
/// let promise = Promise::<u32, String>::resolve(&scheduler, Input::Value(41))
///     .and_then(|v| Resolution::Value(v + 1));
/// assert_eq!(block_on(promise.wait()), Ok(42));
/// ```
#[derive(Debug, Clone, Default)]
pub struct WorkerBuilder {
    name: Option<String>,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name of the worker thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    /// Spawns the worker thread and returns a [`Scheduler`] feeding it.
    pub fn spawn(self) -> Result<Scheduler, Error> {
        let (sender, receiver) = channel::<Task>();
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let label = self.name.unwrap_or_else(|| "unnamed".into());
        builder.spawn(move || {
            log::trace!("worker '{label}' starting");
            for task in receiver {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("task on worker '{label}' panicked");
                }
            }
            log::trace!("worker '{label}' exiting");
        })?;
        Ok(Scheduler::new(WorkerScheduler {
            sender: Mutex::new(sender),
        }))
    }
}

struct WorkerScheduler {
    sender: Mutex<Sender<Task>>,
}

impl Schedule for WorkerScheduler {
    fn schedule(&self, task: Task) -> Result<(), Error> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(task)
            .map_err(|_| Error::SchedulerClosed)
    }
}
