//! Deferred execution of promise continuations.
//!
//! A [`Promise`](crate::Promise) never calls a continuation from inside the
//! call that registered it. Instead the continuation is boxed into a [`Task`]
//! and handed to a [`Scheduler`], which runs it later. Anything that can run
//! boxed closures in FIFO order can back a scheduler by implementing
//! [`Schedule`].
use crate::Error;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The enqueue side of an executor.
///
/// Implementations must run tasks in the order they were scheduled.
pub trait Schedule: Send + Sync + 'static {
    fn schedule(&self, task: Task) -> Result<(), Error>;
}

/// Cloneable handle to a [`Schedule`] implementation.
///
/// Every promise carries one and passes it on to the promises derived from
/// it, so a whole chain runs on the same executor.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<dyn Schedule>,
}

impl Scheduler {
    pub fn new<S: Schedule>(schedule: S) -> Self {
        Self {
            inner: Arc::new(schedule),
        }
    }

    /// Run `f` on a later turn.
    ///
    /// If the executor refuses the task it is dropped, along with whatever
    /// resolver it captured.
    pub fn defer<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(err) = self.inner.schedule(Box::new(f)) {
            log::warn!("dropping deferred task: {err}");
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// A FIFO task queue drained by its owner.
///
/// This is the single-threaded microtask model: tasks pile up until
/// [`run_once`](TaskQueue::run_once) or
/// [`run_until_idle`](TaskQueue::run_until_idle) is called.
///
/// # Examples
///
/// ```
/// use promise_chain::TaskQueue;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let queue = TaskQueue::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = hits.clone();
/// queue.scheduler().defer(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// assert_eq!(hits.load(Ordering::SeqCst), 0);
/// assert_eq!(queue.run_until_idle(), 1);
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    queue: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`Scheduler`] that pushes onto this queue.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the oldest pending task. Returns `false` if the queue was empty.
    pub fn run_once(&self) -> bool {
        // The guard is released before the task runs so it can schedule more.
        let task = self.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including the ones scheduled by
    /// the tasks themselves. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Schedule for TaskQueue {
    fn schedule(&self, task: Task) -> Result<(), Error> {
        self.lock().push_back(task);
        Ok(())
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}
