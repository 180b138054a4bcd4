//! The promise state machine.
//!
//! A [`Promise`] is a shared handle to a lock-guarded cell that starts
//! `Pending` and moves exactly once to `Fulfilled` or `Rejected`. The only
//! way to move it is through its [`Resolver`]. Reactions registered while the
//! promise is pending are queued and drained, in registration order, at the
//! moment it settles. Once settled, the cell never changes again.
use crate::Scheduler;
use std::fmt::{self, Debug};
use std::future::{Future, IntoFuture};
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

/// Callback fired once with the outcome of a settled promise.
pub(crate) type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

/// Observable state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T: Clone, E: Clone> State<T, E> {
    fn outcome(&self) -> Option<Result<T, E>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(err) => Some(Err(err.clone())),
        }
    }
}

struct Inner<T, E> {
    state: State<T, E>,
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

/// A value of type `T` that will become available, or fail with an `E`.
///
/// Cloning a `Promise` clones the handle, not the computation: every clone
/// observes the same settlement.
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
    scheduler: Scheduler,
}

/// The settlement capability of a [`Promise`].
///
/// Only the first call to [`resolve`](Resolver::resolve),
/// [`reject`](Resolver::reject) or [`settle`](Resolver::settle) that finds
/// the promise pending has any effect; every later call is a no-op.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
}

/// What a continuation hands back to settle the promise it feeds.
pub enum Resolution<T, E> {
    /// Fulfill with a plain value.
    Value(T),
    /// Follow another promise and settle the same way it does.
    Adopt(Promise<T, E>),
    /// Reject with an error.
    Error(E),
}

/// A value entering the promise world: either plain, or already a promise.
pub enum Input<T, E> {
    Value(T),
    Promise(Promise<T, E>),
}

impl<T, E> From<Result<T, E>> for Resolution<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Resolution::Value(value),
            Err(err) => Resolution::Error(err),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Adopt(promise)
    }
}

impl<T, E> From<Input<T, E>> for Resolution<T, E> {
    fn from(input: Input<T, E>) -> Self {
        match input {
            Input::Value(value) => Resolution::Value(value),
            Input::Promise(promise) => Resolution::Adopt(promise),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Input<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Input::Promise(promise)
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Promise<T, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PromiseState {
        match self.lock().state {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    /// The scheduler continuations of this promise run on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Whether both handles point at the same promise.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a promise and runs `setup` on the spot with its [`Resolver`].
    ///
    /// If `setup` returns an error the promise is rejected with it, unless
    /// `setup` already settled it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Promise, PromiseState, TaskQueue};
    ///
    /// let queue = TaskQueue::new();
    /// let failed = Promise::<(), &str>::new(&queue.scheduler(), |_| Err("nope"));
    /// assert_eq!(failed.state(), PromiseState::Rejected);
    /// assert_eq!(failed.peek(), Some(Err("nope")));
    /// ```
    pub fn new<S>(scheduler: &Scheduler, setup: S) -> Self
    where
        S: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (promise, resolver) = Self::pair(scheduler);
        if let Err(err) = setup(resolver.clone()) {
            resolver.reject(err);
        }
        promise
    }

    /// A pending promise together with the resolver that settles it.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Promise, WorkerBuilder};
    /// use futures::executor::block_on;
    /// use std::thread;
    ///
    /// let scheduler = WorkerBuilder::new().spawn().unwrap();
    /// let (promise, resolver) = Promise::<String, ()>::pair(&scheduler);
    /// let task = thread::spawn(move || resolver.resolve("Hi".into()));
    /// assert_eq!(block_on(promise.wait()), Ok("Hi".to_string()));
    /// task.join().expect("The task thread has panicked.");
    /// ```
    pub fn pair(scheduler: &Scheduler) -> (Self, Resolver<T, E>) {
        let promise = Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                reactions: vec![],
                wakers: vec![],
            })),
            scheduler: scheduler.clone(),
        };
        let resolver = Resolver {
            promise: promise.clone(),
        };
        (promise, resolver)
    }

    pub(crate) fn fulfilled(scheduler: &Scheduler, value: T) -> Self {
        let (promise, resolver) = Self::pair(scheduler);
        resolver.resolve(value);
        promise
    }

    pub(crate) fn rejected(scheduler: &Scheduler, err: E) -> Self {
        let (promise, resolver) = Self::pair(scheduler);
        resolver.reject(err);
        promise
    }

    /// The outcome, if the promise has settled.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.lock().state.outcome()
    }

    /// A [`Future`] that completes with the outcome of this promise.
    pub fn wait(&self) -> Wait<T, E> {
        Wait {
            promise: self.clone(),
        }
    }

    /// Registers `reaction` to run with the outcome.
    ///
    /// Unlike `then`, this is synchronous: an already settled promise calls
    /// `reaction` before returning, and a pending one calls it from inside
    /// the settling call.
    pub(crate) fn subscribe(&self, reaction: Reaction<T, E>) {
        let mut inner = self.lock();
        match inner.state.outcome() {
            None => inner.reactions.push(reaction),
            Some(outcome) => {
                drop(inner);
                reaction(outcome);
            }
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn resolve(&self, value: T) {
        self.complete(Ok(value));
    }

    pub fn reject(&self, err: E) {
        self.complete(Err(err));
    }

    /// Makes the promise follow `other`: it settles the way `other` settles,
    /// unless something else settles it first.
    ///
    /// The outcome of `other` is forwarded as a task on this promise's
    /// scheduler, so the promise settles on a later turn than `other`.
    ///
    /// Adopting the promise itself leaves it pending. Longer cycles, such as
    /// two promises adopting each other, are not detected: both stay pending
    /// and keep each other alive until one of them is settled directly.
    pub fn adopt(&self, other: Promise<T, E>) {
        if self.promise.state() != PromiseState::Pending {
            return;
        }
        if Promise::ptr_eq(&self.promise, &other) {
            log::trace!("promise {:p} adopting itself", Arc::as_ptr(&other.inner));
            return;
        }
        let resolver = self.clone();
        let scheduler = self.promise.scheduler().clone();
        // One task per hop keeps long adoption chains off the stack.
        other.subscribe(Box::new(move |outcome: Result<T, E>| {
            scheduler.defer(move || resolver.complete(outcome))
        }));
    }

    pub fn settle(&self, resolution: Resolution<T, E>) {
        match resolution {
            Resolution::Value(value) => self.resolve(value),
            Resolution::Adopt(other) => self.adopt(other),
            Resolution::Error(err) => self.reject(err),
        }
    }

    /// The promise this resolver settles.
    pub fn promise(&self) -> &Promise<T, E> {
        &self.promise
    }

    fn complete(&self, outcome: Result<T, E>) {
        let (reactions, wakers) = {
            let mut inner = self.promise.lock();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.state = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(err) => State::Rejected(err.clone()),
            };
            (
                mem::take(&mut inner.reactions),
                mem::take(&mut inner.wakers),
            )
        };
        log::trace!(
            "promise {:p} {} with {} reaction(s)",
            Arc::as_ptr(&self.promise.inner),
            if outcome.is_ok() { "fulfilled" } else { "rejected" },
            reactions.len()
        );
        for reaction in reactions {
            reaction(outcome.clone());
        }
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T, E> Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}

impl<T, E> Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("state", &self.promise.state())
            .finish()
    }
}

impl<T: Debug, E: Debug> Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Adopt(promise) => f.debug_tuple("Adopt").field(promise).finish(),
            Resolution::Error(err) => f.debug_tuple("Error").field(err).finish(),
        }
    }
}

impl<T: Debug, E> Debug for Input<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Input::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
        }
    }
}

/// Future returned by [`Promise::wait`].
#[derive(Debug)]
pub struct Wait<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Future for Wait<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.promise.lock();
        match inner.state.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Wait<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Wait { promise: self }
    }
}
