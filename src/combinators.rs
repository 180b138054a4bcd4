//! Constructors that build one promise out of zero or more inputs.
//!
//! Plain values among the inputs are first wrapped into fulfilled promises.
//! Inputs are observed synchronously: when the inputs settle, the aggregate
//! settles inside that same call, and continuations chained onto the
//! aggregate are deferred as usual.
use crate::{Input, Promise, Resolution, Scheduler};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome record produced by [`Promise::all_settled`].
///
/// `index` is the position of the input the record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Settled<T, E> {
    Fulfilled { index: usize, value: T },
    Rejected { index: usize, reason: E },
}

impl<T, E> Settled<T, E> {
    pub fn index(&self) -> usize {
        match self {
            Settled::Fulfilled { index, .. } | Settled::Rejected { index, .. } => *index,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled { .. })
    }
}

struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Lifts `input` into a promise.
    ///
    /// A promise is returned as is (same handle, not a copy); a plain value
    /// becomes an already fulfilled promise.
    pub fn resolve(scheduler: &Scheduler, input: Input<T, E>) -> Self {
        match input {
            Input::Promise(promise) => promise,
            Input::Value(value) => Self::fulfilled(scheduler, value),
        }
    }

    /// An already rejected promise.
    ///
    /// The reason is always wrapped, even when `E` is itself a promise type:
    /// a rejected promise carries that promise as its error.
    pub fn reject(scheduler: &Scheduler, reason: E) -> Self {
        Self::rejected(scheduler, reason)
    }

    fn normalize<I>(scheduler: &Scheduler, inputs: I) -> Vec<Self>
    where
        I: IntoIterator<Item = Input<T, E>>,
    {
        inputs
            .into_iter()
            .map(|input| Self::resolve(scheduler, input))
            .collect()
    }

    /// Fulfills with every value, in input order, once all inputs fulfill.
    /// Rejects with the first rejection to happen.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Input, Promise, TaskQueue};
    ///
    /// let queue = TaskQueue::new();
    /// let scheduler = queue.scheduler();
    /// let (late, resolver) = Promise::<i32, String>::pair(&scheduler);
    /// let all = Promise::all(&scheduler, vec![Input::Promise(late), Input::Value(2)]);
    /// resolver.resolve(1);
    /// assert_eq!(all.peek(), Some(Ok(vec![1, 2])));
    /// ```
    pub fn all<I>(scheduler: &Scheduler, inputs: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Input<T, E>>,
    {
        let inputs = Self::normalize(scheduler, inputs);
        let (aggregate, resolver) = Promise::pair(scheduler);
        if inputs.is_empty() {
            resolver.resolve(vec![]);
            return aggregate;
        }
        let gather = Arc::new(Mutex::new(Gather {
            slots: inputs.iter().map(|_| None).collect(),
            remaining: inputs.len(),
        }));
        for (index, input) in inputs.iter().enumerate() {
            let resolver = resolver.clone();
            let gather = gather.clone();
            input.subscribe(Box::new(move |outcome: Result<T, E>| match outcome {
                Ok(value) => {
                    let values = {
                        let mut gather = lock(&gather);
                        gather.slots[index] = Some(value);
                        gather.remaining -= 1;
                        if gather.remaining > 0 {
                            return;
                        }
                        mem::take(&mut gather.slots).into_iter().flatten().collect()
                    };
                    resolver.resolve(values);
                }
                Err(err) => resolver.reject(err),
            }));
        }
        aggregate
    }

    /// Fulfills once every input has settled, with one [`Settled`] record per
    /// input in the order they settled. Never rejects.
    pub fn all_settled<I>(scheduler: &Scheduler, inputs: I) -> Promise<Vec<Settled<T, E>>, E>
    where
        I: IntoIterator<Item = Input<T, E>>,
    {
        let inputs = Self::normalize(scheduler, inputs);
        let (aggregate, resolver) = Promise::pair(scheduler);
        if inputs.is_empty() {
            resolver.resolve(vec![]);
            return aggregate;
        }
        let total = inputs.len();
        let records = Arc::new(Mutex::new(Vec::with_capacity(total)));
        for (index, input) in inputs.iter().enumerate() {
            let resolver = resolver.clone();
            let records = records.clone();
            input.subscribe(Box::new(move |outcome: Result<T, E>| {
                let record = match outcome {
                    Ok(value) => Settled::Fulfilled { index, value },
                    Err(reason) => Settled::Rejected { index, reason },
                };
                let done = {
                    let mut records = lock(&records);
                    records.push(record);
                    if records.len() < total {
                        return;
                    }
                    mem::take(&mut *records)
                };
                resolver.resolve(done);
            }));
        }
        aggregate
    }

    /// Settles like whichever input settles first.
    ///
    /// With no inputs the returned promise stays pending forever.
    pub fn race<I>(scheduler: &Scheduler, inputs: I) -> Self
    where
        I: IntoIterator<Item = Input<T, E>>,
    {
        let inputs = Self::normalize(scheduler, inputs);
        let (winner, resolver) = Promise::pair(scheduler);
        for input in &inputs {
            let resolver = resolver.clone();
            input.subscribe(Box::new(move |outcome: Result<T, E>| {
                resolver.settle(Resolution::from(outcome))
            }));
        }
        winner
    }
}
