//! `then`, `catch` and `finally`.
//!
//! Every method here returns a fresh promise and leaves the source alone.
//! The continuation always runs as a task on the source's scheduler, never
//! inside the call that registered it, even when the source has already
//! settled.
use crate::{Promise, Resolution};

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn react<U, F>(&self, continuation: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T, E>) -> Resolution<U, E> + Send + 'static,
    {
        let (next, resolver) = Promise::pair(self.scheduler());
        let scheduler = self.scheduler().clone();
        self.subscribe(Box::new(move |outcome: Result<T, E>| {
            scheduler.defer(move || resolver.settle(continuation(outcome)));
        }));
        next
    }

    /// Chains both outcomes of this promise into a new one.
    ///
    /// Whatever the selected callback returns settles the new promise:
    /// [`Resolution::Value`] fulfills it, [`Resolution::Error`] rejects it,
    /// and [`Resolution::Adopt`] makes it follow another promise.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Promise, Resolution, TaskQueue};
    ///
    /// let queue = TaskQueue::new();
    /// let scheduler = queue.scheduler();
    /// let recovered = Promise::<i32, String>::new(&scheduler, |_| Err("lost".into()))
    ///     .then(
    ///         |v| Resolution::Value(v.to_string()),
    ///         |e| Resolution::Value(format!("recovered {e}")),
    ///     );
    /// queue.run_until_idle();
    /// assert_eq!(recovered.peek(), Some(Ok("recovered lost".to_string())));
    /// ```
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U, E> + Send + 'static,
        R: FnOnce(E) -> Resolution<U, E> + Send + 'static,
    {
        self.react(move |outcome| match outcome {
            Ok(value) => on_fulfilled(value),
            Err(err) => on_rejected(err),
        })
    }

    /// `then` with the rejection passed through untouched.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U, E> + Send + 'static,
    {
        self.then(on_fulfilled, Resolution::Error)
    }

    /// `then` with the value passed through untouched.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Resolution<T, E> + Send + 'static,
    {
        self.then(Resolution::Value, on_rejected)
    }

    /// Runs `on_settled` after either outcome and passes that outcome on.
    ///
    /// The callback sees neither the value nor the error. Returning `Err`
    /// rejects the new promise with that error instead.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
    {
        self.react(move |outcome| match on_settled() {
            Ok(()) => outcome.into(),
            Err(err) => Resolution::Error(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Promise, PromiseState, Resolution, TaskQueue};
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(String) + Clone + Send + 'static) {
        let log = Arc::new(Mutex::new(vec![]));
        let sink = log.clone();
        (log, move |line: String| sink.lock().unwrap().push(line))
    }

    #[test]
    fn test_then_on_settled_promise_is_deferred() {
        let queue = TaskQueue::new();
        let source = Promise::<i32, String>::fulfilled(&queue.scheduler(), 2);
        let (log, record) = recorder();
        let next = source.and_then(move |v| {
            record(format!("ran with {v}"));
            Resolution::Value(v * 10)
        });
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(next.state(), PromiseState::Pending);
        assert_eq!(queue.len(), 1);
        queue.run_until_idle();
        assert_eq!(*log.lock().unwrap(), vec!["ran with 2"]);
        assert_eq!(next.peek(), Some(Ok(20)));
    }

    #[test]
    fn test_then_on_pending_promise_waits_for_settlement() {
        let queue = TaskQueue::new();
        let (source, resolver) = Promise::<i32, String>::pair(&queue.scheduler());
        let next = source.and_then(|v| Resolution::Value(v + 1));
        assert_eq!(queue.run_until_idle(), 0);
        resolver.resolve(1);
        assert_eq!(next.state(), PromiseState::Pending);
        queue.run_until_idle();
        assert_eq!(next.peek(), Some(Ok(2)));
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let queue = TaskQueue::new();
        let (source, resolver) = Promise::<i32, String>::pair(&queue.scheduler());
        let (log, record) = recorder();
        for tag in ["a", "b", "c"] {
            let record = record.clone();
            source.and_then(move |v| {
                record(format!("{tag}{v}"));
                Resolution::Value(v)
            });
        }
        resolver.resolve(0);
        let late = record.clone();
        source.and_then(move |v| {
            late(format!("d{v}"));
            Resolution::Value(v)
        });
        queue.run_until_idle();
        assert_eq!(*log.lock().unwrap(), vec!["a0", "b0", "c0", "d0"]);
    }

    #[test]
    fn test_source_is_never_mutated() {
        let queue = TaskQueue::new();
        let source = Promise::<i32, String>::fulfilled(&queue.scheduler(), 5);
        let failed = source.and_then(|_| Resolution::<i32, String>::Error("derived".into()));
        queue.run_until_idle();
        assert!(!Promise::ptr_eq(&source, &source.catch(Resolution::Error)));
        assert_eq!(source.peek(), Some(Ok(5)));
        assert_eq!(failed.peek(), Some(Err("derived".to_string())));
    }

    #[test]
    fn test_rejection_propagates_past_and_then() {
        let queue = TaskQueue::new();
        let source = Promise::<i32, String>::rejected(&queue.scheduler(), "bad".into());
        let (log, record) = recorder();
        let tail = source
            .and_then(move |v| {
                record("should not run".into());
                Resolution::Value(v)
            })
            .and_then(|v| Resolution::Value(v + 1));
        queue.run_until_idle();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(tail.peek(), Some(Err("bad".to_string())));
    }

    #[test]
    fn test_catch_recovers() {
        let queue = TaskQueue::new();
        let source = Promise::<i32, String>::rejected(&queue.scheduler(), "bad".into());
        let recovered = source
            .catch(|e| Resolution::Value(e.len() as i32))
            .and_then(|v| Resolution::Value(v * 2));
        queue.run_until_idle();
        assert_eq!(recovered.peek(), Some(Ok(6)));
    }

    #[test]
    fn test_catch_passes_value_through() {
        let queue = TaskQueue::new();
        let source = Promise::<i32, String>::fulfilled(&queue.scheduler(), 8);
        let (log, record) = recorder();
        let next = source.catch(move |e| {
            record(e);
            Resolution::Value(0)
        });
        queue.run_until_idle();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(next.peek(), Some(Ok(8)));
    }

    #[test]
    fn test_handler_error_rejects_next() {
        let queue = TaskQueue::new();
        let source = Promise::<i32, String>::rejected(&queue.scheduler(), "first".into());
        let next = source.catch(|e| Resolution::Error(format!("{e} then second")));
        queue.run_until_idle();
        assert_eq!(next.peek(), Some(Err("first then second".to_string())));
    }

    #[test]
    fn test_returned_promise_is_adopted() {
        let queue = TaskQueue::new();
        let scheduler = queue.scheduler();
        let (inner, inner_resolver) = Promise::<&str, String>::pair(&scheduler);
        let source = Promise::<i32, String>::fulfilled(&scheduler, 1);
        let returned = inner.clone();
        let next = source.and_then(move |_| Resolution::Adopt(returned));
        queue.run_until_idle();
        assert_eq!(next.state(), PromiseState::Pending);
        inner_resolver.resolve("inner value");
        queue.run_until_idle();
        assert_eq!(next.peek(), Some(Ok("inner value")));
        assert!(!Promise::ptr_eq(&next, &inner));
    }

    #[test]
    fn test_returned_rejected_promise_is_adopted() {
        let queue = TaskQueue::new();
        let scheduler = queue.scheduler();
        let source = Promise::<i32, String>::fulfilled(&scheduler, 1);
        let inner_scheduler = scheduler.clone();
        let next = source.and_then(move |_| {
            Resolution::Adopt(Promise::<i32, String>::rejected(&inner_scheduler, "nested".into()))
        });
        queue.run_until_idle();
        assert_eq!(next.peek(), Some(Err("nested".to_string())));
    }

    #[test]
    fn test_finally_keeps_value() {
        let queue = TaskQueue::new();
        let (log, record) = recorder();
        let next = Promise::<i32, String>::fulfilled(&queue.scheduler(), 3).finally(move || {
            record("cleanup".into());
            Ok(())
        });
        assert!(log.lock().unwrap().is_empty());
        queue.run_until_idle();
        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
        assert_eq!(next.peek(), Some(Ok(3)));
    }

    #[test]
    fn test_finally_keeps_error() {
        let queue = TaskQueue::new();
        let next = Promise::<i32, String>::rejected(&queue.scheduler(), "kept".into())
            .finally(|| Ok(()));
        queue.run_until_idle();
        assert_eq!(next.peek(), Some(Err("kept".to_string())));
    }

    #[test]
    fn test_failing_finally_rejects() {
        let queue = TaskQueue::new();
        let next = Promise::<i32, String>::fulfilled(&queue.scheduler(), 3)
            .finally(|| Err("cleanup failed".into()));
        queue.run_until_idle();
        assert_eq!(next.peek(), Some(Err("cleanup failed".to_string())));
    }

    #[test]
    fn test_long_chain_settles_in_steps() {
        let queue = TaskQueue::new();
        let mut tail = Promise::<u32, ()>::fulfilled(&queue.scheduler(), 0);
        for _ in 0..10 {
            tail = tail.and_then(|v| Resolution::Value(v + 1));
        }
        assert_eq!(queue.run_until_idle(), 10);
        assert_eq!(tail.peek(), Some(Ok(10)));
    }
}
