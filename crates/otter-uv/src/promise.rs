//! Promise implementation
//!
//! A promise is created together with its settlement capability
//! ([`Resolvers`]). The capability is consumed by value, so a holder can
//! settle the promise at most once; the promise itself only exposes observation.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::value::Value;

/// Promise state
#[derive(Debug, Clone)]
pub enum PromiseState<T, E> {
    /// Not yet settled
    Pending,
    /// Resolved with value
    Fulfilled(T),
    /// Rejected with error
    Rejected(E),
}

/// Callback list type alias
type CallbackList<T> = Vec<Box<dyn FnOnce(T) + Send>>;

struct Shared<T, E> {
    state: PromiseState<T, E>,
    on_fulfilled: CallbackList<T>,
    on_rejected: CallbackList<E>,
}

/// A Promise
pub struct Promise<T, E> {
    shared: Arc<Mutex<Shared<T, E>>>,
}

/// Promise over script values, as handed to the host
pub type JsPromise = Promise<Value, Value>;

/// Settlement capability for script promises
pub type JsResolvers = Resolvers<Value, Value>;

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> Promise<T, E> {
    /// Create a pending promise and the only capability able to settle it
    pub fn with_resolvers() -> (Self, Resolvers<T, E>) {
        let promise = Self {
            shared: Arc::new(Mutex::new(Shared {
                state: PromiseState::Pending,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
        };
        let resolvers = Resolvers {
            promise: promise.clone(),
        };
        (promise, resolvers)
    }

    /// Transition out of `Pending`. Reactions run after the lock is released so
    /// they may observe or chain on this promise.
    fn settle(&self, outcome: Result<T, E>) -> bool {
        let mut shared = self.shared.lock();
        if !matches!(shared.state, PromiseState::Pending) {
            return false;
        }

        match outcome {
            Ok(value) => {
                shared.state = PromiseState::Fulfilled(value.clone());
                let callbacks = std::mem::take(&mut shared.on_fulfilled);
                shared.on_rejected.clear();
                drop(shared);
                for callback in callbacks {
                    callback(value.clone());
                }
            }
            Err(error) => {
                shared.state = PromiseState::Rejected(error.clone());
                let callbacks = std::mem::take(&mut shared.on_rejected);
                shared.on_fulfilled.clear();
                drop(shared);
                for callback in callbacks {
                    callback(error.clone());
                }
            }
        }
        true
    }

    /// Register fulfillment callback
    pub fn then<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let mut shared = self.shared.lock();
        let value = match &shared.state {
            PromiseState::Pending => {
                shared.on_fulfilled.push(Box::new(callback));
                return;
            }
            PromiseState::Fulfilled(value) => value.clone(),
            PromiseState::Rejected(_) => return,
        };
        drop(shared);
        callback(value);
    }

    /// Register rejection callback
    pub fn catch<F>(&self, callback: F)
    where
        F: FnOnce(E) + Send + 'static,
    {
        let mut shared = self.shared.lock();
        let error = match &shared.state {
            PromiseState::Pending => {
                shared.on_rejected.push(Box::new(callback));
                return;
            }
            PromiseState::Rejected(error) => error.clone(),
            PromiseState::Fulfilled(_) => return,
        };
        drop(shared);
        callback(error);
    }

    /// Get current state
    pub fn state(&self) -> PromiseState<T, E> {
        self.shared.lock().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.shared.lock().state, PromiseState::Pending)
    }

    /// `"pending"`, `"fulfilled"` or `"rejected"`
    pub fn state_name(&self) -> &'static str {
        match self.shared.lock().state {
            PromiseState::Pending => "pending",
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
        }
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// The one-time resolve/reject pair for a [`Promise`].
///
/// Not `Clone`: every settling method takes `self`.
pub struct Resolvers<T, E> {
    promise: Promise<T, E>,
}

impl<T: Clone + Send + 'static, E: Clone + Send + 'static> Resolvers<T, E> {
    /// Fulfill the promise
    pub fn resolve(self, value: T) {
        self.promise.settle(Ok(value));
    }

    /// Reject the promise
    pub fn reject(self, error: E) {
        self.promise.settle(Err(error));
    }

    /// Fulfill or reject depending on `outcome`
    pub fn settle(self, outcome: Result<T, E>) {
        self.promise.settle(outcome);
    }

    /// The promise this capability settles
    pub fn promise(&self) -> &Promise<T, E> {
        &self.promise
    }
}
