// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! The future contract and its reference implementation.
//!
//! Generated code needs three things from a future: whether it has
//! settled, its outcome once it has, and a way to run a callback when it
//! settles. [`Settle`] is that contract; [`Promise`] implements it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::Value;

/// Value or failure of a settled future.
#[derive(Debug, Clone)]
pub enum Outcome {
    Fulfilled(Value),
    Rejected(Value),
}

impl Outcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }
}

pub type SettleCallback = Box<dyn FnOnce(Outcome) + Send>;

pub trait Settle {
    fn is_settled(&self) -> bool;

    /// `None` while pending.
    fn outcome(&self) -> Option<Outcome>;

    /// Run `callback` once the future settles. Runs it immediately, on the
    /// calling thread, if it already has.
    fn on_settle(&self, callback: SettleCallback);
}

#[derive(Default)]
struct PromiseState {
    outcome: Option<Outcome>,
    callbacks: Vec<SettleCallback>,
}

/// A settable future. Clones share state.
#[derive(Clone, Default)]
pub struct Promise {
    inner: Arc<Mutex<PromiseState>>,
}

impl Promise {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fulfilled(value: Value) -> Self {
        let p = Self::new();
        p.fulfill(value);
        p
    }

    pub fn rejected(exception: Value) -> Self {
        let p = Self::new();
        p.reject(exception);
        p
    }

    /// Fulfill with `value`. Fulfilling with another future adopts its
    /// outcome once it settles. Returns false if already settled.
    pub fn fulfill(&self, value: Value) -> bool {
        if let Value::Future(other) = value {
            if self.is_settled() {
                return false;
            }
            let this = self.clone();
            other.on_settle(Box::new(move |outcome| {
                this.settle(outcome);
            }));
            return true;
        }
        self.settle(Outcome::Fulfilled(value))
    }

    pub fn reject(&self, exception: Value) -> bool {
        self.settle(Outcome::Rejected(exception))
    }

    /// Settle and run the callbacks registered so far, outside the lock.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback(outcome.clone());
        }
        true
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Settle for Promise {
    fn is_settled(&self) -> bool {
        self.inner.lock().outcome.is_some()
    }

    fn outcome(&self) -> Option<Outcome> {
        self.inner.lock().outcome.clone()
    }

    fn on_settle(&self, callback: SettleCallback) {
        let outcome = {
            let mut state = self.inner.lock();
            match state.outcome.clone() {
                Some(outcome) => outcome,
                None => {
                    state.callbacks.push(callback);
                    return;
                }
            }
        };
        callback(outcome);
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        match &state.outcome {
            None => write!(f, "Promise(pending, {} waiting)", state.callbacks.len()),
            Some(Outcome::Fulfilled(v)) => write!(f, "Promise(fulfilled: {})", v),
            Some(Outcome::Rejected(e)) => write!(f, "Promise(rejected: {})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_run_once_in_registration_order() {
        let p = Promise::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let seen = seen.clone();
            p.on_settle(Box::new(move |_| seen.lock().push(tag)));
        }
        assert!(p.fulfill(Value::Int(1)));
        assert!(!p.fulfill(Value::Int(2)));
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let p = Promise::fulfilled(Value::Int(5));
        let hit = Arc::new(Mutex::new(None));
        let slot = hit.clone();
        p.on_settle(Box::new(move |o| {
            if let Outcome::Fulfilled(Value::Int(v)) = o {
                *slot.lock() = Some(v);
            }
        }));
        assert_eq!(*hit.lock(), Some(5));
    }

    #[test]
    fn fulfilling_with_a_future_adopts_it() {
        let inner = Promise::new();
        let outer = Promise::new();
        outer.fulfill(Value::Future(inner.clone()));
        assert!(!outer.is_settled());

        inner.reject(Value::exception("IOException", "down"));
        match outer.outcome() {
            Some(Outcome::Rejected(e)) => assert_eq!(e.class_name(), Some("IOException")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
