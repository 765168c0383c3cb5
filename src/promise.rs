//! Single-cell promise/future rendezvous.
//!
//! `Promise::get_future` hands out a [`Future`] sharing the same inner
//! cell as the promise. `set_value` can be called from any thread;
//! `get_value` blocks on a condition variable until a value has been
//! set. Exactly one successful `set_value` is expected per promise,
//! but nothing stops a second call — it simply overwrites the stored
//! value and re-signals waiters.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Inner<T> {
    value: Mutex<Option<T>>,
    condvar: Condvar,
}

/// The write side of a one-shot value handoff.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

/// The read side of a one-shot value handoff, bound to the [`Promise`]
/// that created it.
#[derive(Clone)]
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Promise<T> {
    /// Creates a new, unset promise.
    pub fn new() -> Self {
        Promise {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Returns a handle that can wait for this promise's value.
    pub fn get_future(&self) -> Future<T> {
        Future {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Publishes `value` and wakes every waiting [`Future::get_value`]
    /// call. A second call silently overwrites the previous value and
    /// re-signals waiters.
    pub fn set_value(&self, value: T) {
        let mut guard = self.inner.value.lock();
        *guard = Some(value);
        self.inner.condvar.notify_all();
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Future<T> {
    /// Blocks until a value has been set, then returns a clone of it.
    pub fn get_value(&self) -> T {
        let mut guard = self.inner.value.lock();
        while guard.is_none() {
            self.inner.condvar.wait(&mut guard);
        }
        guard.as_ref().expect("value present after wait").clone()
    }

    /// Non-blocking check for whether a value has been set.
    pub fn has_value(&self) -> bool {
        self.inner.value.lock().is_some()
    }
}
