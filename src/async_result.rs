//! One-shot handles to results that may still be computing.
//!
//! [`promise`] returns a connected pair: the producing task keeps the
//! [`Promise`] and completes it exactly once; the consumer holds the
//! [`AsyncResult`] and can poll it, block until it resolves, or take the value.
//! A promise dropped without being completed resolves to
//! [`SchedulerError::TaskAbandoned`], so a waiter can never hang on a task that
//! died.

use anyhow::Result;
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::SchedulerError;

enum State<T> {
    Pending,
    Ready(Result<T>),
    Taken,
}

struct Slot<T> {
    state: Mutex<State<T>>,
    resolved: Condvar,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fill(&self, value: Result<T>) {
        let mut state = self.lock();
        if matches!(*state, State::Pending) {
            *state = State::Ready(value);
            self.resolved.notify_all();
        }
    }

    fn wait_resolved(&self) -> MutexGuard<'_, State<T>> {
        let mut state = self.lock();
        while matches!(*state, State::Pending) {
            state = self
                .resolved
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }
}

/// Producer side of a one-shot result.
pub struct Promise<T> {
    slot: Option<Arc<Slot<T>>>,
}

/// Consumer side of a one-shot result.
pub struct AsyncResult<T> {
    slot: Arc<Slot<T>>,
}

/// Create a connected promise/result pair.
#[must_use]
pub fn promise<T>() -> (Promise<T>, AsyncResult<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(State::Pending),
        resolved: Condvar::new(),
    });
    (
        Promise { slot: Some(Arc::clone(&slot)) },
        AsyncResult { slot },
    )
}

impl<T> Promise<T> {
    /// Resolve the paired [`AsyncResult`] and wake anyone waiting on it.
    pub fn complete(mut self, value: Result<T>) {
        if let Some(slot) = self.slot.take() {
            slot.fill(value);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.fill(Err(SchedulerError::TaskAbandoned.into()));
        }
    }
}

impl<T> AsyncResult<T> {
    /// A result that is already available.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (tx, rx) = promise();
        tx.complete(Ok(value));
        rx
    }

    /// Has the producing task finished, successfully or not?
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(*self.slot.lock(), State::Pending)
    }

    /// Block until the producing task has finished, without taking the value.
    pub fn wait_ready(&self) {
        drop(self.slot.wait_resolved());
    }

    /// Block until the value is available and take it.
    ///
    /// # Errors
    ///
    /// Whatever failure the producing task completed with, or
    /// [`SchedulerError::TaskAbandoned`] if it never completed.
    pub fn wait(self) -> Result<T> {
        let mut state = self.slot.wait_resolved();
        match std::mem::replace(&mut *state, State::Taken) {
            State::Ready(value) => value,
            State::Pending | State::Taken => Err(SchedulerError::TaskAbandoned.into()),
        }
    }
}

impl<T> Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_struct("AsyncResult")
            .field("done", &self.is_done())
            .finish()
    }
}
