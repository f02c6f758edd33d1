//! One-shot result handoff for marshaled calls

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::runtime::error::BridgeError;

enum Slot<T> {
    Waiting,
    Ready(Result<T, BridgeError>),
    Taken,
}

/// State of one in-flight cross-thread call.
///
/// Written once by the owner thread, read once by the calling thread.
pub struct PendingCall<T> {
    slot: Mutex<Slot<T>>,
    done: Condvar,
}

impl<T> PendingCall<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot::Waiting),
            done: Condvar::new(),
        })
    }

    /// Store the outcome and release the waiter.
    ///
    /// Returns `false` if the call was already completed; the outcome is then
    /// discarded.
    pub fn complete(
        &self,
        outcome: Result<T, BridgeError>,
    ) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Waiting) {
            return false;
        }
        *slot = Slot::Ready(outcome);
        self.done.notify_all();
        true
    }

    /// Whether an outcome has been stored (taken or not).
    pub fn is_complete(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Waiting)
    }

    /// Block until the outcome is available and take it.
    ///
    /// Returns `None` when `timeout` elapses first, or when the outcome was
    /// already taken.
    pub fn wait(
        &self,
        timeout: Option<Duration>,
    ) -> Option<Result<T, BridgeError>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.slot.lock();
        loop {
            match mem::replace(&mut *slot, Slot::Taken) {
                Slot::Ready(outcome) => return Some(outcome),
                Slot::Taken => return None,
                Slot::Waiting => *slot = Slot::Waiting,
            }
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut slot, deadline).timed_out()
                        && matches!(*slot, Slot::Waiting)
                    {
                        return None;
                    }
                }
                None => self.done.wait(&mut slot),
            }
        }
    }
}

/// Completes a [`PendingCall`] exactly once.
///
/// Dropping the guard without completing it (the callback was discarded before
/// it ran) completes the call as unavailable, so a waiter is never stranded.
pub(crate) struct Completion<T> {
    call: Option<Arc<PendingCall<T>>>,
}

impl<T> Completion<T> {
    pub(crate) fn new(call: Arc<PendingCall<T>>) -> Self {
        Self { call: Some(call) }
    }

    pub(crate) fn complete(
        mut self,
        outcome: Result<T, BridgeError>,
    ) {
        if let Some(call) = self.call.take() {
            call.complete(outcome);
        }
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            call.complete(Err(BridgeError::Unavailable(
                "owner loop discarded the call before running it",
            )));
        }
    }
}
