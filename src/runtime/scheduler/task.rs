//! Task definitions for the scheduler.
//!
//! A task is an unstarted future plus the [`TaskHandle`] through which every
//! other thread observes it. The handle is created at enqueue time and lives on
//! after the scheduler has dropped the future.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::task::AbortHandle;

/// Body of a tracked task.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

type Listener = Box<dyn FnOnce(TaskState) + Send + 'static>;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Enqueued, not yet admitted by the scheduler.
    Queued,
    /// Admitted and being driven by the scheduler.
    Running,
    /// Completed successfully.
    Finished,
    /// Returned an error or panicked.
    Failed,
    /// Cancelled before admission or aborted while running.
    Cancelled,
}

impl TaskState {
    /// Whether the state is final.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Thread-safe task ID source, monotonic from 0.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next_id: AtomicUsize,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

struct Status {
    state: TaskState,
    failure: Option<String>,
    abort: Option<AbortHandle>,
    listeners: Vec<Listener>,
}

struct Shared {
    id: TaskId,
    status: Mutex<Status>,
    done: Condvar,
    cancel_requested: AtomicBool,
}

/// Observable side of a tracked task.
///
/// Cloneable and usable from any thread.
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<Shared>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                status: Mutex::new(Status {
                    state: TaskState::Queued,
                    failure: None,
                    abort: None,
                    listeners: Vec::new(),
                }),
                done: Condvar::new(),
                cancel_requested: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.shared.status.lock().state
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Error chain or panic message of a failed task.
    pub fn failure(&self) -> Option<String> {
        self.shared.status.lock().failure.clone()
    }

    #[inline]
    pub fn is_cancel_requested(&self) -> bool {
        self.shared.cancel_requested.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// A queued task is cancelled at once and never runs. A running task is
    /// aborted at its next suspension point. Returns `false` if the task had
    /// already reached a terminal state.
    pub fn cancel(&self) -> bool {
        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        let status = self.shared.status.lock();
        match status.state {
            TaskState::Queued => {
                self.complete_locked(status, TaskState::Cancelled, None);
                true
            }
            TaskState::Running => {
                if let Some(abort) = &status.abort {
                    abort.abort();
                }
                true
            }
            _ => false,
        }
    }

    /// Block until the task reaches a terminal state.
    ///
    /// Returns `None` if `timeout` elapses first.
    pub fn wait(
        &self,
        timeout: Option<Duration>,
    ) -> Option<TaskState> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut status = self.shared.status.lock();
        while !status.state.is_terminal() {
            match deadline {
                Some(deadline) => {
                    if self.shared.done.wait_until(&mut status, deadline).timed_out() {
                        return status.state.is_terminal().then_some(status.state);
                    }
                }
                None => self.shared.done.wait(&mut status),
            }
        }
        Some(status.state)
    }

    /// Run `listener` once with the terminal state.
    ///
    /// Runs immediately on the calling thread if the task is already done,
    /// otherwise on whichever thread completes the task.
    pub fn on_complete<F>(
        &self,
        listener: F,
    ) where
        F: FnOnce(TaskState) + Send + 'static,
    {
        let mut status = self.shared.status.lock();
        if status.state.is_terminal() {
            let state = status.state;
            drop(status);
            listener(state);
        } else {
            status.listeners.push(Box::new(listener));
        }
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn completion(&self) -> TaskState {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.on_complete(move |state| {
            let _ = tx.send(state);
        });
        rx.await.unwrap_or(TaskState::Cancelled)
    }

    /// Move a queued task to `Running`. Fails if it was cancelled first.
    pub(crate) fn begin(&self) -> bool {
        let mut status = self.shared.status.lock();
        if status.state != TaskState::Queued {
            return false;
        }
        status.state = TaskState::Running;
        true
    }

    /// Attach the abort handle of the spawned future.
    pub(crate) fn attach(
        &self,
        abort: AbortHandle,
    ) {
        let mut status = self.shared.status.lock();
        if self.is_cancel_requested() {
            abort.abort();
        }
        status.abort = Some(abort);
    }

    /// Record the terminal state. Only the first call has an effect.
    pub(crate) fn finish(
        &self,
        state: TaskState,
        failure: Option<String>,
    ) -> bool {
        let status = self.shared.status.lock();
        if status.state.is_terminal() {
            return false;
        }
        self.complete_locked(status, state, failure);
        true
    }

    fn complete_locked(
        &self,
        mut status: parking_lot::MutexGuard<'_, Status>,
        state: TaskState,
        failure: Option<String>,
    ) {
        status.state = state;
        status.failure = failure;
        status.abort = None;
        let listeners = std::mem::take(&mut status.listeners);
        drop(status);

        self.shared.done.notify_all();
        for listener in listeners {
            listener(state);
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

/// A task waiting in the queue.
pub struct QueuedTask {
    pub(crate) handle: TaskHandle,
    pub(crate) future: TaskFuture,
}

impl QueuedTask {
    #[inline]
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    #[inline]
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }
}

impl fmt::Debug for QueuedTask {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}
