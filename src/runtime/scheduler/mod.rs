//! Cooperative task scheduler
//!
//! The [`SchedulerLoop`] runs on a dedicated worker thread. It drives a
//! single-threaded async runtime and admits work from the [`TaskQueue`] until
//! the [`StopSignal`] fires.
//!
//! ```text
//! Starting ──init──▶ Running ──stop──▶ Draining ──▶ Stopped ──teardown──▶ return
//!                     │  ▲
//!                     ▼  │ admit queued items, yield / idle poll_interval
//! ```

pub mod queue;
pub mod task;

pub use queue::{task_queue, TaskQueue, TaskReceiver};
pub use task::{QueuedTask, TaskFuture, TaskHandle, TaskId, TaskIdGenerator, TaskState};

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use tokio::task::{JoinError, JoinHandle, LocalSet};
use tracing::{debug, info, warn};

use crate::runtime::error::{panic_message, LifecycleError};
use crate::util::config::SchedulerConfig;

/// Future produced by a boundary hook; runs on the worker thread only.
pub type HookFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + 'static>>;

type Hook = Box<dyn FnOnce() -> HookFuture + Send + 'static>;

/// Optional initialization and teardown computations.
#[derive(Default)]
pub struct Hooks {
    init: Option<Hook>,
    teardown: Option<Hook>,
}

impl Hooks {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` to completion before any queued work is admitted.
    pub fn on_init<F, Fut>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.init = Some(Box::new(move || Box::pin(hook()) as HookFuture));
        self
    }

    /// Run `hook` after every active task has been cancelled.
    pub fn on_teardown<F, Fut>(
        mut self,
        hook: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.teardown = Some(Box::new(move || Box::pin(hook()) as HookFuture));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("init", &self.init.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Scheduler loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoopPhase {
    /// Created, not yet running.
    Idle,
    /// Running the init hook.
    Starting,
    /// Admitting and driving tasks.
    Running,
    /// Cancelling active tasks.
    Draining,
    /// Running the teardown hook, or finished.
    Stopped,
}

/// Cloneable view of a loop's phase.
#[derive(Debug, Clone)]
pub struct PhaseWatch {
    inner: Arc<(Mutex<LoopPhase>, Condvar)>,
}

impl PhaseWatch {
    fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(LoopPhase::Idle), Condvar::new())),
        }
    }

    #[inline]
    pub fn get(&self) -> LoopPhase {
        *self.inner.0.lock()
    }

    fn set(
        &self,
        phase: LoopPhase,
    ) {
        let (lock, changed) = &*self.inner;
        *lock.lock() = phase;
        changed.notify_all();
        debug!("scheduler phase: {:?}", phase);
    }

    /// Block until the loop has reached `phase` or a later one.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_for(
        &self,
        phase: LoopPhase,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, changed) = &*self.inner;
        let mut current = lock.lock();
        while *current < phase {
            if changed.wait_until(&mut current, deadline).timed_out() {
                return *current >= phase;
            }
        }
        true
    }
}

/// One-shot stop condition shared by the owner side and the loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    triggered: Arc<AtomicBool>,
}

impl StopSignal {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the first trigger.
    #[inline]
    pub fn trigger(&self) -> bool {
        !self.triggered.swap(true, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// Summary of one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Tasks admitted into the active set
    pub admitted: usize,
    /// Active tasks that ended cancelled while draining
    pub cancelled: usize,
    /// Queued tasks never admitted
    pub discarded: usize,
}

struct ActiveTask {
    handle: TaskHandle,
    watcher: JoinHandle<()>,
}

type ActiveSet = Rc<RefCell<IndexMap<TaskId, ActiveTask>>>;

/// The worker-thread scheduler loop.
pub struct SchedulerLoop {
    receiver: TaskReceiver,
    stop: StopSignal,
    poll_interval: Duration,
    hooks: Hooks,
    phase: PhaseWatch,
}

impl SchedulerLoop {
    pub fn new(
        receiver: TaskReceiver,
        stop: StopSignal,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            receiver,
            stop,
            poll_interval: config.poll_interval(),
            hooks: Hooks::default(),
            phase: PhaseWatch::new(),
        }
    }

    /// Replace the boundary hooks.
    pub fn with_hooks(
        mut self,
        hooks: Hooks,
    ) -> Self {
        self.hooks = hooks;
        self
    }

    /// A handle for observing this loop's phase from other threads.
    #[inline]
    pub fn phase_watch(&self) -> PhaseWatch {
        self.phase.clone()
    }

    /// Run the loop on the current thread until stopped.
    pub fn run(self) -> Result<LoopReport, LifecycleError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LifecycleError::Runtime)?;
        let local = LocalSet::new();
        local.block_on(&runtime, self.drive())
    }

    async fn drive(mut self) -> Result<LoopReport, LifecycleError> {
        let Hooks { init, teardown } = std::mem::take(&mut self.hooks);
        let mut report = LoopReport::default();

        self.phase.set(LoopPhase::Starting);
        if let Some(init) = init {
            if let Err(err) = init().await {
                self.phase.set(LoopPhase::Stopped);
                return Err(LifecycleError::Init(err));
            }
        }

        self.phase.set(LoopPhase::Running);
        info!("scheduler running");
        let active: ActiveSet = Rc::default();

        while !self.stop.is_triggered() {
            let mut admitted_any = false;
            while let Some(task) = self.receiver.try_dequeue() {
                if admit(task, &active) {
                    report.admitted += 1;
                    admitted_any = true;
                } else {
                    report.discarded += 1;
                }
            }

            if admitted_any {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        self.phase.set(LoopPhase::Draining);
        let draining = std::mem::take(&mut *active.borrow_mut());
        for task in draining.values() {
            task.handle.cancel();
        }
        for (id, task) in draining {
            if let Err(err) = task.watcher.await {
                warn!("watcher of {} failed: {}", id, err);
            }
            if task.handle.state() == TaskState::Cancelled {
                report.cancelled += 1;
            }
        }
        report.discarded += self.receiver.cancel_pending();

        self.phase.set(LoopPhase::Stopped);
        if let Some(teardown) = teardown {
            teardown().await.map_err(LifecycleError::Teardown)?;
        }

        info!(
            "scheduler stopped: {} admitted, {} cancelled, {} discarded",
            report.admitted, report.cancelled, report.discarded
        );
        Ok(report)
    }
}

impl fmt::Debug for SchedulerLoop {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SchedulerLoop")
            .field("phase", &self.phase.get())
            .field("poll_interval", &self.poll_interval)
            .field("queued", &self.receiver.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Spawn a queued task and its completion watcher onto the local set.
///
/// Returns `false` if the task was cancelled before admission.
fn admit(
    task: QueuedTask,
    active: &ActiveSet,
) -> bool {
    let QueuedTask { handle, future } = task;
    if !handle.begin() {
        debug!("{} cancelled before admission", handle.id());
        return false;
    }

    let id = handle.id();
    let join = tokio::task::spawn_local(future);
    handle.attach(join.abort_handle());

    let watched = handle.clone();
    let registry = Rc::clone(active);
    let watcher = tokio::task::spawn_local(async move {
        let (state, failure) = outcome(join.await);
        match &failure {
            Some(reason) => warn!("{} failed: {}", id, reason),
            None => debug!("{} {}", id, state),
        }
        watched.finish(state, failure);
        registry.borrow_mut().shift_remove(&id);
    });

    active
        .borrow_mut()
        .insert(id, ActiveTask { handle, watcher });
    true
}

fn outcome(result: Result<anyhow::Result<()>, JoinError>) -> (TaskState, Option<String>) {
    match result {
        Ok(Ok(())) => (TaskState::Finished, None),
        Ok(Err(err)) => (TaskState::Failed, Some(format!("{:#}", err))),
        Err(err) if err.is_cancelled() => (TaskState::Cancelled, None),
        Err(err) => match err.try_into_panic() {
            Ok(payload) => (TaskState::Failed, Some(panic_message(&*payload))),
            Err(err) => (TaskState::Failed, Some(err.to_string())),
        },
    }
}

#[cfg(test)]
mod tests;
