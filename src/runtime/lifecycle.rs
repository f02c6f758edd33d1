//! Lifecycle coordinator
//!
//! Ties the owner event loop and the scheduler thread together:
//!
//! 1. start the scheduler loop on its own thread
//! 2. block the owner thread in the event loop
//! 3. once the event loop returns, fire the stop signal and join the worker
//!
//! If the worker exits on its own (init failure, panic) it asks the owner loop
//! to quit, so a failed start never leaves the owner thread running blind.

use std::fmt;
use std::thread;

use tracing::{debug, error, info};

use crate::runtime::bridge::Bridge;
use crate::runtime::error::{panic_message, LifecycleError};
use crate::runtime::owner::{EventLoop, LoopHandle};
use crate::runtime::scheduler::{task_queue, Hooks, LoopReport, PhaseWatch, SchedulerLoop, StopSignal};
use crate::util::config::BridgeConfig;

/// Owns both halves of the bridge until [`Lifecycle::run`].
pub struct Lifecycle {
    event_loop: EventLoop,
    scheduler: SchedulerLoop,
    stop: StopSignal,
    bridge: Bridge,
    thread_name: String,
}

impl Lifecycle {
    /// Set up the bridge. Must be called on the thread that will own the
    /// event loop.
    pub fn new(config: BridgeConfig) -> Self {
        let event_loop = EventLoop::new();
        let (queue, receiver) = task_queue();
        let stop = StopSignal::new();
        let scheduler = SchedulerLoop::new(receiver, stop.clone(), &config.scheduler);
        let thread_name = config.scheduler.thread_name.clone();
        let bridge = Bridge::new(queue, event_loop.handle(), config);

        Self {
            event_loop,
            scheduler,
            stop,
            bridge,
            thread_name,
        }
    }

    #[inline]
    pub fn bridge(&self) -> Bridge {
        self.bridge.clone()
    }

    /// The owner event loop, e.g. to install a close handler.
    #[inline]
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    #[inline]
    pub fn phase_watch(&self) -> PhaseWatch {
        self.scheduler.phase_watch()
    }

    #[inline]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run until the owner loop exits and the scheduler has shut down.
    pub fn run(
        self,
        hooks: Hooks,
    ) -> Result<LoopReport, LifecycleError> {
        let Lifecycle {
            event_loop,
            scheduler,
            stop,
            bridge,
            thread_name,
        } = self;
        drop(bridge);

        let scheduler = scheduler.with_hooks(hooks);
        let guard = QuitOnExit {
            owner: event_loop.handle(),
            stop: stop.clone(),
        };
        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let _guard = guard;
                scheduler.run()
            })
            .map_err(LifecycleError::Spawn)?;

        info!("owner loop entering run");
        let executed = event_loop.run();
        debug!("owner loop executed {} callbacks", executed);

        if stop.trigger() {
            debug!("stop signal sent to the scheduler");
        }

        match worker.join() {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("scheduler thread panicked: {}", message);
                Err(LifecycleError::Panicked(message))
            }
        }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("bridge", &self.bridge)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Quits the owner loop if the worker exits before being told to stop.
struct QuitOnExit {
    owner: LoopHandle,
    stop: StopSignal,
}

impl Drop for QuitOnExit {
    fn drop(&mut self) {
        if !self.stop.is_triggered() {
            error!("scheduler exited before shutdown; quitting the owner loop");
            let _ = self.owner.quit();
        }
    }
}
