//! Owner-thread event loop
//!
//! The owner thread is the only thread allowed to touch owner-confined state.
//! It runs an [`EventLoop`] that executes zero-argument callbacks one at a time,
//! in the order they were scheduled, until a quit request arrives.
//!
//! [`LoopHandle`] is the cloneable, thread-safe side of the loop. It is the
//! single integration point the rest of the bridge needs from the owner
//! runtime: "run this callback on the owner thread at the next opportunity".
//!
//! ```text
//! worker thread                          owner thread
//! ─────────────                          ────────────
//! call_blocking(f) ──schedule(cb)──────▶ EventLoop::run
//!        │                                   │ cb(): f() → PendingCall::complete
//!        ◀──────────── outcome ──────────────┘
//! ```

pub mod pending;

pub use pending::PendingCall;

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, trace, warn};

use self::pending::Completion;
use crate::runtime::error::{panic_message, BridgeError, CallError};

/// A unit of work for the owner thread.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Callback),
    Close,
    Quit,
}

type CloseHandler = Box<dyn FnMut(&LoopHandle)>;

/// Thread-safe handle to an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    owner: ThreadId,
    commands: Sender<Command>,
    running: Arc<AtomicBool>,
}

impl LoopHandle {
    /// The thread that owns the loop.
    #[inline]
    pub fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    /// Whether the caller is running on the owner thread.
    #[inline]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Whether the loop is currently inside [`EventLoop::run`].
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run `callback` on the owner thread after every callback already
    /// scheduled.
    pub fn schedule<F>(
        &self,
        callback: F,
    ) -> Result<(), BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Command::Run(Box::new(callback)))
    }

    /// Ask the loop to return from [`EventLoop::run`].
    ///
    /// Callbacks scheduled before the request still run.
    pub fn quit(&self) -> Result<(), BridgeError> {
        self.send(Command::Quit)
    }

    /// Deliver a close request to the loop's close handler.
    ///
    /// Without a handler, a close request quits the loop.
    pub fn close(&self) -> Result<(), BridgeError> {
        self.send(Command::Close)
    }

    /// Run `f` on the owner thread and block until it has finished.
    ///
    /// On the owner thread `f` runs inline. Elsewhere the call is marshaled and
    /// the caller waits at most `timeout` (`None` waits indefinitely). A panic
    /// in `f` is captured and returned as [`CallError::Panicked`].
    pub fn call_blocking<T, F>(
        &self,
        label: &str,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, BridgeError> + Send + 'static,
    {
        if self.is_owner_thread() {
            return f();
        }

        let pending = PendingCall::new();
        let completion = Completion::new(Arc::clone(&pending));
        trace!("marshaling `{}` to the owner thread", label);

        self.schedule(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                Err(CallError::Panicked(panic_message(&*payload)).into())
            });
            completion.complete(outcome);
        })?;

        match pending.wait(timeout) {
            Some(outcome) => outcome,
            None => {
                let after = timeout.unwrap_or_default();
                warn!("`{}` did not complete on the owner thread within {:?}", label, after);
                Err(BridgeError::Timeout {
                    target: label.to_string(),
                    after,
                })
            }
        }
    }

    fn send(
        &self,
        command: Command,
    ) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::Unavailable("owner loop has exited"))
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("owner", &self.owner)
            .field("running", &self.is_running())
            .field("pending", &self.commands.len())
            .finish()
    }
}

/// The owner thread's event loop.
///
/// Created on, and confined to, the owner thread.
pub struct EventLoop {
    handle: LoopHandle,
    commands: Receiver<Command>,
    on_close: RefCell<Option<CloseHandler>>,
    _owner_only: PhantomData<Rc<()>>,
}

impl EventLoop {
    /// Create a loop owned by the current thread.
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            handle: LoopHandle {
                owner: thread::current().id(),
                commands: tx,
                running: Arc::new(AtomicBool::new(false)),
            },
            commands: rx,
            on_close: RefCell::new(None),
            _owner_only: PhantomData,
        }
    }

    /// A handle for scheduling onto this loop from any thread.
    #[inline]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Install the close handler, replacing any previous one.
    pub fn on_close<F>(
        &self,
        handler: F,
    ) where
        F: FnMut(&LoopHandle) + 'static,
    {
        *self.on_close.borrow_mut() = Some(Box::new(handler));
    }

    /// Process callbacks until a quit request arrives.
    ///
    /// Returns the number of callbacks executed. A panicking callback or close
    /// handler is logged and does not stop the loop. Callbacks still queued
    /// when the loop returns are dropped, and later scheduling fails with
    /// [`BridgeError::Unavailable`].
    pub fn run(self) -> usize {
        self.handle.running.store(true, Ordering::SeqCst);
        debug!("owner loop started");

        let mut executed = 0;
        for command in self.commands.iter() {
            match command {
                Command::Run(callback) => {
                    executed += 1;
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                        error!(
                            "owner loop callback panicked: {}",
                            panic_message(&*payload)
                        );
                    }
                }
                Command::Close => match self.on_close.borrow_mut().as_mut() {
                    Some(handler) => {
                        let handle = &self.handle;
                        let closed = panic::catch_unwind(AssertUnwindSafe(|| handler(handle)));
                        if let Err(payload) = closed {
                            error!("close handler panicked: {}", panic_message(&*payload));
                        }
                    }
                    None => break,
                },
                Command::Quit => break,
            }
        }

        self.handle.running.store(false, Ordering::SeqCst);
        let discarded = self.commands.try_iter().count();
        debug!(
            "owner loop stopped after {} callbacks ({} discarded)",
            executed, discarded
        );
        executed
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Dropping queued callbacks releases any caller blocked on them.
        for _ in self.commands.try_iter() {}
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("handle", &self.handle)
            .finish()
    }
}
