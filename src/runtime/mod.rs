//! Runtime system
//!
//! The owner event loop, the cooperative scheduler on the worker thread, and
//! the proxies that carry calls between them.

pub mod bridge;
pub mod error;
pub mod lifecycle;
pub mod owner;
pub mod proxy;
pub mod scheduler;
pub mod value;

pub use bridge::Bridge;
pub use error::{BridgeError, CallError, LifecycleError};
pub use lifecycle::Lifecycle;
pub use owner::{EventLoop, LoopHandle, PendingCall};
pub use proxy::{Access, CallProxy, ObjectProxy, Owned, Proxy};
pub use scheduler::{Hooks, LoopPhase, LoopReport, StopSignal, TaskHandle, TaskState};
