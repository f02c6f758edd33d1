//! Owner Bridge
//!
//! Marshals calls from background tasks onto a single owner thread.
//!
//! Some state may only be touched from the thread that created it (a GUI
//! toolkit's main thread is the classic case). This crate runs a cooperative
//! task scheduler on a worker thread and gives its tasks proxies for
//! owner-confined objects: every call through a proxy is executed on the owner
//! thread while the task blocks for the result.
//!
//! # Example
//!
//! ```no_run
//! use owner_bridge::runtime::{Hooks, Lifecycle};
//! use owner_bridge::runtime::value::{native_fn, Value};
//! use owner_bridge::util::config::BridgeConfig;
//! use owner_bridge::args;
//!
//! fn main() -> anyhow::Result<()> {
//!     let lifecycle = Lifecycle::new(BridgeConfig::default());
//!     let bridge = lifecycle.bridge();
//!     let answer = bridge.call_proxy(native_fn("answer", |_, _| Ok(Value::Int(42))));
//!     let quit = bridge.owner().clone();
//!
//!     bridge.spawn(async move {
//!         assert_eq!(answer.call(args![])?, Value::Int(42));
//!         quit.quit()?;
//!         Ok(())
//!     });
//!     lifecycle.run(Hooks::new())?;
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod demo;
pub mod runtime;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::{Bridge, BridgeError, CallError, Lifecycle, LifecycleError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "owner-bridge";
