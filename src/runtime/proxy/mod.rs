//! Cross-thread proxies
//!
//! - [`CallProxy`] marshals one invocation to the owner thread and blocks
//!   until it finishes.
//! - [`ObjectProxy`] resolves members of an owner object lazily, producing
//!   further proxies to any depth.
//! - [`Owned`] is the per-access gate that hands out real members on the owner
//!   thread and proxies everywhere else.

pub mod call;
pub mod facade;
pub mod object;

pub use call::CallProxy;
pub use facade::{Access, Owned};
pub use object::{ObjectProxy, Proxy};

#[cfg(test)]
mod tests;
