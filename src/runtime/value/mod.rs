//! Values and the dynamic object model
//!
//! Everything a proxy can see of an owner-thread object graph is expressed in
//! these types.

pub mod object;
pub mod runtime_value;

pub use object::{native_fn, Callable, Member, NativeFn, Namespace, Object};
pub use runtime_value::{Args, Kwargs, Value};
