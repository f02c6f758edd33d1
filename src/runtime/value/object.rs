//! Duck-typed object model
//!
//! Proxies know nothing about the shape of the objects they wrap. Anything that
//! can answer "what is your member called `name`?" implements [`Object`], and
//! anything that can be invoked with positional and keyword arguments
//! implements [`Callable`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::runtime_value::{Args, Kwargs, Value};
use crate::runtime::error::CallError;

/// An invocable member.
pub trait Callable: Send + Sync {
    /// Invoke with positional and keyword arguments.
    fn call(
        &self,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, CallError>;

    /// Name used in logs and errors.
    fn name(&self) -> &str {
        "<callable>"
    }
}

/// An object whose members can be looked up by name or key.
///
/// Lookup must only fetch references: invoking anything happens through the
/// returned [`Member`].
pub trait Object: Send + Sync {
    /// Type name used in logs and errors.
    fn type_name(&self) -> &str;

    /// Resolve an attribute.
    fn get(
        &self,
        name: &str,
    ) -> Option<Member>;

    /// Resolve an item (`obj[key]`).
    fn get_item(
        &self,
        _key: &Value,
    ) -> Option<Member> {
        None
    }

    /// Copy of the object if it is plain data.
    fn as_value(&self) -> Option<Value> {
        None
    }
}

/// A resolved member.
#[derive(Clone)]
pub enum Member {
    /// Non-callable member
    Object(Arc<dyn Object>),
    /// Callable member
    Callable(Arc<dyn Callable>),
}

impl Member {
    /// Wrap plain data as a member.
    pub fn value(value: impl Into<Value>) -> Self {
        Member::Object(Arc::new(value.into()))
    }

    /// Wrap an object as a member.
    pub fn object(object: impl Object + 'static) -> Self {
        Member::Object(Arc::new(object))
    }

    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(self, Member::Callable(_))
    }

    /// Name of the member's type or callable.
    pub fn describe(&self) -> String {
        match self {
            Member::Object(obj) => obj.type_name().to_string(),
            Member::Callable(func) => func.name().to_string(),
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Member::Object(obj) => f.debug_tuple("Object").field(&obj.type_name()).finish(),
            Member::Callable(func) => f.debug_tuple("Callable").field(&func.name()).finish(),
        }
    }
}

impl Object for Value {
    fn type_name(&self) -> &str {
        Value::type_name(self)
    }

    fn get(
        &self,
        name: &str,
    ) -> Option<Member> {
        match name {
            "len" => self.len().map(Member::value),
            _ => None,
        }
    }

    fn get_item(
        &self,
        key: &Value,
    ) -> Option<Member> {
        let index = key.as_int()?;
        self.index(index).cloned().map(Member::value)
    }

    fn as_value(&self) -> Option<Value> {
        Some(self.clone())
    }
}

type NativeBody = dyn Fn(Args, Kwargs) -> Result<Value, CallError> + Send + Sync;

/// A callable backed by a Rust closure.
pub struct NativeFn {
    name: String,
    body: Box<NativeBody>,
}

impl NativeFn {
    pub fn new<F>(
        name: impl Into<String>,
        body: F,
    ) -> Self
    where
        F: Fn(Args, Kwargs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl Callable for NativeFn {
    fn call(
        &self,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, CallError> {
        (self.body)(args, kwargs)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

/// Shorthand for an `Arc`'d [`NativeFn`].
pub fn native_fn<F>(
    name: impl Into<String>,
    body: F,
) -> Arc<dyn Callable>
where
    F: Fn(Args, Kwargs) -> Result<Value, CallError> + Send + Sync + 'static,
{
    Arc::new(NativeFn::new(name, body))
}

/// A generic object assembled from named members at runtime.
///
/// String keys passed to `get_item` resolve like attributes.
pub struct Namespace {
    type_name: String,
    members: RwLock<IndexMap<String, Member>>,
}

impl Namespace {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: RwLock::new(IndexMap::new()),
        }
    }

    /// Add a plain data attribute.
    pub fn with_value(
        self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set(name, Member::value(value));
        self
    }

    /// Add a nested object.
    pub fn with_object(
        self,
        name: impl Into<String>,
        object: impl Object + 'static,
    ) -> Self {
        self.set(name, Member::object(object));
        self
    }

    /// Add a method.
    pub fn with_method<F>(
        self,
        name: impl Into<String>,
        body: F,
    ) -> Self
    where
        F: Fn(Args, Kwargs) -> Result<Value, CallError> + Send + Sync + 'static,
    {
        let name = name.into();
        let method = native_fn(format!("{}.{}", self.type_name, name), body);
        self.set(name, Member::Callable(method));
        self
    }

    /// Insert or replace a member.
    pub fn set(
        &self,
        name: impl Into<String>,
        member: Member,
    ) {
        self.members.write().insert(name.into(), member);
    }

    /// Remove a member, returning it.
    pub fn remove(
        &self,
        name: &str,
    ) -> Option<Member> {
        self.members.write().shift_remove(name)
    }

    /// Member names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }
}

impl Object for Namespace {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get(
        &self,
        name: &str,
    ) -> Option<Member> {
        self.members.read().get(name).cloned()
    }

    fn get_item(
        &self,
        key: &Value,
    ) -> Option<Member> {
        key.as_str().and_then(|name| self.get(name))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("type_name", &self.type_name)
            .field("members", &self.names())
            .finish()
    }
}
