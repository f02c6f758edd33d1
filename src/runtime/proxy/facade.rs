//! Owner facade: thread-aware access to an owner-confined object

use std::fmt;
use std::sync::Arc;

use super::object::{ObjectProxy, Proxy};
use crate::runtime::error::BridgeError;
use crate::runtime::owner::LoopHandle;
use crate::runtime::value::{Args, Callable, Kwargs, Member, Object, Value};
use crate::util::config::ProxyConfig;

/// Wraps an object that lives on the owner thread.
///
/// Every member access checks the current thread. The owner thread gets the
/// real member; any other thread gets a proxy, except for the configured
/// bypass members (the scheduling primitives the bridge itself is built from).
pub struct Owned<T> {
    inner: Arc<T>,
    owner: LoopHandle,
    config: Arc<ProxyConfig>,
}

impl<T> Clone for Owned<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            owner: self.owner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Object + 'static> Owned<T> {
    pub fn new(
        inner: T,
        owner: LoopHandle,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self::from_arc(Arc::new(inner), owner, config)
    }

    pub fn from_arc(
        inner: Arc<T>,
        owner: LoopHandle,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self {
            inner,
            owner,
            config,
        }
    }

    #[inline]
    pub fn is_owner_thread(&self) -> bool {
        self.owner.is_owner_thread()
    }

    /// The real object, available on the owner thread only.
    pub fn get_ref(&self) -> Option<&T> {
        if self.is_owner_thread() {
            Some(self.inner.as_ref())
        } else {
            None
        }
    }

    /// Resolve an attribute for the current thread.
    pub fn member(
        &self,
        name: &str,
    ) -> Result<Access, BridgeError> {
        if self.is_owner_thread() || self.config.is_bypassed(name) {
            return self
                .inner
                .get(name)
                .map(Access::Direct)
                .ok_or_else(|| BridgeError::NoSuchMember {
                    type_name: self.inner.type_name().to_string(),
                    name: name.to_string(),
                });
        }
        self.proxy().get(name).map(Access::Proxied)
    }

    /// Resolve an item for the current thread.
    pub fn item(
        &self,
        key: impl Into<Value>,
    ) -> Result<Access, BridgeError> {
        let key = key.into();
        if self.is_owner_thread() {
            return self
                .inner
                .get_item(&key)
                .map(Access::Direct)
                .ok_or_else(|| BridgeError::NoSuchItem {
                    type_name: self.inner.type_name().to_string(),
                    key: key.to_string(),
                });
        }
        self.proxy().get_item(key).map(Access::Proxied)
    }

    /// Resolve and invoke a method on whichever path applies.
    pub fn call(
        &self,
        name: &str,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, BridgeError> {
        self.member(name)?.invoke(args, kwargs)
    }

    /// An explicit proxy over the whole object.
    ///
    /// Unlike [`Owned::member`] this builds a proxy on every thread. On the
    /// owner thread its calls and lookups run inline, so it behaves like
    /// direct access.
    pub fn proxy(&self) -> ObjectProxy {
        let target: Arc<dyn Object> = self.inner.clone();
        ObjectProxy::new(target, self.owner.clone(), Arc::clone(&self.config))
    }
}

impl<T: Object> fmt::Debug for Owned<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Owned")
            .field("type_name", &self.inner.type_name())
            .field("owner", &self.owner.owner_thread())
            .finish()
    }
}

/// Result of a facade member access.
#[derive(Debug, Clone)]
pub enum Access {
    /// The real member (owner thread, or a bypass member)
    Direct(Member),
    /// A proxy for the member (any other thread)
    Proxied(Proxy),
}

impl Access {
    #[inline]
    pub fn is_proxied(&self) -> bool {
        matches!(self, Access::Proxied(_))
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Access::Direct(member) => member.is_callable(),
            Access::Proxied(proxy) => proxy.is_callable(),
        }
    }

    /// Invoke the member.
    pub fn invoke(
        &self,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, BridgeError> {
        match self {
            Access::Direct(Member::Callable(func)) => func.call(args, kwargs).map_err(BridgeError::from),
            Access::Direct(Member::Object(obj)) => Err(BridgeError::NotCallable(obj.type_name().to_string())),
            Access::Proxied(proxy) => proxy.invoke(args, kwargs),
        }
    }

    #[inline]
    pub fn call(
        &self,
        args: Args,
    ) -> Result<Value, BridgeError> {
        self.invoke(args, Kwargs::new())
    }

    /// Resolve a nested attribute, staying on the same path.
    pub fn get(
        &self,
        name: &str,
    ) -> Result<Access, BridgeError> {
        match self {
            Access::Direct(Member::Object(obj)) => {
                obj.get(name)
                    .map(Access::Direct)
                    .ok_or_else(|| BridgeError::NoSuchMember {
                        type_name: obj.type_name().to_string(),
                        name: name.to_string(),
                    })
            }
            Access::Direct(Member::Callable(func)) => Err(BridgeError::NotAnObject(func.name().to_string())),
            Access::Proxied(proxy) => proxy.get(name).map(Access::Proxied),
        }
    }

    /// Copy of a plain-data member.
    pub fn value(&self) -> Result<Option<Value>, BridgeError> {
        match self {
            Access::Direct(Member::Object(obj)) => Ok(obj.as_value()),
            Access::Direct(Member::Callable(func)) => Err(BridgeError::NotAnObject(func.name().to_string())),
            Access::Proxied(proxy) => proxy.value(),
        }
    }
}
