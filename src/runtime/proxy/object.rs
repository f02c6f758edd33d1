//! Object proxy: chained member access across the thread boundary

use std::fmt;
use std::sync::Arc;

use super::call::CallProxy;
use crate::runtime::error::BridgeError;
use crate::runtime::owner::LoopHandle;
use crate::runtime::value::{Args, Kwargs, Member, Object, Value};
use crate::util::config::{LookupPolicy, ProxyConfig};

/// Stand-in for a non-callable object owned by the owner thread.
///
/// Member access never invokes anything on the real object from the calling
/// thread: callables come back as [`CallProxy`], everything else as another
/// `ObjectProxy`. How the member reference itself is fetched depends on the
/// configured [`LookupPolicy`].
#[derive(Clone)]
pub struct ObjectProxy {
    target: Arc<dyn Object>,
    owner: LoopHandle,
    config: Arc<ProxyConfig>,
}

impl ObjectProxy {
    pub fn new(
        target: Arc<dyn Object>,
        owner: LoopHandle,
        config: Arc<ProxyConfig>,
    ) -> Self {
        Self {
            target,
            owner,
            config,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        self.target.type_name()
    }

    /// Resolve an attribute.
    pub fn get(
        &self,
        name: &str,
    ) -> Result<Proxy, BridgeError> {
        let key = name.to_string();
        let label = format!("{}.{}", self.type_name(), name);
        let member = self.resolve(&label, move |obj| obj.get(&key))?;

        member
            .map(|member| self.wrap(member))
            .ok_or_else(|| BridgeError::NoSuchMember {
                type_name: self.type_name().to_string(),
                name: name.to_string(),
            })
    }

    /// Resolve an item.
    pub fn get_item(
        &self,
        key: impl Into<Value>,
    ) -> Result<Proxy, BridgeError> {
        let key = key.into();
        let label = format!("{}[{}]", self.type_name(), key);
        let lookup_key = key.clone();
        let member = self.resolve(&label, move |obj| obj.get_item(&lookup_key))?;

        member
            .map(|member| self.wrap(member))
            .ok_or_else(|| BridgeError::NoSuchItem {
                type_name: self.type_name().to_string(),
                key: key.to_string(),
            })
    }

    /// Copy of the target if it is plain data.
    pub fn value(&self) -> Result<Option<Value>, BridgeError> {
        let label = format!("{}.value", self.type_name());
        self.resolve(&label, |obj| obj.as_value())
    }

    /// Wrap a member resolved from this proxy's target.
    pub fn wrap(
        &self,
        member: Member,
    ) -> Proxy {
        match member {
            Member::Callable(target) => Proxy::Call(
                CallProxy::new(target, self.owner.clone()).with_timeout(self.config.call_timeout()),
            ),
            Member::Object(target) => Proxy::Object(ObjectProxy::new(
                target,
                self.owner.clone(),
                Arc::clone(&self.config),
            )),
        }
    }

    fn resolve<T, F>(
        &self,
        label: &str,
        lookup: F,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Object) -> T + Send + 'static,
    {
        match self.config.lookup {
            LookupPolicy::Caller => Ok(lookup(self.target.as_ref())),
            LookupPolicy::Owner => {
                let target = Arc::clone(&self.target);
                self.owner
                    .call_blocking(label, self.config.call_timeout(), move || {
                        Ok(lookup(target.as_ref()))
                    })
            }
        }
    }
}

impl fmt::Debug for ObjectProxy {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("target", &self.target.type_name())
            .field("lookup", &self.config.lookup)
            .finish()
    }
}

/// Either kind of proxy, as produced by member access.
#[derive(Debug, Clone)]
pub enum Proxy {
    Call(CallProxy),
    Object(ObjectProxy),
}

impl Proxy {
    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(self, Proxy::Call(_))
    }

    pub fn as_call(&self) -> Option<&CallProxy> {
        match self {
            Proxy::Call(call) => Some(call),
            Proxy::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectProxy> {
        match self {
            Proxy::Object(object) => Some(object),
            Proxy::Call(_) => None,
        }
    }

    /// Resolve an attribute of an object proxy.
    pub fn get(
        &self,
        name: &str,
    ) -> Result<Proxy, BridgeError> {
        match self {
            Proxy::Object(object) => object.get(name),
            Proxy::Call(call) => Err(BridgeError::NotAnObject(call.name().to_string())),
        }
    }

    /// Resolve an item of an object proxy.
    pub fn get_item(
        &self,
        key: impl Into<Value>,
    ) -> Result<Proxy, BridgeError> {
        match self {
            Proxy::Object(object) => object.get_item(key),
            Proxy::Call(call) => Err(BridgeError::NotAnObject(call.name().to_string())),
        }
    }

    /// Invoke a call proxy.
    pub fn invoke(
        &self,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, BridgeError> {
        match self {
            Proxy::Call(call) => call.invoke(args, kwargs),
            Proxy::Object(object) => Err(BridgeError::NotCallable(object.type_name().to_string())),
        }
    }

    #[inline]
    pub fn call(
        &self,
        args: Args,
    ) -> Result<Value, BridgeError> {
        self.invoke(args, Kwargs::new())
    }

    /// Copy of an object proxy's plain-data target.
    pub fn value(&self) -> Result<Option<Value>, BridgeError> {
        match self {
            Proxy::Object(object) => object.value(),
            Proxy::Call(call) => Err(BridgeError::NotAnObject(call.name().to_string())),
        }
    }
}
