//! Bridge context
//!
//! One cloneable value carrying everything the rest of the program needs to
//! cross the thread boundary: the task queue producer, the owner loop handle and
//! the effective configuration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::runtime::error::BridgeError;
use crate::runtime::owner::LoopHandle;
use crate::runtime::proxy::{CallProxy, ObjectProxy, Owned};
use crate::runtime::scheduler::{TaskHandle, TaskQueue};
use crate::runtime::value::{Callable, Object};
use crate::util::config::{BridgeConfig, ProxyConfig};

struct BridgeInner {
    queue: TaskQueue,
    owner: LoopHandle,
    config: BridgeConfig,
    proxy: Arc<ProxyConfig>,
}

/// Shared entry point to the owner thread and the scheduler.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    pub fn new(
        queue: TaskQueue,
        owner: LoopHandle,
        config: BridgeConfig,
    ) -> Self {
        let proxy = Arc::new(config.proxy.clone());
        Self {
            inner: Arc::new(BridgeInner {
                queue,
                owner,
                config,
                proxy,
            }),
        }
    }

    /// Run `future` as a tracked task on the scheduler thread.
    ///
    /// Callable from any thread; never blocks.
    pub fn spawn<F>(
        &self,
        future: F,
    ) -> TaskHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.queue.enqueue(future)
    }

    #[inline]
    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    #[inline]
    pub fn owner(&self) -> &LoopHandle {
        &self.inner.owner
    }

    #[inline]
    pub fn is_owner_thread(&self) -> bool {
        self.inner.owner.is_owner_thread()
    }

    #[inline]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Run `f` on the owner thread and wait for it, bounded by the configured
    /// call timeout.
    pub fn run_on_owner<T, F>(
        &self,
        label: &str,
        f: F,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.inner
            .owner
            .call_blocking(label, self.inner.proxy.call_timeout(), move || Ok(f()))
    }

    pub fn call_proxy(
        &self,
        target: Arc<dyn Callable>,
    ) -> CallProxy {
        CallProxy::new(target, self.inner.owner.clone()).with_timeout(self.inner.proxy.call_timeout())
    }

    /// Proxy `target` unconditionally. Used from the owner thread, the
    /// proxy's calls and lookups run inline.
    pub fn object_proxy(
        &self,
        target: Arc<dyn Object>,
    ) -> ObjectProxy {
        ObjectProxy::new(target, self.inner.owner.clone(), Arc::clone(&self.inner.proxy))
    }

    /// Put `object` behind an owner facade.
    pub fn own<T: Object + 'static>(
        &self,
        object: T,
    ) -> Owned<T> {
        self.own_arc(Arc::new(object))
    }

    pub fn own_arc<T: Object + 'static>(
        &self,
        object: Arc<T>,
    ) -> Owned<T> {
        Owned::from_arc(object, self.inner.owner.clone(), Arc::clone(&self.inner.proxy))
    }
}

impl fmt::Debug for Bridge {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("owner", &self.inner.owner)
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}
