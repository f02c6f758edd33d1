//! Call proxy: a callable that always runs on the owner thread

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::error::BridgeError;
use crate::runtime::owner::LoopHandle;
use crate::runtime::value::{Args, Callable, Kwargs, Value};

/// Stand-in for a callable owned by the owner thread.
///
/// Invoking it from the owner thread calls the target directly. From any other
/// thread the invocation is marshaled and the caller blocks until the owner
/// thread has run the target exactly once, or until the timeout expires.
#[derive(Clone)]
pub struct CallProxy {
    target: Arc<dyn Callable>,
    owner: LoopHandle,
    timeout: Option<Duration>,
}

impl CallProxy {
    /// Proxy `target` onto the loop behind `owner`, waiting indefinitely.
    pub fn new(
        target: Arc<dyn Callable>,
        owner: LoopHandle,
    ) -> Self {
        Self {
            target,
            owner,
            timeout: None,
        }
    }

    /// Bound how long a foreign caller waits for the owner thread.
    pub fn with_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.target.name()
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Invoke the target with positional and keyword arguments.
    pub fn invoke(
        &self,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, BridgeError> {
        let target = Arc::clone(&self.target);
        self.owner.call_blocking(self.target.name(), self.timeout, move || {
            target.call(args, kwargs).map_err(BridgeError::from)
        })
    }

    /// Invoke with positional arguments only.
    #[inline]
    pub fn call(
        &self,
        args: Args,
    ) -> Result<Value, BridgeError> {
        self.invoke(args, Kwargs::new())
    }
}

impl fmt::Debug for CallProxy {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CallProxy")
            .field("target", &self.target.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
