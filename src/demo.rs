//! Headless demo application
//!
//! An owner-confined widget tree (status label, counter label, button) driven
//! from tracked tasks on the scheduler thread:
//!
//! - the init hook starts a counter task that updates the counter label every
//!   interval and quits the application after the requested number of ticks
//! - a simulated button click starts a task that reports progress on the status
//!   label
//! - the teardown hook cancels the counter task and waits for it

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::runtime::error::CallError;
use crate::runtime::owner::LoopHandle;
use crate::runtime::proxy::Owned;
use crate::runtime::scheduler::{Hooks, LoopReport, TaskHandle, TaskState};
use crate::runtime::value::{native_fn, Args, Callable, Kwargs, Member, Namespace, Object, Value};
use crate::runtime::{Bridge, Lifecycle};
use crate::util::config::BridgeConfig;
use crate::{args, kwargs};

/// A text label. Its text may only change on the owner thread.
pub struct Label {
    text: Arc<Mutex<String>>,
    configure: Arc<dyn Callable>,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        let text = Arc::new(Mutex::new(text.into()));
        let target = Arc::clone(&text);
        let configure = native_fn("Label.configure", move |args: Args, kwargs: Kwargs| {
            if !args.is_empty() {
                return Err(CallError::Arity {
                    expected: 0,
                    found: args.len(),
                });
            }
            for (key, value) in kwargs {
                match key.as_str() {
                    "text" => *target.lock() = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()),
                    _ => return Err(CallError::UnknownKeyword(key)),
                }
            }
            Ok(Value::Unit)
        });
        Self { text, configure }
    }

    pub fn text(&self) -> String {
        self.text.lock().clone()
    }
}

impl Object for Label {
    fn type_name(&self) -> &str {
        "Label"
    }

    fn get(
        &self,
        name: &str,
    ) -> Option<Member> {
        match name {
            "text" => Some(Member::value(self.text())),
            "configure" => Some(Member::Callable(Arc::clone(&self.configure))),
            _ => None,
        }
    }
}

impl fmt::Debug for Label {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Label").field("text", &self.text()).finish()
    }
}

/// Demo parameters.
#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    /// Counter updates before the application quits
    pub ticks: u32,
    /// Delay between counter updates
    pub interval: Duration,
    /// Whether to simulate a button click at startup
    pub click: bool,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            ticks: 3,
            interval: Duration::from_secs(1),
            click: true,
        }
    }
}

/// What the demo observed when it finished.
#[derive(Debug, Clone)]
pub struct DemoOutcome {
    pub report: LoopReport,
    pub status: String,
    pub counter: String,
    pub counter_state: Option<TaskState>,
}

/// The demo widget tree.
pub struct App {
    pub status: Arc<Label>,
    pub counter: Arc<Label>,
    root: Arc<Namespace>,
}

impl App {
    fn build(
        bridge: &Bridge,
        interval: Duration,
    ) -> Self {
        let status = Arc::new(Label::new("Press the button"));
        let counter = Arc::new(Label::new("Counter: 0"));
        let root = Arc::new(Namespace::new("App"));

        let button = Namespace::new("Button").with_value("text", "Click Me");
        let clicks = bridge.clone();
        let label = bridge.own_arc(Arc::clone(&status));
        button.set(
            "click",
            Member::Callable(native_fn("Button.click", move |_, _| {
                let label = label.clone();
                let handle = clicks.spawn(async move {
                    label.call("configure", args![], kwargs! { "text" => "Processing..." })?;
                    tokio::time::sleep(interval * 2).await;
                    label.call("configure", args![], kwargs! { "text" => "Done!" })?;
                    Ok(())
                });
                Ok(Value::from(handle.id().inner()))
            })),
        );

        root.set("status", Member::Object(status.clone()));
        root.set("counter", Member::Object(counter.clone()));
        root.set("button", Member::object(button));
        root.set("quit", Member::Callable(quit_method(bridge.owner().clone())));

        Self {
            status,
            counter,
            root,
        }
    }

    fn owned(
        &self,
        bridge: &Bridge,
    ) -> Owned<Namespace> {
        bridge.own_arc(Arc::clone(&self.root))
    }
}

fn quit_method(owner: LoopHandle) -> Arc<dyn Callable> {
    native_fn("App.quit", move |_, _| {
        owner.quit().map_err(|err| CallError::raised(err.to_string()))?;
        Ok(Value::Unit)
    })
}

/// Increment the counter label every `interval`, quitting after `ticks`.
async fn update_counter(
    app: Owned<Namespace>,
    ticks: u32,
    interval: Duration,
) -> anyhow::Result<()> {
    let mut count = 0u32;
    loop {
        count += 1;
        app.member("counter")?
            .get("configure")?
            .invoke(args![], kwargs! { "text" => format!("Counter: {}", count) })?;
        debug!("counter at {}", count);

        if count == ticks.max(1) {
            info!("{} ticks reached, quitting", count);
            app.call("quit", args![], kwargs! {})?;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Run the demo on the current thread, which becomes the owner thread.
pub fn run(
    config: BridgeConfig,
    options: DemoOptions,
) -> anyhow::Result<DemoOutcome> {
    let lifecycle = Lifecycle::new(config);
    let bridge = lifecycle.bridge();
    let app = App::build(&bridge, options.interval);
    let owned = app.owned(&bridge);

    lifecycle.event_loop().on_close(|owner| {
        info!("close requested");
        let _ = owner.quit();
    });

    if options.click {
        let clicker = owned.clone();
        bridge
            .owner()
            .schedule(move || {
                let clicked = clicker
                    .member("button")
                    .and_then(|button| button.get("click"))
                    .and_then(|click| click.call(args![]));
                if let Err(err) = clicked {
                    warn!("button click failed: {}", err);
                }
            })
            .context("failed to schedule the button click")?;
    }

    let counter_task: Arc<Mutex<Option<TaskHandle>>> = Arc::default();
    let hooks = {
        let started = Arc::clone(&counter_task);
        let stopping = Arc::clone(&counter_task);
        let spawner = bridge.clone();
        Hooks::new()
            .on_init(move || async move {
                let handle = spawner.spawn(update_counter(owned, options.ticks, options.interval));
                info!("counter task started as {}", handle.id());
                *started.lock() = Some(handle);
                Ok(())
            })
            .on_teardown(move || async move {
                let handle = stopping.lock().clone();
                if let Some(handle) = handle {
                    handle.cancel();
                    let state = handle.completion().await;
                    info!("counter task ended: {}", state);
                }
                Ok(())
            })
    };

    let report = lifecycle.run(hooks)?;
    let counter_state = counter_task.lock().as_ref().map(TaskHandle::state);

    Ok(DemoOutcome {
        report,
        status: app.status.text(),
        counter: app.counter.text(),
        counter_state,
    })
}
