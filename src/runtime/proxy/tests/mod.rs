//! Proxy tests
//!
//! Each test runs the owner loop on the test thread and drives proxies from a
//! worker thread, which quits the loop when it is done.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use crate::runtime::error::{BridgeError, CallError};
use crate::runtime::owner::{EventLoop, LoopHandle};
use crate::runtime::proxy::{Access, CallProxy, ObjectProxy, Owned, Proxy};
use crate::runtime::value::{native_fn, Callable, Member, Namespace, Object, Value};
use crate::util::config::{LookupPolicy, ProxyConfig};
use crate::{args, kwargs};

struct QuitOnDrop(LoopHandle);

impl Drop for QuitOnDrop {
    fn drop(&mut self) {
        let _ = self.0.quit();
    }
}

/// Run `body` on a worker thread while the current thread serves the loop.
fn from_worker<R, F>(
    event_loop: EventLoop,
    body: F,
) -> R
where
    R: Send + 'static,
    F: FnOnce(LoopHandle) -> R + Send + 'static,
{
    let handle = event_loop.handle();
    let worker = thread::spawn(move || {
        let _quit = QuitOnDrop(handle.clone());
        body(handle)
    });
    event_loop.run();
    worker.join().unwrap()
}

fn config(lookup: LookupPolicy) -> Arc<ProxyConfig> {
    Arc::new(ProxyConfig {
        lookup,
        ..ProxyConfig::default()
    })
}

fn thread_recorder(
    name: &str,
    seen: Arc<Mutex<Vec<ThreadId>>>,
) -> Arc<dyn Callable> {
    native_fn(name, move |_, _| {
        seen.lock().push(thread::current().id());
        Ok(Value::Unit)
    })
}

#[test]
fn test_call_proxy_returns_value_from_owner_thread() {
    let event_loop = EventLoop::new();
    let owner = thread::current().id();
    let seen = Arc::new(Mutex::new(None));

    let recorded = Arc::clone(&seen);
    let answer = native_fn("answer", move |_, _| {
        *recorded.lock() = Some(thread::current().id());
        Ok(Value::Int(42))
    });
    let proxy = CallProxy::new(answer, event_loop.handle());

    let result = from_worker(event_loop, move |_| proxy.call(args![]));
    assert_eq!(result.unwrap(), Value::Int(42));
    assert_eq!(*seen.lock(), Some(owner));
}

#[test]
fn test_call_proxy_on_owner_thread_calls_directly() {
    // The loop is never run: an owner-thread call must not need it.
    let event_loop = EventLoop::new();
    let double = native_fn("double", |args, _| {
        let n = args.first().and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Int(n * 2))
    });
    let proxy = CallProxy::new(double, event_loop.handle());

    assert_eq!(proxy.call(args![21]).unwrap(), Value::Int(42));
}

#[test]
fn test_call_proxy_runs_target_exactly_once_before_returning() {
    let event_loop = EventLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let (counter, flag) = (Arc::clone(&calls), Arc::clone(&finished));
    let slow = native_fn("slow", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::SeqCst);
        Ok(Value::Unit)
    });
    let proxy = CallProxy::new(slow, event_loop.handle());

    let (counter, flag) = (Arc::clone(&calls), Arc::clone(&finished));
    from_worker(event_loop, move |_| {
        for i in 1..=3 {
            proxy.call(args![]).unwrap();
            assert!(flag.swap(false, Ordering::SeqCst));
            assert_eq!(counter.load(Ordering::SeqCst), i);
        }
    });
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_call_proxy_forwards_kwargs() {
    let event_loop = EventLoop::new();
    let greet = native_fn("greet", |args, kwargs| {
        let name = args.first().and_then(Value::as_str).unwrap_or("nobody").to_string();
        let punct = kwargs
            .get("punct")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .to_string();
        Ok(Value::from(format!("hello {}{}", name, punct)))
    });
    let proxy = CallProxy::new(greet, event_loop.handle());

    let result = from_worker(event_loop, move |_| proxy.invoke(args!["bridge"], kwargs! { "punct" => "!" }));
    assert_eq!(result.unwrap(), Value::from("hello bridge!"));
}

#[test]
fn test_raising_target_is_replayed_in_caller() {
    let event_loop = EventLoop::new();
    let fail = native_fn("fail", |_, _| Err(CallError::raised("no such widget")));
    let proxy = CallProxy::new(fail, event_loop.handle());

    let err = from_worker(event_loop, move |_| proxy.call(args![])).unwrap_err();
    assert_eq!(err.target(), Some(&CallError::Raised("no such widget".to_string())));
    assert_eq!(err.to_string(), "no such widget");
}

#[test]
fn test_panicking_target_keeps_the_loop_alive() {
    let event_loop = EventLoop::new();
    let explode = native_fn("explode", |_, _| panic!("widget destroyed"));
    let answer = native_fn("answer", |_, _| Ok(Value::Int(42)));
    let explode = CallProxy::new(explode, event_loop.handle());
    let answer = CallProxy::new(answer, event_loop.handle());

    let (first, second) = from_worker(event_loop, move |_| (explode.call(args![]), answer.call(args![])));
    assert_eq!(
        first.unwrap_err().target(),
        Some(&CallError::Panicked("widget destroyed".to_string()))
    );
    assert_eq!(second.unwrap(), Value::Int(42));
}

#[test]
fn test_invoke_after_loop_exit_is_unavailable() {
    let event_loop = EventLoop::new();
    let proxy = CallProxy::new(native_fn("noop", |_, _| Ok(Value::Unit)), event_loop.handle());
    event_loop.handle().quit().unwrap();
    event_loop.run();

    let err = thread::spawn(move || proxy.call(args![]).unwrap_err())
        .join()
        .unwrap();
    assert!(err.is_unavailable());
}

#[test]
fn test_stalled_owner_times_out() {
    let event_loop = EventLoop::new();
    let proxy = CallProxy::new(native_fn("noop", |_, _| Ok(Value::Unit)), event_loop.handle())
        .with_timeout(Some(Duration::from_millis(20)));
    assert_eq!(proxy.timeout(), Some(Duration::from_millis(20)));

    // The owner thread is busy joining; nothing serves the loop.
    let err = thread::spawn(move || proxy.call(args![]).unwrap_err())
        .join()
        .unwrap();
    match err {
        BridgeError::Timeout { target, after } => {
            assert_eq!(target, "noop");
            assert_eq!(after, Duration::from_millis(20));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    drop(event_loop);
}

fn widget_tree(seen: Arc<Mutex<Vec<ThreadId>>>) -> Namespace {
    let child = Namespace::new("Child")
        .with_value("label", "ok")
        .with_method("method", |args, _| Ok(Value::Int(args.len() as i64)));
    child.set("record", Member::Callable(thread_recorder("record", seen)));

    Namespace::new("App")
        .with_object("child", child)
        .with_value("items", vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        .with_method("quit", |_, _| Ok(Value::Unit))
}

#[test]
fn test_nested_chain_marshals_final_invocation() {
    let event_loop = EventLoop::new();
    let owner = thread::current().id();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app: Arc<dyn Object> = Arc::new(widget_tree(Arc::clone(&seen)));
    let proxy = ObjectProxy::new(app, event_loop.handle(), config(LookupPolicy::Caller));

    let (child_is_object, method_is_call, result) = from_worker(event_loop, move |_| {
        let child = proxy.get("child").unwrap();
        let method = child.get("method").unwrap();
        child.get("record").unwrap().call(args![]).unwrap();
        (
            matches!(child, Proxy::Object(_)),
            matches!(method, Proxy::Call(_)),
            method.call(args![1, 2]),
        )
    });

    assert!(child_is_object);
    assert!(method_is_call);
    assert_eq!(result.unwrap(), Value::Int(2));
    assert_eq!(*seen.lock(), vec![owner]);
}

#[test]
fn test_get_item_and_values() {
    let event_loop = EventLoop::new();
    let app: Arc<dyn Object> = Arc::new(widget_tree(Arc::default()));
    let proxy = ObjectProxy::new(app, event_loop.handle(), config(LookupPolicy::Caller));

    let (last, label, missing) = from_worker(event_loop, move |_| {
        let items = proxy.get("items").unwrap();
        let last = items.get_item(-1).unwrap().value().unwrap();
        let label = proxy.get_item("child").unwrap().get("label").unwrap().value().unwrap();
        (last, label, items.get_item(10).unwrap_err())
    });

    assert_eq!(last, Some(Value::Int(3)));
    assert_eq!(label, Some(Value::from("ok")));
    assert!(matches!(missing, BridgeError::NoSuchItem { ref type_name, .. } if type_name == "list"));
}

#[test]
fn test_misuse_errors() {
    let event_loop = EventLoop::new();
    let app: Arc<dyn Object> = Arc::new(widget_tree(Arc::default()));
    let proxy = ObjectProxy::new(app, event_loop.handle(), config(LookupPolicy::Caller));

    let errors = from_worker(event_loop, move |_| {
        vec![
            proxy.get("nope").unwrap_err(),
            proxy.get("child").unwrap().call(args![]).unwrap_err(),
            proxy.get("quit").unwrap().get("anything").unwrap_err(),
            proxy.get("quit").unwrap().value().unwrap_err(),
        ]
    });

    assert!(matches!(&errors[0], BridgeError::NoSuchMember { name, .. } if name == "nope"));
    assert!(matches!(&errors[1], BridgeError::NotCallable(name) if name == "Child"));
    assert!(matches!(&errors[2], BridgeError::NotAnObject(name) if name == "App.quit"));
    assert!(matches!(&errors[3], BridgeError::NotAnObject(_)));
}

/// Records the thread every lookup runs on.
struct Spy {
    lookups: Mutex<Vec<ThreadId>>,
}

impl Object for Spy {
    fn type_name(&self) -> &str {
        "Spy"
    }

    fn get(
        &self,
        name: &str,
    ) -> Option<Member> {
        self.lookups.lock().push(thread::current().id());
        (name == "value").then(|| Member::value(7))
    }
}

fn lookup_threads(policy: LookupPolicy) -> (Vec<ThreadId>, ThreadId) {
    let event_loop = EventLoop::new();
    let spy = Arc::new(Spy {
        lookups: Mutex::new(Vec::new()),
    });
    let target: Arc<dyn Object> = spy.clone();
    let proxy = ObjectProxy::new(target, event_loop.handle(), config(policy));

    let worker = from_worker(event_loop, move |_| {
        assert_eq!(proxy.get("value").unwrap().value().unwrap(), Some(Value::Int(7)));
        thread::current().id()
    });
    let lookups = spy.lookups.lock().clone();
    (lookups, worker)
}

#[test]
fn test_caller_lookup_runs_on_calling_thread() {
    let (lookups, worker) = lookup_threads(LookupPolicy::Caller);
    assert_eq!(lookups, vec![worker]);
}

#[test]
fn test_owner_lookup_runs_on_owner_thread() {
    let owner = thread::current().id();
    let (lookups, _) = lookup_threads(LookupPolicy::Owner);
    assert_eq!(lookups, vec![owner]);
}

fn owned_app(handle: LoopHandle) -> Owned<Namespace> {
    let text = Arc::new(Mutex::new(String::from("idle")));
    let reader = Arc::clone(&text);
    let app = Namespace::new("App")
        .with_method("configure", move |_, kwargs| {
            if let Some(value) = kwargs.get("text").and_then(Value::as_str) {
                *text.lock() = value.to_string();
            }
            Ok(Value::Unit)
        })
        .with_method("text", move |_, _| Ok(Value::from(reader.lock().clone())))
        .with_method("schedule", |_, _| Ok(Value::from(format!("{:?}", thread::current().id()))));
    Owned::new(app, handle, Arc::new(ProxyConfig::default()))
}

#[test]
fn test_owned_direct_on_owner_thread() {
    let event_loop = EventLoop::new();
    let owned = owned_app(event_loop.handle());

    assert!(owned.is_owner_thread());
    assert!(owned.get_ref().is_some());
    let access = owned.member("configure").unwrap();
    assert!(!access.is_proxied());
    assert!(access.is_callable());

    owned.call("configure", args![], kwargs! { "text" => "ready" }).unwrap();
    assert_eq!(owned.call("text", args![], kwargs! {}).unwrap(), Value::from("ready"));
}

#[test]
fn test_explicit_proxy_on_owner_thread_runs_inline() {
    // The loop is never run: anything marshaled would block until timeout.
    let event_loop = EventLoop::new();
    let owned = owned_app(event_loop.handle());
    let proxy = owned.proxy();

    proxy
        .get("configure")
        .unwrap()
        .invoke(args![], kwargs! { "text" => "inline" })
        .unwrap();
    assert_eq!(proxy.get("text").unwrap().call(args![]).unwrap(), Value::from("inline"));
    assert!(!event_loop.handle().is_running());
}

#[test]
fn test_owned_proxied_off_owner_thread() {
    let event_loop = EventLoop::new();
    let owned = owned_app(event_loop.handle());
    let owner = format!("{:?}", thread::current().id());

    let (proxied, no_ref, text, bypass) = from_worker(event_loop, move |_| {
        let access = owned.member("configure").unwrap();
        let proxied = access.is_proxied();
        access.invoke(args![], kwargs! { "text" => "from worker" }).unwrap();

        let text = owned.call("text", args![], kwargs! {}).unwrap();
        let bypass = owned.member("schedule").unwrap();
        let where_ran = bypass.call(args![]).unwrap();
        (
            proxied,
            owned.get_ref().is_none(),
            text,
            (bypass.is_proxied(), where_ran),
        )
    });

    assert!(proxied);
    assert!(no_ref);
    assert_eq!(text, Value::from("from worker"));
    // Bypass members run right on the calling thread.
    assert!(!bypass.0);
    assert_ne!(bypass.1, Value::from(owner));
}

#[test]
fn test_access_get_follows_path() {
    let event_loop = EventLoop::new();
    let app = Namespace::new("App").with_object("child", Namespace::new("Child").with_value("n", 5));
    let owned = Owned::new(app, event_loop.handle(), Arc::new(ProxyConfig::default()));

    let direct = owned.member("child").unwrap().get("n").unwrap();
    assert!(matches!(direct, Access::Direct(_)));
    assert_eq!(direct.value().unwrap(), Some(Value::Int(5)));

    let proxied = from_worker(event_loop, move |_| {
        let n = owned.member("child").unwrap().get("n").unwrap();
        (n.is_proxied(), n.value().unwrap())
    });
    assert_eq!(proxied, (true, Some(Value::Int(5))));
}
