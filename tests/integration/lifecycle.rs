//! End-to-end lifecycle scenarios: owner loop on the test thread, scheduler on
//! its worker thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use owner_bridge::demo::{self, DemoOptions};
use owner_bridge::runtime::{Bridge, Hooks, Lifecycle, LifecycleError, TaskHandle, TaskState};
use owner_bridge::util::config::BridgeConfig;

fn fast_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.scheduler.poll_interval_ms = 1;
    config.proxy.call_timeout_ms = 5_000;
    config
}

/// Spawn a task that quits the owner loop after `delay`.
fn quit_after(
    bridge: &Bridge,
    delay: Duration,
) -> TaskHandle {
    let owner = bridge.owner().clone();
    bridge.spawn(async move {
        tokio::time::sleep(delay).await;
        owner.quit()?;
        Ok(())
    })
}

#[test]
fn test_counter_demo_reaches_three_then_cancels() {
    let outcome = demo::run(
        fast_config(),
        DemoOptions {
            ticks: 3,
            interval: Duration::from_millis(150),
            click: false,
        },
    )
    .unwrap();

    assert_eq!(outcome.counter, "Counter: 3");
    assert_eq!(outcome.counter_state, Some(TaskState::Cancelled));
    assert_eq!(outcome.status, "Press the button");
    assert_eq!(outcome.report.cancelled, 1);
}

#[test]
fn test_demo_button_click_updates_status() {
    let outcome = demo::run(
        fast_config(),
        DemoOptions {
            ticks: 6,
            interval: Duration::from_millis(40),
            click: true,
        },
    )
    .unwrap();

    assert_eq!(outcome.counter, "Counter: 6");
    assert_eq!(outcome.status, "Done!");
    assert_eq!(outcome.report.admitted, 2);
}

#[test]
fn test_active_tasks_cancelled_before_teardown() {
    let lifecycle = Lifecycle::new(fast_config());
    let bridge = lifecycle.bridge();

    let sleepers: Vec<TaskHandle> = (0..4)
        .map(|_| {
            bridge.spawn(async {
                std::future::pending::<()>().await;
                Ok(())
            })
        })
        .collect();
    quit_after(&bridge, Duration::from_millis(30));

    let teardowns = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = {
        let teardowns = Arc::clone(&teardowns);
        let seen = Arc::clone(&seen);
        let watched = sleepers.clone();
        Hooks::new().on_teardown(move || async move {
            teardowns.fetch_add(1, Ordering::SeqCst);
            *seen.lock() = watched.iter().map(TaskHandle::state).collect();
            Ok(())
        })
    };

    let report = lifecycle.run(hooks).unwrap();
    assert_eq!(report.cancelled, 4);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock(), vec![TaskState::Cancelled; 4]);
    assert!(sleepers.iter().all(|h| h.is_cancel_requested()));
}

#[test]
fn test_init_failure_aborts_startup() {
    let lifecycle = Lifecycle::new(fast_config());
    let never = lifecycle.bridge().spawn(async { Ok(()) });

    let err = lifecycle
        .run(Hooks::new().on_init(|| async { Err(anyhow::anyhow!("display not found")) }))
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Init(_)));
    assert!(err.to_string().contains("display not found"));
    assert_eq!(never.state(), TaskState::Cancelled);
}

#[test]
fn test_init_panic_is_reported() {
    let lifecycle = Lifecycle::new(fast_config());
    let err = lifecycle
        .run(Hooks::new().on_init(|| async {
            if true {
                panic!("init exploded");
            }
            Ok(())
        }))
        .unwrap_err();

    match err {
        LifecycleError::Panicked(message) => assert_eq!(message, "init exploded"),
        other => panic!("expected panic, got {:?}", other),
    }
}

#[test]
fn test_teardown_failure_is_reported() {
    let lifecycle = Lifecycle::new(fast_config());
    quit_after(&lifecycle.bridge(), Duration::from_millis(5));

    let err = lifecycle
        .run(Hooks::new().on_teardown(|| async { Err(anyhow::anyhow!("state not saved")) }))
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Teardown(_)));
}

#[test]
fn test_close_request_shuts_down() {
    let lifecycle = Lifecycle::new(fast_config());
    let bridge = lifecycle.bridge();
    let closes = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&closes);
    lifecycle.event_loop().on_close(move |owner| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = owner.quit();
    });

    let owner = bridge.owner().clone();
    let closer = bridge.spawn(async move {
        owner.close()?;
        Ok(())
    });

    lifecycle.run(Hooks::new()).unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(closer.state(), TaskState::Finished);
}

#[test]
fn test_cancelled_before_admission_never_runs() {
    let lifecycle = Lifecycle::new(fast_config());
    let bridge = lifecycle.bridge();
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ran);
    let handle = bridge.spawn(async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    assert!(handle.cancel());
    quit_after(&bridge, Duration::from_millis(10));

    let report = lifecycle.run(Hooks::new()).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert_eq!(report.discarded, 1);
}

#[test]
fn test_spawn_after_shutdown_is_cancelled() {
    let lifecycle = Lifecycle::new(fast_config());
    let bridge = lifecycle.bridge();
    quit_after(&bridge, Duration::from_millis(5));
    lifecycle.run(Hooks::new()).unwrap();

    let late = bridge.spawn(async { Ok(()) });
    assert_eq!(late.state(), TaskState::Cancelled);
}
