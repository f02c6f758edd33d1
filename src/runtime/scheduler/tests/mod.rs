//! Scheduler unit tests
//!
//! Task ids, task states, handle transitions and the loop itself.


use crate::runtime::scheduler::{TaskHandle, TaskId, TaskIdGenerator, TaskState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(test)]
mod task_id_tests {
    use super::*;

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(7).to_string(), "Task(7)");
        assert_eq!(TaskId(3).inner(), 3);
    }

    #[test]
    fn test_generator_is_monotonic_from_zero() {
        let ids = TaskIdGenerator::new();
        assert_eq!(ids.next(), TaskId(0));
        assert_eq!(ids.next(), TaskId(1));
        assert_eq!(ids.next(), TaskId(2));
    }

    #[test]
    fn test_generator_unique_across_threads() {
        let ids = Arc::new(TaskIdGenerator::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..100).map(|_| ids.next().inner()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<usize> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<_>>());
    }
}

#[cfg(test)]
mod task_state_tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Finished.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert_eq!(TaskState::Cancelled.to_string(), "cancelled");
    }
}

#[cfg(test)]
mod task_handle_tests {
    use super::*;

    #[test]
    fn test_new_handle_is_queued() {
        let handle = TaskHandle::new(TaskId(1));
        assert_eq!(handle.state(), TaskState::Queued);
        assert!(!handle.is_done());
        assert!(!handle.is_cancel_requested());
        assert_eq!(handle.failure(), None);
    }

    #[test]
    fn test_cancel_before_admission() {
        let handle = TaskHandle::new(TaskId(1));
        assert!(handle.cancel());
        assert_eq!(handle.state(), TaskState::Cancelled);
        assert!(handle.is_cancel_requested());
        assert!(!handle.begin());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_finish_only_once() {
        let handle = TaskHandle::new(TaskId(1));
        assert!(handle.begin());
        assert_eq!(handle.state(), TaskState::Running);
        assert!(handle.finish(TaskState::Failed, Some("boom".to_string())));
        assert!(!handle.finish(TaskState::Finished, None));
        assert_eq!(handle.state(), TaskState::Failed);
        assert_eq!(handle.failure().as_deref(), Some("boom"));
    }

    #[test]
    fn test_on_complete_fires_once() {
        let handle = TaskHandle::new(TaskId(1));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        handle.on_complete(move |state| {
            assert_eq!(state, TaskState::Finished);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.begin();
        handle.finish(TaskState::Finished, None);
        handle.finish(TaskState::Failed, None);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Late listeners run immediately.
        let counter = Arc::clone(&fired);
        handle.on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_across_threads() {
        let handle = TaskHandle::new(TaskId(1));
        handle.begin();

        let remote = handle.clone();
        let finisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.finish(TaskState::Finished, None);
        });

        assert_eq!(handle.wait(Some(Duration::from_secs(5))), Some(TaskState::Finished));
        finisher.join().unwrap();
    }

    #[test]
    fn test_wait_timeout() {
        let handle = TaskHandle::new(TaskId(1));
        assert_eq!(handle.wait(Some(Duration::from_millis(10))), None);
    }
}
