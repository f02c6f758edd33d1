//! Task queue for the scheduler
//!
//! Unbounded FIFO: many producers, one consumer. The producer side is
//! cloneable and usable from any thread; the consumer side is owned by the
//! scheduler loop.

use std::future::Future;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{trace, warn};

use super::task::{QueuedTask, TaskFuture, TaskHandle, TaskIdGenerator, TaskState};

/// Create a connected producer/consumer pair.
pub fn task_queue() -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = channel::unbounded();
    (
        TaskQueue {
            sender,
            ids: Arc::new(TaskIdGenerator::new()),
        },
        TaskReceiver { receiver },
    )
}

/// Producer side of the task queue.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: Sender<QueuedTask>,
    ids: Arc<TaskIdGenerator>,
}

impl TaskQueue {
    /// Append a task to the tail of the queue. Never blocks.
    pub fn enqueue<F>(
        &self,
        future: F,
    ) -> TaskHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.enqueue_boxed(Box::pin(future))
    }

    /// Append an already boxed task.
    ///
    /// If the consumer is gone the task is dropped and its handle reports
    /// `Cancelled`.
    pub fn enqueue_boxed(
        &self,
        future: TaskFuture,
    ) -> TaskHandle {
        let handle = TaskHandle::new(self.ids.next());
        let task = QueuedTask {
            handle: handle.clone(),
            future,
        };

        match self.sender.send(task) {
            Ok(()) => trace!("enqueued {}", handle.id()),
            Err(_) => {
                warn!("{} enqueued after the scheduler stopped; cancelled", handle.id());
                handle.finish(TaskState::Cancelled, None);
            }
        }
        handle
    }

    /// Number of items waiting for admission.
    #[inline]
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer side of the task queue.
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: Receiver<QueuedTask>,
}

impl TaskReceiver {
    /// Remove and return the head of the queue, if any. Never blocks.
    #[inline]
    pub fn try_dequeue(&mut self) -> Option<QueuedTask> {
        self.receiver.try_recv().ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Drop every queued task, marking each `Cancelled`.
    ///
    /// Returns the number of tasks discarded.
    pub fn cancel_pending(&mut self) -> usize {
        let mut discarded = 0;
        while let Some(task) = self.try_dequeue() {
            task.handle.finish(TaskState::Cancelled, None);
            discarded += 1;
        }
        discarded
    }
}

impl Drop for TaskReceiver {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
