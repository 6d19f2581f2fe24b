//! Unbounded multi-producer / single-consumer task queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ExecutorError;

/// A queued unit of work. Completion delivery is captured inside the closure.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Producer side. Cloned into every `ExecutorHandle`.
#[derive(Clone)]
pub(crate) struct QueueSender {
    tx: mpsc::UnboundedSender<Job>,
    len: Arc<AtomicUsize>,
}

/// Consumer side, owned by the worker thread only.
pub(crate) struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
    len: Arc<AtomicUsize>,
}

/// Create a connected queue pair.
pub(crate) fn task_queue() -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let len = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            len: Arc::clone(&len),
        },
        QueueReceiver { rx, len },
    )
}

impl QueueSender {
    /// Append a job. Fails once the consumer has closed the queue.
    pub(crate) fn push(&self, job: Job) -> Result<(), ExecutorError> {
        self.len.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.len.fetch_sub(1, Ordering::SeqCst);
            return Err(ExecutorError::Stopped);
        }
        Ok(())
    }

    /// Number of jobs enqueued but not yet dequeued.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }
}

impl QueueReceiver {
    /// Dequeue the next job without blocking.
    pub(crate) fn pop(&mut self) -> Option<Job> {
        match self.rx.try_recv() {
            Ok(job) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Some(job)
            }
            Err(_) => None,
        }
    }

    /// Close the queue and drop every pending job without running it.
    ///
    /// Dropping a job drops its completion sender, so its submitter observes
    /// `ExecutorError::Stopped`. Returns the number of discarded jobs.
    pub(crate) fn discard(&mut self) -> usize {
        self.rx.close();
        let mut count = 0;
        while self.pop().is_some() {
            count += 1;
        }
        count
    }
}
