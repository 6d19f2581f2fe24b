//! Task outcomes: panic capture and the async completion handle.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::ExecutorError;

/// Run `work`, turning a panic into `ExecutorError::TaskPanicked`.
pub(crate) fn run_guarded<T>(work: impl FnOnce() -> T) -> Result<T, ExecutorError> {
    panic::catch_unwind(AssertUnwindSafe(work))
        .map_err(|payload| ExecutorError::TaskPanicked(panic_message(payload.as_ref())))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

enum HandleState<T> {
    Ready(Option<Result<T, ExecutorError>>),
    Pending(oneshot::Receiver<Result<T, ExecutorError>>),
}

/// Completion of a task submitted with `submit_async`.
///
/// Resolves to the task's value, its captured panic, or
/// `ExecutorError::Stopped` if the task was discarded without running.
pub struct TaskHandle<T> {
    state: HandleState<T>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn ready(outcome: Result<T, ExecutorError>) -> Self {
        Self {
            state: HandleState::Ready(Some(outcome)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<Result<T, ExecutorError>>) -> Self {
        Self {
            state: HandleState::Pending(rx),
        }
    }

    /// Block the calling thread until the outcome is available.
    ///
    /// Must not be called from inside an async context.
    pub fn wait(self) -> Result<T, ExecutorError> {
        match self.state {
            HandleState::Ready(slot) => slot.unwrap_or(Err(ExecutorError::Stopped)),
            HandleState::Pending(rx) => rx.blocking_recv().unwrap_or(Err(ExecutorError::Stopped)),
        }
    }
}

// The value is only moved out, never pinned.
impl<T> Unpin for TaskHandle<T> {}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, ExecutorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(slot) => {
                Poll::Ready(slot.take().unwrap_or(Err(ExecutorError::Stopped)))
            }
            HandleState::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(ExecutorError::Stopped))),
        }
    }
}
