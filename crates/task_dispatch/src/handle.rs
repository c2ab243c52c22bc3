// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! [`TaskHandle`] for waiting on submitted work.

use std::{
    fmt::Debug,
    pin::Pin,
    task::{Context, Poll},
};

use futures_channel::oneshot;

use crate::TaskError;

pub(crate) type Completion<T> = oneshot::Sender<Result<T, TaskError>>;

/// A handle to submitted work that resolves once the work has run.
///
/// The handle implements [`Future`] so it can be awaited from async code, and
/// [`wait`](Self::wait) blocks the current thread for callers that are not async.
/// Dropping the handle does not cancel the work.
///
/// # Examples
///
/// ```
/// use task_dispatch::{DispatcherConfig, PoolName, TaskDispatcher};
///
/// let dispatcher = TaskDispatcher::new(DispatcherConfig::default())?;
/// let handle = dispatcher.submit(PoolName::General, || "done")?;
/// assert_eq!(handle.wait()?, "done");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn channel() -> (Completion<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Creates a handle that is already resolved with `value`.
    ///
    /// Useful when a caller can answer without dispatching any work but still has to
    /// hand out a handle.
    #[must_use]
    pub fn ready(value: T) -> Self {
        let (tx, handle) = Self::channel();
        // The receiver is alive in `handle`, so this cannot fail.
        _ = tx.send(Ok(value));
        handle
    }

    /// Blocks the current thread until the work has run.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Panicked`] if the work panicked and [`TaskError::Cancelled`]
    /// if it was dropped without running.
    pub fn wait(self) -> Result<T, TaskError> {
        futures::executor::block_on(self)
    }

    /// Returns the outcome if the work has already finished, without blocking.
    ///
    /// Returns `None` while the work is queued or running. Once this has returned
    /// `Some`, the outcome has been taken and later calls report [`TaskError::Cancelled`].
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|res| match res {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Err(TaskError::Cancelled),
        })
    }
}

impl<T> Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
