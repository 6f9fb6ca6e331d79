//! Completion handle for tasks submitted to the elastic pool.

use tokio::sync::oneshot;

use crate::error::{Result, SourcedError};

/// Handle to the eventual result of a pool task.
///
/// The task runs exactly once on a pool worker. Dropping the handle does not
/// cancel the task; the result is simply discarded.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Block the current thread until the task finished.
    ///
    /// Must not be called from within an async runtime; use [`TaskHandle::join`]
    /// there instead.
    pub fn wait(self) -> Result<T> {
        self.rx.blocking_recv().map_err(|_| dropped())?
    }

    /// Await the task result.
    pub async fn join(self) -> Result<T> {
        self.rx.await.map_err(|_| dropped())?
    }
}

fn dropped() -> SourcedError {
    SourcedError::Rejected("task was dropped before it completed".to_string())
}
