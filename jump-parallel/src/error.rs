//! Error types for fan-out tasks.

use std::any::Any;

use thiserror::Error;
use tokio::task::JoinError;

/// Why a single fan-out task did not produce a value.
#[derive(Debug, Error)]
pub enum TaskFailure<E> {
    /// The work function returned an error.
    #[error("{0}")]
    Failed(E),

    /// The work function panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was cancelled by the runtime before it finished.
    #[error("task cancelled")]
    Cancelled,

    /// No thread could be started for the task.
    #[error("could not start task: {0}")]
    NotStarted(String),
}

impl<E> TaskFailure<E> {
    /// Returns the work function's error, if that is what this failure holds.
    pub fn as_failed(&self) -> Option<&E> {
        match self {
            TaskFailure::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if the task panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, TaskFailure::Panicked(_))
    }

    pub(crate) fn from_join_error(err: JoinError) -> Self {
        if !err.is_panic() {
            return TaskFailure::Cancelled;
        }

        Self::from_panic(err.into_panic())
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        TaskFailure::Panicked(message)
    }
}
