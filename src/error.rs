//! Error types used by tasks, chains and the identity controller.
//!
//! - [`TaskError`]: the single failure type a task body, a combinator step or
//!   a recovery handler ever sees.
//! - [`TaskResult`]: `Result<V, TaskError>`, the value every task settles with.
//!
//! Both the controller and the executor layer keep their own small error
//! enums next to the code that raises them.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Outcome of a task: a value or a [`TaskError`].
pub type TaskResult<V> = Result<V, TaskError>;

/// # Errors produced by task execution.
///
/// Combinators never invent new kinds: a step either propagates the error it
/// received unchanged or hands it to the chain's recovery handler, which
/// still reports it.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// A task that was never given behavior was executed.
    #[error("task has no behavior")]
    NotImplemented,

    /// User failure described by a message.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Opaque user error, passed through chains unchanged.
    #[error("{error}")]
    Custom {
        /// The wrapped error.
        error: Arc<dyn StdError + Send + Sync>,
    },

    /// A task that a chain was waiting on was cancelled on its own.
    #[error("upstream task cancelled")]
    Canceled,

    /// A callback-style body dropped its completer without reporting.
    #[error("completer dropped without a result")]
    Abandoned,

    /// The task body panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl TaskError {
    /// Builds a [`TaskError::Fail`] from a message.
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Wraps an arbitrary error as [`TaskError::Custom`].
    ///
    /// # Example
    /// ```
    /// use taskchain::TaskError;
    ///
    /// let err = TaskError::custom(std::io::Error::other("disk full"));
    /// assert!(err.downcast_ref::<std::io::Error>().is_some());
    /// ```
    pub fn custom<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        TaskError::Custom {
            error: Arc::new(error),
        }
    }

    /// Returns the wrapped user error if it is of type `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            TaskError::Custom { error } => error.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use taskchain::TaskError;
    ///
    /// assert_eq!(TaskError::NotImplemented.as_label(), "task_not_implemented");
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::NotImplemented => "task_not_implemented",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Custom { .. } => "task_custom",
            TaskError::Canceled => "task_canceled",
            TaskError::Abandoned => "task_abandoned",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::NotImplemented => "not implemented".to_string(),
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Custom { error } => format!("error: {error}"),
            TaskError::Canceled => "upstream cancelled".to_string(),
            TaskError::Abandoned => "completer dropped".to_string(),
            TaskError::Panicked { message } => format!("panic: {message}"),
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded")]
    struct Quota;

    #[test]
    fn labels_are_stable() {
        assert_eq!(TaskError::Canceled.as_label(), "task_canceled");
        assert_eq!(TaskError::Abandoned.as_label(), "task_abandoned");
        assert_eq!(
            TaskError::Panicked {
                message: "x".into()
            }
            .as_label(),
            "task_panicked"
        );
        assert_eq!(TaskError::custom(Quota).as_label(), "task_custom");
    }

    #[test]
    fn custom_error_keeps_its_type_through_clones() {
        let err = TaskError::custom(Quota);
        let copy = err.clone();
        assert!(copy.downcast_ref::<Quota>().is_some());
        assert!(copy.downcast_ref::<std::io::Error>().is_none());
        assert_eq!(copy.to_string(), "quota exceeded");
    }

    #[test]
    fn fail_message_is_rendered() {
        let err = TaskError::fail("boom");
        assert_eq!(err.to_string(), "execution failed: boom");
        assert_eq!(err.as_message(), "error: boom");
        assert!(TaskError::NotImplemented.downcast_ref::<Quota>().is_none());
    }

    #[test]
    fn panic_payloads_render() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic");
    }
}
