use thiserror::Error;

/// Error returned by [`Controller::execute`](crate::Controller::execute).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    /// The task has no identity (or an empty one); set it with `Task::with_id`.
    #[error("task has no identity")]
    MissingIdentity,
}
