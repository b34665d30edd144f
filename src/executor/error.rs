use thiserror::Error;

/// Error returned when configuring process-wide execution defaults.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorError {
    /// A default was already installed, or already created lazily by first use.
    #[error("default already installed")]
    AlreadyInstalled,
}
