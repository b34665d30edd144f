//! # Identity controller: one in-flight task per identity.
//!
//! - [`Controller`] - the registry; supersedes, observes, queries
//! - [`ControllerBuilder`] - executor override and event subscribers
//! - [`ControllerConfig`] - retention and bus sizing
//! - [`Observe`] / [`ObserverId`] - per-identity lifecycle observers
//! - [`ControllerError`] - contract errors of `execute`

mod builder;
mod config;
mod core;
mod error;
mod observer;
mod registry;

pub use builder::ControllerBuilder;
pub use config::ControllerConfig;
pub use self::core::Controller;
pub use error::ControllerError;
pub use observer::{ObserverId, Observe};
