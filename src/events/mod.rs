//! Controller events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the controller (admission, lifecycle, observer panics) and
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber listener spawned by
//!   [`ControllerBuilder::build`](crate::ControllerBuilder::build), and any
//!   receiver obtained from [`Controller::events`](crate::Controller::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
