//! # Event subscribers.
//!
//! ```text
//! Controller ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                          │
//!                                              ┌───────────┼──────────┐
//!                                              ▼           ▼          ▼
//!                                          LogWriter    Metrics    Custom
//! ```
//!
//! - [`Subscribe`] - the extension trait
//! - [`SubscriberSet`] - per-subscriber queues and workers
//! - [`LogWriter`] - stdout printer (feature `logging`)

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
