//! # Controller configuration.
//!
//! ## Field semantics
//! - `retain_finished`: keep an identity's entry after its task completed, so
//!   `did_finish` and `pending_update` stay answerable. Cancellation always evicts.
//! - `bus_capacity`: event bus ring buffer size (min 1; clamped by [`Bus`](crate::Bus)).

/// Configuration for a [`Controller`](crate::Controller).
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Keep completed tasks queryable until superseded or cancelled.
    pub retain_finished: bool,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers lagging by more than this many events skip the oldest ones.
    pub bus_capacity: usize,
}

impl ControllerConfig {
    /// Returns the bus capacity clamped to at least 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retain_finished: false,
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_drop_finished_entries() {
        let cfg = ControllerConfig::default();
        assert!(!cfg.retain_finished);
        assert_eq!(cfg.bus_capacity_clamped(), 1024);

        let tiny = ControllerConfig {
            bus_capacity: 0,
            ..cfg
        };
        assert_eq!(tiny.bus_capacity_clamped(), 1);
    }
}
