//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings injected into
//! [`Runtime::builder`](crate::Runtime::builder). There is no global default
//! dispatcher: everything the runtime needs arrives through this struct,
//! which keeps single-threaded deterministic test setups possible.
//!
//! ## Sentinel values
//! - `workers = 0` → Tokio's default worker count (one per core)
//! - `bus_capacity` is clamped to a minimum of 1 by the bus

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// ## Field semantics
/// - `workers`: worker thread count of the pool dispatcher (`0` = default)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by the bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Worker thread count for the pool dispatcher.
    ///
    /// - `0` = Tokio's default (one per core)
    /// - `n > 0` = exactly `n` worker threads
    pub workers: usize,

    /// Capacity of the event bus broadcast ring buffer.
    ///
    /// Subscribers that lag behind more than `bus_capacity` events skip the
    /// oldest items.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the pool worker count as an `Option`.
    ///
    /// - `None` → Tokio's default
    /// - `Some(n)` → exactly `n` workers
    #[inline]
    pub fn worker_threads(&self) -> Option<usize> {
        if self.workers == 0 {
            None
        } else {
            Some(self.workers)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// A single-worker configuration, handy for deterministic tests.
    pub fn single_worker() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 0` (Tokio default)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: 0,
            bus_capacity: 1024,
        }
    }
}
