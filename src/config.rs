//! Engine configuration.

use std::time::Duration;

use crate::resilience::RetryPolicy;

/// Tunables for the monitor scheduler and creation-time ceilings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cadence for price-triggered policies (stop-limit, OCO)
    pub check_interval: Duration,
    /// Cadence for grid fill polling
    pub grid_check_interval: Duration,
    /// Upper bound on concurrently active watched orders (one worker each)
    pub max_active_orders: usize,
    /// Creation-time ceiling on grid levels
    pub max_grid_levels: u32,
    /// Creation-time ceiling on TWAP slices
    pub max_twap_slices: u32,
    /// Backoff discipline for venue calls
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            grid_check_interval: Duration::from_secs(30),
            max_active_orders: 64,
            max_grid_levels: 50,
            max_twap_slices: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Tight cadences for paper trading and demos.
    pub fn rapid() -> Self {
        Self {
            check_interval: Duration::from_millis(500),
            grid_check_interval: Duration::from_secs(1),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
            },
            ..Self::default()
        }
    }
}
