//! Policy seam between the monitor scheduler and the order variants.
//!
//! Each variant implements [`TriggerPolicy`]: one evaluation per tick,
//! reading an external signal (price or clock position) through the
//! retrying client, applying side effects, and reporting where the order's
//! lifecycle should go next. Policies never touch the registry; the worker
//! owns persistence.

use async_trait::async_trait;

use crate::exchange::ExchangeError;
use crate::orders::{ChildOrder, WatchedOrderStatus};
use crate::resilience::RetryingClient;
use crate::types::OrderSide;

/// Everything a policy may see and touch during one evaluation.
pub struct PolicyContext<'a> {
    /// Venue handle with retry/backoff baked in
    pub exchange: &'a RetryingClient,
    pub symbol: &'a str,
    pub side: OrderSide,
    /// Venue orders owned by this watched order; policies append on
    /// placement and refresh statuses when they poll.
    pub children: &'a mut Vec<ChildOrder>,
}

/// Result of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// Condition not met; keep monitoring at the current cadence.
    Continue,
    /// Move the order to this (possibly terminal) status.
    Transition(WatchedOrderStatus),
}

/// One behavioral variant of a watched order.
///
/// Evaluations of a single order are strictly sequential; the worker never
/// overlaps ticks, so `&mut self` is sufficient for all variant state.
#[async_trait]
pub trait TriggerPolicy {
    /// Evaluate the policy once against the current market/clock signal.
    ///
    /// # Errors
    ///
    /// Any error returned here fails the order: transient venue errors are
    /// already absorbed by the retrying client, so an `Err` means retries
    /// were exhausted or the venue rejected the operation outright.
    async fn tick(&mut self, ctx: &mut PolicyContext<'_>) -> Result<PolicyOutcome, ExchangeError>;
}
