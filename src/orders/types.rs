//! Core types for watched-order management.
//!
//! A watched order is an order whose execution is conditional on a future
//! market or time event. The record here is the single source of truth for
//! one such order: identity, lifecycle status, the variant-specific payload
//! and its runtime state, and every venue order placed on its behalf.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::{ExchangeOrderStatus, OrderId, OrderRequest, OrderType, PlacedOrder};
use crate::types::OrderSide;

/// Quantities and prices are kept to this many decimal places.
pub(crate) const QUANTITY_SCALE: u32 = 8;

/// Type-safe watched-order identifier (engine-assigned).
///
/// Distinct from [`OrderId`], which identifies venue-side orders; one
/// watched order may own many venue orders over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchedOrderId(String);

impl WatchedOrderId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WatchedOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WatchedOrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WatchedOrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Watched-order lifecycle states.
///
/// `Pending` is momentary (between creation and the worker's first write);
/// `Monitoring` is the steady state while waiting on a condition;
/// `Executing`/`PartiallyFilled` cover the window between trigger and full
/// fill. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchedOrderStatus {
    /// Created, worker not yet started
    Pending,
    /// Waiting on a price or time condition
    Monitoring,
    /// Trigger met, venue order(s) working
    Executing,
    /// Some child quantity executed
    PartiallyFilled,
    /// All intended quantity executed
    Completed,
    /// Explicitly cancelled by the caller
    Cancelled,
    /// Ended by an unrecoverable error (see `error_info`)
    Failed,
}

impl WatchedOrderStatus {
    /// Returns true if the order is finished and will never be evaluated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for WatchedOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Monitoring => write!(f, "Monitoring"),
            Self::Executing => write!(f, "Executing"),
            Self::PartiallyFilled => write!(f, "PartiallyFilled"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// A venue order placed on behalf of a watched order, with its last known
/// venue status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildOrder {
    pub id: OrderId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub status: ExchangeOrderStatus,
    pub placed_at: DateTime<Utc>,
}

impl ChildOrder {
    /// Bookkeeping entry for a just-acknowledged placement.
    pub fn from_placement(request: &OrderRequest, placed: &PlacedOrder) -> Self {
        Self {
            id: placed.order_id.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            status: placed.status,
            placed_at: Utc::now(),
        }
    }
}

/// Update the recorded status of a child order, if present.
pub(crate) fn mark_child(children: &mut [ChildOrder], id: &OrderId, status: ExchangeOrderStatus) {
    if let Some(child) = children.iter_mut().find(|c| &c.id == id) {
        child.status = status;
    }
}

/// Stop-limit payload: converts into a limit order once the stop price is
/// crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLimitState {
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub limit_price: Decimal,
    /// Set once the stop condition has fired and the limit order is placed.
    pub triggered: bool,
    /// Last price observed at the moment of trigger.
    pub trigger_price: Option<Decimal>,
}

impl StopLimitState {
    pub fn new(quantity: Decimal, stop_price: Decimal, limit_price: Decimal) -> Self {
        Self {
            quantity,
            stop_price,
            limit_price,
            triggered: false,
            trigger_price: None,
        }
    }
}

/// The two conceptual legs of an OCO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcoLeg {
    TakeProfit,
    StopLoss,
}

impl OcoLeg {
    pub fn other(&self) -> Self {
        match self {
            Self::TakeProfit => Self::StopLoss,
            Self::StopLoss => Self::TakeProfit,
        }
    }
}

impl std::fmt::Display for OcoLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "take-profit"),
            Self::StopLoss => write!(f, "stop-loss"),
        }
    }
}

/// OCO payload: two conceptual exits, of which at most one is ever sent to
/// the venue. The losing leg is voided locally, never placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcoState {
    pub quantity: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
    /// The leg that won the race, once one has.
    pub executed_leg: Option<OcoLeg>,
    /// The leg voided without ever reaching the venue.
    pub cancelled_leg: Option<OcoLeg>,
    /// Last price observed at the moment of trigger.
    pub trigger_price: Option<Decimal>,
}

impl OcoState {
    pub fn new(quantity: Decimal, take_profit_price: Decimal, stop_loss_price: Decimal) -> Self {
        Self {
            quantity,
            take_profit_price,
            stop_loss_price,
            executed_leg: None,
            cancelled_leg: None,
            trigger_price: None,
        }
    }
}

/// TWAP payload: equal time-spaced slices of a large order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwapState {
    pub total_quantity: Decimal,
    pub duration_minutes: u32,
    pub interval_minutes: u32,
    pub use_market_orders: bool,
    /// `ceil(duration / interval)`, fixed at creation.
    pub slice_count: u32,
    pub slices_sent: u32,
    /// Sum of slice quantities sent so far; never exceeds `total_quantity`.
    pub executed_quantity: Decimal,
    /// Running `price * quantity` over fills with a known price.
    pub executed_notional: Decimal,
    /// Quantity behind `executed_notional` (fills without a reported price
    /// do not distort the average).
    pub priced_quantity: Decimal,
}

impl TwapState {
    pub fn new(
        total_quantity: Decimal,
        duration_minutes: u32,
        interval_minutes: u32,
        use_market_orders: bool,
    ) -> Self {
        Self {
            total_quantity,
            duration_minutes,
            interval_minutes,
            use_market_orders,
            slice_count: slice_count(duration_minutes, interval_minutes),
            slices_sent: 0,
            executed_quantity: Decimal::ZERO,
            executed_notional: Decimal::ZERO,
            priced_quantity: Decimal::ZERO,
        }
    }

    /// Quantity for the given zero-based slice. Every slice is the rounded
    /// equal share except the last, which absorbs the rounding remainder so
    /// the slices sum to `total_quantity` exactly.
    pub fn slice_quantity(&self, index: u32) -> Decimal {
        let count = Decimal::from(self.slice_count);
        let base = (self.total_quantity / count).round_dp(QUANTITY_SCALE);
        if index + 1 == self.slice_count {
            self.total_quantity - base * Decimal::from(self.slice_count - 1)
        } else {
            base
        }
    }

    /// Realized volume-weighted average price, if any priced fills exist.
    pub fn vwap(&self) -> Option<Decimal> {
        if self.priced_quantity.is_zero() {
            None
        } else {
            Some(self.executed_notional / self.priced_quantity)
        }
    }
}

/// `ceil(duration / interval)` in whole slices.
pub fn slice_count(duration_minutes: u32, interval_minutes: u32) -> u32 {
    duration_minutes.div_ceil(interval_minutes.max(1))
}

/// One resting (or once-resting) leg of a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLeg {
    pub order_id: OrderId,
    pub side: OrderSide,
    pub price: Decimal,
    /// Still resting on the venue book.
    pub open: bool,
    /// Fill price of the opposite leg this one was placed against, when it
    /// is a rebalance leg. Used for round-trip profit accounting.
    pub paired_entry: Option<Decimal>,
}

/// Grid payload: a ladder of resting legs across `[min_price, max_price]`,
/// replaced one step away as they fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub quantity_per_order: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub step_size: Decimal,
    pub rebalance: bool,
    /// `floor((max - min) / step) + 1`, fixed at creation.
    pub levels: u32,
    pub completed_trades: u32,
    pub total_profit: Decimal,
    pub legs: Vec<GridLeg>,
}

impl GridState {
    pub fn new(
        quantity_per_order: Decimal,
        min_price: Decimal,
        max_price: Decimal,
        step_size: Decimal,
        rebalance: bool,
    ) -> Self {
        Self {
            quantity_per_order,
            min_price,
            max_price,
            step_size,
            rebalance,
            levels: grid_level_count(min_price, max_price, step_size).unwrap_or(0),
            completed_trades: 0,
            total_profit: Decimal::ZERO,
            legs: Vec::new(),
        }
    }

    /// All ladder prices from `min_price` upward in `step_size` increments,
    /// bounded by `max_price`.
    pub fn level_prices(&self) -> Vec<Decimal> {
        let mut prices = Vec::with_capacity(self.levels as usize);
        let mut price = self.min_price;
        while price <= self.max_price {
            prices.push(price);
            price += self.step_size;
        }
        prices
    }

    /// Number of legs currently resting on the book.
    pub fn open_legs(&self) -> usize {
        self.legs.iter().filter(|l| l.open).count()
    }
}

/// `floor((max - min) / step) + 1`, or `None` for a degenerate range/step.
pub fn grid_level_count(min_price: Decimal, max_price: Decimal, step_size: Decimal) -> Option<u32> {
    if step_size <= Decimal::ZERO || max_price <= min_price {
        return None;
    }
    ((max_price - min_price) / step_size)
        .floor()
        .to_u32()
        .map(|n| n + 1)
}

/// Variant tag plus variant-specific parameters and runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum OrderVariant {
    StopLimit(StopLimitState),
    Oco(OcoState),
    Twap(TwapState),
    Grid(GridState),
}

impl OrderVariant {
    /// Short tag for ids and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StopLimit(_) => "stop-limit",
            Self::Oco(_) => "oco",
            Self::Twap(_) => "twap",
            Self::Grid(_) => "grid",
        }
    }
}

/// The central entity: one conditional or scheduled order under supervision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedOrder {
    pub id: WatchedOrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub status: WatchedOrderStatus,
    pub variant: OrderVariant,
    /// Venue orders placed on behalf of this order, in placement order.
    pub child_orders: Vec<ChildOrder>,
    pub created_at: DateTime<Utc>,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    /// Populated only in `Failed` state.
    pub error_info: Option<String>,
}

impl WatchedOrder {
    pub fn new(
        id: WatchedOrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        variant: OrderVariant,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            status: WatchedOrderStatus::Pending,
            variant,
            child_orders: Vec::new(),
            created_at: Utc::now(),
            last_evaluated_at: None,
            error_info: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
