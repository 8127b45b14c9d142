//! Exchange Abstraction Layer
//!
//! Exchange-agnostic trait and types for the trading venue the engine
//! supervises. The engine only ever talks to the venue through
//! [`ExchangeClient`]; new venues can be added by implementing the trait
//! without touching any policy logic.

mod paper;

pub use paper::PaperExchange;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::OrderSide;

/// Errors returned by the exchange.
///
/// The split between transient and permanent matters: transient errors are
/// retried by the `resilience` layer, permanent errors fail the calling
/// order immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// Network failure or venue unreachable (retryable)
    #[error("network error: {0}")]
    Network(String),

    /// Venue rate limit hit (retryable)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Order rejected by the venue (not retryable)
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Account cannot cover the order (not retryable)
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Order id unknown to the venue, or already in a terminal state
    #[error("unknown or closed order: {0}")]
    UnknownOrder(String),
}

impl ExchangeError {
    /// Returns true if the call may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_))
    }
}

/// Type-safe exchange-assigned order identifier.
///
/// Newtype wrapper to prevent mixing venue order ids with other string
/// types at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Venue order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Venue-side lifecycle state of a single exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    /// Accepted by the venue, resting on the book
    New,
    /// Some quantity executed
    PartiallyFilled,
    /// All quantity executed
    Filled,
    /// Cancelled before completion
    Canceled,
    /// Refused by the venue
    Rejected,
    /// Time-in-force exceeded
    Expired,
}

impl ExchangeOrderStatus {
    /// Returns true if no further updates are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Expired)
    }
}

impl std::fmt::Display for ExchangeOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::PartiallyFilled => write!(f, "PartiallyFilled"),
            Self::Filled => write!(f, "Filled"),
            Self::Canceled => write!(f, "Canceled"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

/// A single order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }
}

/// Acknowledgement returned by a successful placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub status: ExchangeOrderStatus,
    /// Average fill price, when the venue filled (part of) the order on
    /// placement. Market orders on a liquid book report this immediately.
    pub avg_fill_price: Option<Decimal>,
}

/// Synchronous venue operations the engine consumes.
///
/// All calls may fail with a transient error kind (network, rate limit)
/// or a permanent one (rejection, insufficient balance). Implementations
/// must be safe to call concurrently from many order workers.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order to the venue.
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, ExchangeError>;

    /// Cancel a resting order. Fails with [`ExchangeError::UnknownOrder`]
    /// if the order is already filled or cancelled.
    async fn cancel_order(
        &self,
        symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError>;

    /// Last known venue-side state of an order.
    async fn get_order_status(
        &self,
        symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError>;

    /// Last trade price for a symbol. Fails only transiently.
    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;
}
