//! Creation parameters and validation for watched orders.
//!
//! Every payload is validated before a [`WatchedOrder`](super::WatchedOrder)
//! exists; a rejected payload never reaches the registry or a worker.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::config::EngineConfig;
use crate::types::OrderSide;

use super::types::{grid_level_count, slice_count};

/// Smallest slice the venue will accept for most pairs.
const MIN_SLICE_QUANTITY: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

/// Parameter rejection, raised before any watched order is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: Decimal },

    #[error("for a {side} OCO the take-profit {take_profit} and stop-loss {stop_loss} bounds are inverted")]
    OcoBoundsInverted {
        side: OrderSide,
        take_profit: Decimal,
        stop_loss: Decimal,
    },

    #[error("duration must be positive")]
    NonPositiveDuration,

    #[error("interval must be positive")]
    NonPositiveInterval,

    #[error("interval ({interval_minutes}min) cannot exceed duration ({duration_minutes}min)")]
    IntervalExceedsDuration {
        interval_minutes: u32,
        duration_minutes: u32,
    },

    #[error("too many slices ({count}, limit {limit}); increase the interval or reduce the duration")]
    TooManySlices { count: u32, limit: u32 },

    #[error("slice quantity {quantity} is below the venue minimum {minimum}")]
    SliceTooSmall { quantity: Decimal, minimum: Decimal },

    #[error("min price {min_price} must be below max price {max_price}")]
    InvalidPriceRange {
        min_price: Decimal,
        max_price: Decimal,
    },

    #[error("step size {step_size} is too large for the price range {min_price}..{max_price}")]
    StepTooLarge {
        step_size: Decimal,
        min_price: Decimal,
        max_price: Decimal,
    },

    #[error("too many grid levels ({levels}, limit {limit}); increase the step size or narrow the range")]
    TooManyLevels { levels: u32, limit: u32 },

    #[error("too few grid levels ({levels}); need at least 2")]
    TooFewLevels { levels: u32 },
}

fn require_positive(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        Err(ValidationError::NonPositive { field, value })
    } else {
        Ok(())
    }
}

fn require_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.trim().is_empty() {
        Err(ValidationError::EmptySymbol)
    } else {
        Ok(())
    }
}

/// Parameters for a stop-limit order.
#[derive(Debug, Clone, PartialEq)]
pub struct StopLimitParams {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub stop_price: Decimal,
    pub limit_price: Decimal,
}

impl StopLimitParams {
    pub fn validate(&self, _config: &EngineConfig) -> Result<(), ValidationError> {
        require_symbol(&self.symbol)?;
        require_positive("quantity", self.quantity)?;
        require_positive("stop price", self.stop_price)?;
        require_positive("limit price", self.limit_price)?;

        // A limit on the wrong side of the stop executes immediately on
        // trigger. Legal, so only worth a warning.
        match self.side {
            OrderSide::Buy if self.limit_price < self.stop_price => warn!(
                symbol = %self.symbol,
                stop = %self.stop_price,
                limit = %self.limit_price,
                "buy stop-limit with limit below stop may fill immediately on trigger"
            ),
            OrderSide::Sell if self.limit_price > self.stop_price => warn!(
                symbol = %self.symbol,
                stop = %self.stop_price,
                limit = %self.limit_price,
                "sell stop-limit with limit above stop may fill immediately on trigger"
            ),
            _ => {}
        }
        Ok(())
    }
}

/// Parameters for an OCO (one-cancels-other) order.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoParams {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
}

impl OcoParams {
    pub fn validate(&self, _config: &EngineConfig) -> Result<(), ValidationError> {
        require_symbol(&self.symbol)?;
        require_positive("quantity", self.quantity)?;
        require_positive("take-profit price", self.take_profit_price)?;
        require_positive("stop-loss price", self.stop_loss_price)?;

        // A sell exit takes profit above and stops out below; a buy exit
        // (covering a short) is the mirror image.
        let ordered = match self.side {
            OrderSide::Sell => self.take_profit_price > self.stop_loss_price,
            OrderSide::Buy => self.take_profit_price < self.stop_loss_price,
        };
        if !ordered {
            return Err(ValidationError::OcoBoundsInverted {
                side: self.side,
                take_profit: self.take_profit_price,
                stop_loss: self.stop_loss_price,
            });
        }
        Ok(())
    }
}

/// Parameters for a TWAP order.
#[derive(Debug, Clone, PartialEq)]
pub struct TwapParams {
    pub symbol: String,
    pub side: OrderSide,
    pub total_quantity: Decimal,
    pub duration_minutes: u32,
    pub interval_minutes: u32,
    pub use_market_orders: bool,
}

impl TwapParams {
    pub fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        require_symbol(&self.symbol)?;
        require_positive("total quantity", self.total_quantity)?;
        if self.duration_minutes == 0 {
            return Err(ValidationError::NonPositiveDuration);
        }
        if self.interval_minutes == 0 {
            return Err(ValidationError::NonPositiveInterval);
        }
        if self.interval_minutes > self.duration_minutes {
            return Err(ValidationError::IntervalExceedsDuration {
                interval_minutes: self.interval_minutes,
                duration_minutes: self.duration_minutes,
            });
        }

        let count = slice_count(self.duration_minutes, self.interval_minutes);
        if count > config.max_twap_slices {
            return Err(ValidationError::TooManySlices {
                count,
                limit: config.max_twap_slices,
            });
        }

        let base_slice = self.total_quantity / Decimal::from(count);
        if base_slice < MIN_SLICE_QUANTITY {
            return Err(ValidationError::SliceTooSmall {
                quantity: base_slice,
                minimum: MIN_SLICE_QUANTITY,
            });
        }
        Ok(())
    }
}

/// Parameters for a grid order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    pub symbol: String,
    /// Primary side; the ladder itself places both sides around the price.
    pub side: OrderSide,
    pub quantity_per_order: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub step_size: Decimal,
    pub rebalance: bool,
}

impl GridParams {
    pub fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        require_symbol(&self.symbol)?;
        require_positive("quantity per order", self.quantity_per_order)?;
        require_positive("min price", self.min_price)?;
        require_positive("step size", self.step_size)?;
        if self.min_price >= self.max_price {
            return Err(ValidationError::InvalidPriceRange {
                min_price: self.min_price,
                max_price: self.max_price,
            });
        }
        if self.step_size >= self.max_price - self.min_price {
            return Err(ValidationError::StepTooLarge {
                step_size: self.step_size,
                min_price: self.min_price,
                max_price: self.max_price,
            });
        }

        // Ceiling prevents unbounded order fan-out at creation time.
        let levels = grid_level_count(self.min_price, self.max_price, self.step_size)
            .unwrap_or(u32::MAX);
        if levels > config.max_grid_levels {
            return Err(ValidationError::TooManyLevels {
                levels,
                limit: config.max_grid_levels,
            });
        }
        if levels < 2 {
            return Err(ValidationError::TooFewLevels { levels });
        }
        Ok(())
    }
}

/// Tagged creation payload, one variant per order type.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchedOrderParams {
    StopLimit(StopLimitParams),
    Oco(OcoParams),
    Twap(TwapParams),
    Grid(GridParams),
}

impl WatchedOrderParams {
    pub fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        match self {
            Self::StopLimit(p) => p.validate(config),
            Self::Oco(p) => p.validate(config),
            Self::Twap(p) => p.validate(config),
            Self::Grid(p) => p.validate(config),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::StopLimit(p) => &p.symbol,
            Self::Oco(p) => &p.symbol,
            Self::Twap(p) => &p.symbol,
            Self::Grid(p) => &p.symbol,
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            Self::StopLimit(p) => p.side,
            Self::Oco(p) => p.side,
            Self::Twap(p) => p.side,
            Self::Grid(p) => p.side,
        }
    }
}
