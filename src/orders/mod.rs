//! Watched-Order Data Model
//!
//! The registry of live watched orders plus the types that describe them.
//!
//! # Architecture
//!
//! - `OrderRegistry` - thread-safe store of all watched orders
//! - Parameter structs with creation-time validation
//! - Core types - `WatchedOrderId`, `WatchedOrderStatus`, `OrderVariant`,
//!   `WatchedOrder`, `ChildOrder`
//!
//! # Example
//!
//! ```ignore
//! use orderwatch::orders::{OrderRegistry, WatchedOrderStatus};
//!
//! let registry = OrderRegistry::new();
//! registry.insert(order).await;
//! let monitoring = registry.list_by_status(WatchedOrderStatus::Monitoring).await;
//! ```

mod params;
mod registry;
mod types;

pub use params::{
    GridParams, OcoParams, StopLimitParams, TwapParams, ValidationError, WatchedOrderParams,
};
pub use registry::{OrderRegistry, RegistryError};
pub use types::{
    grid_level_count, slice_count, ChildOrder, GridLeg, GridState, OcoLeg, OcoState, OrderVariant,
    StopLimitState, TwapState, WatchedOrder, WatchedOrderId, WatchedOrderStatus,
};

pub(crate) use types::mark_child;
