//! Order Orchestration Engine
//!
//! The caller-facing surface over the conditional-order machinery: create a
//! watched order (validated, registered, worker started), query it, cancel
//! it, sweep finished ones. One monitor worker per active order, all
//! sharing a single registry and a single retrying venue handle.
//!
//! # Example
//!
//! ```ignore
//! use orderwatch::engine::OrderEngine;
//! use orderwatch::config::EngineConfig;
//!
//! let engine = OrderEngine::new(exchange, EngineConfig::default());
//! let id = engine.place_stop_limit(params).await?;
//! let snapshot = engine.status(&id).await?;
//! engine.cancel(&id).await?;
//! ```

mod grid;
mod monitor;
mod oco;
mod policy;
mod stop_limit;
mod twap;

pub use policy::{PolicyContext, PolicyOutcome, TriggerPolicy};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::exchange::{ExchangeClient, ExchangeError};
use crate::orders::{
    GridParams, GridState, OcoParams, OcoState, OrderRegistry, OrderVariant, RegistryError,
    StopLimitParams, StopLimitState, TwapParams, TwapState, ValidationError, WatchedOrder,
    WatchedOrderId, WatchedOrderParams,
};
use crate::resilience::RetryingClient;

use monitor::{cancel_order, run_order_worker, StopSignal};

/// Errors surfaced by the engine's caller-facing operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Parameters rejected before any order was created
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown or already-swept watched order
    #[error("watched order not found: {0}")]
    NotFound(WatchedOrderId),

    /// Active-order cap reached; no worker spawned
    #[error("too many active watched orders (limit {0})")]
    TooManyOrders(usize),

    /// Venue failure during a caller-facing operation
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => Self::NotFound(id),
        }
    }
}

struct WorkerHandle {
    stop_tx: watch::Sender<StopSignal>,
    join: JoinHandle<()>,
}

/// Supervisory engine over all watched orders in the process.
///
/// Explicitly constructed and shared by `Arc` — there is no global
/// instance. All methods take `&self`; the engine is safe to share across
/// tasks.
pub struct OrderEngine {
    registry: Arc<OrderRegistry>,
    exchange: RetryingClient,
    config: EngineConfig,
    workers: DashMap<WatchedOrderId, WorkerHandle>,
    next_seq: AtomicU64,
}

impl OrderEngine {
    pub fn new(exchange: Arc<dyn ExchangeClient>, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(OrderRegistry::new()),
            exchange: RetryingClient::new(exchange, config.retry.clone()),
            config,
            workers: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Create a watched order and start monitoring it.
    ///
    /// # Errors
    ///
    /// [`EngineError::Validation`] if the payload violates its variant's
    /// invariants; [`EngineError::TooManyOrders`] if the active-order cap
    /// is reached. In both cases nothing is registered.
    pub async fn create_watched_order(
        &self,
        params: WatchedOrderParams,
    ) -> Result<WatchedOrderId, EngineError> {
        params.validate(&self.config)?;
        let order = self.build_order(params);
        let id = order.id.clone();
        if !self
            .registry
            .insert_within_cap(order.clone(), self.config.max_active_orders)
            .await
        {
            return Err(EngineError::TooManyOrders(self.config.max_active_orders));
        }
        info!(
            order_id = %id,
            variant = order.variant.kind(),
            symbol = %order.symbol,
            side = %order.side,
            "watched order created"
        );
        self.start_watching(order);
        Ok(id)
    }

    /// Convenience wrapper for [`Self::create_watched_order`].
    pub async fn place_stop_limit(
        &self,
        params: StopLimitParams,
    ) -> Result<WatchedOrderId, EngineError> {
        self.create_watched_order(WatchedOrderParams::StopLimit(params)).await
    }

    /// Convenience wrapper for [`Self::create_watched_order`].
    pub async fn place_oco(&self, params: OcoParams) -> Result<WatchedOrderId, EngineError> {
        self.create_watched_order(WatchedOrderParams::Oco(params)).await
    }

    /// Convenience wrapper for [`Self::create_watched_order`].
    pub async fn place_twap(&self, params: TwapParams) -> Result<WatchedOrderId, EngineError> {
        self.create_watched_order(WatchedOrderParams::Twap(params)).await
    }

    /// Convenience wrapper for [`Self::create_watched_order`].
    pub async fn place_grid(&self, params: GridParams) -> Result<WatchedOrderId, EngineError> {
        self.create_watched_order(WatchedOrderParams::Grid(params)).await
    }

    /// Snapshot of one watched order, terminal or not.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown or already-swept id; never
    /// fails for a valid one.
    pub async fn status(&self, id: &WatchedOrderId) -> Result<WatchedOrder, EngineError> {
        Ok(self.registry.snapshot(id).await?)
    }

    /// Snapshots of all non-terminal watched orders.
    pub async fn active_orders(&self) -> Vec<WatchedOrder> {
        self.registry.active_orders().await
    }

    /// Request cancellation of a watched order.
    ///
    /// Idempotent: a terminal order is left untouched and no venue call is
    /// made. Otherwise the order's worker observes the signal at its next
    /// tick, unwinds any resting child orders, and marks the order
    /// Cancelled.
    pub async fn cancel(&self, id: &WatchedOrderId) -> Result<(), EngineError> {
        let snapshot = self.registry.snapshot(id).await?;
        if snapshot.is_terminal() {
            debug!(order_id = %id, status = %snapshot.status, "cancel is a no-op on terminal order");
            return Ok(());
        }
        // Signal first and let the handle guard go before any await.
        let signaled = match self.workers.get(id) {
            Some(handle) => handle.stop_tx.send(StopSignal::Cancel).is_ok(),
            None => false,
        };
        if signaled {
            info!(order_id = %id, "cancel requested");
        } else {
            // No live worker (never started or already detached): unwind any
            // resting children here, then persist the cancelled record.
            warn!(order_id = %id, "cancel without live worker, unwinding directly");
            let mut order = snapshot;
            cancel_order(&mut order, &self.exchange).await;
            self.registry.replace(&order).await;
        }
        Ok(())
    }

    /// Stop evaluating one order without touching its venue orders. The
    /// record stays queryable at its last persisted state; a later
    /// [`Self::cancel`] still works through the registry.
    pub fn stop_watching(&self, id: &WatchedOrderId) {
        if let Some((_, handle)) = self.workers.remove(id) {
            let _ = handle.stop_tx.send(StopSignal::Detach);
            info!(order_id = %id, "stopped watching");
        }
    }

    /// Remove every terminal order from the registry. Returns the number
    /// removed. Terminal orders stay queryable until this is called.
    pub async fn sweep_completed(&self) -> usize {
        let removed = self.registry.sweep_completed().await;
        // Drop handles of workers whose orders are gone; their tasks have
        // already finished.
        self.workers.retain(|_, handle| !handle.join.is_finished());
        removed
    }

    /// Detach every worker and wait for them to exit. Child orders are
    /// left resting at the venue; use [`Self::cancel`] per order to unwind.
    pub async fn shutdown(&self) {
        let handles: Vec<(WatchedOrderId, WorkerHandle)> = {
            let keys: Vec<WatchedOrderId> =
                self.workers.iter().map(|e| e.key().clone()).collect();
            keys.into_iter()
                .filter_map(|k| self.workers.remove(&k))
                .collect()
        };
        for (id, handle) in handles {
            let _ = handle.stop_tx.send(StopSignal::Detach);
            if let Err(e) = handle.join.await {
                warn!(order_id = %id, error = %e, "worker join failed during shutdown");
            }
        }
        info!("engine shut down");
    }

    fn build_order(&self, params: WatchedOrderParams) -> WatchedOrder {
        let symbol = params.symbol().to_string();
        let side = params.side();
        let variant = match params {
            WatchedOrderParams::StopLimit(p) => OrderVariant::StopLimit(StopLimitState::new(
                p.quantity,
                p.stop_price,
                p.limit_price,
            )),
            WatchedOrderParams::Oco(p) => OrderVariant::Oco(OcoState::new(
                p.quantity,
                p.take_profit_price,
                p.stop_loss_price,
            )),
            WatchedOrderParams::Twap(p) => OrderVariant::Twap(TwapState::new(
                p.total_quantity,
                p.duration_minutes,
                p.interval_minutes,
                p.use_market_orders,
            )),
            WatchedOrderParams::Grid(p) => OrderVariant::Grid(GridState::new(
                p.quantity_per_order,
                p.min_price,
                p.max_price,
                p.step_size,
                p.rebalance,
            )),
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = WatchedOrderId::new(format!(
            "{}-{}-{}-{}",
            variant.kind(),
            symbol.to_lowercase(),
            side,
            seq
        ));
        WatchedOrder::new(id, symbol, side, variant)
    }

    /// Spawn the monitor worker for a freshly registered order.
    /// Idempotent per id: a second call for the same order is a no-op.
    fn start_watching(&self, order: WatchedOrder) {
        if self.workers.contains_key(&order.id) {
            debug!(order_id = %order.id, "already watching");
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(StopSignal::Run);
        let interval = tick_interval(&order.variant, &self.config);
        let join = tokio::spawn(run_order_worker(
            Arc::clone(&self.registry),
            self.exchange.clone(),
            order.clone(),
            interval,
            stop_rx,
        ));
        self.workers.insert(order.id, WorkerHandle { stop_tx, join });
    }
}

/// Evaluation cadence for a variant: TWAP ticks on its own slice interval,
/// grids on the (slower) fill-poll cadence, price triggers on the default.
fn tick_interval(variant: &OrderVariant, config: &EngineConfig) -> Duration {
    match variant {
        OrderVariant::Twap(state) => Duration::from_secs(u64::from(state.interval_minutes) * 60),
        OrderVariant::Grid(_) => config.grid_check_interval,
        OrderVariant::StopLimit(_) | OrderVariant::Oco(_) => config.check_interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use crate::types::OrderSide;
    use rust_decimal_macros::dec;

    fn engine() -> OrderEngine {
        OrderEngine::new(Arc::new(PaperExchange::new()), EngineConfig::default())
    }

    fn stop_limit_params() -> StopLimitParams {
        StopLimitParams {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(0.5),
            stop_price: dec!(27500),
            limit_price: dec!(27000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_registers_nothing() {
        let engine = engine();
        let result = engine
            .place_grid(GridParams {
                symbol: "BTCUSDT".into(),
                side: OrderSide::Buy,
                quantity_per_order: dec!(0.01),
                min_price: dec!(25000),
                max_price: dec!(30000),
                step_size: dec!(1),
                rebalance: true,
            })
            .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(engine.active_orders().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_order_cap_enforced() {
        let venue = Arc::new(PaperExchange::new());
        venue.set_last_price("BTCUSDT", dec!(27000));
        let engine = OrderEngine::new(
            venue,
            EngineConfig {
                max_active_orders: 1,
                ..EngineConfig::default()
            },
        );

        engine.place_stop_limit(stop_limit_params()).await.unwrap();
        let second = engine.place_stop_limit(stop_limit_params()).await;
        assert!(matches!(second, Err(EngineError::TooManyOrders(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_are_unique_and_tagged() {
        let venue = Arc::new(PaperExchange::new());
        venue.set_last_price("BTCUSDT", dec!(27000));
        let engine = OrderEngine::new(venue, EngineConfig::default());

        let a = engine.place_stop_limit(stop_limit_params()).await.unwrap();
        let b = engine.place_stop_limit(stop_limit_params()).await.unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("stop-limit-btcusdt-buy-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_of_unknown_id_is_not_found() {
        let engine = engine();
        let result = engine.status(&"nope".into()).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }
}
