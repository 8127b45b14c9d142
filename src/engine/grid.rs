//! Grid policy: a ladder of resting legs replaced on fill.
//!
//! At start the ladder is seeded with buy legs below the current price and
//! sell legs above it, one per level inside `[min_price, max_price]`. Each
//! tick polls the resting legs; a filled leg is (optionally) replaced by
//! the opposing side one step away, capturing the spread on every round
//! trip. A grid has no natural completion — it runs until explicitly
//! cancelled, at which point every still-resting leg is cancelled at the
//! venue.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::exchange::{ExchangeError, ExchangeOrderStatus, OrderRequest};
use crate::orders::{mark_child, ChildOrder, GridLeg, GridState};
use crate::types::OrderSide;

use super::policy::{PolicyContext, PolicyOutcome, TriggerPolicy};

#[async_trait]
impl TriggerPolicy for GridState {
    async fn tick(&mut self, ctx: &mut PolicyContext<'_>) -> Result<PolicyOutcome, ExchangeError> {
        let filled = self.poll_legs(ctx).await?;
        for index in filled {
            self.handle_fill(ctx, index).await?;
        }
        // Steady state: a grid only leaves Monitoring on explicit cancel.
        Ok(PolicyOutcome::Continue)
    }
}

impl GridState {
    /// Place the initial ladder around the current price. Returns the
    /// number of legs placed. The level equal to the current price (if
    /// any) is left empty.
    pub(crate) async fn seed(
        &mut self,
        ctx: &mut PolicyContext<'_>,
        last_price: Decimal,
    ) -> Result<usize, ExchangeError> {
        for price in self.level_prices() {
            let side = if price < last_price {
                OrderSide::Buy
            } else if price > last_price {
                OrderSide::Sell
            } else {
                continue;
            };
            self.place_leg(ctx, side, price, None).await?;
        }
        info!(
            symbol = ctx.symbol,
            legs = self.open_legs(),
            levels = self.levels,
            "grid seeded"
        );
        Ok(self.open_legs())
    }

    async fn place_leg(
        &mut self,
        ctx: &mut PolicyContext<'_>,
        side: OrderSide,
        price: Decimal,
        paired_entry: Option<Decimal>,
    ) -> Result<(), ExchangeError> {
        let request = OrderRequest::limit(ctx.symbol, side, self.quantity_per_order, price);
        let placed = ctx.exchange.place_order(&request).await?;
        self.legs.push(GridLeg {
            order_id: placed.order_id.clone(),
            side,
            price,
            open: true,
            paired_entry,
        });
        ctx.children.push(ChildOrder::from_placement(&request, &placed));
        info!(symbol = ctx.symbol, %side, %price, order_id = %placed.order_id, "grid leg placed");
        Ok(())
    }

    /// Poll every open leg, record status changes, and return the indices
    /// of legs that newly filled.
    async fn poll_legs(
        &mut self,
        ctx: &mut PolicyContext<'_>,
    ) -> Result<Vec<usize>, ExchangeError> {
        let mut filled = Vec::new();
        for index in 0..self.legs.len() {
            if !self.legs[index].open {
                continue;
            }
            let id = self.legs[index].order_id.clone();
            let status = ctx.exchange.get_order_status(ctx.symbol, &id).await?;
            mark_child(ctx.children, &id, status);
            match status {
                ExchangeOrderStatus::Filled => {
                    self.legs[index].open = false;
                    filled.push(index);
                }
                ExchangeOrderStatus::Canceled
                | ExchangeOrderStatus::Rejected
                | ExchangeOrderStatus::Expired => {
                    warn!(symbol = ctx.symbol, order_id = %id, %status, "grid leg closed externally");
                    self.legs[index].open = false;
                }
                ExchangeOrderStatus::New | ExchangeOrderStatus::PartiallyFilled => {}
            }
        }
        Ok(filled)
    }

    /// Book the fill and, when rebalancing, place the opposing leg one step
    /// away. The replacement inherits the fill price as its pair entry so
    /// profit is realized when the round trip closes.
    async fn handle_fill(
        &mut self,
        ctx: &mut PolicyContext<'_>,
        index: usize,
    ) -> Result<(), ExchangeError> {
        let leg = self.legs[index].clone();
        self.completed_trades += 1;
        info!(
            symbol = ctx.symbol,
            side = %leg.side,
            price = %leg.price,
            completed_trades = self.completed_trades,
            "grid leg filled"
        );

        if let Some(entry) = leg.paired_entry {
            let profit = match leg.side {
                OrderSide::Sell => leg.price - entry,
                OrderSide::Buy => entry - leg.price,
            } * self.quantity_per_order;
            self.total_profit += profit;
            info!(
                symbol = ctx.symbol,
                %profit,
                total_profit = %self.total_profit,
                "grid round trip closed"
            );
        }

        if !self.rebalance {
            return Ok(());
        }
        let (side, price) = match leg.side {
            OrderSide::Buy => (OrderSide::Sell, leg.price + self.step_size),
            OrderSide::Sell => (OrderSide::Buy, leg.price - self.step_size),
        };
        if price < self.min_price || price > self.max_price {
            warn!(symbol = ctx.symbol, %price, "rebalance target outside grid range, leg not replaced");
            return Ok(());
        }
        self.place_leg(ctx, side, price, Some(leg.price)).await
    }

    /// Cancel every still-resting leg at the venue. Failures on legs that
    /// filled or vanished in the meantime are logged and tolerated.
    pub(crate) async fn unwind(&mut self, ctx: &mut PolicyContext<'_>) -> usize {
        let mut cancelled = 0;
        for index in 0..self.legs.len() {
            if !self.legs[index].open {
                continue;
            }
            let id = self.legs[index].order_id.clone();
            match ctx.exchange.cancel_order(ctx.symbol, &id).await {
                Ok(status) => {
                    mark_child(ctx.children, &id, status);
                    cancelled += 1;
                }
                Err(e) => {
                    warn!(symbol = ctx.symbol, order_id = %id, error = %e, "could not cancel grid leg");
                }
            }
            self.legs[index].open = false;
        }
        info!(symbol = ctx.symbol, cancelled, "grid unwound");
        cancelled
    }
}
