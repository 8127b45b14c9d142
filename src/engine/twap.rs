//! TWAP policy: equal time-spaced slices of a large order.
//!
//! The worker ticks once per `interval_minutes`; each tick sends one slice
//! (market, or limit priced off the last trade) until `slice_count` slices
//! are out. A terminal placement failure fails the order but leaves the
//! already-sent slices' fills intact — state reflects reality, not intent.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::exchange::{ExchangeError, OrderRequest};
use crate::orders::{ChildOrder, TwapState, WatchedOrderStatus};
use crate::types::OrderSide;

use super::policy::{PolicyContext, PolicyOutcome, TriggerPolicy};

/// Price offset for limit slices: 0.1% through the last trade, so the
/// slice is marketable without paying a full market spread.
const LIMIT_OFFSET: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

#[async_trait]
impl TriggerPolicy for TwapState {
    async fn tick(&mut self, ctx: &mut PolicyContext<'_>) -> Result<PolicyOutcome, ExchangeError> {
        if self.slices_sent >= self.slice_count {
            return Ok(PolicyOutcome::Transition(WatchedOrderStatus::Completed));
        }

        let quantity = self.slice_quantity(self.slices_sent);
        let request = if self.use_market_orders {
            OrderRequest::market(ctx.symbol, ctx.side, quantity)
        } else {
            let last = ctx.exchange.get_last_price(ctx.symbol).await?;
            let price = match ctx.side {
                OrderSide::Buy => last * (Decimal::ONE + LIMIT_OFFSET),
                OrderSide::Sell => last * (Decimal::ONE - LIMIT_OFFSET),
            }
            .round_dp(8);
            OrderRequest::limit(ctx.symbol, ctx.side, quantity, price)
        };

        // A failure here propagates and fails the order; slices already
        // sent stay counted.
        let placed = ctx.exchange.place_order(&request).await?;

        self.slices_sent += 1;
        self.executed_quantity += quantity;
        if let Some(price) = placed.avg_fill_price {
            self.executed_notional += price * quantity;
            self.priced_quantity += quantity;
        }
        info!(
            symbol = ctx.symbol,
            side = %ctx.side,
            slice = self.slices_sent,
            slice_count = self.slice_count,
            %quantity,
            executed = %self.executed_quantity,
            "TWAP slice sent"
        );
        ctx.children.push(ChildOrder::from_placement(&request, &placed));

        if self.slices_sent == self.slice_count {
            info!(
                symbol = ctx.symbol,
                executed = %self.executed_quantity,
                vwap = ?self.vwap(),
                "TWAP schedule complete"
            );
            Ok(PolicyOutcome::Transition(WatchedOrderStatus::Completed))
        } else {
            Ok(PolicyOutcome::Transition(WatchedOrderStatus::Executing))
        }
    }
}
