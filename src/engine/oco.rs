//! OCO (one-cancels-other) policy.
//!
//! Both legs are conceptual until a bound is hit: the engine watches only
//! the price and places the winning leg, while the losing leg is voided
//! locally without ever reaching the venue. "Cancels the other" is
//! implemented as "never place the loser", so at most one venue order ever
//! exists for an OCO.
//!
//! Tie-break: if both bounds are crossed within the same tick, the
//! take-profit leg wins.

use async_trait::async_trait;
use tracing::info;

use crate::exchange::{ExchangeError, ExchangeOrderStatus, OrderRequest};
use crate::orders::{mark_child, ChildOrder, OcoLeg, OcoState, WatchedOrderStatus};
use crate::types::OrderSide;

use super::policy::{PolicyContext, PolicyOutcome, TriggerPolicy};

#[async_trait]
impl TriggerPolicy for OcoState {
    async fn tick(&mut self, ctx: &mut PolicyContext<'_>) -> Result<PolicyOutcome, ExchangeError> {
        if self.executed_leg.is_none() {
            return self.check_bounds(ctx).await;
        }
        self.poll_child(ctx).await
    }
}

impl OcoState {
    /// Which leg, if any, the current price triggers. Take-profit wins a tie.
    fn winning_leg(&self, side: OrderSide, last: rust_decimal::Decimal) -> Option<OcoLeg> {
        let (tp_hit, sl_hit) = match side {
            // Sell exit: profit above, stop below. Buy exit mirrors it.
            OrderSide::Sell => (last >= self.take_profit_price, last <= self.stop_loss_price),
            OrderSide::Buy => (last <= self.take_profit_price, last >= self.stop_loss_price),
        };
        if tp_hit {
            Some(OcoLeg::TakeProfit)
        } else if sl_hit {
            Some(OcoLeg::StopLoss)
        } else {
            None
        }
    }

    async fn check_bounds(
        &mut self,
        ctx: &mut PolicyContext<'_>,
    ) -> Result<PolicyOutcome, ExchangeError> {
        let last = ctx.exchange.get_last_price(ctx.symbol).await?;
        let Some(leg) = self.winning_leg(ctx.side, last) else {
            return Ok(PolicyOutcome::Continue);
        };

        let price = match leg {
            OcoLeg::TakeProfit => self.take_profit_price,
            OcoLeg::StopLoss => self.stop_loss_price,
        };
        info!(
            symbol = ctx.symbol,
            side = %ctx.side,
            %last,
            %leg,
            %price,
            "OCO bound hit, placing winning leg"
        );
        let request = OrderRequest::limit(ctx.symbol, ctx.side, self.quantity, price);
        let placed = ctx.exchange.place_order(&request).await?;

        self.executed_leg = Some(leg);
        self.cancelled_leg = Some(leg.other());
        self.trigger_price = Some(last);
        ctx.children.push(ChildOrder::from_placement(&request, &placed));
        info!(symbol = ctx.symbol, voided = %leg.other(), "losing OCO leg voided without placement");
        Ok(PolicyOutcome::Transition(WatchedOrderStatus::Executing))
    }

    async fn poll_child(
        &mut self,
        ctx: &mut PolicyContext<'_>,
    ) -> Result<PolicyOutcome, ExchangeError> {
        let Some(child_id) = ctx.children.last().map(|c| c.id.clone()) else {
            return Ok(PolicyOutcome::Continue);
        };
        let status = ctx.exchange.get_order_status(ctx.symbol, &child_id).await?;
        mark_child(ctx.children, &child_id, status);

        match status {
            ExchangeOrderStatus::Filled => {
                info!(symbol = ctx.symbol, leg = ?self.executed_leg, "OCO winning leg filled");
                Ok(PolicyOutcome::Transition(WatchedOrderStatus::Completed))
            }
            ExchangeOrderStatus::PartiallyFilled => {
                Ok(PolicyOutcome::Transition(WatchedOrderStatus::PartiallyFilled))
            }
            ExchangeOrderStatus::Canceled => {
                Ok(PolicyOutcome::Transition(WatchedOrderStatus::Cancelled))
            }
            ExchangeOrderStatus::Rejected | ExchangeOrderStatus::Expired => Err(
                ExchangeError::Rejected(format!("child order {child_id} ended {status}")),
            ),
            ExchangeOrderStatus::New => Ok(PolicyOutcome::Continue),
        }
    }
}
