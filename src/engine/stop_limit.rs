//! Stop-limit policy: place a limit order once the stop price is crossed.
//!
//! Monitoring → (trigger met) → Executing → Completed | Failed. Before the
//! trigger, each tick reads the last price; after it, each tick polls the
//! child limit order until the venue reports a terminal state.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::exchange::{ExchangeError, ExchangeOrderStatus, OrderRequest};
use crate::orders::{mark_child, ChildOrder, StopLimitState, WatchedOrderStatus};
use crate::types::OrderSide;

use super::policy::{PolicyContext, PolicyOutcome, TriggerPolicy};

#[async_trait]
impl TriggerPolicy for StopLimitState {
    async fn tick(&mut self, ctx: &mut PolicyContext<'_>) -> Result<PolicyOutcome, ExchangeError> {
        if !self.triggered {
            return self.check_trigger(ctx).await;
        }
        self.poll_child(ctx).await
    }
}

impl StopLimitState {
    async fn check_trigger(
        &mut self,
        ctx: &mut PolicyContext<'_>,
    ) -> Result<PolicyOutcome, ExchangeError> {
        let last = ctx.exchange.get_last_price(ctx.symbol).await?;

        let hit = match ctx.side {
            // Buy stops protect against a rising market, sell stops a falling one.
            OrderSide::Buy => last >= self.stop_price,
            OrderSide::Sell => last <= self.stop_price,
        };
        if !hit {
            debug!(symbol = ctx.symbol, %last, stop = %self.stop_price, "stop not crossed");
            return Ok(PolicyOutcome::Continue);
        }

        info!(
            symbol = ctx.symbol,
            side = %ctx.side,
            %last,
            stop = %self.stop_price,
            limit = %self.limit_price,
            "stop condition triggered, placing limit order"
        );
        let request = OrderRequest::limit(ctx.symbol, ctx.side, self.quantity, self.limit_price);
        let placed = ctx.exchange.place_order(&request).await?;

        self.triggered = true;
        self.trigger_price = Some(last);
        ctx.children.push(ChildOrder::from_placement(&request, &placed));
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
                info!(symbol = ctx.symbol, child = %child_id, "stop-limit child filled");
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
