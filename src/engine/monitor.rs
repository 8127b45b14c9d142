//! Per-order monitor worker.
//!
//! One tokio task per active watched order: sleep for the order's cadence,
//! observe the stop signal, evaluate the variant policy, persist the
//! updated record. A policy error is caught locally, recorded in
//! `error_info`, and fails that order alone — it can never take down
//! another order's worker or the scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::exchange::ExchangeError;
use crate::orders::{OrderRegistry, OrderVariant, WatchedOrder, WatchedOrderStatus};
use crate::resilience::RetryingClient;

use super::policy::{PolicyContext, PolicyOutcome, TriggerPolicy};

/// Signal observed by a worker at the top of each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopSignal {
    /// Keep evaluating
    Run,
    /// Unwind resting child orders and mark the order Cancelled
    Cancel,
    /// Exit without touching the order or its children (engine shutdown)
    Detach,
}

/// Evaluate the order's variant policy once.
async fn evaluate_once(
    order: &mut WatchedOrder,
    exchange: &RetryingClient,
) -> Result<PolicyOutcome, ExchangeError> {
    let WatchedOrder {
        symbol,
        side,
        variant,
        child_orders,
        ..
    } = order;
    let mut ctx = PolicyContext {
        exchange,
        symbol: symbol.as_str(),
        side: *side,
        children: child_orders,
    };
    match variant {
        OrderVariant::StopLimit(state) => state.tick(&mut ctx).await,
        OrderVariant::Oco(state) => state.tick(&mut ctx).await,
        OrderVariant::Twap(state) => state.tick(&mut ctx).await,
        OrderVariant::Grid(state) => state.tick(&mut ctx).await,
    }
}

/// Place a grid's initial ladder. No-op for other variants.
async fn seed_if_grid(
    order: &mut WatchedOrder,
    exchange: &RetryingClient,
) -> Result<(), ExchangeError> {
    if !matches!(order.variant, OrderVariant::Grid(_)) {
        return Ok(());
    }
    let last = exchange.get_last_price(&order.symbol).await?;
    let WatchedOrder {
        symbol,
        side,
        variant,
        child_orders,
        ..
    } = order;
    let mut ctx = PolicyContext {
        exchange,
        symbol: symbol.as_str(),
        side: *side,
        children: child_orders,
    };
    if let OrderVariant::Grid(state) = variant {
        state.seed(&mut ctx, last).await?;
    }
    Ok(())
}

/// Unwind on explicit cancel: cancel grid legs, or any still-resting child
/// of the other variants, then mark the order Cancelled. Also used by the
/// engine when a detached order is cancelled with no worker left.
pub(super) async fn cancel_order(order: &mut WatchedOrder, exchange: &RetryingClient) {
    let id = order.id.clone();
    let WatchedOrder {
        symbol,
        side,
        variant,
        child_orders,
        ..
    } = &mut *order;
    match variant {
        OrderVariant::Grid(state) => {
            let mut ctx = PolicyContext {
                exchange,
                symbol: symbol.as_str(),
                side: *side,
                children: child_orders,
            };
            state.unwind(&mut ctx).await;
        }
        _ => {
            for child in child_orders.iter_mut().filter(|c| !c.status.is_terminal()) {
                match exchange.cancel_order(symbol, &child.id).await {
                    Ok(status) => child.status = status,
                    Err(e) => {
                        debug!(order_id = %id, child = %child.id, error = %e, "child cancel skipped")
                    }
                }
            }
        }
    }
    order.status = WatchedOrderStatus::Cancelled;
}

/// One full evaluation: stamp the tick, run the policy, apply the outcome
/// or record the failure.
async fn evaluate_and_apply(order: &mut WatchedOrder, exchange: &RetryingClient) {
    order.last_evaluated_at = Some(Utc::now());
    match evaluate_once(order, exchange).await {
        Ok(PolicyOutcome::Continue) => {}
        Ok(PolicyOutcome::Transition(next)) => {
            if next != order.status {
                info!(order_id = %order.id, from = %order.status, to = %next, "status transition");
            }
            order.status = next;
        }
        Err(e) => fail_order(order, &e),
    }
}

fn fail_order(order: &mut WatchedOrder, error: &ExchangeError) {
    error!(order_id = %order.id, error = %error, "watched order failed");
    order.error_info = Some(error.to_string());
    order.status = WatchedOrderStatus::Failed;
}

/// Worker loop for one watched order. Runs until the order reaches a
/// terminal status or a stop signal arrives.
pub(crate) async fn run_order_worker(
    registry: Arc<OrderRegistry>,
    exchange: RetryingClient,
    mut order: WatchedOrder,
    interval: Duration,
    mut stop_rx: watch::Receiver<StopSignal>,
) {
    info!(
        order_id = %order.id,
        variant = order.variant.kind(),
        symbol = %order.symbol,
        interval_ms = interval.as_millis() as u64,
        "monitor worker started"
    );

    if order.status == WatchedOrderStatus::Pending {
        order.status = WatchedOrderStatus::Monitoring;
    }
    if let Err(e) = seed_if_grid(&mut order, &exchange).await {
        fail_order(&mut order, &e);
    }
    // TWAP sends its first slice right away; slice i then fires at
    // i * interval, so the whole schedule fits inside the duration.
    if matches!(order.variant, OrderVariant::Twap(_)) && !order.is_terminal() {
        evaluate_and_apply(&mut order, &exchange).await;
    }
    registry.replace(&order).await;

    while !order.is_terminal() {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    debug!(order_id = %order.id, "engine dropped, worker detaching");
                    return;
                }
            }
        }

        // Copy the signal out so the watch guard is not held across the
        // unwind await below.
        let signal = *stop_rx.borrow();
        match signal {
            StopSignal::Run => {}
            StopSignal::Cancel => {
                info!(order_id = %order.id, "cancel observed, unwinding");
                cancel_order(&mut order, &exchange).await;
                registry.replace(&order).await;
                break;
            }
            StopSignal::Detach => {
                debug!(order_id = %order.id, "detach observed, worker exiting");
                return;
            }
        }

        evaluate_and_apply(&mut order, &exchange).await;
        registry.replace(&order).await;
    }

    info!(order_id = %order.id, status = %order.status, "monitor worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use crate::orders::{StopLimitState, WatchedOrderId};
    use crate::resilience::RetryPolicy;
    use crate::types::OrderSide;
    use rust_decimal_macros::dec;

    fn stop_limit_order(id: &str) -> WatchedOrder {
        WatchedOrder::new(
            WatchedOrderId::new(id),
            "BTCUSDT",
            OrderSide::Buy,
            OrderVariant::StopLimit(StopLimitState::new(dec!(0.5), dec!(27500), dec!(27000))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_the_order_locally() {
        // No price feed: every get_last_price is a transient error, so the
        // retry budget drains and the order must end Failed with the error
        // recorded, without the worker panicking.
        let registry = Arc::new(OrderRegistry::new());
        let venue = Arc::new(PaperExchange::new());
        let exchange = RetryingClient::new(venue, RetryPolicy::default());

        let order = stop_limit_order("sl-1");
        registry.insert(order.clone()).await;
        let (_stop_tx, stop_rx) = watch::channel(StopSignal::Run);

        run_order_worker(
            registry.clone(),
            exchange,
            order,
            Duration::from_secs(5),
            stop_rx,
        )
        .await;

        let snap = registry.snapshot(&"sl-1".into()).await.unwrap();
        assert_eq!(snap.status, WatchedOrderStatus::Failed);
        assert!(snap.error_info.unwrap().contains("no price feed"));
        assert!(snap.last_evaluated_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_leaves_order_untouched() {
        let registry = Arc::new(OrderRegistry::new());
        let venue = Arc::new(PaperExchange::new());
        venue.set_last_price("BTCUSDT", dec!(27000));
        let exchange = RetryingClient::new(venue, RetryPolicy::default());

        let order = stop_limit_order("sl-2");
        registry.insert(order.clone()).await;
        let (stop_tx, stop_rx) = watch::channel(StopSignal::Run);

        let handle = tokio::spawn(run_order_worker(
            registry.clone(),
            exchange,
            order,
            Duration::from_secs(5),
            stop_rx,
        ));
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop_tx.send(StopSignal::Detach).unwrap();
        handle.await.unwrap();

        let snap = registry.snapshot(&"sl-2".into()).await.unwrap();
        assert_eq!(snap.status, WatchedOrderStatus::Monitoring);
    }
}
