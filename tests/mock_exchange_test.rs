//! Policy behavior pinned against a mocked venue.
//!
//! These tests assert on the exact venue calls a policy makes (arguments
//! and call counts), which the simulated exchanges cannot express.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use orderwatch::engine::{PolicyContext, PolicyOutcome, TriggerPolicy};
use orderwatch::exchange::{
    ExchangeClient, ExchangeError, ExchangeOrderStatus, OrderId, OrderRequest, PlacedOrder,
};
use orderwatch::orders::{ChildOrder, OcoState, StopLimitState, WatchedOrderStatus};
use orderwatch::resilience::{RetryPolicy, RetryingClient};
use orderwatch::types::OrderSide;

mock! {
    Venue {}

    #[async_trait]
    impl ExchangeClient for Venue {
        async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, ExchangeError>;
        async fn cancel_order(
            &self,
            symbol: &str,
            id: &OrderId,
        ) -> Result<ExchangeOrderStatus, ExchangeError>;
        async fn get_order_status(
            &self,
            symbol: &str,
            id: &OrderId,
        ) -> Result<ExchangeOrderStatus, ExchangeError>;
        async fn get_last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
    }
}

fn client(venue: MockVenue) -> RetryingClient {
    RetryingClient::new(Arc::new(venue), quick_retry())
}

fn ack(id: &str) -> PlacedOrder {
    PlacedOrder {
        order_id: OrderId::new(id),
        status: ExchangeOrderStatus::New,
        avg_fill_price: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_limit_places_exactly_one_child_at_the_limit_price() {
    let mut venue = MockVenue::new();
    venue
        .expect_get_last_price()
        .with(eq("BTCUSDT"))
        .times(1)
        .returning(|_| Ok(dec!(27500)));
    venue
        .expect_place_order()
        .withf(|req: &OrderRequest| {
            req.symbol == "BTCUSDT" && req.side == OrderSide::Buy && req.price == Some(dec!(27000))
        })
        .times(1)
        .returning(|_| Ok(ack("venue-1")));

    let exchange = client(venue);
    let mut state = StopLimitState::new(dec!(0.5), dec!(27500), dec!(27000));
    let mut children: Vec<ChildOrder> = Vec::new();
    let mut ctx = PolicyContext {
        exchange: &exchange,
        symbol: "BTCUSDT",
        side: OrderSide::Buy,
        children: &mut children,
    };

    let outcome = state.tick(&mut ctx).await.unwrap();
    assert_eq!(
        outcome,
        PolicyOutcome::Transition(WatchedOrderStatus::Executing)
    );
    assert!(state.triggered);
    assert_eq!(children.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_price_fetch_retries_transient_failures_then_succeeds() {
    let mut venue = MockVenue::new();
    let mut seq = mockall::Sequence::new();
    for _ in 0..2 {
        venue
            .expect_get_last_price()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ExchangeError::Network("flaky".into())));
    }
    venue
        .expect_get_last_price()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(dec!(27000)));

    let exchange = client(venue);
    let mut state = StopLimitState::new(dec!(0.5), dec!(27500), dec!(27000));
    let mut children: Vec<ChildOrder> = Vec::new();
    let mut ctx = PolicyContext {
        exchange: &exchange,
        symbol: "BTCUSDT",
        side: OrderSide::Buy,
        children: &mut children,
    };

    // Below the stop after the retries: no placement, keep watching.
    let outcome = state.tick(&mut ctx).await.unwrap();
    assert_eq!(outcome, PolicyOutcome::Continue);
    assert!(!state.triggered);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_rejection_surfaces_without_retry() {
    let mut venue = MockVenue::new();
    venue
        .expect_get_last_price()
        .times(1)
        .returning(|_| Ok(dec!(27600)));
    venue
        .expect_place_order()
        .times(1)
        .returning(|_| Err(ExchangeError::InsufficientBalance("0 USDT free".into())));

    let exchange = client(venue);
    let mut state = StopLimitState::new(dec!(0.5), dec!(27500), dec!(27000));
    let mut children: Vec<ChildOrder> = Vec::new();
    let mut ctx = PolicyContext {
        exchange: &exchange,
        symbol: "BTCUSDT",
        side: OrderSide::Buy,
        children: &mut children,
    };

    let err = state.tick(&mut ctx).await.unwrap_err();
    assert!(matches!(err, ExchangeError::InsufficientBalance(_)));
    assert!(children.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_oco_loser_leg_never_reaches_the_venue() {
    let mut venue = MockVenue::new();
    venue
        .expect_get_last_price()
        .times(1)
        .returning(|_| Ok(dec!(26900)));
    // Only the stop-loss goes out; a take-profit placement would fail the
    // call-count expectation.
    venue
        .expect_place_order()
        .withf(|req: &OrderRequest| req.price == Some(dec!(27000)))
        .times(1)
        .returning(|_| Ok(ack("venue-2")));

    let exchange = client(venue);
    let mut state = OcoState::new(dec!(0.5), dec!(29000), dec!(27000));
    let mut children: Vec<ChildOrder> = Vec::new();
    let mut ctx = PolicyContext {
        exchange: &exchange,
        symbol: "BTCUSDT",
        side: OrderSide::Sell,
        children: &mut children,
    };

    let outcome = state.tick(&mut ctx).await.unwrap();
    assert_eq!(
        outcome,
        PolicyOutcome::Transition(WatchedOrderStatus::Executing)
    );
    assert_eq!(children.len(), 1);
}
