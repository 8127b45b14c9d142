//! Scriptable exchange double for engine integration tests.
//!
//! Serves a pre-programmed price tape (the last price repeats once the tape
//! runs out), can inject transient or permanent failures per method, and
//! counts every call so tests can assert on retry and cancel behavior.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use orderwatch::exchange::{
    ExchangeClient, ExchangeError, ExchangeOrderStatus, OrderId, OrderRequest, OrderType,
    PlacedOrder,
};

/// Install the test log subscriber. Safe to call from every test; only the
/// first call wins. Run with `RUST_LOG=orderwatch=debug` to see engine logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct State {
    tape: VecDeque<Decimal>,
    last_price: Option<Decimal>,
    /// Transient failures still to inject on `get_last_price`.
    price_failures: u32,
    /// Placements allowed before every further one is rejected.
    place_budget: Option<u32>,
    statuses: HashMap<OrderId, ExchangeOrderStatus>,
    placed: Vec<OrderRequest>,
}

pub struct ScriptedExchange {
    state: Mutex<State>,
    price_calls: AtomicU32,
    place_calls: AtomicU32,
    cancel_calls: AtomicU32,
    status_calls: AtomicU32,
    next_id: AtomicU64,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            price_calls: AtomicU32::new(0),
            place_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_tape(prices: impl IntoIterator<Item = Decimal>) -> Self {
        let venue = Self::new();
        venue.push_prices(prices);
        venue
    }

    pub fn push_prices(&self, prices: impl IntoIterator<Item = Decimal>) {
        let mut state = self.lock();
        state.tape.extend(prices);
    }

    /// Inject `n` transient network errors before the next price is served.
    pub fn fail_next_price_calls(&self, n: u32) {
        self.lock().price_failures = n;
    }

    /// Allow `n` successful placements, then reject every further one
    /// permanently.
    pub fn reject_placements_after(&self, n: u32) {
        self.lock().place_budget = Some(n);
    }

    /// Force the venue-side status of an order (fill or expire it).
    pub fn set_order_status(&self, id: &OrderId, status: ExchangeOrderStatus) {
        self.lock().statuses.insert(id.clone(), status);
    }

    pub fn placed_requests(&self) -> Vec<OrderRequest> {
        self.lock().placed.clone()
    }

    pub fn price_calls(&self) -> u32 {
        self.price_calls.load(Ordering::SeqCst)
    }

    pub fn place_calls(&self) -> u32 {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn allocate_id(&self) -> OrderId {
        OrderId::new(format!(
            "scripted-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ))
    }
}

impl Default for ScriptedExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, ExchangeError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if let Some(budget) = state.place_budget {
            if state.placed.len() as u32 >= budget {
                return Err(ExchangeError::Rejected("placement budget spent".into()));
            }
        }

        let id = self.allocate_id();
        let (status, avg_fill_price) = match request.order_type {
            OrderType::Market => (ExchangeOrderStatus::Filled, state.last_price),
            OrderType::Limit => (ExchangeOrderStatus::New, None),
        };
        state.statuses.insert(id.clone(), status);
        state.placed.push(request.clone());
        Ok(PlacedOrder {
            order_id: id,
            status,
            avg_fill_price,
        })
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        match state.statuses.get_mut(id) {
            Some(status) if !status.is_terminal() => {
                *status = ExchangeOrderStatus::Canceled;
                Ok(ExchangeOrderStatus::Canceled)
            }
            Some(status) => Err(ExchangeError::UnknownOrder(format!("{id} already {status}"))),
            None => Err(ExchangeError::UnknownOrder(id.to_string())),
        }
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .statuses
            .get(id)
            .copied()
            .ok_or_else(|| ExchangeError::UnknownOrder(id.to_string()))
    }

    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.price_failures > 0 {
            state.price_failures -= 1;
            return Err(ExchangeError::Network("injected outage".into()));
        }
        if let Some(next) = state.tape.pop_front() {
            state.last_price = Some(next);
        }
        state
            .last_price
            .ok_or_else(|| ExchangeError::Network(format!("no price feed for {symbol}")))
    }
}
