//! In-process simulated exchange.
//!
//! A minimal venue for paper trading and tests: the last trade price is set
//! by the caller, market orders fill immediately at that price, and limit
//! orders rest until a price update crosses them. No partial fills, no
//! fees, no latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use crate::types::OrderSide;

use super::{
    ExchangeClient, ExchangeError, ExchangeOrderStatus, OrderId, OrderRequest, OrderType,
    PlacedOrder,
};

struct RestingOrder {
    request: OrderRequest,
    status: ExchangeOrderStatus,
}

/// Simulated venue with a settable last price and fill-on-cross limit book.
pub struct PaperExchange {
    // Never held across an await point.
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

struct Inner {
    prices: HashMap<String, Decimal>,
    orders: HashMap<OrderId, RestingOrder>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                prices: HashMap::new(),
                orders: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish a new last trade price and fill any limit orders it crosses.
    pub fn set_last_price(&self, symbol: &str, price: Decimal) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.prices.insert(symbol.to_string(), price);

        for (id, order) in inner.orders.iter_mut() {
            if order.status != ExchangeOrderStatus::New || order.request.symbol != symbol {
                continue;
            }
            let Some(limit) = order.request.price else {
                continue;
            };
            let crossed = match order.request.side {
                OrderSide::Buy => price <= limit,
                OrderSide::Sell => price >= limit,
            };
            if crossed {
                order.status = ExchangeOrderStatus::Filled;
                debug!(order_id = %id, %price, limit = %limit, "paper limit order filled");
            }
        }
    }

    fn allocate_id(&self) -> OrderId {
        OrderId::new(format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, ExchangeError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let last = inner.prices.get(&request.symbol).copied();

        let id = self.allocate_id();
        match request.order_type {
            OrderType::Market => {
                let Some(price) = last else {
                    return Err(ExchangeError::Rejected(format!(
                        "no market for {}",
                        request.symbol
                    )));
                };
                inner.orders.insert(
                    id.clone(),
                    RestingOrder {
                        request: request.clone(),
                        status: ExchangeOrderStatus::Filled,
                    },
                );
                debug!(order_id = %id, symbol = %request.symbol, %price, "paper market order filled");
                Ok(PlacedOrder {
                    order_id: id,
                    status: ExchangeOrderStatus::Filled,
                    avg_fill_price: Some(price),
                })
            }
            OrderType::Limit => {
                let Some(limit) = request.price else {
                    return Err(ExchangeError::Rejected("limit order without price".into()));
                };
                // A limit order already crossing the market fills at once.
                let crossed = last.is_some_and(|p| match request.side {
                    OrderSide::Buy => p <= limit,
                    OrderSide::Sell => p >= limit,
                });
                let status = if crossed {
                    ExchangeOrderStatus::Filled
                } else {
                    ExchangeOrderStatus::New
                };
                inner.orders.insert(
                    id.clone(),
                    RestingOrder {
                        request: request.clone(),
                        status,
                    },
                );
                debug!(order_id = %id, symbol = %request.symbol, limit = %limit, ?status, "paper limit order placed");
                Ok(PlacedOrder {
                    order_id: id,
                    status,
                    avg_fill_price: if crossed { Some(limit) } else { None },
                })
            }
        }
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let order = inner
            .orders
            .get_mut(id)
            .ok_or_else(|| ExchangeError::UnknownOrder(id.to_string()))?;
        if order.status.is_terminal() {
            return Err(ExchangeError::UnknownOrder(format!(
                "{id} already {}",
                order.status
            )));
        }
        order.status = ExchangeOrderStatus::Canceled;
        Ok(ExchangeOrderStatus::Canceled)
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .orders
            .get(id)
            .map(|o| o.status)
            .ok_or_else(|| ExchangeError::UnknownOrder(id.to_string()))
    }

    async fn get_last_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Network(format!("no price feed for {symbol}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_market_order_fills_at_last_price() {
        let venue = PaperExchange::new();
        venue.set_last_price("BTCUSDT", dec!(27500));

        let placed = venue
            .place_order(&OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(0.5)))
            .await
            .unwrap();
        assert_eq!(placed.status, ExchangeOrderStatus::Filled);
        assert_eq!(placed.avg_fill_price, Some(dec!(27500)));
    }

    #[tokio::test]
    async fn test_limit_order_rests_until_crossed() {
        let venue = PaperExchange::new();
        venue.set_last_price("BTCUSDT", dec!(27500));

        let placed = venue
            .place_order(&OrderRequest::limit(
                "BTCUSDT",
                OrderSide::Buy,
                dec!(0.5),
                dec!(27000),
            ))
            .await
            .unwrap();
        assert_eq!(placed.status, ExchangeOrderStatus::New);

        venue.set_last_price("BTCUSDT", dec!(26900));
        let status = venue
            .get_order_status("BTCUSDT", &placed.order_id)
            .await
            .unwrap();
        assert_eq!(status, ExchangeOrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_cancel_of_filled_order_fails() {
        let venue = PaperExchange::new();
        venue.set_last_price("ETHUSDT", dec!(1800));

        let placed = venue
            .place_order(&OrderRequest::market("ETHUSDT", OrderSide::Sell, dec!(1)))
            .await
            .unwrap();
        let err = venue
            .cancel_order("ETHUSDT", &placed.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownOrder(_)));
    }

    #[tokio::test]
    async fn test_price_without_feed_is_transient() {
        let venue = PaperExchange::new();
        let err = venue.get_last_price("DOGEUSDT").await.unwrap_err();
        assert!(err.is_transient());
    }
}
