//! Bounded exponential backoff for venue calls.
//!
//! Policies run every side effect through [`RetryingClient`], which retries
//! transient venue failures (network, rate limit) with a doubling delay and
//! surfaces permanent failures immediately. Repeated transient failure is
//! converted into a terminal error once the attempt budget is spent.
//!
//! Delays are deterministic (no jitter): call sites are per-order policy
//! ticks, not reconnect storms, and tests assert exact attempt counts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::exchange::{
    ExchangeClient, ExchangeError, ExchangeOrderStatus, OrderId, OrderRequest, PlacedOrder,
};

/// Retry budget and delay schedule.
///
/// Delay for attempt `n` (zero-based) is `base_delay * 2^n`, capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to apply after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Run `op` under the policy, retrying only transient exchange errors.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "transient exchange error"
                );
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| ExchangeError::Network("retry budget exhausted".to_string())))
}

/// Exchange client handle with the retry policy baked in.
///
/// Cheap to clone; every order worker holds one.
#[derive(Clone)]
pub struct RetryingClient {
    inner: Arc<dyn ExchangeClient>,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ExchangeClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder, ExchangeError> {
        call_with_retry(&self.policy, "place_order", || self.inner.place_order(request)).await
    }

    pub async fn cancel_order(
        &self,
        symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        call_with_retry(&self.policy, "cancel_order", || {
            self.inner.cancel_order(symbol, id)
        })
        .await
    }

    pub async fn get_order_status(
        &self,
        symbol: &str,
        id: &OrderId,
    ) -> Result<ExchangeOrderStatus, ExchangeError> {
        call_with_retry(&self.policy, "get_order_status", || {
            self.inner.get_order_status(symbol, id)
        })
        .await
    }

    pub async fn get_last_price(&self, symbol: &str) -> Result<rust_decimal::Decimal, ExchangeError> {
        call_with_retry(&self.policy, "get_last_price", || {
            self.inner.get_last_price(symbol)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(3)); // capped
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&quick_policy(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ExchangeError::Network("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&quick_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExchangeError::RateLimited("429".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(ExchangeError::RateLimited(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&quick_policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ExchangeError::InsufficientBalance("broke".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ExchangeError::InsufficientBalance(_))));
    }
}
