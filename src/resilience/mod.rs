//! # Resilience Module
//!
//! Reusable resilience patterns around calls to the trading venue.
//!
//! ## Components
//! - `RetryPolicy` / `RetryingClient`: bounded exponential backoff around
//!   every `ExchangeClient` operation.

pub mod retry;

// Re-export for convenience
pub use retry::{call_with_retry, RetryPolicy, RetryingClient};
