//! Shared registry of live watched orders.
//!
//! Process-wide mapping from watched-order id to its record, accessed
//! concurrently by every monitor worker and by the caller-facing engine.
//! Reads hand out snapshots (clones); writes go through the lock so a
//! cleanup sweep can never race an in-flight status update.
//!
//! # Thread Safety
//!
//! Uses `tokio::sync::RwLock` for concurrent reads with exclusive writes.
//! The lock is never held across an await into the exchange.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{WatchedOrder, WatchedOrderId, WatchedOrderStatus};

/// Errors from registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Unknown or already-swept watched order
    #[error("watched order not found: {0}")]
    NotFound(WatchedOrderId),
}

/// Thread-safe store of all watched orders in the process.
#[derive(Default)]
pub struct OrderRegistry {
    orders: RwLock<HashMap<WatchedOrderId, WatchedOrder>>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly created order. Replaces any record with the same id
    /// (ids are unique for the process lifetime, so this only happens in
    /// tests).
    pub async fn insert(&self, order: WatchedOrder) {
        let mut orders = self.orders.write().await;
        debug!(order_id = %order.id, variant = order.variant.kind(), "watched order registered");
        orders.insert(order.id.clone(), order);
    }

    /// Register the order unless the number of non-terminal records has
    /// reached `cap`. Count and insert happen under one write lock, so two
    /// concurrent creations cannot both slip past the cap.
    pub async fn insert_within_cap(&self, order: WatchedOrder, cap: usize) -> bool {
        let mut orders = self.orders.write().await;
        if orders.values().filter(|o| !o.is_terminal()).count() >= cap {
            return false;
        }
        debug!(order_id = %order.id, variant = order.variant.kind(), "watched order registered");
        orders.insert(order.id.clone(), order);
        true
    }

    /// Snapshot of a single order.
    pub async fn snapshot(&self, id: &WatchedOrderId) -> Result<WatchedOrder, RegistryError> {
        let orders = self.orders.read().await;
        orders
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Overwrite an existing record with the worker's updated copy.
    ///
    /// Returns false if the record is gone (already swept); the stale write
    /// is dropped rather than resurrecting the entry.
    pub async fn replace(&self, order: &WatchedOrder) -> bool {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                true
            }
            None => false,
        }
    }

    /// Apply a mutation to one record under the write lock, returning the
    /// updated snapshot.
    pub async fn update<F>(&self, id: &WatchedOrderId, f: F) -> Result<WatchedOrder, RegistryError>
    where
        F: FnOnce(&mut WatchedOrder),
    {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        f(order);
        Ok(order.clone())
    }

    /// Snapshots of all orders currently in the given status.
    pub async fn list_by_status(&self, status: WatchedOrderStatus) -> Vec<WatchedOrder> {
        let orders = self.orders.read().await;
        orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    /// Snapshots of all non-terminal orders.
    pub async fn active_orders(&self) -> Vec<WatchedOrder> {
        let orders = self.orders.read().await;
        orders.values().filter(|o| !o.is_terminal()).cloned().collect()
    }

    /// Number of non-terminal orders.
    pub async fn active_count(&self) -> usize {
        let orders = self.orders.read().await;
        orders.values().filter(|o| !o.is_terminal()).count()
    }

    /// Total number of records, terminal included.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Remove every terminal order. Terminal orders are never evaluated
    /// again, so nothing can race this removal.
    pub async fn sweep_completed(&self) -> usize {
        let mut orders = self.orders.write().await;
        let before = orders.len();
        orders.retain(|_, o| !o.is_terminal());
        let removed = before - orders.len();
        if removed > 0 {
            info!(removed, "swept terminal watched orders");
        }
        removed
    }
}
