//! Order lock repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::OrderLock;
use tokio::sync::RwLock;

use crate::{Result, StoreError};

/// Repository for advisory [`OrderLock`]s.
///
/// The one-live-lock-per-order invariant is enforced here: `insert` fails
/// with [`StoreError::DuplicateKey`] when a lock row already exists for the
/// order.
#[async_trait]
pub trait OrderLockStore: Send + Sync {
    /// Inserts a new lock.
    async fn insert(&self, lock: OrderLock) -> Result<()>;

    /// Returns the live lock for an order, if any.
    async fn get(&self, order_id: OrderId) -> Result<Option<OrderLock>>;

    /// Removes the lock for an order. Removing a non-existent lock is a
    /// no-op.
    async fn remove(&self, order_id: OrderId) -> Result<()>;
}

/// In-memory order lock repository.
#[derive(Clone, Default)]
pub struct InMemoryOrderLockStore {
    locks: Arc<RwLock<HashMap<OrderId, OrderLock>>>,
}

impl InMemoryOrderLockStore {
    /// Creates a new empty lock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live locks.
    pub async fn lock_count(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[async_trait]
impl OrderLockStore for InMemoryOrderLockStore {
    async fn insert(&self, lock: OrderLock) -> Result<()> {
        let mut locks = self.locks.write().await;
        if locks.contains_key(&lock.order_id) {
            return Err(StoreError::DuplicateKey {
                constraint: "order_lock_order_id",
                value: lock.order_id.to_string(),
            });
        }
        locks.insert(lock.order_id, lock);
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<OrderLock>> {
        let locks = self.locks.read().await;
        Ok(locks.get(&order_id).cloned())
    }

    async fn remove(&self, order_id: OrderId) -> Result<()> {
        let mut locks = self.locks.write().await;
        locks.remove(&order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::Actor;

    #[tokio::test]
    async fn insert_get_remove() {
        let store = InMemoryOrderLockStore::new();
        let order_id = OrderId::new();
        let lock = OrderLock::new(order_id, Actor::CmUser("u1".into()), Utc::now());

        store.insert(lock.clone()).await.unwrap();
        assert_eq!(store.get(order_id).await.unwrap(), Some(lock));

        store.remove(order_id).await.unwrap();
        assert!(store.get(order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_insert_is_duplicate() {
        let store = InMemoryOrderLockStore::new();
        let order_id = OrderId::new();
        store
            .insert(OrderLock::new(order_id, Actor::CmUser("u1".into()), Utc::now()))
            .await
            .unwrap();

        let result = store
            .insert(OrderLock::new(order_id, Actor::CmUser("u2".into()), Utc::now()))
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
        assert_eq!(store.lock_count().await, 1);
    }

    #[tokio::test]
    async fn remove_missing_lock_is_noop() {
        let store = InMemoryOrderLockStore::new();
        store.remove(OrderId::new()).await.unwrap();
    }
}
