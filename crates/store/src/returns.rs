//! Order return repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ReturnId};
use domain::OrderReturn;
use tokio::sync::RwLock;

use crate::{Result, StoreError, Version, Versioned};

/// Repository for [`OrderReturn`] entities.
#[async_trait]
pub trait ReturnStore: Send + Sync {
    /// Persists a new return.
    async fn insert(&self, order_return: OrderReturn) -> Result<Versioned<OrderReturn>>;

    /// Updates an existing return, conditioned on the version it was read at.
    async fn update(
        &self,
        order_return: OrderReturn,
        expected_version: Version,
    ) -> Result<Versioned<OrderReturn>>;

    /// Loads a return by id.
    async fn get(&self, return_id: ReturnId) -> Result<Option<Versioned<OrderReturn>>>;

    /// Returns all returns raised against an order, oldest first.
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderReturn>>;
}

#[derive(Default)]
struct ReturnMap {
    returns: HashMap<ReturnId, (OrderReturn, Version, u64)>,
    next_seq: u64,
}

/// In-memory return repository.
#[derive(Clone, Default)]
pub struct InMemoryReturnStore {
    state: Arc<RwLock<ReturnMap>>,
}

impl InMemoryReturnStore {
    /// Creates a new empty return store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReturnStore for InMemoryReturnStore {
    async fn insert(&self, order_return: OrderReturn) -> Result<Versioned<OrderReturn>> {
        let mut state = self.state.write().await;
        if state.returns.contains_key(&order_return.id) {
            return Err(StoreError::DuplicateKey {
                constraint: "return_id",
                value: order_return.id.to_string(),
            });
        }
        let version = Version::first();
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .returns
            .insert(order_return.id, (order_return.clone(), version, seq));
        Ok(Versioned::new(order_return, version))
    }

    async fn update(
        &self,
        order_return: OrderReturn,
        expected_version: Version,
    ) -> Result<Versioned<OrderReturn>> {
        let mut state = self.state.write().await;
        let entry = state
            .returns
            .get_mut(&order_return.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "OrderReturn",
                id: order_return.id.to_string(),
            })?;

        if entry.1 != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                entity: "OrderReturn",
                id: order_return.id.to_string(),
            });
        }

        let version = expected_version.next();
        entry.0 = order_return.clone();
        entry.1 = version;
        Ok(Versioned::new(order_return, version))
    }

    async fn get(&self, return_id: ReturnId) -> Result<Option<Versioned<OrderReturn>>> {
        let state = self.state.read().await;
        Ok(state
            .returns
            .get(&return_id)
            .map(|(ret, version, _)| Versioned::new(ret.clone(), *version)))
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<OrderReturn>> {
        let state = self.state.read().await;
        let mut matches: Vec<_> = state
            .returns
            .values()
            .filter(|(ret, _, _)| ret.order_id == order_id)
            .collect();
        matches.sort_by_key(|(_, _, seq)| *seq);
        Ok(matches.into_iter().map(|(ret, _, _)| ret.clone()).collect())
    }
}
