//! Advisory order locking for interactive editing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Actor, LockValidation, Order, OrderLock};
use store::{OrderLockStore, OrderStore, StoreError, Versioned};

use crate::error::{FulfillmentError, Result};
use crate::services::time::TimeService;

/// Manages the one-live-lock-per-order contract for editing clients.
///
/// Outcomes are returned directly from each call; the service itself holds
/// no per-request state.
pub struct OrderLockService {
    locks: Arc<dyn OrderLockStore>,
    orders: Arc<dyn OrderStore>,
    time: Arc<dyn TimeService>,
}

impl OrderLockService {
    /// Creates a new lock service.
    pub fn new(
        locks: Arc<dyn OrderLockStore>,
        orders: Arc<dyn OrderStore>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            locks,
            orders,
            time,
        }
    }

    /// Attempts to take the lock on an order.
    ///
    /// Returns `None` without locking when the order was modified after the
    /// editor opened it, or when another live lock already exists (the
    /// store's uniqueness violation is "already locked", not an error).
    #[tracing::instrument(skip(self, order, actor), fields(order_id = %order.id))]
    pub async fn obtain_lock(
        &self,
        order: &Order,
        actor: &Actor,
        editor_opened_at: DateTime<Utc>,
    ) -> Result<Option<OrderLock>> {
        if order.last_modified > editor_opened_at {
            return Ok(None);
        }

        let lock = OrderLock::new(order.id, actor.clone(), self.time.now());
        match self.locks.insert(lock.clone()).await {
            Ok(()) => Ok(Some(lock)),
            Err(StoreError::DuplicateKey { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-derives the state of a lock the caller holds.
    pub async fn validate_lock(
        &self,
        lock: &OrderLock,
        editor_opened_at: DateTime<Utc>,
    ) -> Result<LockValidation> {
        let live = match self.locks.get(lock.order_id).await? {
            None => return Ok(LockValidation::OrderWasUnlocked),
            Some(live) => live,
        };
        if live.locked_by != lock.locked_by {
            return Ok(LockValidation::OrderIsLocked);
        }
        if live.created_at != lock.created_at {
            return Ok(LockValidation::LockIsAlien);
        }

        let order = self
            .orders
            .get(lock.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(lock.order_id))?;
        if order.entity.last_modified > editor_opened_at {
            return Ok(LockValidation::OrderWasModified);
        }
        Ok(LockValidation::ValidatedSuccessfully)
    }

    /// Releases a lock. Only the actor that took the lock may release it.
    pub async fn release_lock(&self, lock: &OrderLock, actor: &Actor) -> Result<()> {
        if &lock.locked_by != actor {
            return Err(FulfillmentError::InvalidUnlocker {
                holder: lock.locked_by.descriptor(),
                releaser: actor.descriptor(),
            });
        }
        self.locks.remove(lock.order_id).await?;
        Ok(())
    }

    /// Returns the live lock for an order, if any.
    pub async fn order_lock(&self, order_id: OrderId) -> Result<Option<OrderLock>> {
        Ok(self.locks.get(order_id).await?)
    }

    /// Releases any live lock held by the actor and persists the order.
    pub async fn unlock_and_update(
        &self,
        order: Versioned<Order>,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        if let Some(lock) = self.locks.get(order.entity.id).await? {
            self.release_lock(&lock, actor).await?;
        }
        let mut entity = order.entity;
        entity.touch(self.time.now(), actor.clone());
        Ok(self.orders.update(entity, order.version).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{CustomerId, StoreCode, WarehouseCode};
    use store::{InMemoryOrderLockStore, InMemoryOrderStore};

    use crate::services::time::FixedTimeService;

    struct Fixture {
        service: OrderLockService,
        orders: InMemoryOrderStore,
        time: Arc<FixedTimeService>,
    }

    fn fixture() -> Fixture {
        let orders = InMemoryOrderStore::new();
        let time = Arc::new(FixedTimeService::new());
        let service = OrderLockService::new(
            Arc::new(InMemoryOrderLockStore::new()),
            Arc::new(orders.clone()),
            time.clone(),
        );
        Fixture {
            service,
            orders,
            time,
        }
    }

    async fn stored_order(f: &Fixture) -> Versioned<Order> {
        let order = Order::new(
            OrderId::new(),
            "ORD-1",
            CustomerId::new(),
            StoreCode::new("store1"),
            WarehouseCode::new("WH1"),
            "USD",
            vec![],
            f.time.now(),
            Actor::System,
        );
        f.orders.insert(order).await.unwrap()
    }

    fn editor() -> Actor {
        Actor::CmUser("editor".into())
    }

    #[tokio::test]
    async fn obtain_validate_release() {
        let f = fixture();
        let order = stored_order(&f).await;
        let opened_at = f.time.now();
        f.time.advance(Duration::seconds(5));

        let lock = f
            .service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap()
            .expect("lock should be granted");

        assert_eq!(
            f.service.validate_lock(&lock, opened_at).await.unwrap(),
            LockValidation::ValidatedSuccessfully
        );

        f.service.release_lock(&lock, &editor()).await.unwrap();
        assert!(f.service.order_lock(order.entity.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn modified_order_is_never_locked() {
        let f = fixture();
        let order = stored_order(&f).await;

        // Editor opened before the order was last modified.
        let opened_at = order.entity.last_modified - Duration::minutes(5);
        let lock = f
            .service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap();
        assert!(lock.is_none());
    }

    #[tokio::test]
    async fn second_locker_gets_nothing() {
        let f = fixture();
        let order = stored_order(&f).await;
        let opened_at = f.time.now();
        f.time.advance(Duration::seconds(5));

        let first = f
            .service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = f
            .service
            .obtain_lock(&order.entity, &Actor::CmUser("other".into()), opened_at)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn validate_outcomes() {
        let f = fixture();
        let order = stored_order(&f).await;
        let opened_at = f.time.now();
        f.time.advance(Duration::seconds(5));

        let lock = f
            .service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap()
            .unwrap();

        // Released elsewhere: unlocked.
        f.service.release_lock(&lock, &editor()).await.unwrap();
        assert_eq!(
            f.service.validate_lock(&lock, opened_at).await.unwrap(),
            LockValidation::OrderWasUnlocked
        );

        // A different editor takes the lock: locked.
        f.time.advance(Duration::seconds(5));
        let foreign = f
            .service
            .obtain_lock(&order.entity, &Actor::CmUser("other".into()), f.time.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            f.service.validate_lock(&lock, opened_at).await.unwrap(),
            LockValidation::OrderIsLocked
        );
        f.service
            .release_lock(&foreign, &Actor::CmUser("other".into()))
            .await
            .unwrap();

        // Same editor, different lock instance: alien.
        f.time.advance(Duration::seconds(5));
        let _second = f
            .service
            .obtain_lock(&order.entity, &editor(), f.time.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            f.service.validate_lock(&lock, opened_at).await.unwrap(),
            LockValidation::LockIsAlien
        );
    }

    #[tokio::test]
    async fn modified_order_detected_on_validate() {
        let f = fixture();
        let order = stored_order(&f).await;
        let opened_at = f.time.now();
        f.time.advance(Duration::seconds(5));

        let lock = f
            .service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap()
            .unwrap();

        // Someone else saves the order after our editor opened it.
        f.time.advance(Duration::seconds(5));
        let mut modified = order.entity.clone();
        modified.touch(f.time.now(), Actor::System);
        f.orders.update(modified, order.version).await.unwrap();

        assert_eq!(
            f.service.validate_lock(&lock, opened_at).await.unwrap(),
            LockValidation::OrderWasModified
        );
    }

    #[tokio::test]
    async fn foreign_release_is_rejected() {
        let f = fixture();
        let order = stored_order(&f).await;
        let opened_at = f.time.now();
        f.time.advance(Duration::seconds(5));

        let lock = f
            .service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap()
            .unwrap();

        let result = f
            .service
            .release_lock(&lock, &Actor::CmUser("intruder".into()))
            .await;
        assert!(matches!(
            result,
            Err(FulfillmentError::InvalidUnlocker { .. })
        ));
        // Lock is still held.
        assert!(f.service.order_lock(order.entity.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unlock_and_update_releases_and_persists() {
        let f = fixture();
        let order = stored_order(&f).await;
        let opened_at = f.time.now();
        f.time.advance(Duration::seconds(5));

        f.service
            .obtain_lock(&order.entity, &editor(), opened_at)
            .await
            .unwrap()
            .unwrap();

        let saved = f
            .service
            .unlock_and_update(order.clone(), &editor())
            .await
            .unwrap();
        assert_eq!(saved.version, order.version.next());
        assert!(f.service.order_lock(saved.entity.id).await.unwrap().is_none());
    }
}
