//! Order repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderShipmentStatus, OrderStatus, ShipmentNumber, SkuCode, WarehouseCode};
use tokio::sync::RwLock;

use crate::{Result, StoreError, Version, Versioned};

/// Repository for [`Order`] aggregates.
///
/// `insert` enforces order-number uniqueness; `update` is a compare-and-swap
/// on the version read, surfacing [`StoreError::ConcurrencyConflict`] on
/// mismatch. Query methods return orders in insertion (creation) order.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if an order with the same
    /// order number (or id) already exists.
    async fn insert(&self, order: Order) -> Result<Versioned<Order>>;

    /// Updates an existing order, conditioned on the version it was read at.
    async fn update(&self, order: Order, expected_version: Version) -> Result<Versioned<Order>>;

    /// Loads an order by id.
    async fn get(&self, order_id: OrderId) -> Result<Option<Versioned<Order>>>;

    /// Loads an order by order number.
    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Versioned<Order>>>;

    /// Loads the order owning the given shipment.
    async fn find_by_shipment_number(
        &self,
        shipment_number: &ShipmentNumber,
    ) -> Result<Option<Versioned<Order>>>;

    /// Returns orders in any of the given statuses that have at least one
    /// shipment in the given shipment status.
    async fn find_by_status_with_shipments_in(
        &self,
        order_statuses: &[OrderStatus],
        shipment_status: OrderShipmentStatus,
    ) -> Result<Vec<Versioned<Order>>>;

    /// Returns orders with at least one shipment awaiting inventory that has
    /// an unallocated line for the given SKU, fulfilled from the given
    /// warehouse, oldest first.
    async fn find_awaiting_inventory(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
    ) -> Result<Vec<Versioned<Order>>>;
}

#[derive(Default)]
struct OrderMap {
    /// Order id -> (order, version, insertion sequence).
    orders: HashMap<OrderId, (Order, Version, u64)>,
    by_number: HashMap<String, OrderId>,
    next_seq: u64,
}

/// In-memory order repository.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderMap>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

fn awaits_inventory_for(order: &Order, sku_code: &SkuCode) -> bool {
    order.shipments().iter().any(|shipment| {
        shipment.status() == OrderShipmentStatus::AwaitingInventory
            && shipment
                .skus()
                .iter()
                .any(|sku| &sku.sku_code == sku_code && sku.unallocated_quantity() > 0)
    })
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<Versioned<Order>> {
        let mut state = self.state.write().await;

        if state.by_number.contains_key(&order.order_number) {
            return Err(StoreError::DuplicateKey {
                constraint: "order_number",
                value: order.order_number.clone(),
            });
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateKey {
                constraint: "order_id",
                value: order.id.to_string(),
            });
        }

        let version = Version::first();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.by_number.insert(order.order_number.clone(), order.id);
        state
            .orders
            .insert(order.id, (order.clone(), version, seq));

        Ok(Versioned::new(order, version))
    }

    async fn update(&self, order: Order, expected_version: Version) -> Result<Versioned<Order>> {
        let mut state = self.state.write().await;

        let entry = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "Order",
                id: order.id.to_string(),
            })?;

        if entry.1 != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                entity: "Order",
                id: order.id.to_string(),
            });
        }

        let version = expected_version.next();
        entry.0 = order.clone();
        entry.1 = version;

        Ok(Versioned::new(order, version))
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Versioned<Order>>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .get(&order_id)
            .map(|(order, version, _)| Versioned::new(order.clone(), *version)))
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Versioned<Order>>> {
        let state = self.state.read().await;
        Ok(state
            .by_number
            .get(order_number)
            .and_then(|id| state.orders.get(id))
            .map(|(order, version, _)| Versioned::new(order.clone(), *version)))
    }

    async fn find_by_shipment_number(
        &self,
        shipment_number: &ShipmentNumber,
    ) -> Result<Option<Versioned<Order>>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|(order, _, _)| order.shipment(shipment_number).is_some())
            .map(|(order, version, _)| Versioned::new(order.clone(), *version)))
    }

    async fn find_by_status_with_shipments_in(
        &self,
        order_statuses: &[OrderStatus],
        shipment_status: OrderShipmentStatus,
    ) -> Result<Vec<Versioned<Order>>> {
        let state = self.state.read().await;
        let mut matches: Vec<_> = state
            .orders
            .values()
            .filter(|(order, _, _)| {
                order_statuses.contains(&order.status())
                    && order
                        .shipments()
                        .iter()
                        .any(|shipment| shipment.status() == shipment_status)
            })
            .collect();
        matches.sort_by_key(|(_, _, seq)| *seq);
        Ok(matches
            .into_iter()
            .map(|(order, version, _)| Versioned::new(order.clone(), *version))
            .collect())
    }

    async fn find_awaiting_inventory(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
    ) -> Result<Vec<Versioned<Order>>> {
        let state = self.state.read().await;
        let mut matches: Vec<_> = state
            .orders
            .values()
            .filter(|(order, _, _)| {
                &order.warehouse_code == warehouse_code && awaits_inventory_for(order, sku_code)
            })
            .collect();
        matches.sort_by_key(|(_, _, seq)| *seq);
        Ok(matches
            .into_iter()
            .map(|(order, version, _)| Versioned::new(order.clone(), *version))
            .collect())
    }
}
