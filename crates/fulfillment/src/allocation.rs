//! Allocation engine: the single authorized entry point for mutating
//! allocation state.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    Actor, AllocationEventType, AllocationResult, AllocationStatus, AvailabilityCriteria,
    InventoryCommand, InventoryKey, OrderSku, SkuCode, WarehouseCode,
};
use store::InventoryStore;
use tokio::sync::RwLock;

use crate::error::{FulfillmentError, Result};
use crate::services::catalog::{CatalogService, SkuDescriptor};

/// Callback fired when new stock arrives for a (SKU, warehouse) pair.
#[async_trait]
pub trait InventoryListener: Send + Sync {
    /// Notifies the listener of newly received stock.
    async fn new_inventory(&self, sku_code: &SkuCode, warehouse_code: &WarehouseCode);
}

/// Decides how much of a SKU's stock can be promised to an order line and
/// applies quantity deltas to the inventory store.
///
/// All mutation flows through [`InventoryStore::execute`], which serializes
/// commands per (SKU, warehouse) key; concurrent callers for different keys
/// proceed independently.
pub struct AllocationService {
    inventory: Arc<dyn InventoryStore>,
    catalog: Arc<dyn CatalogService>,
    listeners: RwLock<Vec<Arc<dyn InventoryListener>>>,
}

impl AllocationService {
    /// Creates a new allocation engine.
    pub fn new(inventory: Arc<dyn InventoryStore>, catalog: Arc<dyn CatalogService>) -> Self {
        Self {
            inventory,
            catalog,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a listener for new-inventory notifications.
    pub async fn register_listener(&self, listener: Arc<dyn InventoryListener>) {
        self.listeners.write().await.push(listener);
    }

    async fn sku(&self, sku_code: &SkuCode) -> Result<SkuDescriptor> {
        self.catalog
            .find_sku(sku_code)
            .await?
            .ok_or_else(|| FulfillmentError::SkuNotFound(sku_code.clone()))
    }

    /// Returns the unallocated in-stock quantity for a (SKU, warehouse)
    /// pair; zero when the pair has never been stocked.
    pub async fn available_in_stock(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
    ) -> Result<u32> {
        let key = InventoryKey::new(sku_code.clone(), warehouse_code.clone());
        Ok(self
            .inventory
            .get(&key)
            .await?
            .map(|record| record.available_in_stock())
            .unwrap_or(0))
    }

    /// Decides whether `quantity` units can be promised for the SKU.
    ///
    /// What "sufficient" means is the SKU's availability policy: physical
    /// stock for in-stock-only SKUs, the advance-order allowance for
    /// pre/backorder SKUs, and unconditionally true for always-available
    /// SKUs.
    pub async fn has_sufficient_unallocated(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
        quantity: u32,
    ) -> Result<bool> {
        if quantity == 0 {
            return Err(FulfillmentError::Validation(
                "Cannot check for zero or negative quantity".to_string(),
            ));
        }
        let sku = self.sku(sku_code).await?;
        match sku.availability {
            AvailabilityCriteria::AlwaysAvailable => Ok(true),
            AvailabilityCriteria::AvailableWhenInStock => {
                Ok(self.available_in_stock(sku_code, warehouse_code).await? >= quantity)
            }
            AvailabilityCriteria::AvailableForPreOrder
            | AvailabilityCriteria::AvailableForBackOrder => {
                let available = self.available_in_stock(sku_code, warehouse_code).await?;
                if available >= quantity {
                    return Ok(true);
                }
                let details = self.catalog.pre_or_back_order_details(sku_code).await?;
                Ok(details.accepts(quantity - available))
            }
        }
    }

    /// Reports where a requested quantity stands.
    pub async fn allocation_status(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
        quantity: u32,
    ) -> Result<AllocationStatus> {
        if !self
            .has_sufficient_unallocated(sku_code, warehouse_code, quantity)
            .await?
        {
            return Ok(AllocationStatus::NotAllocated);
        }
        let sku = self.sku(sku_code).await?;
        if sku.availability == AvailabilityCriteria::AlwaysAvailable {
            return Ok(AllocationStatus::AllocatedInStock);
        }
        if self.available_in_stock(sku_code, warehouse_code).await? >= quantity {
            Ok(AllocationStatus::AllocatedInStock)
        } else {
            Ok(AllocationStatus::AwaitingAllocation)
        }
    }

    /// Applies an allocation event for an order line.
    ///
    /// Always-available SKUs are never inventory-constrained: the result
    /// reports the full requested quantity allocated and nothing is mutated.
    /// For finite-stock SKUs the event maps to an inventory command through
    /// the [`AllocationEventType`] table; deallocation and release are capped
    /// at the line's allocated quantity so cancellation can never drive the
    /// record negative.
    #[tracing::instrument(
        skip(self, order_sku, originator),
        fields(sku = %order_sku.sku_code, event = %event_type)
    )]
    pub async fn process_allocation_event(
        &self,
        order_sku: &OrderSku,
        event_type: AllocationEventType,
        originator: &Actor,
        warehouse_code: &WarehouseCode,
        quantity: u32,
        reason: Option<&str>,
    ) -> Result<AllocationResult> {
        metrics::counter!("allocation_events_total").increment(1);

        let sku = self.sku(&order_sku.sku_code).await?;
        if sku.availability == AvailabilityCriteria::AlwaysAvailable {
            return Ok(AllocationResult::always_available(quantity));
        }

        let key = InventoryKey::new(order_sku.sku_code.clone(), warehouse_code.clone());
        let result = match event_type {
            AllocationEventType::OrderPlaced => {
                self.allocate(&sku, &key, quantity).await?
            }
            AllocationEventType::OrderCancellation => {
                self.deallocate(&sku, &key, order_sku, quantity).await?
            }
            AllocationEventType::OrderShipmentCompleted => {
                let capped = quantity.min(order_sku.allocated_quantity());
                let execution = self
                    .inventory
                    .execute(&key, event_type.command_for(capped))
                    .await?;
                AllocationResult::of(execution.quantity, 0, execution.inventory_after)
            }
        };

        tracing::info!(
            originator = %originator,
            quantity,
            in_stock = result.quantity_allocated_in_stock,
            awaiting = result.quantity_awaiting_allocation,
            reason = reason.unwrap_or(""),
            "allocation event processed"
        );
        Ok(result)
    }

    async fn allocate(
        &self,
        sku: &SkuDescriptor,
        key: &InventoryKey,
        quantity: u32,
    ) -> Result<AllocationResult> {
        let available = self.available_in_stock(&key.sku_code, &key.warehouse_code).await?;
        let in_stock = quantity.min(available);
        let awaiting = quantity - in_stock;

        if awaiting > 0 {
            if !sku.availability.allows_advance_orders() {
                return Err(FulfillmentError::InsufficientStock {
                    sku_code: key.sku_code.clone(),
                    requested: quantity,
                    available,
                });
            }
            let details = self.catalog.pre_or_back_order_details(&key.sku_code).await?;
            if !details.accepts(awaiting) {
                return Err(FulfillmentError::InsufficientStock {
                    sku_code: key.sku_code.clone(),
                    requested: quantity,
                    available,
                });
            }
            self.catalog
                .add_pre_or_back_order_quantity(&key.sku_code, awaiting)
                .await?;
        }

        let execution = self
            .inventory
            .execute(key, InventoryCommand::Allocate(in_stock))
            .await?;
        Ok(AllocationResult::of(
            in_stock,
            awaiting,
            execution.inventory_after,
        ))
    }

    async fn deallocate(
        &self,
        sku: &SkuDescriptor,
        key: &InventoryKey,
        order_sku: &OrderSku,
        quantity: u32,
    ) -> Result<AllocationResult> {
        // Never deallocate more than the line has allocated.
        let capped = quantity.min(order_sku.allocated_quantity());
        let execution = self
            .inventory
            .execute(key, InventoryCommand::Deallocate(capped))
            .await?;

        // The line's backordered remainder comes off the outstanding counter.
        let backordered = order_sku.unallocated_quantity();
        if backordered > 0 && sku.availability.allows_advance_orders() {
            self.catalog
                .deduct_pre_or_back_order_quantity(&key.sku_code, backordered)
                .await?;
        }

        Ok(AllocationResult::of(
            execution.quantity,
            0,
            execution.inventory_after,
        ))
    }

    /// Records newly received stock and notifies listeners.
    #[tracing::instrument(skip(self), fields(sku = %sku_code, warehouse = %warehouse_code))]
    pub async fn receive_stock(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
        quantity: u32,
        reason: Option<&str>,
    ) -> Result<domain::Inventory> {
        if quantity == 0 {
            return Err(FulfillmentError::Validation(
                "Cannot receive zero quantity".to_string(),
            ));
        }
        let key = InventoryKey::new(sku_code.clone(), warehouse_code.clone());
        let execution = self
            .inventory
            .execute(&key, InventoryCommand::Receive(quantity))
            .await?;
        tracing::info!(quantity, reason = reason.unwrap_or(""), "stock received");
        self.fire_new_inventory(sku_code, warehouse_code).await;
        Ok(execution.inventory_after)
    }

    /// Applies a signed stock correction; listeners fire when availability
    /// increased.
    pub async fn adjust_stock(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
        delta: i64,
        reason: Option<&str>,
    ) -> Result<domain::Inventory> {
        let key = InventoryKey::new(sku_code.clone(), warehouse_code.clone());
        let execution = self
            .inventory
            .execute(&key, InventoryCommand::Adjust(delta))
            .await?;
        tracing::info!(delta, reason = reason.unwrap_or(""), "stock adjusted");
        if delta > 0 {
            self.fire_new_inventory(sku_code, warehouse_code).await;
        }
        Ok(execution.inventory_after)
    }

    async fn fire_new_inventory(&self, sku_code: &SkuCode, warehouse_code: &WarehouseCode) {
        let listeners: Vec<_> = self.listeners.read().await.clone();
        for listener in listeners {
            listener.new_inventory(sku_code, warehouse_code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Inventory, Money};
    use store::InMemoryInventoryStore;

    use crate::services::catalog::InMemoryCatalogService;

    fn setup() -> (AllocationService, InMemoryInventoryStore, InMemoryCatalogService) {
        let inventory = InMemoryInventoryStore::new();
        let catalog = InMemoryCatalogService::new();
        let service = AllocationService::new(
            Arc::new(inventory.clone()),
            Arc::new(catalog.clone()),
        );
        (service, inventory, catalog)
    }

    fn stock_sku(
        catalog: &InMemoryCatalogService,
        code: &str,
        availability: AvailabilityCriteria,
    ) {
        catalog.add_sku(SkuDescriptor::new(code, availability));
    }

    fn line(code: &str, quantity: u32) -> OrderSku {
        OrderSku::new(code, quantity, Money::from_cents(1000))
    }

    fn wh() -> WarehouseCode {
        WarehouseCode::new("WH1")
    }

    #[tokio::test]
    async fn zero_quantity_check_is_a_validation_error() {
        let (service, _, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AlwaysAvailable);

        let result = service
            .has_sufficient_unallocated(&SkuCode::new("SKU-001"), &wh(), 0)
            .await;
        assert!(matches!(result, Err(FulfillmentError::Validation(_))));
    }

    #[tokio::test]
    async fn always_available_never_touches_inventory() {
        let (service, inventory, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AlwaysAvailable);

        let result = service
            .process_allocation_event(
                &line("SKU-001", 5),
                AllocationEventType::OrderPlaced,
                &Actor::System,
                &wh(),
                5,
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.quantity_allocated_in_stock, 5);
        assert!(result.inventory_after.is_none());
        assert!(inventory
            .get(&InventoryKey::new("SKU-001", "WH1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn allocate_cancel_round_trip_restores_inventory() {
        let (service, inventory, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AvailableWhenInStock);
        inventory
            .save(Inventory::with_quantities("SKU-001", "WH1", 10, 0))
            .await
            .unwrap();

        let mut sku = line("SKU-001", 4);
        let placed = service
            .process_allocation_event(
                &sku,
                AllocationEventType::OrderPlaced,
                &Actor::System,
                &wh(),
                4,
                None,
            )
            .await
            .unwrap();
        assert_eq!(placed.quantity_allocated_in_stock, 4);
        sku.set_allocated_quantity(4).unwrap();

        let cancelled = service
            .process_allocation_event(
                &sku,
                AllocationEventType::OrderCancellation,
                &Actor::System,
                &wh(),
                sku.allocated_quantity(),
                None,
            )
            .await
            .unwrap();

        let after = cancelled.inventory_after.unwrap();
        assert_eq!(after.allocated(), 0);
        assert_eq!(after.on_hand(), 10);
    }

    #[tokio::test]
    async fn in_stock_sku_rejects_over_allocation() {
        let (service, inventory, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AvailableWhenInStock);
        inventory
            .save(Inventory::with_quantities("SKU-001", "WH1", 2, 0))
            .await
            .unwrap();

        let result = service
            .process_allocation_event(
                &line("SKU-001", 5),
                AllocationEventType::OrderPlaced,
                &Actor::System,
                &wh(),
                5,
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock {
                requested: 5,
                available: 2,
                ..
            })
        ));
        // Nothing was mutated.
        let record = inventory
            .get(&InventoryKey::new("SKU-001", "WH1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.allocated(), 0);
    }

    #[tokio::test]
    async fn backorder_sku_splits_allocation() {
        let (service, _, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AvailableForBackOrder);

        let result = service
            .process_allocation_event(
                &line("SKU-001", 5),
                AllocationEventType::OrderPlaced,
                &Actor::System,
                &wh(),
                5,
                None,
            )
            .await
            .unwrap();

        // No stock on hand: everything goes on backorder.
        assert_eq!(result.quantity_allocated_in_stock, 0);
        assert_eq!(result.quantity_awaiting_allocation, 5);
        assert_eq!(catalog.outstanding_quantity(&SkuCode::new("SKU-001")), 5);
    }

    #[tokio::test]
    async fn backorder_limit_is_enforced() {
        let (service, _, catalog) = setup();
        catalog.add_sku(SkuDescriptor {
            sku_code: SkuCode::new("SKU-001"),
            availability: AvailabilityCriteria::AvailableForBackOrder,
            pre_or_back_order_limit: 3,
        });

        let result = service
            .process_allocation_event(
                &line("SKU-001", 5),
                AllocationEventType::OrderPlaced,
                &Actor::System,
                &wh(),
                5,
                None,
            )
            .await;
        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock { .. })
        ));
    }

    #[tokio::test]
    async fn shipment_completed_releases_stock() {
        let (service, inventory, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AvailableWhenInStock);
        inventory
            .save(Inventory::with_quantities("SKU-001", "WH1", 10, 4))
            .await
            .unwrap();

        let mut sku = line("SKU-001", 4);
        sku.set_allocated_quantity(4).unwrap();

        let result = service
            .process_allocation_event(
                &sku,
                AllocationEventType::OrderShipmentCompleted,
                &Actor::System,
                &wh(),
                4,
                Some("Order shipment SHIP-1 completed"),
            )
            .await
            .unwrap();

        let after = result.inventory_after.unwrap();
        assert_eq!(after.on_hand(), 6);
        assert_eq!(after.allocated(), 0);
    }

    #[tokio::test]
    async fn allocation_status_reflects_stock() {
        let (service, inventory, catalog) = setup();
        stock_sku(&catalog, "SKU-IN", AvailabilityCriteria::AvailableWhenInStock);
        stock_sku(&catalog, "SKU-BACK", AvailabilityCriteria::AvailableForBackOrder);
        inventory
            .save(Inventory::with_quantities("SKU-IN", "WH1", 10, 0))
            .await
            .unwrap();

        assert_eq!(
            service
                .allocation_status(&SkuCode::new("SKU-IN"), &wh(), 5)
                .await
                .unwrap(),
            AllocationStatus::AllocatedInStock
        );
        assert_eq!(
            service
                .allocation_status(&SkuCode::new("SKU-IN"), &wh(), 15)
                .await
                .unwrap(),
            AllocationStatus::NotAllocated
        );
        assert_eq!(
            service
                .allocation_status(&SkuCode::new("SKU-BACK"), &wh(), 5)
                .await
                .unwrap(),
            AllocationStatus::AwaitingAllocation
        );
    }

    #[tokio::test]
    async fn receive_stock_fires_listeners() {
        struct Recorder(std::sync::Mutex<Vec<String>>);

        #[async_trait]
        impl InventoryListener for Recorder {
            async fn new_inventory(&self, sku_code: &SkuCode, warehouse_code: &WarehouseCode) {
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("{}@{}", sku_code, warehouse_code));
            }
        }

        let (service, _, catalog) = setup();
        stock_sku(&catalog, "SKU-001", AvailabilityCriteria::AvailableForBackOrder);

        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        service.register_listener(recorder.clone()).await;

        service
            .receive_stock(&SkuCode::new("SKU-001"), &wh(), 3, Some("po receipt"))
            .await
            .unwrap();

        assert_eq!(recorder.0.lock().unwrap().as_slice(), &["SKU-001@WH1"]);
    }
}
