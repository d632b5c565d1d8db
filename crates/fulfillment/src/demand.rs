//! Outstanding-demand processor: drains backordered order lines when new
//! stock arrives.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Actor, AllocationEventType, OrderShipmentStatus, SkuCode, WarehouseCode};
use store::OrderStore;

use crate::allocation::{AllocationService, InventoryListener};
use crate::error::{FulfillmentError, Result};
use crate::services::catalog::CatalogService;
use crate::services::time::TimeService;

/// Walks the queue of order lines awaiting stock for a (SKU, warehouse) pair
/// and allocates newly available quantity to them, oldest order first.
///
/// Each touched order is committed in its own unit of work: if the batch is
/// interrupted mid-loop, earlier commits stand and the remainder is picked
/// up by the next new-inventory notification. Fully allocated lines are
/// excluded by the awaiting-inventory query, so re-running is a no-op for
/// them.
pub struct OutstandingDemandProcessor {
    orders: Arc<dyn OrderStore>,
    allocation: Arc<AllocationService>,
    catalog: Arc<dyn CatalogService>,
    time: Arc<dyn TimeService>,
}

impl OutstandingDemandProcessor {
    /// Creates a new processor.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        allocation: Arc<AllocationService>,
        catalog: Arc<dyn CatalogService>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            orders,
            allocation,
            catalog,
            time,
        }
    }

    /// Allocates as much of the available quantity as possible to waiting
    /// order lines. Returns the total quantity allocated.
    #[tracing::instrument(skip(self), fields(sku = %sku_code, warehouse = %warehouse_code))]
    pub async fn process_new_inventory(
        &self,
        sku_code: &SkuCode,
        warehouse_code: &WarehouseCode,
    ) -> Result<u32> {
        self.catalog
            .find_warehouse(warehouse_code)
            .await?
            .ok_or_else(|| FulfillmentError::WarehouseNotFound(warehouse_code.clone()))?;
        self.catalog
            .find_sku(sku_code)
            .await?
            .ok_or_else(|| FulfillmentError::SkuNotFound(sku_code.clone()))?;

        let mut total_available = self
            .allocation
            .available_in_stock(sku_code, warehouse_code)
            .await?;
        if total_available == 0 {
            return Ok(0);
        }

        let awaiting = self
            .orders
            .find_awaiting_inventory(sku_code, warehouse_code)
            .await?;

        let mut total_allocated: u32 = 0;
        for versioned in awaiting {
            if total_available == 0 {
                break;
            }
            let mut order = versioned.entity;
            let mut touched = false;

            for shipment in order.shipments_mut() {
                if shipment.status() != OrderShipmentStatus::AwaitingInventory {
                    continue;
                }
                for line in shipment.skus_mut() {
                    if line.sku_code != *sku_code || total_available == 0 {
                        continue;
                    }
                    let to_allocate = total_available.min(line.unallocated_quantity());
                    if to_allocate == 0 {
                        continue;
                    }
                    self.allocation
                        .process_allocation_event(
                            line,
                            AllocationEventType::OrderPlaced,
                            &Actor::System,
                            warehouse_code,
                            to_allocate,
                            Some("outstanding demand fulfilment"),
                        )
                        .await?;
                    line.add_allocated_quantity(to_allocate)?;
                    total_available -= to_allocate;
                    total_allocated += to_allocate;
                    touched = true;
                }
                shipment.refresh_inventory_status();
            }

            if touched {
                // One update per distinct order.
                let order_id = order.id;
                order.touch(self.time.now(), Actor::System);
                self.orders.update(order, versioned.version).await?;
                tracing::info!(%order_id, "backordered lines allocated");
            }
        }

        if total_allocated > 0 {
            self.catalog
                .deduct_pre_or_back_order_quantity(sku_code, total_allocated)
                .await?;
        }
        Ok(total_allocated)
    }
}

#[async_trait]
impl InventoryListener for OutstandingDemandProcessor {
    async fn new_inventory(&self, sku_code: &SkuCode, warehouse_code: &WarehouseCode) {
        if let Err(e) = self.process_new_inventory(sku_code, warehouse_code).await {
            // Committed per-order updates stand; the rest of the batch waits
            // for the next notification.
            tracing::error!(
                sku = %sku_code,
                warehouse = %warehouse_code,
                error = %e,
                "outstanding demand processing aborted"
            );
        }
    }
}
