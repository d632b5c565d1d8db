//! Availability criteria and the allocation event table.

use serde::{Deserialize, Serialize};

use crate::inventory::{Inventory, InventoryCommand};
use crate::value_objects::SkuCode;

/// Per-SKU policy governing whether allocation is constrained by physical
/// stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvailabilityCriteria {
    /// Never inventory-constrained; allocation never touches inventory.
    AlwaysAvailable,
    /// Only physical on-hand stock can be promised.
    AvailableWhenInStock,
    /// Allocation ahead of a release date, fulfilled when stock arrives.
    AvailableForPreOrder,
    /// Allocation beyond on-hand stock, fulfilled when stock arrives.
    AvailableForBackOrder,
}

impl AvailabilityCriteria {
    /// Returns true for criteria that allow allocation beyond on-hand stock.
    pub fn allows_advance_orders(&self) -> bool {
        matches!(
            self,
            AvailabilityCriteria::AvailableForPreOrder | AvailabilityCriteria::AvailableForBackOrder
        )
    }
}

/// Outcome of asking where a requested quantity stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    /// Both unallocated-quantity and physical-stock checks pass.
    AllocatedInStock,
    /// Unallocated allowance exists but physical stock does not; the line
    /// will be fulfilled later when stock arrives.
    AwaitingAllocation,
    /// Neither check passes.
    NotAllocated,
}

/// The order-lifecycle events that may mutate allocation state.
///
/// Each event maps to exactly one inventory command through
/// [`AllocationEventType::command_for`], keeping the full transition table
/// reviewable in one place:
///
/// | event                  | command      | effect                        |
/// |------------------------|--------------|-------------------------------|
/// | `OrderPlaced`          | `Allocate`   | allocated +                   |
/// | `OrderCancellation`    | `Deallocate` | allocated − (capped)          |
/// | `OrderShipmentCompleted` | `Release`  | allocated −, on-hand − (capped) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationEventType {
    /// An order line was placed.
    OrderPlaced,
    /// An order or shipment was cancelled; committed quantity is returned.
    OrderCancellation,
    /// A shipment shipped; committed quantity leaves the warehouse.
    OrderShipmentCompleted,
}

impl AllocationEventType {
    /// Translates the event into the inventory command to execute.
    pub fn command_for(&self, quantity: u32) -> InventoryCommand {
        match self {
            AllocationEventType::OrderPlaced => InventoryCommand::Allocate(quantity),
            AllocationEventType::OrderCancellation => InventoryCommand::Deallocate(quantity),
            AllocationEventType::OrderShipmentCompleted => InventoryCommand::Release(quantity),
        }
    }

    /// Returns true for events that add to the allocated quantity.
    pub fn is_allocating(&self) -> bool {
        matches!(self, AllocationEventType::OrderPlaced)
    }

    /// Returns the event name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationEventType::OrderPlaced => "OrderPlaced",
            AllocationEventType::OrderCancellation => "OrderCancellation",
            AllocationEventType::OrderShipmentCompleted => "OrderShipmentCompleted",
        }
    }
}

impl std::fmt::Display for AllocationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one allocation attempt. Constructed fresh per call, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Quantity committed against physical stock now.
    pub quantity_allocated_in_stock: u32,

    /// Quantity queued as backorder/preorder demand.
    pub quantity_awaiting_allocation: u32,

    /// Snapshot of the inventory record after the event, when one was
    /// touched. `None` for always-available SKUs.
    pub inventory_after: Option<Inventory>,
}

impl AllocationResult {
    /// Result for an always-available SKU: the full requested quantity is
    /// reported allocated and no inventory is touched.
    pub fn always_available(quantity: u32) -> Self {
        Self {
            quantity_allocated_in_stock: quantity,
            quantity_awaiting_allocation: 0,
            inventory_after: None,
        }
    }

    /// Result for a finite-stock mutation.
    pub fn of(in_stock: u32, awaiting: u32, inventory_after: Inventory) -> Self {
        Self {
            quantity_allocated_in_stock: in_stock,
            quantity_awaiting_allocation: awaiting,
            inventory_after: Some(inventory_after),
        }
    }
}

/// Outstanding pre/backorder demand for one SKU.
///
/// `limit` of zero means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreOrBackOrderDetails {
    pub sku_code: SkuCode,
    pub limit: u32,
    pub quantity_ordered: u32,
}

impl PreOrBackOrderDetails {
    /// Creates details with no outstanding quantity.
    pub fn new(sku_code: impl Into<SkuCode>, limit: u32) -> Self {
        Self {
            sku_code: sku_code.into(),
            limit,
            quantity_ordered: 0,
        }
    }

    /// Returns how much more may be ordered ahead of stock, or `None` when
    /// unlimited.
    pub fn remaining_allowance(&self) -> Option<u32> {
        if self.limit == 0 {
            None
        } else {
            Some(self.limit.saturating_sub(self.quantity_ordered))
        }
    }

    /// Returns true if `quantity` more units may be ordered ahead of stock.
    pub fn accepts(&self, quantity: u32) -> bool {
        match self.remaining_allowance() {
            None => true,
            Some(remaining) => quantity <= remaining,
        }
    }
}
