//! Per-SKU, per-warehouse inventory records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{SkuCode, WarehouseCode};

/// Key identifying an inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub sku_code: SkuCode,
    pub warehouse_code: WarehouseCode,
}

impl InventoryKey {
    /// Creates a new inventory key.
    pub fn new(sku_code: impl Into<SkuCode>, warehouse_code: impl Into<WarehouseCode>) -> Self {
        Self {
            sku_code: sku_code.into(),
            warehouse_code: warehouse_code.into(),
        }
    }
}

impl std::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.sku_code, self.warehouse_code)
    }
}

/// A command to apply against one inventory record.
///
/// Commands are executed read-modify-write by the inventory store under
/// per-key exclusive access, so concurrent mutations for the same key are
/// serialized while different keys proceed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryCommand {
    /// Commit quantity to an order line (allocated +).
    Allocate(u32),
    /// Return previously committed quantity (allocated −, capped).
    Deallocate(u32),
    /// Ship committed quantity out (allocated −, on-hand −, capped).
    Release(u32),
    /// New stock arrived (on-hand +).
    Receive(u32),
    /// Signed stock correction (on-hand ±, floored at zero).
    Adjust(i64),
}

/// Inventory record for one (SKU, warehouse) pair.
///
/// `allocated` may exceed `on_hand` for backorder/preorder SKUs, but it never
/// goes negative: deallocation and release are capped at the current
/// allocated quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// The SKU this record tracks.
    pub sku_code: SkuCode,

    /// The warehouse this record tracks.
    pub warehouse_code: WarehouseCode,

    /// Physical units in the warehouse.
    on_hand: u32,

    /// Units committed to orders.
    allocated: u32,

    /// Reorder point.
    pub reorder_minimum: u32,

    /// Quantity to reorder when the reorder point is reached.
    pub reorder_quantity: u32,

    /// Expected restock date, when known.
    pub restock_date: Option<DateTime<Utc>>,
}

impl Inventory {
    /// Creates an empty inventory record.
    pub fn new(sku_code: impl Into<SkuCode>, warehouse_code: impl Into<WarehouseCode>) -> Self {
        Self {
            sku_code: sku_code.into(),
            warehouse_code: warehouse_code.into(),
            on_hand: 0,
            allocated: 0,
            reorder_minimum: 0,
            reorder_quantity: 0,
            restock_date: None,
        }
    }

    /// Creates an inventory record with the given starting quantities.
    pub fn with_quantities(
        sku_code: impl Into<SkuCode>,
        warehouse_code: impl Into<WarehouseCode>,
        on_hand: u32,
        allocated: u32,
    ) -> Self {
        let mut inventory = Self::new(sku_code, warehouse_code);
        inventory.on_hand = on_hand;
        inventory.allocated = allocated;
        inventory
    }

    /// Returns the key for this record.
    pub fn key(&self) -> InventoryKey {
        InventoryKey {
            sku_code: self.sku_code.clone(),
            warehouse_code: self.warehouse_code.clone(),
        }
    }

    /// Physical units in the warehouse.
    pub fn on_hand(&self) -> u32 {
        self.on_hand
    }

    /// Units committed to orders.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Units on hand and not yet committed.
    pub fn available_in_stock(&self) -> u32 {
        self.on_hand.saturating_sub(self.allocated)
    }

    /// Applies a command, returning the quantity actually moved.
    ///
    /// Deallocate and Release are capped at the current allocated quantity;
    /// a negative Adjust is floored at zero on-hand. The returned magnitude
    /// is what was applied after capping.
    pub fn apply(&mut self, command: InventoryCommand) -> u32 {
        match command {
            InventoryCommand::Allocate(quantity) => {
                self.allocated += quantity;
                quantity
            }
            InventoryCommand::Deallocate(quantity) => {
                let moved = quantity.min(self.allocated);
                self.allocated -= moved;
                moved
            }
            InventoryCommand::Release(quantity) => {
                let moved = quantity.min(self.allocated);
                self.allocated -= moved;
                self.on_hand = self.on_hand.saturating_sub(moved);
                moved
            }
            InventoryCommand::Receive(quantity) => {
                self.on_hand += quantity;
                quantity
            }
            InventoryCommand::Adjust(delta) => {
                if delta >= 0 {
                    let quantity = delta as u32;
                    self.on_hand += quantity;
                    quantity
                } else {
                    let quantity = delta.unsigned_abs() as u32;
                    let moved = quantity.min(self.on_hand);
                    self.on_hand -= moved;
                    moved
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_is_on_hand_minus_allocated() {
        let inventory = Inventory::with_quantities("SKU-001", "WH1", 10, 3);
        assert_eq!(inventory.available_in_stock(), 7);
    }

    #[test]
    fn available_never_underflows() {
        // Backorder SKUs can be allocated beyond on-hand.
        let inventory = Inventory::with_quantities("SKU-001", "WH1", 2, 5);
        assert_eq!(inventory.available_in_stock(), 0);
    }

    #[test]
    fn allocate_then_deallocate_round_trips() {
        let mut inventory = Inventory::with_quantities("SKU-001", "WH1", 10, 0);
        assert_eq!(inventory.apply(InventoryCommand::Allocate(4)), 4);
        assert_eq!(inventory.allocated(), 4);
        assert_eq!(inventory.apply(InventoryCommand::Deallocate(4)), 4);
        assert_eq!(inventory.allocated(), 0);
        assert_eq!(inventory.on_hand(), 10);
    }

    #[test]
    fn deallocate_is_capped_at_allocated() {
        let mut inventory = Inventory::with_quantities("SKU-001", "WH1", 10, 2);
        assert_eq!(inventory.apply(InventoryCommand::Deallocate(5)), 2);
        assert_eq!(inventory.allocated(), 0);
    }

    #[test]
    fn release_decrements_both_sides() {
        let mut inventory = Inventory::with_quantities("SKU-001", "WH1", 10, 4);
        assert_eq!(inventory.apply(InventoryCommand::Release(3)), 3);
        assert_eq!(inventory.on_hand(), 7);
        assert_eq!(inventory.allocated(), 1);
    }

    #[test]
    fn release_is_capped_at_allocated() {
        let mut inventory = Inventory::with_quantities("SKU-001", "WH1", 10, 2);
        assert_eq!(inventory.apply(InventoryCommand::Release(6)), 2);
        assert_eq!(inventory.on_hand(), 8);
        assert_eq!(inventory.allocated(), 0);
    }

    #[test]
    fn receive_adds_on_hand() {
        let mut inventory = Inventory::new("SKU-001", "WH1");
        assert_eq!(inventory.apply(InventoryCommand::Receive(5)), 5);
        assert_eq!(inventory.on_hand(), 5);
    }

    #[test]
    fn negative_adjust_floors_at_zero() {
        let mut inventory = Inventory::with_quantities("SKU-001", "WH1", 3, 0);
        assert_eq!(inventory.apply(InventoryCommand::Adjust(-5)), 3);
        assert_eq!(inventory.on_hand(), 0);
    }
}
