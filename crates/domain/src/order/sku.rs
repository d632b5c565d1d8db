//! Order line entity.

use serde::{Deserialize, Serialize};

use super::OrderError;
use crate::value_objects::{Money, SkuCode};

/// A single order line: one SKU at one unit price within a shipment.
///
/// Invariant: `allocated_quantity <= quantity` at all times; the line is
/// fully allocated when the two are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSku {
    /// The SKU this line refers to.
    pub sku_code: SkuCode,

    /// Quantity ordered.
    pub quantity: u32,

    /// Quantity committed from inventory so far.
    allocated_quantity: u32,

    /// Unit price.
    pub unit_price: Money,
}

impl OrderSku {
    /// Creates a new, unallocated order line.
    pub fn new(sku_code: impl Into<SkuCode>, quantity: u32, unit_price: Money) -> Self {
        Self {
            sku_code: sku_code.into(),
            quantity,
            allocated_quantity: 0,
            unit_price,
        }
    }

    /// Returns the quantity committed from inventory so far.
    pub fn allocated_quantity(&self) -> u32 {
        self.allocated_quantity
    }

    /// Returns the quantity still awaiting allocation.
    pub fn unallocated_quantity(&self) -> u32 {
        self.quantity - self.allocated_quantity
    }

    /// Returns true when the full ordered quantity has been allocated.
    pub fn is_allocated(&self) -> bool {
        self.allocated_quantity == self.quantity
    }

    /// Sets the allocated quantity.
    pub fn set_allocated_quantity(&mut self, allocated: u32) -> Result<(), OrderError> {
        if allocated > self.quantity {
            return Err(OrderError::AllocationExceedsOrdered {
                ordered: self.quantity,
                requested: allocated,
            });
        }
        self.allocated_quantity = allocated;
        Ok(())
    }

    /// Increases the allocated quantity.
    pub fn add_allocated_quantity(&mut self, quantity: u32) -> Result<(), OrderError> {
        self.set_allocated_quantity(self.allocated_quantity + quantity)
    }

    /// Clears the allocated quantity, used when allocation is reversed.
    pub fn clear_allocated_quantity(&mut self) {
        self.allocated_quantity = 0;
    }

    /// Returns the extended price of the line.
    pub fn total_price(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}
