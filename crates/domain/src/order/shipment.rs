//! Shipment entity.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderShipmentStatus, OrderSku};
use crate::value_objects::{Money, ShipmentNumber};

/// How a shipment is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentType {
    /// Picked, packed and carried; subject to the warehouse pick delay.
    Physical,
    /// Delivered electronically; ships as soon as payment is captured.
    Electronic,
}

impl ShipmentType {
    /// Returns true if the shipment ships without a separate pick/pack step.
    pub fn ships_immediately(&self) -> bool {
        matches!(self, ShipmentType::Electronic)
    }
}

/// A sub-grouping of an order's lines that ship together.
///
/// Shipments are owned by their order; `order_id` is a non-owning
/// back-reference for callers holding a shipment out of context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipment {
    /// Unique shipment number.
    pub shipment_number: ShipmentNumber,

    /// The order this shipment belongs to.
    pub order_id: OrderId,

    /// Physical or electronic delivery.
    pub shipment_type: ShipmentType,

    /// Current status.
    status: OrderShipmentStatus,

    /// Lines shipping together in this shipment.
    skus: Vec<OrderSku>,

    /// Shipping charged to the customer for this shipment.
    pub shipping_cost: Money,

    /// When the shipment was created.
    pub created_at: DateTime<Utc>,

    /// Carrier tracking code, set when the shipment ships.
    pub tracking_code: Option<String>,

    /// When the shipment shipped.
    pub shipment_date: Option<DateTime<Utc>>,
}

impl OrderShipment {
    /// Creates a new shipment awaiting inventory.
    pub fn new(
        shipment_number: impl Into<ShipmentNumber>,
        order_id: OrderId,
        shipment_type: ShipmentType,
        skus: Vec<OrderSku>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            shipment_number: shipment_number.into(),
            order_id,
            shipment_type,
            status: OrderShipmentStatus::AwaitingInventory,
            skus,
            shipping_cost: Money::zero(),
            created_at,
            tracking_code: None,
            shipment_date: None,
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderShipmentStatus {
        self.status
    }

    /// Returns the shipment's lines.
    pub fn skus(&self) -> &[OrderSku] {
        &self.skus
    }

    /// Returns the shipment's lines mutably.
    pub fn skus_mut(&mut self) -> &mut [OrderSku] {
        &mut self.skus
    }

    /// Returns true when every line is fully allocated.
    pub fn is_allocated(&self) -> bool {
        self.skus.iter().all(OrderSku::is_allocated)
    }

    /// Returns the total ordered quantity across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.skus.iter().map(|sku| sku.quantity).sum()
    }

    /// Returns the merchandise value of the shipment plus shipping.
    pub fn total_amount(&self) -> Money {
        let mut total = self.shipping_cost;
        for sku in &self.skus {
            total += sku.total_price();
        }
        total
    }

    /// Recomputes the pre-release status from line allocation.
    ///
    /// Only meaningful while the shipment has not been released: a shipment
    /// whose lines are all allocated is `InventoryAssigned`, otherwise it
    /// falls back to `AwaitingInventory`.
    pub fn refresh_inventory_status(&mut self) {
        if matches!(
            self.status,
            OrderShipmentStatus::AwaitingInventory | OrderShipmentStatus::InventoryAssigned
        ) {
            self.status = if self.is_allocated() {
                OrderShipmentStatus::InventoryAssigned
            } else {
                OrderShipmentStatus::AwaitingInventory
            };
        }
    }

    /// Releases the shipment for pick/pack.
    pub fn mark_released(&mut self) -> Result<(), OrderError> {
        if self.status != OrderShipmentStatus::InventoryAssigned {
            return Err(OrderError::InvalidShipmentTransition {
                current: self.status,
                action: "release",
            });
        }
        self.status = OrderShipmentStatus::Released;
        Ok(())
    }

    /// Marks the shipment shipped, recording the tracking code and ship date.
    ///
    /// Physical shipments must have been released first; electronic shipments
    /// ship directly from `InventoryAssigned` since they have no pick/pack
    /// step.
    pub fn mark_shipped(
        &mut self,
        tracking_code: Option<String>,
        shipment_date: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let can_ship = match self.shipment_type {
            ShipmentType::Physical => self.status == OrderShipmentStatus::Released,
            ShipmentType::Electronic => matches!(
                self.status,
                OrderShipmentStatus::InventoryAssigned | OrderShipmentStatus::Released
            ),
        };
        if !can_ship {
            return Err(OrderError::InvalidShipmentTransition {
                current: self.status,
                action: "ship",
            });
        }
        self.tracking_code = tracking_code;
        self.shipment_date = Some(shipment_date);
        self.status = OrderShipmentStatus::Shipped;
        Ok(())
    }

    /// Cancels the shipment.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.is_cancellable() {
            return Err(OrderError::InvalidShipmentTransition {
                current: self.status,
                action: "cancel",
            });
        }
        self.status = OrderShipmentStatus::Cancelled;
        Ok(())
    }
}
