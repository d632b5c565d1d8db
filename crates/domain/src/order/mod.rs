//! Order aggregate and its entities.

mod error;
mod shipment;
mod sku;
mod state;

pub use error::OrderError;
pub use shipment::{OrderShipment, ShipmentType};
pub use sku::OrderSku;
pub use state::{OrderShipmentStatus, OrderStatus};

use chrono::{DateTime, Utc};
use common::{OrderId, ReturnId};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Actor, CustomerId, ShipmentNumber, StoreCode, WarehouseCode};

/// Order aggregate root.
///
/// Owns its shipments, which own their lines. Status transitions are
/// monotonic along the graph defined by [`OrderStatus`]; an order with any
/// shipment in a non-terminal status cannot be completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// Human-facing order number, unique across all orders.
    pub order_number: String,

    /// Current status.
    status: OrderStatus,

    /// Customer who placed the order.
    pub customer_id: CustomerId,

    /// Store the order was placed through.
    pub store_code: StoreCode,

    /// Warehouse the order is fulfilled from.
    pub warehouse_code: WarehouseCode,

    /// ISO currency code for all amounts on the order.
    pub currency: String,

    /// Shipments belonging to this order.
    shipments: Vec<OrderShipment>,

    /// Returns raised against this order.
    returns: Vec<ReturnId>,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When the order was last modified.
    pub last_modified: DateTime<Utc>,

    /// Who last modified the order.
    pub modified_by: Actor,
}

impl Order {
    /// Creates a new order in `Created` status with the given shipments.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        order_number: impl Into<String>,
        customer_id: CustomerId,
        store_code: StoreCode,
        warehouse_code: WarehouseCode,
        currency: impl Into<String>,
        shipments: Vec<OrderShipment>,
        created_at: DateTime<Utc>,
        created_by: Actor,
    ) -> Self {
        Self {
            id,
            order_number: order_number.into(),
            status: OrderStatus::Created,
            customer_id,
            store_code,
            warehouse_code,
            currency: currency.into(),
            shipments,
            returns: Vec::new(),
            created_at,
            last_modified: created_at,
            modified_by: created_by,
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns all shipments.
    pub fn shipments(&self) -> &[OrderShipment] {
        &self.shipments
    }

    /// Returns all shipments mutably.
    pub fn shipments_mut(&mut self) -> &mut [OrderShipment] {
        &mut self.shipments
    }

    /// Returns the physical shipments.
    pub fn physical_shipments(&self) -> impl Iterator<Item = &OrderShipment> {
        self.shipments
            .iter()
            .filter(|s| s.shipment_type == ShipmentType::Physical)
    }

    /// Looks up a shipment by number.
    pub fn shipment(&self, number: &ShipmentNumber) -> Option<&OrderShipment> {
        self.shipments.iter().find(|s| &s.shipment_number == number)
    }

    /// Looks up a shipment by number, mutably.
    pub fn shipment_mut(&mut self, number: &ShipmentNumber) -> Option<&mut OrderShipment> {
        self.shipments
            .iter_mut()
            .find(|s| &s.shipment_number == number)
    }

    /// Iterates over every line of every shipment.
    pub fn skus(&self) -> impl Iterator<Item = &OrderSku> {
        self.shipments.iter().flat_map(|s| s.skus().iter())
    }

    /// Returns the return ids raised against this order.
    pub fn returns(&self) -> &[ReturnId] {
        &self.returns
    }

    /// Returns the total value of the order: all line prices plus shipping.
    pub fn total_amount(&self) -> crate::value_objects::Money {
        let mut total = crate::value_objects::Money::zero();
        for shipment in &self.shipments {
            total += shipment.total_amount();
        }
        total
    }

    /// Returns true if any shipment is in a non-terminal status.
    pub fn has_open_shipments(&self) -> bool {
        self.shipments.iter().any(|s| !s.status().is_terminal())
    }

    /// Returns true if a hold can be placed on the order.
    pub fn is_holdable(&self) -> bool {
        self.status.is_holdable()
    }

    /// Returns true if the order can be released for fulfillment.
    pub fn is_releasable(&self) -> bool {
        self.status.is_releasable()
    }

    /// Returns true if the order can be cancelled.
    pub fn is_cancellable(&self) -> bool {
        self.status.is_cancellable()
    }

    /// Records a modification timestamp and actor.
    pub fn touch(&mut self, at: DateTime<Utc>, by: Actor) {
        self.last_modified = at;
        self.modified_by = by;
    }

    /// Places a hold on the order.
    pub fn hold(&mut self) -> Result<(), OrderError> {
        if !self.is_holdable() {
            return Err(OrderError::InvalidOrderTransition {
                current: self.status,
                action: "hold",
            });
        }
        self.status = OrderStatus::OnHold;
        Ok(())
    }

    /// Releases the order for fulfillment.
    pub fn release(&mut self) -> Result<(), OrderError> {
        if !self.is_releasable() {
            return Err(OrderError::InvalidOrderTransition {
                current: self.status,
                action: "release",
            });
        }
        self.status = OrderStatus::InProgress;
        Ok(())
    }

    /// Marks the order as actively being fulfilled.
    pub fn start_progress(&mut self) {
        self.status = OrderStatus::InProgress;
    }

    /// Parks the order awaiting completion of an exchange.
    pub fn await_exchange(&mut self) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Created | OrderStatus::InProgress) {
            return Err(OrderError::InvalidOrderTransition {
                current: self.status,
                action: "park for exchange",
            });
        }
        self.status = OrderStatus::AwaitingExchange;
        Ok(())
    }

    /// Cancels the order and all of its open shipments.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.is_cancellable() {
            return Err(OrderError::InvalidOrderTransition {
                current: self.status,
                action: "cancel",
            });
        }
        for shipment in &mut self.shipments {
            if shipment.status().is_cancellable() {
                shipment.cancel()?;
            }
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Completes the order.
    ///
    /// Rejected while any shipment remains in a non-terminal status.
    pub fn complete(&mut self) -> Result<(), OrderError> {
        if self.has_open_shipments() {
            return Err(OrderError::IncompleteShipments);
        }
        if self.status.is_terminal() {
            return Err(OrderError::InvalidOrderTransition {
                current: self.status,
                action: "complete",
            });
        }
        self.status = OrderStatus::Completed;
        Ok(())
    }

    /// Recomputes overall progress after a shipment ships.
    ///
    /// Moves the order to `Completed` once every shipment is terminal with at
    /// least one shipped, or to `PartiallyShipped` while shipments remain
    /// open.
    pub fn refresh_progress(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        let any_shipped = self
            .shipments
            .iter()
            .any(|s| s.status() == OrderShipmentStatus::Shipped);
        if !any_shipped {
            return;
        }
        if self.has_open_shipments() {
            self.status = OrderStatus::PartiallyShipped;
        } else {
            self.status = OrderStatus::Completed;
        }
    }

    /// Attaches a return to the order.
    pub fn add_return(&mut self, return_id: ReturnId) {
        self.returns.push(return_id);
    }
}
