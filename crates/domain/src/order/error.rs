//! Order domain error types.

use thiserror::Error;

use super::{OrderShipmentStatus, OrderStatus};
use crate::value_objects::ShipmentNumber;

/// Errors raised by the order aggregate and its entities.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order is not in a status that permits the requested action.
    #[error("Cannot {action} order in {current} status")]
    InvalidOrderTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// The shipment is not in a status that permits the requested action.
    #[error("Cannot {action} shipment in {current} status")]
    InvalidShipmentTransition {
        current: OrderShipmentStatus,
        action: &'static str,
    },

    /// An allocation would exceed the line's ordered quantity.
    #[error("Allocated quantity {requested} exceeds ordered quantity {ordered}")]
    AllocationExceedsOrdered { ordered: u32, requested: u32 },

    /// No shipment with the given number exists on the order.
    #[error("Shipment not found: {0}")]
    ShipmentNotFound(ShipmentNumber),

    /// The order cannot complete while shipments remain open.
    #[error("Order has shipments in a non-terminal status and cannot be completed")]
    IncompleteShipments,
}
