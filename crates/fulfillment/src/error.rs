//! Fulfillment error types.

use common::{OrderId, ReturnId};
use domain::{OrderError, ReturnError, ShipmentNumber, SkuCode, WarehouseCode};
use store::StoreError;
use thiserror::Error;

use crate::returns::ReturnValidationError;

/// Errors that can occur during fulfillment operations.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Bad input; nothing was mutated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An illegal order or shipment transition was attempted.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// An illegal return transition was attempted.
    #[error(transparent)]
    Return(#[from] ReturnError),

    /// A return failed its composite validation.
    #[error(transparent)]
    ReturnValidation(#[from] ReturnValidationError),

    /// Not enough stock to satisfy an allocation for an in-stock-only SKU.
    #[error("Insufficient inventory for {sku_code}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_code: SkuCode,
        requested: u32,
        available: u32,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Shipment not found in any order.
    #[error("Shipment not found: {0}")]
    ShipmentNotFound(ShipmentNumber),

    /// Return not found.
    #[error("Return not found: {0}")]
    ReturnNotFound(ReturnId),

    /// SKU could not be resolved through the catalog.
    #[error("SKU not found: {0}")]
    SkuNotFound(SkuCode),

    /// Warehouse could not be resolved through the catalog.
    #[error("Warehouse not found: {0}")]
    WarehouseNotFound(WarehouseCode),

    /// An order with the same order number already exists.
    #[error("Duplicate order: {0}")]
    DuplicateOrder(String),

    /// The entity was modified by someone else; reload and retry.
    #[error("{entity} {id} is out of date; reload and retry")]
    OutOfDate { entity: &'static str, id: String },

    /// The return was modified by someone else; reload and retry.
    #[error("Return {0} has been updated by another user")]
    ReturnOutOfDate(ReturnId),

    /// A lock can only be released by the actor that took it.
    #[error("Lock held by {holder} cannot be released by {releaser}")]
    InvalidUnlocker { holder: String, releaser: String },

    /// Shipment completion failed; any captured payments were rolled back.
    #[error("Cannot complete shipment {shipment_number}: {reason}")]
    CompleteShipmentFailed {
        shipment_number: ShipmentNumber,
        reason: String,
    },

    /// Shipment could not be released for pick/pack.
    #[error("Cannot release shipment {shipment_number}: {reason}")]
    ReleaseShipmentFailed {
        shipment_number: ShipmentNumber,
        reason: String,
    },

    /// An exchange return has no exchange order attached.
    #[error("Exchange order is not specified on return {0}")]
    ExchangeOrderMissing(ReturnId),

    /// Payment gateway failure.
    #[error("Payment error: {0}")]
    Payment(String),

    /// Tax engine failure.
    #[error("Tax error: {0}")]
    Tax(String),

    /// Event publication failure.
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Unexpected store failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for FulfillmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict { entity, id } => {
                FulfillmentError::OutOfDate { entity, id }
            }
            other => FulfillmentError::Store(other),
        }
    }
}

/// Result type for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
