//! Domain model for the order fulfillment core.
//!
//! This crate provides the pure (I/O-free) domain types:
//! - Order aggregate with its shipment and line entities
//! - Order and shipment status state machines
//! - Inventory records and the allocation event table
//! - Return/exchange entities with their own status lifecycle
//! - Order lock value type

pub mod allocation;
pub mod inventory;
pub mod lock;
pub mod order;
pub mod returns;
pub mod value_objects;

pub use allocation::{
    AllocationEventType, AllocationResult, AllocationStatus, AvailabilityCriteria,
    PreOrBackOrderDetails,
};
pub use inventory::{Inventory, InventoryCommand, InventoryKey};
pub use lock::{LockValidation, OrderLock};
pub use order::{
    Order, OrderError, OrderShipment, OrderShipmentStatus, OrderSku, OrderStatus, ShipmentType,
};
pub use returns::{
    OrderReturn, OrderReturnSku, OrderReturnStatus, OrderReturnType, ReturnDisposition,
    ReturnError, ReturnPayment, ReturnPaymentKind, ReturnPaymentStatus,
};
pub use value_objects::{
    Actor, CustomerId, Money, ShipmentNumber, SkuCode, StoreCode, WarehouseCode,
};
