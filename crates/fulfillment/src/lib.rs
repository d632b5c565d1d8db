//! Order fulfillment service layer.
//!
//! This crate composes the domain model and the repository contracts into
//! the operations the rest of the system calls:
//!
//! - [`AllocationService`]: decides how much of a SKU's stock can be promised
//!   to an order line and applies the quantity delta to inventory
//! - [`OutstandingDemandProcessor`]: reacts to new-inventory notifications by
//!   draining backordered demand, oldest order first
//! - [`OrderService`]: the order and shipment status lifecycles — hold,
//!   release, cancel, pick/pack release, shipment completion, and the
//!   periodic release sweep
//! - [`OrderLockService`]: advisory locks for interactive editing
//! - [`ReturnService`]: returns and exchanges, including the compensating
//!   paths that give inventory and money back

pub mod allocation;
pub mod demand;
pub mod error;
pub mod lock;
pub mod order_service;
pub mod returns;
pub mod services;

pub use allocation::{AllocationService, InventoryListener};
pub use demand::OutstandingDemandProcessor;
pub use error::FulfillmentError;
pub use lock::OrderLockService;
pub use order_service::OrderService;
pub use returns::{ReturnRequest, ReturnRequestItem, ReturnService, ReturnValidationError};
pub use services::catalog::{CatalogService, InMemoryCatalogService, SkuDescriptor, Warehouse};
pub use services::checkout::{ExchangeCheckoutService, ExchangeItem, InMemoryExchangeCheckout};
pub use services::messaging::{EventMessage, EventPublisher, InMemoryEventPublisher, OrderEventType};
pub use services::payment::{
    GatewayTransaction, GatewayTransactionKind, InMemoryPaymentGateway, PaymentGateway,
    PaymentResult,
};
pub use services::tax::{InMemoryTaxService, TaxOperationService};
pub use services::time::{FixedTimeService, SystemTimeService, TimeService};
