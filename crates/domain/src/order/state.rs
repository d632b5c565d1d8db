//! Order and shipment status state machines.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Created ──► InProgress ──► PartiallyShipped ──► Completed
///    │             │ ▲               │
///    │         OnHold │              │
///    └─────────────┴──┴──────────────┴──► Cancelled
///
/// AwaitingExchange is entered only by orders spawned to satisfy an
/// exchange, and releases back into InProgress.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order has been created but not yet released for fulfillment.
    #[default]
    Created,

    /// Order is being fulfilled.
    InProgress,

    /// At least one shipment has shipped; others remain open.
    PartiallyShipped,

    /// A hold has been placed on the order.
    OnHold,

    /// Order spawned by an exchange, parked until the exchange completes.
    AwaitingExchange,

    /// All shipments have shipped (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a hold can be placed in this status.
    pub fn is_holdable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::InProgress | OrderStatus::AwaitingExchange
        )
    }

    /// Returns true if the order can be released for fulfillment.
    pub fn is_releasable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::OnHold | OrderStatus::AwaitingExchange
        )
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created
                | OrderStatus::InProgress
                | OrderStatus::OnHold
                | OrderStatus::AwaitingExchange
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "Created",
            OrderStatus::InProgress => "InProgress",
            OrderStatus::PartiallyShipped => "PartiallyShipped",
            OrderStatus::OnHold => "OnHold",
            OrderStatus::AwaitingExchange => "AwaitingExchange",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a single shipment.
///
/// Status transitions:
/// ```text
/// AwaitingInventory ──► InventoryAssigned ──► Released ──► Shipped
///         │                     │                │
///         └─────────────────────┴────────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderShipmentStatus {
    /// One or more lines still await stock.
    #[default]
    AwaitingInventory,

    /// Every line is fully allocated.
    InventoryAssigned,

    /// Released to the warehouse for pick/pack.
    Released,

    /// Shipped (terminal state).
    Shipped,

    /// Cancelled (terminal state).
    Cancelled,
}

impl OrderShipmentStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderShipmentStatus::Shipped | OrderShipmentStatus::Cancelled
        )
    }

    /// Returns true if the shipment can still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderShipmentStatus::AwaitingInventory => "AwaitingInventory",
            OrderShipmentStatus::InventoryAssigned => "InventoryAssigned",
            OrderShipmentStatus::Released => "Released",
            OrderShipmentStatus::Shipped => "Shipped",
            OrderShipmentStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
