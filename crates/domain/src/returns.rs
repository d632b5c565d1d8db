//! Return and exchange entities.

use chrono::{DateTime, Utc};
use common::{OrderId, ReturnId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::Order;
use crate::value_objects::{Actor, Money, ShipmentNumber, SkuCode};

/// The status of a return in its lifecycle.
///
/// Status transitions:
/// ```text
/// AwaitingStockReturn ──► Completed
///          │
///          └──► Cancelled
/// ```
///
/// Returns that require no physical stock back (refund/manual dispositions)
/// are created directly in `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderReturnStatus {
    /// Waiting for the customer to send the goods back.
    AwaitingStockReturn,
    /// Fully processed (terminal state).
    Completed,
    /// Cancelled before stock came back (terminal state).
    Cancelled,
}

impl OrderReturnStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderReturnStatus::Completed | OrderReturnStatus::Cancelled
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderReturnStatus::AwaitingStockReturn => "AwaitingStockReturn",
            OrderReturnStatus::Completed => "Completed",
            OrderReturnStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether this is a plain return or an exchange spawning a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderReturnType {
    Return,
    Exchange,
}

/// Requested disposition for a return's refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnDisposition {
    /// Goods must come back before any refund is issued.
    PhysicalReturnRequired,
    /// Refund immediately against the original payment instrument.
    RefundToOriginal,
    /// Refund was handled outside the system (e.g. cash); record it only.
    ManualReturn,
}

/// How a refund attached to a return was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnPaymentKind {
    /// Refunded through the payment gateway.
    GatewayRefund,
    /// Synthesized "paper" record for a refund made outside the system.
    Manual,
}

/// Status of a refund attached to a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnPaymentStatus {
    Approved,
    Failed,
}

/// A refund record attached to a return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnPayment {
    pub kind: ReturnPaymentKind,
    pub status: ReturnPaymentStatus,
    pub amount: Money,
}

/// A single returned line, referencing an order line by SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReturnSku {
    /// The SKU being returned.
    pub sku_code: SkuCode,

    /// Quantity being returned.
    pub quantity: u32,

    /// How many units of this line may still be returned; recomputed against
    /// the order before validation.
    pub returnable_quantity: u32,

    /// Unit price at which the line was sold.
    pub unit_price: Money,

    /// Restocking fee withheld from the refund for this line.
    pub restock_amount: Money,
}

impl OrderReturnSku {
    /// Creates a return line with no restocking fee.
    pub fn new(sku_code: impl Into<SkuCode>, quantity: u32, unit_price: Money) -> Self {
        Self {
            sku_code: sku_code.into(),
            quantity,
            returnable_quantity: 0,
            unit_price,
            restock_amount: Money::zero(),
        }
    }

    /// Refund value of the line before fees.
    pub fn subtotal(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Errors raised by the return entity.
#[derive(Debug, Error)]
pub enum ReturnError {
    /// The return is not in a status that permits the requested action.
    #[error("Cannot {action} return in {current} status")]
    IllegalState {
        current: OrderReturnStatus,
        action: &'static str,
    },
}

/// A return or exchange request raised against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReturn {
    /// Unique return identifier.
    pub id: ReturnId,

    /// Human-facing RMA code.
    pub rma_code: String,

    /// The order being returned against.
    pub order_id: OrderId,

    /// The shipment the returned lines came from.
    pub shipment_number: ShipmentNumber,

    /// Plain return or exchange.
    pub return_type: OrderReturnType,

    /// Current status.
    status: OrderReturnStatus,

    /// Returned lines.
    pub skus: Vec<OrderReturnSku>,

    /// True when the goods must physically come back.
    pub physical_return: bool,

    /// Shipping amount refunded to the customer.
    pub refunded_shipping: Money,

    /// Shipping originally charged on the shipment; refunds may not exceed it.
    pub shipping_charged: Money,

    /// The replacement order, for exchanges.
    pub exchange_order_id: Option<OrderId>,

    /// Refund records attached to this return.
    pub payments: Vec<ReturnPayment>,

    /// Who raised the return.
    pub created_by: Actor,

    /// When the return was created.
    pub created_at: DateTime<Utc>,

    /// When the return was last modified.
    pub last_modified: DateTime<Utc>,
}

impl OrderReturn {
    /// Creates a new return awaiting validation and disposition.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ReturnId,
        rma_code: impl Into<String>,
        order_id: OrderId,
        shipment_number: impl Into<ShipmentNumber>,
        return_type: OrderReturnType,
        skus: Vec<OrderReturnSku>,
        created_by: Actor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            rma_code: rma_code.into(),
            order_id,
            shipment_number: shipment_number.into(),
            return_type,
            status: OrderReturnStatus::AwaitingStockReturn,
            skus,
            physical_return: false,
            refunded_shipping: Money::zero(),
            shipping_charged: Money::zero(),
            exchange_order_id: None,
            payments: Vec::new(),
            created_by,
            created_at,
            last_modified: created_at,
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderReturnStatus {
        self.status
    }

    /// Returns true once the return reached a terminal status.
    pub fn is_in_terminal_state(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sets the status directly; used by the orchestrator's disposition
    /// handling at creation time.
    pub fn set_status(&mut self, status: OrderReturnStatus) {
        self.status = status;
    }

    /// Completes the return.
    pub fn complete(&mut self) -> Result<(), ReturnError> {
        if self.status != OrderReturnStatus::AwaitingStockReturn {
            return Err(ReturnError::IllegalState {
                current: self.status,
                action: "complete",
            });
        }
        self.status = OrderReturnStatus::Completed;
        Ok(())
    }

    /// Cancels the return; only legal while awaiting stock back.
    pub fn cancel(&mut self) -> Result<(), ReturnError> {
        if self.status != OrderReturnStatus::AwaitingStockReturn {
            return Err(ReturnError::IllegalState {
                current: self.status,
                action: "cancel",
            });
        }
        self.status = OrderReturnStatus::Cancelled;
        Ok(())
    }

    /// Total amount to refund: line subtotals plus refunded shipping, less
    /// restocking fees.
    pub fn return_total(&self) -> Money {
        let mut total = Money::zero();
        for sku in &self.skus {
            total += sku.subtotal();
            total -= sku.restock_amount;
        }
        total += self.refunded_shipping;
        total
    }

    /// Total restocking fee across all lines.
    pub fn restock_total(&self) -> Money {
        let mut total = Money::zero();
        for sku in &self.skus {
            total += sku.restock_amount;
        }
        total
    }

    /// Recomputes each line's returnable quantity against the order and any
    /// previously raised returns.
    ///
    /// Returnable is the ordered quantity of the matching shipment line minus
    /// quantities claimed by prior non-cancelled returns for the same line.
    pub fn update_returnable_quantities(&mut self, order: &Order, prior_returns: &[OrderReturn]) {
        for return_sku in &mut self.skus {
            let ordered = order
                .shipment(&self.shipment_number)
                .and_then(|shipment| {
                    shipment
                        .skus()
                        .iter()
                        .find(|sku| sku.sku_code == return_sku.sku_code)
                })
                .map(|sku| sku.quantity)
                .unwrap_or(0);

            let already_returned: u32 = prior_returns
                .iter()
                .filter(|prior| {
                    prior.id != self.id
                        && prior.status != OrderReturnStatus::Cancelled
                        && prior.shipment_number == self.shipment_number
                })
                .flat_map(|prior| prior.skus.iter())
                .filter(|sku| sku.sku_code == return_sku.sku_code)
                .map(|sku| sku.quantity)
                .sum();

            return_sku.returnable_quantity = ordered.saturating_sub(already_returned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderShipment, OrderSku, ShipmentType};
    use crate::value_objects::{CustomerId, StoreCode, WarehouseCode};

    fn order_with_line(quantity: u32) -> Order {
        let id = OrderId::new();
        let shipment = OrderShipment::new(
            "SHIP-001",
            id,
            ShipmentType::Physical,
            vec![OrderSku::new("SKU-001", quantity, Money::from_cents(1000))],
            Utc::now(),
        );
        Order::new(
            id,
            "ORD-0001",
            CustomerId::new(),
            StoreCode::new("store1"),
            WarehouseCode::new("WH1"),
            "USD",
            vec![shipment],
            Utc::now(),
            Actor::System,
        )
    }

    fn plain_return(order: &Order, quantity: u32) -> OrderReturn {
        OrderReturn::new(
            ReturnId::new(),
            "RMA-0001",
            order.id,
            "SHIP-001",
            OrderReturnType::Return,
            vec![OrderReturnSku::new(
                "SKU-001",
                quantity,
                Money::from_cents(1000),
            )],
            Actor::System,
            Utc::now(),
        )
    }

    #[test]
    fn return_total_includes_shipping_and_fees() {
        let order = order_with_line(5);
        let mut ret = plain_return(&order, 2);
        ret.skus[0].restock_amount = Money::from_cents(300);
        ret.refunded_shipping = Money::from_cents(500);

        // 2 * 10.00 - 3.00 + 5.00
        assert_eq!(ret.return_total().cents(), 2200);
    }

    #[test]
    fn returnable_quantity_subtracts_prior_returns() {
        let order = order_with_line(5);
        let mut prior = plain_return(&order, 2);
        prior.set_status(OrderReturnStatus::Completed);

        let mut ret = plain_return(&order, 3);
        ret.update_returnable_quantities(&order, &[prior]);
        assert_eq!(ret.skus[0].returnable_quantity, 3);
    }

    #[test]
    fn cancelled_priors_do_not_reduce_returnable() {
        let order = order_with_line(5);
        let mut prior = plain_return(&order, 2);
        prior.set_status(OrderReturnStatus::Cancelled);

        let mut ret = plain_return(&order, 3);
        ret.update_returnable_quantities(&order, &[prior]);
        assert_eq!(ret.skus[0].returnable_quantity, 5);
    }

    #[test]
    fn cancel_only_from_awaiting_stock_return() {
        let order = order_with_line(5);
        let mut ret = plain_return(&order, 2);
        ret.cancel().unwrap();
        assert_eq!(ret.status(), OrderReturnStatus::Cancelled);

        let mut completed = plain_return(&order, 2);
        completed.complete().unwrap();
        assert!(matches!(
            completed.cancel(),
            Err(ReturnError::IllegalState { .. })
        ));
    }

    #[test]
    fn complete_from_awaiting_stock_return() {
        let order = order_with_line(5);
        let mut ret = plain_return(&order, 2);
        ret.complete().unwrap();
        assert_eq!(ret.status(), OrderReturnStatus::Completed);
        assert!(ret.is_in_terminal_state());
    }
}
