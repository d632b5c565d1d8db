//! Payment gateway trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Money, Order, ShipmentNumber};

use crate::error::{FulfillmentError, Result};

/// Result of a successful gateway operation that produced a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// Gateway transaction ID, usable for rollback.
    pub transaction_id: String,
}

/// A transaction recorded by the in-memory gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTransaction {
    pub kind: GatewayTransactionKind,
    pub order_number: String,
    pub amount: Money,
}

/// The kind of gateway transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayTransactionKind {
    Capture,
    Refund,
    Authorize,
    CancelAuthorization,
    AdjustAuthorization,
    Finalize,
    Rollback,
}

/// Trait for payment gateway operations.
///
/// Every operation returns enough detail for the caller to roll back what it
/// did; rollback itself is best-effort.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Captures funds for one shipment.
    async fn capture_shipment_payment(
        &self,
        order: &Order,
        shipment_number: &ShipmentNumber,
        amount: Money,
    ) -> Result<PaymentResult>;

    /// Adjusts the authorization held for a shipment before release.
    async fn adjust_shipment_authorization(
        &self,
        order: &Order,
        shipment_number: &ShipmentNumber,
    ) -> Result<()>;

    /// Reverses all authorizations held for an order.
    async fn cancel_order_authorizations(&self, order: &Order) -> Result<()>;

    /// Reverses the authorization held for one shipment.
    async fn cancel_shipment_authorization(
        &self,
        order: &Order,
        shipment_number: &ShipmentNumber,
    ) -> Result<()>;

    /// Refunds an amount against the order's original payment instrument.
    async fn refund(&self, order: &Order, amount: Money) -> Result<PaymentResult>;

    /// Authorizes an additional amount against the order's payment
    /// instrument.
    async fn authorize(&self, order: &Order, amount: Money) -> Result<PaymentResult>;

    /// Confirms shipment with the gateway after a successful capture.
    async fn finalize_shipment(&self, order: &Order, shipment_number: &ShipmentNumber)
        -> Result<()>;

    /// Rolls back a previously captured transaction.
    async fn rollback_capture(&self, transaction_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct GatewayState {
    transactions: Vec<GatewayTransaction>,
    next_id: u32,
    fail_on_capture: bool,
    fail_on_refund: bool,
    fail_on_authorize: bool,
    fail_on_adjust: bool,
    fail_on_cancel_authorization: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<GatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail capture calls.
    pub fn set_fail_on_capture(&self, fail: bool) {
        self.state.write().unwrap().fail_on_capture = fail;
    }

    /// Configures the gateway to fail refund calls.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Configures the gateway to fail authorize calls.
    pub fn set_fail_on_authorize(&self, fail: bool) {
        self.state.write().unwrap().fail_on_authorize = fail;
    }

    /// Configures the gateway to fail authorization adjustments.
    pub fn set_fail_on_adjust(&self, fail: bool) {
        self.state.write().unwrap().fail_on_adjust = fail;
    }

    /// Configures the gateway to fail authorization reversals.
    pub fn set_fail_on_cancel_authorization(&self, fail: bool) {
        self.state.write().unwrap().fail_on_cancel_authorization = fail;
    }

    /// Returns all recorded transactions.
    pub fn transactions(&self) -> Vec<GatewayTransaction> {
        self.state.read().unwrap().transactions.clone()
    }

    /// Returns the number of transactions of a given kind.
    pub fn count_of(&self, kind: GatewayTransactionKind) -> usize {
        self.state
            .read()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.kind == kind)
            .count()
    }

    fn record(
        &self,
        kind: GatewayTransactionKind,
        order: &Order,
        amount: Money,
    ) -> PaymentResult {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let transaction_id = format!("TXN-{:04}", state.next_id);
        state.transactions.push(GatewayTransaction {
            kind,
            order_number: order.order_number.clone(),
            amount,
        });
        PaymentResult { transaction_id }
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn capture_shipment_payment(
        &self,
        order: &Order,
        _shipment_number: &ShipmentNumber,
        amount: Money,
    ) -> Result<PaymentResult> {
        if self.state.read().unwrap().fail_on_capture {
            return Err(FulfillmentError::Payment("Capture declined".to_string()));
        }
        Ok(self.record(GatewayTransactionKind::Capture, order, amount))
    }

    async fn adjust_shipment_authorization(
        &self,
        order: &Order,
        _shipment_number: &ShipmentNumber,
    ) -> Result<()> {
        if self.state.read().unwrap().fail_on_adjust {
            return Err(FulfillmentError::Payment(
                "Authorization adjustment declined".to_string(),
            ));
        }
        self.record(
            GatewayTransactionKind::AdjustAuthorization,
            order,
            Money::zero(),
        );
        Ok(())
    }

    async fn cancel_order_authorizations(&self, order: &Order) -> Result<()> {
        if self.state.read().unwrap().fail_on_cancel_authorization {
            return Err(FulfillmentError::Payment(
                "Authorization reversal failed".to_string(),
            ));
        }
        self.record(
            GatewayTransactionKind::CancelAuthorization,
            order,
            Money::zero(),
        );
        Ok(())
    }

    async fn cancel_shipment_authorization(
        &self,
        order: &Order,
        _shipment_number: &ShipmentNumber,
    ) -> Result<()> {
        if self.state.read().unwrap().fail_on_cancel_authorization {
            return Err(FulfillmentError::Payment(
                "Authorization reversal failed".to_string(),
            ));
        }
        self.record(
            GatewayTransactionKind::CancelAuthorization,
            order,
            Money::zero(),
        );
        Ok(())
    }

    async fn refund(&self, order: &Order, amount: Money) -> Result<PaymentResult> {
        if self.state.read().unwrap().fail_on_refund {
            return Err(FulfillmentError::Payment("Refund declined".to_string()));
        }
        Ok(self.record(GatewayTransactionKind::Refund, order, amount))
    }

    async fn authorize(&self, order: &Order, amount: Money) -> Result<PaymentResult> {
        if self.state.read().unwrap().fail_on_authorize {
            return Err(FulfillmentError::Payment(
                "Authorization declined".to_string(),
            ));
        }
        Ok(self.record(GatewayTransactionKind::Authorize, order, amount))
    }

    async fn finalize_shipment(
        &self,
        order: &Order,
        _shipment_number: &ShipmentNumber,
    ) -> Result<()> {
        self.record(GatewayTransactionKind::Finalize, order, Money::zero());
        Ok(())
    }

    async fn rollback_capture(&self, transaction_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.transactions.push(GatewayTransaction {
            kind: GatewayTransactionKind::Rollback,
            order_number: transaction_id.to_string(),
            amount: Money::zero(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::OrderId;
    use domain::{Actor, CustomerId, StoreCode, WarehouseCode};

    fn order() -> Order {
        Order::new(
            OrderId::new(),
            "ORD-1",
            CustomerId::new(),
            StoreCode::new("store1"),
            WarehouseCode::new("WH1"),
            "USD",
            vec![],
            Utc::now(),
            Actor::System,
        )
    }

    #[tokio::test]
    async fn capture_records_transaction() {
        let gateway = InMemoryPaymentGateway::new();
        let result = gateway
            .capture_shipment_payment(&order(), &"SHIP-1".into(), Money::from_cents(2000))
            .await
            .unwrap();
        assert!(result.transaction_id.starts_with("TXN-"));
        assert_eq!(gateway.count_of(GatewayTransactionKind::Capture), 1);
    }

    #[tokio::test]
    async fn capture_failure_records_nothing() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_capture(true);

        let result = gateway
            .capture_shipment_payment(&order(), &"SHIP-1".into(), Money::from_cents(2000))
            .await;
        assert!(matches!(result, Err(FulfillmentError::Payment(_))));
        assert_eq!(gateway.count_of(GatewayTransactionKind::Capture), 0);
    }

    #[tokio::test]
    async fn sequential_transaction_ids() {
        let gateway = InMemoryPaymentGateway::new();
        let o = order();
        let r1 = gateway.refund(&o, Money::from_cents(100)).await.unwrap();
        let r2 = gateway.refund(&o, Money::from_cents(100)).await.unwrap();
        assert_eq!(r1.transaction_id, "TXN-0001");
        assert_eq!(r2.transaction_id, "TXN-0002");
    }
}
