//! Tax engine trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Order, OrderReturn, ShipmentNumber};

use crate::error::{FulfillmentError, Result};

/// A tax document action recorded by the in-memory engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxDocumentAction {
    OrderCommitted(String),
    ReturnCommitted(String),
    OrderReversed(String),
    ShipmentReversed(String),
    ReturnReversed(String),
}

/// Trait for tax document operations.
#[async_trait]
pub trait TaxOperationService: Send + Sync {
    /// Commits the tax document for a new order.
    async fn commit_order_document(&self, order: &Order) -> Result<()>;

    /// Commits the tax document for a new return.
    async fn commit_return_document(&self, order_return: &OrderReturn) -> Result<()>;

    /// Reverses all tax documents committed for an order.
    async fn reverse_order_taxes(&self, order: &Order) -> Result<()>;

    /// Reverses the tax document for one shipment.
    async fn reverse_shipment_taxes(
        &self,
        order: &Order,
        shipment_number: &ShipmentNumber,
    ) -> Result<()>;

    /// Reverses the tax document for a return.
    async fn reverse_return_taxes(&self, order_return: &OrderReturn) -> Result<()>;
}

#[derive(Debug, Default)]
struct TaxState {
    actions: Vec<TaxDocumentAction>,
    fail_on_commit: bool,
}

/// In-memory tax engine for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaxService {
    state: Arc<RwLock<TaxState>>,
}

impl InMemoryTaxService {
    /// Creates a new in-memory tax engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the engine to fail document commits.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.state.write().unwrap().fail_on_commit = fail;
    }

    /// Returns all recorded actions.
    pub fn actions(&self) -> Vec<TaxDocumentAction> {
        self.state.read().unwrap().actions.clone()
    }

    fn record(&self, action: TaxDocumentAction) {
        self.state.write().unwrap().actions.push(action);
    }
}

#[async_trait]
impl TaxOperationService for InMemoryTaxService {
    async fn commit_order_document(&self, order: &Order) -> Result<()> {
        if self.state.read().unwrap().fail_on_commit {
            return Err(FulfillmentError::Tax("Document commit failed".to_string()));
        }
        self.record(TaxDocumentAction::OrderCommitted(
            order.order_number.clone(),
        ));
        Ok(())
    }

    async fn commit_return_document(&self, order_return: &OrderReturn) -> Result<()> {
        if self.state.read().unwrap().fail_on_commit {
            return Err(FulfillmentError::Tax("Document commit failed".to_string()));
        }
        self.record(TaxDocumentAction::ReturnCommitted(
            order_return.rma_code.clone(),
        ));
        Ok(())
    }

    async fn reverse_order_taxes(&self, order: &Order) -> Result<()> {
        self.record(TaxDocumentAction::OrderReversed(order.order_number.clone()));
        Ok(())
    }

    async fn reverse_shipment_taxes(
        &self,
        _order: &Order,
        shipment_number: &ShipmentNumber,
    ) -> Result<()> {
        self.record(TaxDocumentAction::ShipmentReversed(
            shipment_number.as_str().to_string(),
        ));
        Ok(())
    }

    async fn reverse_return_taxes(&self, order_return: &OrderReturn) -> Result<()> {
        self.record(TaxDocumentAction::ReturnReversed(
            order_return.rma_code.clone(),
        ));
        Ok(())
    }
}
