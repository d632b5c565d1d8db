//! Return and exchange orchestration.

use std::sync::Arc;

use common::ReturnId;
use domain::{
    Actor, Money, Order, OrderReturn, OrderReturnSku, OrderReturnStatus, OrderReturnType,
    OrderStatus, ReturnDisposition, ReturnPayment, ReturnPaymentKind, ReturnPaymentStatus,
    ShipmentNumber, SkuCode,
};
use store::{OrderStore, ReturnStore, StoreError, Version, Versioned};
use thiserror::Error;

use crate::error::{FulfillmentError, Result};
use crate::order_service::OrderService;
use crate::services::checkout::{ExchangeCheckoutService, ExchangeItem};
use crate::services::messaging::{EventMessage, EventPublisher, OrderEventType};
use crate::services::payment::PaymentGateway;
use crate::services::tax::TaxOperationService;
use crate::services::time::TimeService;

/// One line of a return request.
#[derive(Debug, Clone)]
pub struct ReturnRequestItem {
    pub sku_code: SkuCode,
    pub quantity: u32,
    pub restock_amount: Money,
}

/// A request to return lines from one shipment.
#[derive(Debug, Clone)]
pub struct ReturnRequest {
    pub order_id: common::OrderId,
    pub shipment_number: ShipmentNumber,
    pub items: Vec<ReturnRequestItem>,
    pub refunded_shipping: Money,
    pub disposition: ReturnDisposition,
}

/// A failed rule of the composite return validator. Each variant names what
/// was violated so callers can report an actionable message.
#[derive(Debug, Error)]
pub enum ReturnValidationError {
    #[error("Returned quantity for {sku_code} must be positive")]
    NonPositiveQuantity { sku_code: SkuCode },

    #[error("Returned quantity {requested} for {sku_code} exceeds returnable quantity {returnable}")]
    QuantityExceedsReturnable {
        sku_code: SkuCode,
        requested: u32,
        returnable: u32,
    },

    #[error("Restock amount for {sku_code} must not be negative")]
    NegativeRestockAmount { sku_code: SkuCode },

    #[error("Refunded shipping {refunded} exceeds shipping charged {charged}")]
    ShippingRefundExceedsCharged { refunded: Money, charged: Money },

    #[error("SKU {sku_code} is not part of shipment {shipment_number}")]
    SkuNotInShipment {
        sku_code: SkuCode,
        shipment_number: ShipmentNumber,
    },
}

/// Composite validator for return creation and editing. Rules run in order;
/// the first failure aborts.
#[derive(Debug, Default)]
pub struct ReturnValidator;

impl ReturnValidator {
    /// Validates a return against its order.
    pub fn validate(
        &self,
        order_return: &OrderReturn,
        order: &Order,
    ) -> std::result::Result<(), ReturnValidationError> {
        self.validate_quantities(order_return)?;
        self.validate_returnable(order_return)?;
        self.validate_restock_amounts(order_return)?;
        self.validate_shipping(order_return)?;
        self.validate_sku_references(order_return, order)?;
        Ok(())
    }

    fn validate_quantities(
        &self,
        order_return: &OrderReturn,
    ) -> std::result::Result<(), ReturnValidationError> {
        for sku in &order_return.skus {
            if sku.quantity == 0 {
                return Err(ReturnValidationError::NonPositiveQuantity {
                    sku_code: sku.sku_code.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_returnable(
        &self,
        order_return: &OrderReturn,
    ) -> std::result::Result<(), ReturnValidationError> {
        for sku in &order_return.skus {
            if sku.quantity > sku.returnable_quantity {
                return Err(ReturnValidationError::QuantityExceedsReturnable {
                    sku_code: sku.sku_code.clone(),
                    requested: sku.quantity,
                    returnable: sku.returnable_quantity,
                });
            }
        }
        Ok(())
    }

    fn validate_restock_amounts(
        &self,
        order_return: &OrderReturn,
    ) -> std::result::Result<(), ReturnValidationError> {
        for sku in &order_return.skus {
            if sku.restock_amount.is_negative() {
                return Err(ReturnValidationError::NegativeRestockAmount {
                    sku_code: sku.sku_code.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_shipping(
        &self,
        order_return: &OrderReturn,
    ) -> std::result::Result<(), ReturnValidationError> {
        if order_return.refunded_shipping > order_return.shipping_charged {
            return Err(ReturnValidationError::ShippingRefundExceedsCharged {
                refunded: order_return.refunded_shipping,
                charged: order_return.shipping_charged,
            });
        }
        Ok(())
    }

    fn validate_sku_references(
        &self,
        order_return: &OrderReturn,
        order: &Order,
    ) -> std::result::Result<(), ReturnValidationError> {
        let shipment = order.shipment(&order_return.shipment_number);
        for sku in &order_return.skus {
            let found = shipment
                .map(|s| s.skus().iter().any(|line| line.sku_code == sku.sku_code))
                .unwrap_or(false);
            if !found {
                return Err(ReturnValidationError::SkuNotInShipment {
                    sku_code: sku.sku_code.clone(),
                    shipment_number: order_return.shipment_number.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Orchestrates returns and exchanges over the order state machine and the
/// allocation engine's compensating paths.
pub struct ReturnService {
    returns: Arc<dyn ReturnStore>,
    orders: Arc<dyn OrderStore>,
    order_service: Arc<OrderService>,
    payments: Arc<dyn PaymentGateway>,
    taxes: Arc<dyn TaxOperationService>,
    publisher: Arc<dyn EventPublisher>,
    checkout: Arc<dyn ExchangeCheckoutService>,
    time: Arc<dyn TimeService>,
    validator: ReturnValidator,
}

impl ReturnService {
    /// Creates a new return service.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        returns: Arc<dyn ReturnStore>,
        orders: Arc<dyn OrderStore>,
        order_service: Arc<OrderService>,
        payments: Arc<dyn PaymentGateway>,
        taxes: Arc<dyn TaxOperationService>,
        publisher: Arc<dyn EventPublisher>,
        checkout: Arc<dyn ExchangeCheckoutService>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            returns,
            orders,
            order_service,
            payments,
            taxes,
            publisher,
            checkout,
            time,
            validator: ReturnValidator,
        }
    }

    /// Loads a return by id.
    pub async fn get_return(&self, return_id: ReturnId) -> Result<Option<Versioned<OrderReturn>>> {
        Ok(self.returns.get(return_id).await?)
    }

    /// Returns all returns raised against an order.
    pub async fn list_for_order(
        &self,
        order_id: common::OrderId,
    ) -> Result<Vec<OrderReturn>> {
        Ok(self.returns.list_for_order(order_id).await?)
    }

    async fn build_return(
        &self,
        order: &Order,
        request: &ReturnRequest,
        return_type: OrderReturnType,
        actor: &Actor,
    ) -> Result<OrderReturn> {
        let shipment = order
            .shipment(&request.shipment_number)
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(request.shipment_number.clone()))?;

        let skus: Vec<OrderReturnSku> = request
            .items
            .iter()
            .map(|item| {
                let unit_price = shipment
                    .skus()
                    .iter()
                    .find(|line| line.sku_code == item.sku_code)
                    .map(|line| line.unit_price)
                    .unwrap_or_default();
                let mut sku = OrderReturnSku::new(item.sku_code.clone(), item.quantity, unit_price);
                sku.restock_amount = item.restock_amount;
                sku
            })
            .collect();

        let prior = self.returns.list_for_order(order.id).await?;
        let rma_code = format!("RMA-{}-{}", order.order_number, prior.len() + 1);

        let mut order_return = OrderReturn::new(
            ReturnId::new(),
            rma_code,
            order.id,
            request.shipment_number.clone(),
            return_type,
            skus,
            actor.clone(),
            self.time.now(),
        );
        order_return.shipping_charged = shipment.shipping_cost;
        order_return.refunded_shipping = request.refunded_shipping;
        order_return.update_returnable_quantities(order, &prior);
        self.validator.validate(&order_return, order)?;
        Ok(order_return)
    }

    async fn apply_disposition(
        &self,
        order_return: &mut OrderReturn,
        order: &Order,
        disposition: ReturnDisposition,
    ) -> Result<()> {
        match disposition {
            ReturnDisposition::PhysicalReturnRequired => {
                order_return.physical_return = true;
            }
            ReturnDisposition::RefundToOriginal => {
                let amount = order_return.return_total();
                if amount.is_positive() {
                    self.payments.refund(order, amount).await?;
                    order_return.payments.push(ReturnPayment {
                        kind: ReturnPaymentKind::GatewayRefund,
                        status: ReturnPaymentStatus::Approved,
                        amount,
                    });
                }
            }
            ReturnDisposition::ManualReturn => {
                // Refund happened outside the system; record it without any
                // gateway call so the return's refunded total stays correct.
                let amount = order_return.return_total();
                if amount.is_positive() {
                    order_return.payments.push(ReturnPayment {
                        kind: ReturnPaymentKind::Manual,
                        status: ReturnPaymentStatus::Approved,
                        amount,
                    });
                }
            }
        }
        Ok(())
    }

    fn status_for(disposition: ReturnDisposition) -> OrderReturnStatus {
        if disposition == ReturnDisposition::PhysicalReturnRequired {
            OrderReturnStatus::AwaitingStockReturn
        } else {
            OrderReturnStatus::Completed
        }
    }

    /// Creates a plain return against one shipment.
    #[tracing::instrument(skip(self, request, actor), fields(order_id = %request.order_id))]
    pub async fn create_shipment_return(
        &self,
        request: ReturnRequest,
        actor: &Actor,
    ) -> Result<Versioned<OrderReturn>> {
        let order_versioned = self
            .order_service
            .get_order(request.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(request.order_id))?;
        let order = &order_versioned.entity;

        let mut order_return = self
            .build_return(order, &request, OrderReturnType::Return, actor)
            .await?;

        self.apply_disposition(&mut order_return, order, request.disposition)
            .await?;
        order_return.set_status(Self::status_for(request.disposition));

        self.taxes.commit_return_document(&order_return).await?;
        let saved = self.returns.insert(order_return).await?;
        self.order_service
            .add_return(order.id, saved.entity.id, actor)
            .await?;

        metrics::counter!("returns_created_total").increment(1);
        self.publisher
            .publish(EventMessage::new(
                OrderEventType::ReturnCreated,
                saved.entity.rma_code.clone(),
            ))
            .await?;
        Ok(saved)
    }

    /// Creates an exchange: a return plus a replacement order parked in
    /// `AwaitingExchange`.
    ///
    /// If the refund step fails, the freshly created exchange order is
    /// cancelled and the return comes back `Cancelled` instead of an error.
    #[tracing::instrument(skip(self, request, exchange_items, actor), fields(order_id = %request.order_id))]
    pub async fn create_exchange(
        &self,
        request: ReturnRequest,
        exchange_items: Vec<ExchangeItem>,
        actor: &Actor,
    ) -> Result<Versioned<OrderReturn>> {
        let order_versioned = self
            .order_service
            .get_order(request.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(request.order_id))?;
        let order = &order_versioned.entity;

        let mut order_return = self
            .build_return(order, &request, OrderReturnType::Exchange, actor)
            .await?;

        let exchange_order = self
            .checkout
            .checkout_exchange_order(order, &exchange_items)
            .await?;
        let placed = self
            .order_service
            .process_order_on_checkout(exchange_order, true)
            .await?;
        order_return.exchange_order_id = Some(placed.entity.id);

        match self
            .apply_disposition(&mut order_return, order, request.disposition)
            .await
        {
            Ok(()) => {}
            Err(e @ FulfillmentError::Payment(_)) => {
                tracing::error!(error = %e, "error occurred while processing an exchange");
                self.order_service
                    .cancel_order(placed.entity.id, actor)
                    .await?;
                order_return.set_status(OrderReturnStatus::Cancelled);
                return Ok(self.returns.insert(order_return).await?);
            }
            Err(e) => return Err(e),
        }

        order_return.set_status(Self::status_for(request.disposition));
        self.taxes.commit_return_document(&order_return).await?;
        let saved = self.returns.insert(order_return).await?;
        self.order_service
            .add_return(order.id, saved.entity.id, actor)
            .await?;

        metrics::counter!("exchanges_created_total").increment(1);
        self.publisher
            .publish(
                EventMessage::new(OrderEventType::ExchangeCreated, saved.entity.rma_code.clone())
                    .with("exchangeOrder", placed.entity.order_number.clone()),
            )
            .await?;
        Ok(saved)
    }

    /// Completes a return awaiting stock, issuing the refund requested.
    #[tracing::instrument(skip(self, actor))]
    pub async fn complete_return(
        &self,
        return_id: ReturnId,
        refund_type: ReturnDisposition,
        actor: &Actor,
    ) -> Result<Versioned<OrderReturn>> {
        let versioned = self
            .returns
            .get(return_id)
            .await?
            .ok_or(FulfillmentError::ReturnNotFound(return_id))?;
        let mut order_return = versioned.entity;

        if order_return.status() != OrderReturnStatus::AwaitingStockReturn {
            return Err(domain::ReturnError::IllegalState {
                current: order_return.status(),
                action: "complete",
            }
            .into());
        }
        if refund_type == ReturnDisposition::PhysicalReturnRequired {
            return Err(FulfillmentError::Validation(
                "Completion requires a refund disposition".to_string(),
            ));
        }

        let order = self
            .order_service
            .get_order(order_return.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_return.order_id))?;
        self.apply_disposition(&mut order_return, &order.entity, refund_type)
            .await?;

        order_return.complete()?;
        order_return.last_modified = self.time.now();
        self.update_return(order_return, versioned.version).await
    }

    /// Completes an exchange: completes the return, then releases the
    /// replacement order and settles the price difference.
    ///
    /// If authorizing the difference fails, the replacement order is
    /// re-parked in `AwaitingExchange` before the failure propagates.
    #[tracing::instrument(skip(self, actor))]
    pub async fn complete_exchange(
        &self,
        return_id: ReturnId,
        refund_type: ReturnDisposition,
        actor: &Actor,
    ) -> Result<Versioned<OrderReturn>> {
        let versioned = self
            .returns
            .get(return_id)
            .await?
            .ok_or(FulfillmentError::ReturnNotFound(return_id))?;
        let exchange_order_id = versioned
            .entity
            .exchange_order_id
            .ok_or(FulfillmentError::ExchangeOrderMissing(return_id))?;

        let exchange = self
            .order_service
            .get_order(exchange_order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(exchange_order_id))?;
        let exchange_status = exchange.entity.status();
        let exchange_live = exchange_status != OrderStatus::Cancelled;
        if exchange_status != OrderStatus::AwaitingExchange && exchange_live {
            return Err(domain::OrderError::InvalidOrderTransition {
                current: exchange_status,
                action: "complete exchange with",
            }
            .into());
        }

        let completed = self.complete_return(return_id, refund_type, actor).await?;

        if exchange_live {
            let released = self
                .order_service
                .release_order(exchange_order_id, actor)
                .await?;

            let difference = released.entity.total_amount() - completed.entity.return_total();
            if difference.is_positive() {
                if let Err(e) = self.payments.authorize(&released.entity, difference).await {
                    self.repark_exchange_order(exchange_order_id, actor).await?;
                    return Err(e);
                }
            } else if difference.is_negative() {
                self.payments
                    .refund(&released.entity, Money::zero() - difference)
                    .await?;
            }
        }
        Ok(completed)
    }

    async fn repark_exchange_order(
        &self,
        exchange_order_id: common::OrderId,
        actor: &Actor,
    ) -> Result<()> {
        let fresh = self
            .order_service
            .get_order(exchange_order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(exchange_order_id))?;
        let mut order = fresh.entity;
        order.await_exchange()?;
        order.touch(self.time.now(), actor.clone());
        self.orders.update(order, fresh.version).await?;
        Ok(())
    }

    /// Cancels an in-flight return; only legal while awaiting stock back.
    /// A linked exchange order is cancelled with it.
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel_return(
        &self,
        return_id: ReturnId,
        actor: &Actor,
    ) -> Result<Versioned<OrderReturn>> {
        let versioned = self
            .returns
            .get(return_id)
            .await?
            .ok_or(FulfillmentError::ReturnNotFound(return_id))?;
        let mut order_return = versioned.entity;

        order_return.cancel()?;
        self.taxes.reverse_return_taxes(&order_return).await?;
        order_return.last_modified = self.time.now();

        let saved = self.update_return(order_return, versioned.version).await?;

        if let Some(exchange_order_id) = saved.entity.exchange_order_id {
            self.order_service
                .cancel_order(exchange_order_id, actor)
                .await?;
        }

        self.publisher
            .publish(EventMessage::new(
                OrderEventType::ReturnCancelled,
                saved.entity.rma_code.clone(),
            ))
            .await?;
        Ok(saved)
    }

    /// Edits a return that has not reached a terminal state.
    pub async fn edit_return(
        &self,
        mut order_return: OrderReturn,
        expected_version: Version,
        actor: &Actor,
    ) -> Result<Versioned<OrderReturn>> {
        if order_return.is_in_terminal_state() {
            return Err(domain::ReturnError::IllegalState {
                current: order_return.status(),
                action: "edit",
            }
            .into());
        }

        let order = self
            .order_service
            .get_order(order_return.order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_return.order_id))?;
        let prior = self.returns.list_for_order(order_return.order_id).await?;
        order_return.update_returnable_quantities(&order.entity, &prior);
        self.validator.validate(&order_return, &order.entity)?;

        order_return.last_modified = self.time.now();
        self.update_return(order_return, expected_version).await
    }

    async fn update_return(
        &self,
        order_return: OrderReturn,
        expected_version: Version,
    ) -> Result<Versioned<OrderReturn>> {
        let return_id = order_return.id;
        match self.returns.update(order_return, expected_version).await {
            Ok(saved) => Ok(saved),
            Err(StoreError::ConcurrencyConflict { .. }) => {
                Err(FulfillmentError::ReturnOutOfDate(return_id))
            }
            Err(e) => Err(e.into()),
        }
    }
}
