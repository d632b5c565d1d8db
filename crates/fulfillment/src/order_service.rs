//! Order lifecycle service: hold, release, cancel, pick/pack release,
//! shipment completion, and the periodic release sweep.

use std::sync::Arc;

use chrono::Duration;
use common::{OrderId, ReturnId};
use domain::{
    Actor, AllocationEventType, Order, OrderShipmentStatus, OrderStatus, ShipmentNumber,
    SkuCode, WarehouseCode,
};
use store::{OrderStore, StoreError, Versioned};

use crate::allocation::AllocationService;
use crate::error::{FulfillmentError, Result};
use crate::services::catalog::CatalogService;
use crate::services::messaging::{EventMessage, EventPublisher, OrderEventType};
use crate::services::payment::PaymentGateway;
use crate::services::tax::TaxOperationService;
use crate::services::time::TimeService;

/// Owns the order and shipment status lifecycles.
///
/// Mutating operations re-read the order fresh from the store and write back
/// conditioned on the version read ("optimistic refresh, then act"); stale
/// writes surface as [`FulfillmentError::OutOfDate`].
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    allocation: Arc<AllocationService>,
    catalog: Arc<dyn CatalogService>,
    payments: Arc<dyn PaymentGateway>,
    taxes: Arc<dyn TaxOperationService>,
    publisher: Arc<dyn EventPublisher>,
    time: Arc<dyn TimeService>,
}

impl OrderService {
    /// Creates a new order service.
    pub fn new(
        orders: Arc<dyn OrderStore>,
        allocation: Arc<AllocationService>,
        catalog: Arc<dyn CatalogService>,
        payments: Arc<dyn PaymentGateway>,
        taxes: Arc<dyn TaxOperationService>,
        publisher: Arc<dyn EventPublisher>,
        time: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            orders,
            allocation,
            catalog,
            payments,
            taxes,
            publisher,
            time,
        }
    }

    /// Loads an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Versioned<Order>>> {
        Ok(self.orders.get(order_id).await?)
    }

    /// Loads an order by order number.
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Versioned<Order>>> {
        Ok(self.orders.find_by_order_number(order_number).await?)
    }

    async fn require_order(&self, order_id: OrderId) -> Result<Versioned<Order>> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    async fn require_order_for_shipment(
        &self,
        shipment_number: &ShipmentNumber,
    ) -> Result<Versioned<Order>> {
        self.orders
            .find_by_shipment_number(shipment_number)
            .await?
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(shipment_number.clone()))
    }

    /// Allocates inventory for a freshly checked-out order, commits its tax
    /// document, persists it, and announces it.
    ///
    /// The order stays `Created` until released; exchange orders are parked
    /// in `AwaitingExchange` instead. A store uniqueness violation on the
    /// order number surfaces as [`FulfillmentError::DuplicateOrder`].
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub async fn process_order_on_checkout(
        &self,
        mut order: Order,
        is_exchange: bool,
    ) -> Result<Versioned<Order>> {
        if self
            .orders
            .find_by_order_number(&order.order_number)
            .await?
            .is_some()
        {
            return Err(FulfillmentError::DuplicateOrder(order.order_number));
        }

        let warehouse_code = order.warehouse_code.clone();
        let originator = order.modified_by.clone();

        self.allocate_inventory_for_order(&mut order, &warehouse_code, &originator)
            .await?;

        if is_exchange {
            order.await_exchange()?;
        }
        order.touch(self.time.now(), originator);

        let order_number = order.order_number.clone();
        let saved = match self.orders.insert(order).await {
            Ok(saved) => saved,
            Err(StoreError::DuplicateKey { .. }) => {
                return Err(FulfillmentError::DuplicateOrder(order_number));
            }
            Err(e) => return Err(e.into()),
        };

        self.taxes.commit_order_document(&saved.entity).await?;

        metrics::counter!("orders_placed_total").increment(1);
        self.publisher
            .publish(EventMessage::new(
                OrderEventType::OrderCreated,
                saved.entity.order_number.clone(),
            ))
            .await?;
        Ok(saved)
    }

    async fn allocate_inventory_for_order(
        &self,
        order: &mut Order,
        warehouse_code: &WarehouseCode,
        originator: &Actor,
    ) -> Result<()> {
        for shipment in order.shipments_mut() {
            for line in shipment.skus_mut() {
                let result = self
                    .allocation
                    .process_allocation_event(
                        line,
                        AllocationEventType::OrderPlaced,
                        originator,
                        warehouse_code,
                        line.quantity,
                        None,
                    )
                    .await?;
                line.set_allocated_quantity(result.quantity_allocated_in_stock)?;
            }
            shipment.refresh_inventory_status();
        }
        Ok(())
    }

    /// Places a hold on an order.
    #[tracing::instrument(skip(self, actor))]
    pub async fn hold_order(&self, order_id: OrderId, actor: &Actor) -> Result<Versioned<Order>> {
        let versioned = self.require_order(order_id).await?;
        let mut order = versioned.entity;

        order.hold()?;
        order.touch(self.time.now(), actor.clone());
        let saved = self.orders.update(order, versioned.version).await?;

        self.publisher
            .publish(EventMessage::new(
                OrderEventType::OrderHeld,
                saved.entity.order_number.clone(),
            ))
            .await?;
        Ok(saved)
    }

    /// Releases an order for fulfillment.
    ///
    /// Coming out of a hold, payment is captured for shipments that ship
    /// without a separate fulfillment step (electronic) and they go straight
    /// to `Shipped`. Physical shipments whose pick-delay window has elapsed
    /// advance to `Released`; a failure releasing one shipment is reported
    /// and does not block the others.
    #[tracing::instrument(skip(self, actor))]
    pub async fn release_order(
        &self,
        order_id: OrderId,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        let versioned = self.require_order(order_id).await?;
        let mut order = versioned.entity;

        let previous_status = order.status();
        order.release()?;

        if previous_status == OrderStatus::OnHold {
            self.capture_immediately_shippable_shipments(&mut order)
                .await?;
        }

        self.release_due_shipments_in(&mut order).await?;
        order.refresh_progress();
        order.touch(self.time.now(), actor.clone());
        let saved = self.orders.update(order, versioned.version).await?;

        self.publisher
            .publish(EventMessage::new(
                OrderEventType::OrderReleased,
                saved.entity.order_number.clone(),
            ))
            .await?;
        Ok(saved)
    }

    /// Captures payment for electronic shipments and ships them in place.
    async fn capture_immediately_shippable_shipments(&self, order: &mut Order) -> Result<()> {
        let now = self.time.now();
        let numbers: Vec<ShipmentNumber> = order
            .shipments()
            .iter()
            .filter(|s| {
                s.shipment_type.ships_immediately()
                    && s.status() == OrderShipmentStatus::InventoryAssigned
            })
            .map(|s| s.shipment_number.clone())
            .collect();

        for number in numbers {
            let amount = order
                .shipment(&number)
                .map(|s| s.total_amount())
                .unwrap_or_default();
            self.payments
                .capture_shipment_payment(order, &number, amount)
                .await?;
            if let Some(shipment) = order.shipment_mut(&number) {
                shipment.mark_shipped(None, now)?;
            }
        }
        Ok(())
    }

    /// Advances due physical shipments of an in-memory order to `Released`.
    ///
    /// Fail-soft per shipment: a payment-adjustment failure is logged,
    /// counted, and published; remaining shipments still release.
    async fn release_due_shipments_in(&self, order: &mut Order) -> Result<u32> {
        let pick_delay = match self.catalog.find_warehouse(&order.warehouse_code).await? {
            Some(warehouse) => Duration::minutes(warehouse.pick_delay_minutes),
            None => Duration::zero(),
        };
        let pick_date = self.time.now() - pick_delay;

        let due: Vec<ShipmentNumber> = order
            .shipments()
            .iter()
            .filter(|s| {
                !s.shipment_type.ships_immediately()
                    && s.status() == OrderShipmentStatus::InventoryAssigned
                    && s.created_at <= pick_date
            })
            .map(|s| s.shipment_number.clone())
            .collect();

        let mut released = 0;
        for number in due {
            match self.payments.adjust_shipment_authorization(order, &number).await {
                Ok(()) => {
                    if let Some(shipment) = order.shipment_mut(&number) {
                        shipment.mark_released()?;
                        released += 1;
                    }
                }
                Err(e) => {
                    self.report_release_failure(&number, &order.order_number, &e)
                        .await;
                }
            }
        }
        Ok(released)
    }

    async fn report_release_failure(
        &self,
        shipment_number: &ShipmentNumber,
        order_number: &str,
        error: &FulfillmentError,
    ) {
        tracing::error!(
            shipment = %shipment_number,
            order = order_number,
            error = %error,
            "shipment release failed"
        );
        metrics::counter!("shipment_release_failures_total").increment(1);
        let _ = self
            .publisher
            .publish(
                EventMessage::new(
                    OrderEventType::OrderShipmentReleaseFailed,
                    shipment_number.as_str(),
                )
                .with("orderGuid", order_number)
                .with("errorMessage", error.to_string()),
            )
            .await;
    }

    /// Releases one shipment for pick/pack.
    ///
    /// Re-reads the order fresh from the store: another session may have
    /// released the shipment already and a cached order would not show it.
    /// Failures are reported as a structured error event before propagating,
    /// since this path is also driven by the periodic sweep.
    #[tracing::instrument(skip(self))]
    pub async fn process_release_shipment(
        &self,
        shipment_number: &ShipmentNumber,
    ) -> Result<Versioned<Order>> {
        match self.process_release_shipment_internal(shipment_number).await {
            Ok(saved) => Ok(saved),
            Err(e) => {
                let order_number = self
                    .orders
                    .find_by_shipment_number(shipment_number)
                    .await
                    .ok()
                    .flatten()
                    .map(|v| v.entity.order_number)
                    .unwrap_or_default();
                self.report_release_failure(shipment_number, &order_number, &e)
                    .await;
                Err(e)
            }
        }
    }

    async fn process_release_shipment_internal(
        &self,
        shipment_number: &ShipmentNumber,
    ) -> Result<Versioned<Order>> {
        let versioned = self.require_order_for_shipment(shipment_number).await?;
        let mut order = versioned.entity;

        let status = order
            .shipment(shipment_number)
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(shipment_number.clone()))?
            .status();
        if status != OrderShipmentStatus::InventoryAssigned {
            return Err(FulfillmentError::ReleaseShipmentFailed {
                shipment_number: shipment_number.clone(),
                reason: format!("shipment is in {} status, expected InventoryAssigned", status),
            });
        }

        self.payments
            .adjust_shipment_authorization(&order, shipment_number)
            .await
            .map_err(|e| FulfillmentError::ReleaseShipmentFailed {
                shipment_number: shipment_number.clone(),
                reason: e.to_string(),
            })?;

        if let Some(shipment) = order.shipment_mut(shipment_number) {
            shipment.mark_released()?;
        }
        order.touch(self.time.now(), Actor::System);
        Ok(self.orders.update(order, versioned.version).await?)
    }

    /// The periodic sweep: finds in-flight orders with inventory-assigned
    /// shipments and releases the ones whose pick delay has elapsed.
    ///
    /// Fail-soft per order: a failure on one order is logged and counted,
    /// and the sweep continues with the rest. Returns the number of orders
    /// whose shipments were released.
    #[tracing::instrument(skip(self))]
    pub async fn release_due_shipments(&self) -> Result<u32> {
        let candidates = self
            .orders
            .find_by_status_with_shipments_in(
                &[OrderStatus::InProgress, OrderStatus::PartiallyShipped],
                OrderShipmentStatus::InventoryAssigned,
            )
            .await?;

        let mut processed = 0;
        for candidate in candidates {
            let order_id = candidate.entity.id;
            match self.release_releasable_shipments(order_id).await {
                Ok(released) if released > 0 => processed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(%order_id, error = %e, "release sweep failed for order");
                    metrics::counter!("sweep_order_failures_total").increment(1);
                }
            }
        }
        Ok(processed)
    }

    /// Releases the due shipments of one order as a single unit of work.
    /// Returns the number of shipments released.
    pub async fn release_releasable_shipments(&self, order_id: OrderId) -> Result<u32> {
        let versioned = self.require_order(order_id).await?;
        let mut order = versioned.entity;

        let released = self.release_due_shipments_in(&mut order).await?;
        if released > 0 {
            order.touch(self.time.now(), Actor::System);
            self.orders.update(order, versioned.version).await?;
        }
        Ok(released)
    }

    /// Cancels an order.
    ///
    /// Payment-authorization reversal is attempted first and is best-effort:
    /// a failure there is logged and never blocks the cancellation. The
    /// transactional part re-validates cancellability against fresh state
    /// before writing.
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel_order(&self, order_id: OrderId, actor: &Actor) -> Result<Versioned<Order>> {
        let versioned = self.require_order(order_id).await?;
        let order = versioned.entity;

        if !order.is_cancellable() {
            return Err(domain::OrderError::InvalidOrderTransition {
                current: order.status(),
                action: "cancel",
            }
            .into());
        }

        if let Err(e) = self.payments.cancel_order_authorizations(&order).await {
            // Only the authorization reversal failed; the cancellation is
            // more important than a failed reversal attempt.
            tracing::error!(order = %order.order_number, error = %e, "payment reversal failed during order cancellation");
        }

        let saved = self.process_order_cancellation(order_id, actor).await?;

        self.taxes.reverse_order_taxes(&saved.entity).await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        self.publisher
            .publish(EventMessage::new(
                OrderEventType::OrderCancelled,
                saved.entity.order_number.clone(),
            ))
            .await?;
        Ok(saved)
    }

    /// The transactional core of cancellation: re-reads the order, re-checks
    /// cancellability inside the unit of work, returns allocated inventory,
    /// and writes the terminal state.
    pub async fn process_order_cancellation(
        &self,
        order_id: OrderId,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        // Fresh read: the caller's earlier check does not close the
        // check-then-act race, this one does.
        let versioned = self.require_order(order_id).await?;
        let mut order = versioned.entity;

        if !order.is_cancellable() {
            return Err(domain::OrderError::InvalidOrderTransition {
                current: order.status(),
                action: "cancel",
            }
            .into());
        }

        let warehouse_code = order.warehouse_code.clone();
        self.deallocate_lines(&order, &warehouse_code, actor, None)
            .await?;

        order.cancel()?;
        order.touch(self.time.now(), actor.clone());
        Ok(self.orders.update(order, versioned.version).await?)
    }

    /// Issues cancellation allocation events for every line with a
    /// resolvable SKU, scoped to one shipment when given.
    async fn deallocate_lines(
        &self,
        order: &Order,
        warehouse_code: &WarehouseCode,
        actor: &Actor,
        only_shipment: Option<&ShipmentNumber>,
    ) -> Result<()> {
        for shipment in order.shipments() {
            if let Some(number) = only_shipment {
                if &shipment.shipment_number != number {
                    continue;
                }
            }
            if shipment.status().is_terminal() {
                continue;
            }
            for line in shipment.skus() {
                if self.resolvable(&line.sku_code).await? {
                    self.allocation
                        .process_allocation_event(
                            line,
                            AllocationEventType::OrderCancellation,
                            actor,
                            warehouse_code,
                            line.allocated_quantity(),
                            None,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn resolvable(&self, sku_code: &SkuCode) -> Result<bool> {
        Ok(self.catalog.find_sku(sku_code).await?.is_some())
    }

    /// Cancels one shipment.
    ///
    /// The payment reversal attempt comes first and is best-effort; the
    /// shipment cancellation proceeds regardless, then shipment taxes are
    /// reversed.
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel_shipment(
        &self,
        shipment_number: &ShipmentNumber,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        let versioned = self.require_order_for_shipment(shipment_number).await?;
        let order = versioned.entity;

        if let Err(e) = self
            .payments
            .cancel_shipment_authorization(&order, shipment_number)
            .await
        {
            tracing::error!(
                order = %order.order_number,
                shipment = %shipment_number,
                error = %e,
                "payment reversal failed during shipment cancellation"
            );
        }

        let saved = self
            .process_shipment_cancellation(shipment_number, actor)
            .await?;

        self.taxes
            .reverse_shipment_taxes(&saved.entity, shipment_number)
            .await?;
        Ok(saved)
    }

    async fn process_shipment_cancellation(
        &self,
        shipment_number: &ShipmentNumber,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        let versioned = self.require_order_for_shipment(shipment_number).await?;
        let mut order = versioned.entity;

        let warehouse_code = order.warehouse_code.clone();
        self.deallocate_lines(&order, &warehouse_code, actor, Some(shipment_number))
            .await?;

        let shipment = order
            .shipment_mut(shipment_number)
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(shipment_number.clone()))?;
        shipment.cancel()?;

        order.touch(self.time.now(), actor.clone());
        Ok(self.orders.update(order, versioned.version).await?)
    }

    /// Completes a shipment: captures funds (optionally), releases the
    /// committed inventory, records tracking data, marks the shipment
    /// shipped, and announces it.
    ///
    /// A capture failure stops everything before any state is touched. If a
    /// later step fails, the captured payment is rolled back before the
    /// failure is re-raised.
    #[tracing::instrument(skip(self, actor))]
    pub async fn complete_shipment(
        &self,
        shipment_number: &ShipmentNumber,
        tracking_code: Option<String>,
        capture_funds: bool,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        let mut captured = None;
        if capture_funds {
            let versioned = self.require_order_for_shipment(shipment_number).await?;
            let amount = versioned
                .entity
                .shipment(shipment_number)
                .map(|s| s.total_amount())
                .unwrap_or_default();
            captured = Some(
                self.payments
                    .capture_shipment_payment(&versioned.entity, shipment_number, amount)
                    .await
                    .map_err(|e| FulfillmentError::CompleteShipmentFailed {
                        shipment_number: shipment_number.clone(),
                        reason: format!("payments have failed: {}", e),
                    })?,
            );
        }

        match self
            .process_order_shipment(shipment_number, tracking_code, actor)
            .await
        {
            Ok(saved) => {
                self.publisher
                    .publish(
                        EventMessage::new(
                            OrderEventType::OrderShipmentShipped,
                            shipment_number.as_str(),
                        )
                        .with("orderGuid", saved.entity.order_number.clone()),
                    )
                    .await?;
                Ok(saved)
            }
            Err(e) => {
                if let Some(payment) = captured {
                    if let Err(rollback_error) =
                        self.payments.rollback_capture(&payment.transaction_id).await
                    {
                        tracing::error!(
                            shipment = %shipment_number,
                            error = %rollback_error,
                            "payment rollback failed after shipment completion failure"
                        );
                    }
                }
                Err(FulfillmentError::CompleteShipmentFailed {
                    shipment_number: shipment_number.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn process_order_shipment(
        &self,
        shipment_number: &ShipmentNumber,
        tracking_code: Option<String>,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        let versioned = self.require_order_for_shipment(shipment_number).await?;
        let mut order = versioned.entity;
        let warehouse_code = order.warehouse_code.clone();

        {
            let reason = format!("Order shipment {} completed", shipment_number);
            let shipment = order
                .shipment(shipment_number)
                .ok_or_else(|| FulfillmentError::ShipmentNotFound(shipment_number.clone()))?;
            for line in shipment.skus() {
                self.allocation
                    .process_allocation_event(
                        line,
                        AllocationEventType::OrderShipmentCompleted,
                        actor,
                        &warehouse_code,
                        line.quantity,
                        Some(reason.as_str()),
                    )
                    .await?;
            }
        }

        let now = self.time.now();
        let shipment = order
            .shipment_mut(shipment_number)
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(shipment_number.clone()))?;
        shipment.mark_shipped(tracking_code, now)?;

        self.payments.finalize_shipment(&order, shipment_number).await?;

        order.refresh_progress();
        order.touch(now, actor.clone());
        Ok(self.orders.update(order, versioned.version).await?)
    }

    /// Attaches a return to an order.
    pub async fn add_return(
        &self,
        order_id: OrderId,
        return_id: ReturnId,
        actor: &Actor,
    ) -> Result<Versioned<Order>> {
        let versioned = self.require_order(order_id).await?;
        let mut order = versioned.entity;
        order.add_return(return_id);
        order.touch(self.time.now(), actor.clone());
        Ok(self.orders.update(order, versioned.version).await?)
    }

    /// Counts shipments awaiting pick/pack release for a warehouse.
    pub async fn awaiting_shipment_count(&self, warehouse_code: &WarehouseCode) -> Result<usize> {
        let candidates = self
            .orders
            .find_by_status_with_shipments_in(
                &[OrderStatus::InProgress, OrderStatus::PartiallyShipped],
                OrderShipmentStatus::InventoryAssigned,
            )
            .await?;
        Ok(candidates
            .iter()
            .filter(|v| &v.entity.warehouse_code == warehouse_code)
            .flat_map(|v| v.entity.shipments())
            .filter(|s| s.status() == OrderShipmentStatus::InventoryAssigned)
            .count())
    }
}
