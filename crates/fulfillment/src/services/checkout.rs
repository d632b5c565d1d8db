//! Exchange checkout trait and in-memory implementation.
//!
//! Building the replacement order for an exchange belongs to the shopping
//! cart checkout flow, which is outside this core; the trait is the seam
//! through which the return orchestrator drives it.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::{Money, Order, OrderShipment, OrderSku, ShipmentType, SkuCode};

use crate::error::Result;
use crate::services::time::TimeService;

/// A line requested on an exchange's replacement order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeItem {
    pub sku_code: SkuCode,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Trait for building the replacement order of an exchange.
#[async_trait]
pub trait ExchangeCheckoutService: Send + Sync {
    /// Builds a new, unpersisted order carrying the requested items, priced
    /// and addressed from the origin order.
    async fn checkout_exchange_order(
        &self,
        origin: &Order,
        items: &[ExchangeItem],
    ) -> Result<Order>;
}

#[derive(Debug, Default)]
struct CheckoutState {
    next_id: u32,
}

/// In-memory exchange checkout for testing.
#[derive(Clone)]
pub struct InMemoryExchangeCheckout {
    state: Arc<RwLock<CheckoutState>>,
    time: Arc<dyn TimeService>,
}

impl InMemoryExchangeCheckout {
    /// Creates a new in-memory exchange checkout.
    pub fn new(time: Arc<dyn TimeService>) -> Self {
        Self {
            state: Arc::new(RwLock::new(CheckoutState::default())),
            time,
        }
    }
}

#[async_trait]
impl ExchangeCheckoutService for InMemoryExchangeCheckout {
    async fn checkout_exchange_order(
        &self,
        origin: &Order,
        items: &[ExchangeItem],
    ) -> Result<Order> {
        let seq = {
            let mut state = self.state.write().unwrap();
            state.next_id += 1;
            state.next_id
        };

        let order_id = OrderId::new();
        let now = self.time.now();
        let skus: Vec<OrderSku> = items
            .iter()
            .map(|item| OrderSku::new(item.sku_code.clone(), item.quantity, item.unit_price))
            .collect();
        let shipment = OrderShipment::new(
            format!("EXC-{:04}-1", seq).as_str(),
            order_id,
            ShipmentType::Physical,
            skus,
            now,
        );

        Ok(Order::new(
            order_id,
            format!("EXC-{:04}", seq),
            origin.customer_id,
            origin.store_code.clone(),
            origin.warehouse_code.clone(),
            origin.currency.clone(),
            vec![shipment],
            now,
            origin.modified_by.clone(),
        ))
    }
}
