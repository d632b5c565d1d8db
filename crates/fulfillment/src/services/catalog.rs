//! Catalog lookup trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{AvailabilityCriteria, PreOrBackOrderDetails, SkuCode, WarehouseCode};

use crate::error::{FulfillmentError, Result};

/// SKU descriptor as resolved through the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuDescriptor {
    /// The SKU code.
    pub sku_code: SkuCode,
    /// Availability policy for allocation.
    pub availability: AvailabilityCriteria,
    /// Maximum units that may be ordered ahead of stock; 0 = unlimited.
    pub pre_or_back_order_limit: u32,
}

impl SkuDescriptor {
    /// Creates a descriptor with no advance-order limit.
    pub fn new(sku_code: impl Into<SkuCode>, availability: AvailabilityCriteria) -> Self {
        Self {
            sku_code: sku_code.into(),
            availability,
            pre_or_back_order_limit: 0,
        }
    }
}

/// Warehouse descriptor, including its pick-delay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warehouse {
    /// The warehouse code.
    pub code: WarehouseCode,
    /// Minutes a physical shipment waits before it may be released for
    /// pick/pack.
    pub pick_delay_minutes: i64,
}

impl Warehouse {
    /// Creates a warehouse descriptor.
    pub fn new(code: impl Into<WarehouseCode>, pick_delay_minutes: i64) -> Self {
        Self {
            code: code.into(),
            pick_delay_minutes,
        }
    }
}

/// Trait for catalog lookups and the pre/backorder demand counter.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Resolves a SKU code to its descriptor.
    async fn find_sku(&self, sku_code: &SkuCode) -> Result<Option<SkuDescriptor>>;

    /// Resolves a warehouse code to its descriptor.
    async fn find_warehouse(&self, code: &WarehouseCode) -> Result<Option<Warehouse>>;

    /// Returns the outstanding pre/backorder demand for a SKU.
    async fn pre_or_back_order_details(&self, sku_code: &SkuCode)
        -> Result<PreOrBackOrderDetails>;

    /// Adds to the outstanding pre/backorder demand counter.
    async fn add_pre_or_back_order_quantity(&self, sku_code: &SkuCode, quantity: u32)
        -> Result<()>;

    /// Deducts from the outstanding pre/backorder demand counter, flooring at
    /// zero.
    async fn deduct_pre_or_back_order_quantity(
        &self,
        sku_code: &SkuCode,
        quantity: u32,
    ) -> Result<()>;
}

#[derive(Debug, Default)]
struct CatalogState {
    skus: HashMap<SkuCode, SkuDescriptor>,
    outstanding: HashMap<SkuCode, u32>,
    warehouses: HashMap<WarehouseCode, Warehouse>,
}

/// In-memory catalog for testing and local wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogService {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalogService {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a SKU.
    pub fn add_sku(&self, descriptor: SkuDescriptor) {
        let mut state = self.state.write().unwrap();
        state.skus.insert(descriptor.sku_code.clone(), descriptor);
    }

    /// Registers a warehouse.
    pub fn add_warehouse(&self, warehouse: Warehouse) {
        let mut state = self.state.write().unwrap();
        state.warehouses.insert(warehouse.code.clone(), warehouse);
    }

    /// Returns the current outstanding pre/backorder quantity for a SKU.
    pub fn outstanding_quantity(&self, sku_code: &SkuCode) -> u32 {
        self.state
            .read()
            .unwrap()
            .outstanding
            .get(sku_code)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn find_sku(&self, sku_code: &SkuCode) -> Result<Option<SkuDescriptor>> {
        let state = self.state.read().unwrap();
        Ok(state.skus.get(sku_code).cloned())
    }

    async fn find_warehouse(&self, code: &WarehouseCode) -> Result<Option<Warehouse>> {
        let state = self.state.read().unwrap();
        Ok(state.warehouses.get(code).cloned())
    }

    async fn pre_or_back_order_details(
        &self,
        sku_code: &SkuCode,
    ) -> Result<PreOrBackOrderDetails> {
        let state = self.state.read().unwrap();
        let descriptor = state
            .skus
            .get(sku_code)
            .ok_or_else(|| FulfillmentError::SkuNotFound(sku_code.clone()))?;
        let mut details =
            PreOrBackOrderDetails::new(sku_code.clone(), descriptor.pre_or_back_order_limit);
        details.quantity_ordered = state.outstanding.get(sku_code).copied().unwrap_or(0);
        Ok(details)
    }

    async fn add_pre_or_back_order_quantity(
        &self,
        sku_code: &SkuCode,
        quantity: u32,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();
        *state.outstanding.entry(sku_code.clone()).or_insert(0) += quantity;
        Ok(())
    }

    async fn deduct_pre_or_back_order_quantity(
        &self,
        sku_code: &SkuCode,
        quantity: u32,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let counter = state.outstanding.entry(sku_code.clone()).or_insert(0);
        *counter = counter.saturating_sub(quantity);
        Ok(())
    }
}
