//! Inventory repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Inventory, InventoryCommand, InventoryKey};
use tokio::sync::RwLock;

use crate::Result;

/// Outcome of executing an inventory command.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryExecution {
    /// Quantity actually moved after capping.
    pub quantity: u32,
    /// Snapshot of the record after the command.
    pub inventory_after: Inventory,
}

/// Repository for per-(SKU, warehouse) [`Inventory`] records.
///
/// `execute` is the mutation entry point: the command is applied
/// read-modify-write under per-key exclusive access, so concurrent commands
/// for the same key are serialized while different keys proceed
/// independently. A record is created on first touch.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Loads a record, or `None` if the key has never been touched.
    async fn get(&self, key: &InventoryKey) -> Result<Option<Inventory>>;

    /// Creates or replaces a record; used for administrative setup.
    async fn save(&self, inventory: Inventory) -> Result<Inventory>;

    /// Applies a command atomically against the record for `key`.
    async fn execute(
        &self,
        key: &InventoryKey,
        command: InventoryCommand,
    ) -> Result<InventoryExecution>;
}

/// In-memory inventory repository.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    records: Arc<RwLock<HashMap<InventoryKey, Inventory>>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty inventory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get(&self, key: &InventoryKey) -> Result<Option<Inventory>> {
        let records = self.records.read().await;
        Ok(records.get(key).cloned())
    }

    async fn save(&self, inventory: Inventory) -> Result<Inventory> {
        let mut records = self.records.write().await;
        records.insert(inventory.key(), inventory.clone());
        Ok(inventory)
    }

    async fn execute(
        &self,
        key: &InventoryKey,
        command: InventoryCommand,
    ) -> Result<InventoryExecution> {
        let mut records = self.records.write().await;
        let record = records.entry(key.clone()).or_insert_with(|| {
            Inventory::new(key.sku_code.clone(), key.warehouse_code.clone())
        });
        let quantity = record.apply(command);
        Ok(InventoryExecution {
            quantity,
            inventory_after: record.clone(),
        })
    }
}
