//! Call surface between the components.
//!
//! Every hop (client -> index, client -> unit, controller -> index) goes through
//! one of these traits, so the same routing and scaling logic runs against
//! in-process units (`cluster::local`) or remote ones over HTTP
//! (`cluster::http`). Any call may suspend and any call may fail.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{
    BatchAck, Entity, InsertAck, OpId, PartitionAddress, PartitionKey, ScanRange, SortKey,
    SyntheticBatch, UnitStatus,
};

/// Authoritative PK -> partition addresses registry.
#[async_trait]
pub trait IndexApi: Send + Sync {
    /// Provisions and registers the first unit of a new partition key.
    async fn create_partition(&self, pk: &PartitionKey) -> Result<PartitionAddress>;

    /// Appends an already provisioned unit to the key's sequence.
    async fn register_sibling(&self, pk: &PartitionKey, address: PartitionAddress) -> Result<()>;

    /// Provisions a new unit for an existing key and appends it.
    async fn spawn_sibling(&self, pk: &PartitionKey) -> Result<PartitionAddress>;

    /// Newest unit of the key.
    async fn resolve_write_target(&self, pk: &PartitionKey) -> Result<PartitionAddress>;

    /// Every unit of the key, in creation order.
    async fn resolve_all_partitions(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>>;
}

/// A single storage unit.
#[async_trait]
pub trait UnitApi: Send + Sync {
    fn address(&self) -> &PartitionAddress;

    /// Stores one entity. Sending the same `op_id` again returns the first
    /// ack instead of storing twice, even after the unit has closed.
    async fn insert(&self, op_id: OpId, sk: SortKey, value: serde_json::Value) -> Result<InsertAck>;

    /// Stores a synthetic run; deduplicated by `batch.op_id` like `insert`.
    async fn insert_batch(&self, batch: SyntheticBatch) -> Result<BatchAck>;

    async fn size(&self) -> Result<u64>;

    async fn get(&self, sk: &SortKey) -> Result<Option<serde_json::Value>>;

    async fn delete(&self, sk: &SortKey) -> Result<Option<serde_json::Value>>;

    async fn scan(&self, range: ScanRange) -> Result<Vec<Entity>>;

    async fn status(&self) -> Result<UnitStatus>;
}

/// Directory layer turning an opaque address into a callable unit.
pub trait UnitResolver: Send + Sync {
    fn resolve(&self, address: &PartitionAddress) -> Result<Arc<dyn UnitApi>>;
}

/// Allocates fresh storage units.
#[async_trait]
pub trait UnitProvisioner: Send + Sync {
    async fn provision(&self, pk: &PartitionKey) -> Result<PartitionAddress>;

    /// Drops a unit that was provisioned but never registered.
    async fn release(&self, address: &PartitionAddress) -> Result<()>;
}
