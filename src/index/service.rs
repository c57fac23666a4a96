use crate::api::{IndexApi, UnitProvisioner};
use crate::error::{Result, StoreError};
use crate::types::{PartitionAddress, PartitionKey};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Single owner of the PK -> addresses mapping.
///
/// Each sequence is append-only and kept in creation order, so its last
/// element is always the newest unit of the key. Mutations take the entry
/// lock of one key only; keys living in different shards never contend.
pub struct IndexService {
    partitions: DashMap<PartitionKey, Vec<PartitionAddress>>,
    provisioner: Arc<dyn UnitProvisioner>,
}

impl IndexService {
    pub fn new(provisioner: Arc<dyn UnitProvisioner>) -> Self {
        Self {
            partitions: DashMap::new(),
            provisioner,
        }
    }

    pub async fn create_partition(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        if self.partitions.contains_key(pk) {
            return Err(StoreError::AlreadyExists(pk.0.clone()));
        }

        // Provisioning suspends, so no map guard may be held across it.
        let address = self.provisioner.provision(pk).await?;

        let registered = match self.partitions.entry(pk.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(vec![address.clone()]);
                true
            }
        };

        if !registered {
            tracing::warn!("Lost creation race for pk {}, releasing unit {}", pk, address);
            self.release_orphan(&address).await;
            return Err(StoreError::AlreadyExists(pk.0.clone()));
        }

        tracing::info!("Created partition set for pk {} with unit {}", pk, address);
        Ok(address)
    }

    pub fn register_sibling(&self, pk: &PartitionKey, address: PartitionAddress) -> Result<()> {
        let mut sequence = self
            .partitions
            .get_mut(pk)
            .ok_or_else(|| StoreError::UnknownPk(pk.clone()))?;

        if sequence.contains(&address) {
            return Err(StoreError::AlreadyExists(address.0));
        }
        sequence.push(address.clone());

        tracing::info!(
            "Registered unit {} as partition #{} of pk {}",
            address,
            sequence.len(),
            pk
        );
        Ok(())
    }

    pub async fn spawn_sibling(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        if !self.partitions.contains_key(pk) {
            return Err(StoreError::UnknownPk(pk.clone()));
        }

        let address = self.provisioner.provision(pk).await?;
        if let Err(e) = self.register_sibling(pk, address.clone()) {
            self.release_orphan(&address).await;
            return Err(e);
        }
        Ok(address)
    }

    pub fn resolve_write_target(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        self.partitions
            .get(pk)
            .and_then(|sequence| sequence.last().cloned())
            .ok_or_else(|| StoreError::UnknownPk(pk.clone()))
    }

    pub fn resolve_all_partitions(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>> {
        self.partitions
            .get(pk)
            .map(|sequence| sequence.value().clone())
            .ok_or_else(|| StoreError::UnknownPk(pk.clone()))
    }

    /// Registered partition keys, sorted.
    pub fn partition_keys(&self) -> Vec<PartitionKey> {
        let mut keys: Vec<PartitionKey> =
            self.partitions.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn partition_count(&self, pk: &PartitionKey) -> usize {
        self.partitions
            .get(pk)
            .map(|sequence| sequence.len())
            .unwrap_or(0)
    }

    async fn release_orphan(&self, address: &PartitionAddress) {
        if let Err(e) = self.provisioner.release(address).await {
            tracing::warn!("Failed to release orphaned unit {}: {}", address, e);
        }
    }
}

#[async_trait]
impl IndexApi for IndexService {
    async fn create_partition(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        IndexService::create_partition(self, pk).await
    }

    async fn register_sibling(&self, pk: &PartitionKey, address: PartitionAddress) -> Result<()> {
        IndexService::register_sibling(self, pk, address)
    }

    async fn spawn_sibling(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        IndexService::spawn_sibling(self, pk).await
    }

    async fn resolve_write_target(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        IndexService::resolve_write_target(self, pk)
    }

    async fn resolve_all_partitions(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>> {
        IndexService::resolve_all_partitions(self, pk)
    }
}
