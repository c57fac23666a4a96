//! In-process wiring of the index, its storage units and routing clients.
//!
//! Units reach the index through an [`IndexLink`] that holds it weakly: the
//! index owns the directory, the directory owns the units, and each unit's
//! controller points back at the index.

use crate::api::{IndexApi, UnitApi, UnitProvisioner, UnitResolver};
use crate::client::router::RoutingClient;
use crate::config::{RouterConfig, ScalingConfig};
use crate::error::{Result, StoreError};
use crate::index::service::IndexService;
use crate::types::{PartitionAddress, PartitionKey};
use crate::unit::autoscaler::AutoscalingController;
use crate::unit::storage::StorageUnit;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Weak handle to an [`IndexService`], bound once the service exists.
#[derive(Default)]
pub struct IndexLink {
    index: OnceLock<Weak<IndexService>>,
}

impl IndexLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, index: &Arc<IndexService>) {
        if self.index.set(Arc::downgrade(index)).is_err() {
            tracing::warn!("Index link already bound, ignoring rebind");
        }
    }

    fn upgrade(&self) -> Result<Arc<IndexService>> {
        self.index
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| StoreError::PartitionUnreachable("index service is gone".to_string()))
    }
}

#[async_trait]
impl IndexApi for IndexLink {
    async fn create_partition(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        self.upgrade()?.create_partition(pk).await
    }

    async fn register_sibling(&self, pk: &PartitionKey, address: PartitionAddress) -> Result<()> {
        self.upgrade()?.register_sibling(pk, address)
    }

    async fn spawn_sibling(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        self.upgrade()?.spawn_sibling(pk).await
    }

    async fn resolve_write_target(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        self.upgrade()?.resolve_write_target(pk)
    }

    async fn resolve_all_partitions(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>> {
        self.upgrade()?.resolve_all_partitions(pk)
    }
}

/// Directory of the storage units living in this process.
///
/// Allocates units on request (bounded by an optional unit limit, which
/// stands in for resource exhaustion) and resolves addresses to units.
pub struct UnitDirectory {
    units: DashMap<PartitionAddress, Arc<StorageUnit>>,
    scaling: ScalingConfig,
    index: Arc<dyn IndexApi>,
    allocated: AtomicUsize,
    unit_limit: AtomicUsize,
}

impl UnitDirectory {
    pub fn new(scaling: ScalingConfig, index: Arc<dyn IndexApi>) -> Self {
        Self {
            units: DashMap::new(),
            scaling,
            index,
            allocated: AtomicUsize::new(0),
            unit_limit: AtomicUsize::new(usize::MAX),
        }
    }

    /// Caps the number of live units; `None` removes the cap.
    pub fn set_unit_limit(&self, limit: Option<usize>) {
        self.unit_limit
            .store(limit.unwrap_or(usize::MAX), Ordering::SeqCst);
    }

    pub fn unit(&self, address: &PartitionAddress) -> Option<Arc<StorageUnit>> {
        self.units.get(address).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn scaling(&self) -> &ScalingConfig {
        &self.scaling
    }

    fn reserve_slot(&self) -> Result<()> {
        let limit = self.unit_limit.load(Ordering::SeqCst);
        self.allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |allocated| {
                (allocated < limit).then_some(allocated + 1)
            })
            .map(|_| ())
            .map_err(|allocated| {
                StoreError::ProvisioningFailed(format!(
                    "unit limit reached ({} of {})",
                    allocated, limit
                ))
            })
    }
}

#[async_trait]
impl UnitProvisioner for UnitDirectory {
    async fn provision(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        self.reserve_slot()?;

        let address = PartitionAddress::new();
        let controller = AutoscalingController::new(self.scaling.clone(), self.index.clone());
        let unit = StorageUnit::new(address.clone(), pk.clone(), controller);
        self.units.insert(address.clone(), unit);

        tracing::debug!("Provisioned unit {} for pk {}", address, pk);
        Ok(address)
    }

    async fn release(&self, address: &PartitionAddress) -> Result<()> {
        match self.units.remove(address) {
            Some(_) => {
                self.allocated.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!("Released unit {}", address);
                Ok(())
            }
            None => Err(StoreError::UnknownPartition(address.clone())),
        }
    }
}

impl UnitResolver for UnitDirectory {
    fn resolve(&self, address: &PartitionAddress) -> Result<Arc<dyn UnitApi>> {
        self.unit(address)
            .map(|unit| unit as Arc<dyn UnitApi>)
            .ok_or_else(|| StoreError::UnknownPartition(address.clone()))
    }
}

/// Index plus directory running in one process.
#[derive(Clone)]
pub struct LocalCluster {
    index: Arc<IndexService>,
    directory: Arc<UnitDirectory>,
}

impl LocalCluster {
    pub fn new(scaling: ScalingConfig) -> Self {
        let link = Arc::new(IndexLink::new());
        let directory = Arc::new(UnitDirectory::new(scaling, link.clone()));
        let index = Arc::new(IndexService::new(directory.clone()));
        link.bind(&index);

        tracing::info!(
            "Local cluster ready (threshold {}, redirect {:?})",
            directory.scaling().threshold,
            directory.scaling().redirect
        );

        Self { index, directory }
    }

    pub fn index(&self) -> Arc<IndexService> {
        self.index.clone()
    }

    pub fn directory(&self) -> Arc<UnitDirectory> {
        self.directory.clone()
    }

    pub fn client(&self, config: RouterConfig) -> RoutingClient {
        RoutingClient::new(self.index.clone(), self.directory.clone(), config)
    }
}
