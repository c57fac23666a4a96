use super::autoscaler::{AutoscalingController, ScaleLatch};
use crate::api::UnitApi;
use crate::error::{Result, StoreError};
use crate::types::{
    BatchAck, Entity, InsertAck, OpId, PartitionAddress, PartitionKey, ScanRange, SortKey,
    SyntheticBatch, UnitStatus,
};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Applied writes remembered per unit for deduplication.
const APPLIED_OPS_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
enum WriteAck {
    Insert(InsertAck),
    Batch(BatchAck),
}

/// Acks of the most recent writes by op id, oldest evicted first.
#[derive(Default)]
struct AppliedOps {
    acks: HashMap<OpId, WriteAck>,
    order: VecDeque<OpId>,
}

impl AppliedOps {
    fn get(&self, op_id: &OpId) -> Option<&WriteAck> {
        self.acks.get(op_id)
    }

    fn record(&mut self, op_id: OpId, ack: WriteAck) {
        if self.acks.insert(op_id.clone(), ack).is_none() {
            self.order.push_back(op_id);
        }
        while self.order.len() > APPLIED_OPS_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.acks.remove(&oldest);
            }
        }
    }
}

/// Mutable part of a unit. Guarded by one async lock so inserts, batches and
/// the scaling decision are applied in a strict order.
#[derive(Default)]
struct UnitState {
    entities: BTreeMap<SortKey, serde_json::Value>,
    latch: ScaleLatch,
    applied: AppliedOps,
}

/// A single partition holding the entities of one PK shard.
pub struct StorageUnit {
    address: PartitionAddress,
    pk: PartitionKey,
    state: Mutex<UnitState>,
    /// Mirrors of the locked state for lock-free reads.
    size: AtomicU64,
    open: AtomicBool,
    scaled: AtomicBool,
    controller: AutoscalingController,
}

impl StorageUnit {
    pub fn new(
        address: PartitionAddress,
        pk: PartitionKey,
        controller: AutoscalingController,
    ) -> Arc<Self> {
        Arc::new(Self {
            address,
            pk,
            state: Mutex::new(UnitState::default()),
            size: AtomicU64::new(0),
            open: AtomicBool::new(true),
            scaled: AtomicBool::new(false),
            controller,
        })
    }

    pub fn address(&self) -> &PartitionAddress {
        &self.address
    }

    pub fn pk(&self) -> &PartitionKey {
        &self.pk
    }

    pub fn len(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn is_scaled(&self) -> bool {
        self.scaled.load(Ordering::Acquire)
    }

    /// Stores one entity under a fresh op id.
    pub async fn insert(&self, sk: SortKey, value: serde_json::Value) -> Result<InsertAck> {
        self.insert_with_op(OpId::new(), sk, value).await
    }

    /// Stores one entity, then lets the controller re-evaluate the fill level
    /// before the lock is released.
    ///
    /// An op id seen before gets its original ack back, also on a closed
    /// unit, and nothing is stored.
    pub async fn insert_with_op(
        &self,
        op_id: OpId,
        sk: SortKey,
        value: serde_json::Value,
    ) -> Result<InsertAck> {
        let mut state = self.state.lock().await;
        match state.applied.get(&op_id) {
            Some(WriteAck::Insert(ack)) => {
                tracing::debug!("Unit {} replaying ack of insert {}", self.address, op_id);
                return Ok(ack.clone());
            }
            Some(WriteAck::Batch(_)) => {
                return Err(StoreError::Internal(format!("op {} was a batch", op_id)));
            }
            None => {}
        }
        if !state.latch.open {
            return Err(StoreError::AtCapacity(self.address.clone()));
        }

        let replaced = self.store(&mut state, sk, value);
        let sibling = if replaced {
            None
        } else {
            self.scale_check(&mut state).await
        };

        let ack = InsertAck {
            size: state.entities.len() as u64,
            replaced,
            sibling,
        };
        state.applied.record(op_id, WriteAck::Insert(ack.clone()));
        Ok(ack)
    }

    /// Inserts a run of synthetic entities one by one, applying the same
    /// threshold check after each entity as single inserts do.
    ///
    /// If the unit closes part way through, the batch stops right after the
    /// entity that triggered scaling and the ack names the sibling that should
    /// receive the remainder.
    pub async fn insert_batch(&self, batch: SyntheticBatch) -> Result<BatchAck> {
        let mut state = self.state.lock().await;
        match state.applied.get(&batch.op_id) {
            Some(WriteAck::Batch(ack)) => {
                tracing::debug!("Unit {} replaying ack of batch op {}", self.address, batch.op_id);
                return Ok(ack.clone());
            }
            Some(WriteAck::Insert(_)) => {
                return Err(StoreError::Internal(format!("op {} was an insert", batch.op_id)));
            }
            None => {}
        }
        if !state.latch.open {
            return Err(StoreError::AtCapacity(self.address.clone()));
        }

        let mut inserted = 0;
        let mut redirect = None;
        while inserted < batch.count {
            let entity = batch.entity(inserted);
            let replaced = self.store(&mut state, entity.sk, entity.value);
            inserted += 1;

            if replaced {
                continue;
            }
            if let Some(sibling) = self.scale_check(&mut state).await {
                if !state.latch.open {
                    redirect = Some(sibling);
                    break;
                }
            }
        }

        tracing::debug!(
            "Unit {} stored {}/{} entities of batch {}",
            self.address,
            inserted,
            batch.count,
            batch.batch_id
        );

        let ack = BatchAck {
            inserted,
            size: state.entities.len() as u64,
            redirect,
        };
        state.applied.record(batch.op_id, WriteAck::Batch(ack.clone()));
        Ok(ack)
    }

    pub async fn get(&self, sk: &SortKey) -> Option<serde_json::Value> {
        self.state.lock().await.entities.get(sk).cloned()
    }

    /// Removes an entity. Closed units still accept deletes.
    pub async fn delete(&self, sk: &SortKey) -> Option<serde_json::Value> {
        let mut state = self.state.lock().await;
        let removed = state.entities.remove(sk);
        self.size
            .store(state.entities.len() as u64, Ordering::Release);
        removed
    }

    pub async fn scan(&self, range: &ScanRange) -> Vec<Entity> {
        let state = self.state.lock().await;
        let lower = match &range.start {
            Some(start) => Bound::Included(start),
            None => Bound::Unbounded,
        };
        let upper = match &range.end {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        if let (Bound::Included(start), Bound::Excluded(end)) = (lower, upper) {
            // BTreeMap::range panics on inverted bounds
            if start >= end {
                return Vec::new();
            }
        }

        state
            .entities
            .range::<SortKey, _>((lower, upper))
            .take(range.limit.unwrap_or(usize::MAX))
            .map(|(sk, value)| Entity {
                sk: sk.clone(),
                value: value.clone(),
            })
            .collect()
    }

    pub fn status(&self) -> UnitStatus {
        UnitStatus {
            address: self.address.clone(),
            pk: self.pk.clone(),
            size: self.len(),
            threshold: self.controller.threshold(),
            open: self.is_open(),
            scaled: self.is_scaled(),
        }
    }

    fn store(&self, state: &mut UnitState, sk: SortKey, value: serde_json::Value) -> bool {
        let replaced = state.entities.insert(sk, value).is_some();
        self.size
            .store(state.entities.len() as u64, Ordering::Release);
        replaced
    }

    async fn scale_check(&self, state: &mut UnitState) -> Option<PartitionAddress> {
        let size = state.entities.len() as u64;
        let sibling = self
            .controller
            .maybe_scale(&self.pk, &self.address, size, &mut state.latch)
            .await;
        self.open.store(state.latch.open, Ordering::Release);
        self.scaled.store(state.latch.scaled, Ordering::Release);
        sibling
    }
}

#[async_trait]
impl UnitApi for StorageUnit {
    fn address(&self) -> &PartitionAddress {
        &self.address
    }

    async fn insert(&self, op_id: OpId, sk: SortKey, value: serde_json::Value) -> Result<InsertAck> {
        StorageUnit::insert_with_op(self, op_id, sk, value).await
    }

    async fn insert_batch(&self, batch: SyntheticBatch) -> Result<BatchAck> {
        StorageUnit::insert_batch(self, batch).await
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.len())
    }

    async fn get(&self, sk: &SortKey) -> Result<Option<serde_json::Value>> {
        Ok(StorageUnit::get(self, sk).await)
    }

    async fn delete(&self, sk: &SortKey) -> Result<Option<serde_json::Value>> {
        Ok(StorageUnit::delete(self, sk).await)
    }

    async fn scan(&self, range: ScanRange) -> Result<Vec<Entity>> {
        Ok(StorageUnit::scan(self, &range).await)
    }

    async fn status(&self) -> Result<UnitStatus> {
        Ok(StorageUnit::status(self))
    }
}
