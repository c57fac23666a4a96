//! Routing Client
//!
//! Resolves partition keys through the index and dispatches calls to storage
//! units. Writes go to exactly one unit, the write target; reads fan out to
//! every unit of the key and come back as one outcome per unit.

use super::cache::RouteCache;
use crate::api::{IndexApi, UnitApi, UnitResolver};
use crate::config::RouterConfig;
use crate::error::{Result, StoreError};
use crate::types::{InsertAck, OpId, PartitionAddress, PartitionKey, SortKey, SyntheticBatch};

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_millis(1200);

/// Result of a fan-out call on a single partition.
#[derive(Debug)]
pub struct PartitionOutcome<T> {
    pub address: PartitionAddress,
    pub result: Result<T>,
}

impl<T> PartitionOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }
}

pub struct RoutingClient {
    index: Arc<dyn IndexApi>,
    resolver: Arc<dyn UnitResolver>,
    cache: RouteCache,
    config: RouterConfig,
}

impl RoutingClient {
    pub fn new(
        index: Arc<dyn IndexApi>,
        resolver: Arc<dyn UnitResolver>,
        config: RouterConfig,
    ) -> Self {
        Self {
            index,
            resolver,
            cache: RouteCache::new(),
            config,
        }
    }

    pub async fn create_partition(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        let address = self.index.create_partition(pk).await?;
        if self.config.cache_routes {
            self.cache.store(pk, vec![address.clone()]);
        }
        Ok(address)
    }

    /// Every partition of `pk` in creation order, straight from the index.
    pub async fn partitions(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>> {
        self.index.resolve_all_partitions(pk).await
    }

    pub fn invalidate(&self, pk: &PartitionKey) {
        self.cache.invalidate(pk);
    }

    /// Runs `op` against the write target of `pk`.
    ///
    /// A closed or stale target makes the client re-resolve the key and try
    /// again, up to `max_reroutes` times; an unreachable target is retried
    /// with backoff up to `max_attempts` times. Unknown keys and duplicate
    /// creations are returned as is. When the budget runs out the last error
    /// is returned.
    ///
    /// The retry after an unreachable target goes to that same unit, since
    /// the write may have landed there. `op` must resend the same op id so
    /// the unit can answer it without storing twice.
    #[tracing::instrument(level = "debug", skip_all, fields(pk = %pk, sk = %sk))]
    pub async fn update<T, F, Fut>(&self, pk: &PartitionKey, sk: &SortKey, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn UnitApi>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut reroutes = 0;
        let mut attempts = 0;
        let mut delay = self.config.retry_backoff;
        let mut pinned: Option<PartitionAddress> = None;

        loop {
            let target = match pinned.take() {
                Some(target) => target,
                None => self.write_target(pk).await?,
            };
            let result = match self.resolver.resolve(&target) {
                Ok(unit) => op(unit).await,
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.needs_reroute() || matches!(error, StoreError::UnknownPartition(_)) {
                reroutes += 1;
                let fresh = self.refresh(pk).await?;
                let error = if fresh.last() == Some(&target) {
                    // The index still names the unit that just refused the write.
                    StoreError::StaleTarget(target.clone())
                } else {
                    error
                };
                if reroutes > self.config.max_reroutes {
                    tracing::warn!("Giving up on pk {} after {} reroutes: {}", pk, reroutes - 1, error);
                    return Err(error);
                }
                tracing::debug!("Rerouting write for pk {} away from {}: {}", pk, target, error);
                if matches!(error, StoreError::StaleTarget(_)) {
                    self.backoff(&mut delay).await;
                }
                continue;
            }

            if error.is_retryable() {
                attempts += 1;
                if attempts >= self.config.max_attempts {
                    tracing::warn!("Giving up on pk {} after {} attempts: {}", pk, attempts, error);
                    return Err(error);
                }
                tracing::warn!("Write to {} failed (attempt {}): {}", target, attempts, error);
                self.backoff(&mut delay).await;
                pinned = Some(target);
                continue;
            }

            return Err(error);
        }
    }

    /// Runs `op` against every partition of `pk` concurrently.
    ///
    /// Each partition gets `query_timeout`; a partition that fails or times out
    /// only marks its own outcome as failed. Outcomes are in creation order.
    /// Only a failure to resolve the key fails the whole call.
    #[tracing::instrument(level = "debug", skip_all, fields(pk = %pk))]
    pub async fn query<T, F, Fut>(&self, pk: &PartitionKey, op: F) -> Result<Vec<PartitionOutcome<T>>>
    where
        F: Fn(Arc<dyn UnitApi>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let addresses = self.partitions(pk).await?;
        let timeout = self.config.query_timeout;
        let op = &op;

        let calls = addresses.into_iter().map(|address| async move {
            let result = match self.resolver.resolve(&address) {
                Ok(unit) => match tokio::time::timeout(timeout, op(unit)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::PartitionUnreachable(format!(
                        "{} did not answer within {:?}",
                        address, timeout
                    ))),
                },
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                tracing::warn!("Fan-out to {} failed: {}", address, e);
            }
            PartitionOutcome { address, result }
        });

        Ok(join_all(calls).await)
    }

    pub async fn insert(
        &self,
        pk: &PartitionKey,
        sk: SortKey,
        value: serde_json::Value,
    ) -> Result<InsertAck> {
        let op_id = OpId::new();
        self.update(pk, &sk, |unit| {
            let op_id = op_id.clone();
            let sk = sk.clone();
            let value = value.clone();
            async move { unit.insert(op_id, sk, value).await }
        })
        .await
    }

    /// Inserts `count` synthetic entities under `pk`.
    ///
    /// A unit that closes mid-batch returns the number it stored; the rest is
    /// sent on to the new write target until every entity is acknowledged.
    /// Returns the number of entities stored.
    pub async fn insert_batch(&self, pk: &PartitionKey, count: u64) -> Result<u64> {
        let mut batch = SyntheticBatch::new(count);
        let sk = SortKey(format!("batch:{}", batch.batch_id));
        let mut stored = 0;

        while batch.count > 0 {
            let chunk = batch.clone();
            let ack = self
                .update(pk, &sk, |unit| {
                    let chunk = chunk.clone();
                    async move { unit.insert_batch(chunk).await }
                })
                .await?;

            if ack.inserted == 0 {
                return Err(StoreError::Internal(format!(
                    "unit accepted no entities of batch {}",
                    batch.batch_id
                )));
            }
            stored += ack.inserted;
            batch = batch.remainder(ack.inserted);

            if let Some(next) = ack.redirect {
                tracing::debug!(
                    "Batch {} continues on {} with {} entities left",
                    batch.batch_id,
                    next,
                    batch.count
                );
                self.refresh(pk).await?;
            }
        }

        Ok(stored)
    }

    /// Sizes of every partition of `pk`.
    pub async fn sizes(&self, pk: &PartitionKey) -> Result<Vec<PartitionOutcome<u64>>> {
        self.query(pk, |unit| async move { unit.size().await }).await
    }

    async fn write_target(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        if !self.config.cache_routes {
            return self.index.resolve_write_target(pk).await;
        }
        if let Some(target) = self.cache.write_target(pk) {
            return Ok(target);
        }

        // Concurrent writers with a cold cache share one lookup, so they all
        // start from the same target.
        let fill = self.cache.fill_lock(pk);
        let _guard = fill.lock().await;
        if let Some(target) = self.cache.write_target(pk) {
            return Ok(target);
        }
        self.refresh(pk)
            .await?
            .last()
            .cloned()
            .ok_or_else(|| StoreError::UnknownPk(pk.clone()))
    }

    async fn refresh(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>> {
        let sequence = self.index.resolve_all_partitions(pk).await?;
        if self.config.cache_routes {
            Ok(self.cache.store(pk, sequence))
        } else {
            Ok(sequence)
        }
    }

    async fn backoff(&self, delay: &mut Duration) {
        let jitter = Duration::from_millis(rand::random::<u64>() % 50);
        tokio::time::sleep(*delay + jitter).await;
        *delay = (*delay * 2).min(MAX_BACKOFF);
    }
}
