use crate::types::{PartitionAddress, PartitionKey};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Advisory PK -> partition sequence cache of a routing client.
///
/// Index sequences only grow, so a longer sequence is always the newer one.
/// `store` never swaps a cached sequence for a shorter one, which keeps the
/// write targets handed out by one client monotonic in creation order.
#[derive(Default)]
pub struct RouteCache {
    routes: DashMap<PartitionKey, Vec<PartitionAddress>>,
    fills: DashMap<PartitionKey, Arc<Mutex<()>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pk: &PartitionKey) -> Option<Vec<PartitionAddress>> {
        self.routes.get(pk).map(|entry| entry.value().clone())
    }

    pub fn write_target(&self, pk: &PartitionKey) -> Option<PartitionAddress> {
        self.routes
            .get(pk)
            .and_then(|entry| entry.value().last().cloned())
    }

    /// Caches `sequence` unless a longer one is already known. Returns the
    /// sequence that is cached afterwards.
    pub fn store(&self, pk: &PartitionKey, sequence: Vec<PartitionAddress>) -> Vec<PartitionAddress> {
        let mut entry = self.routes.entry(pk.clone()).or_default();
        if sequence.len() >= entry.len() {
            *entry = sequence;
        } else {
            tracing::debug!(
                "Ignoring stale route for pk {} ({} < {} partitions)",
                pk,
                sequence.len(),
                entry.len()
            );
        }
        entry.value().clone()
    }

    /// Lock serializing cache fills for one key.
    pub fn fill_lock(&self, pk: &PartitionKey) -> Arc<Mutex<()>> {
        self.fills.entry(pk.clone()).or_default().value().clone()
    }

    pub fn invalidate(&self, pk: &PartitionKey) {
        self.routes.remove(pk);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(names: &[&str]) -> Vec<PartitionAddress> {
        names.iter().map(|name| PartitionAddress::from(*name)).collect()
    }

    #[test]
    fn test_store_keeps_longest_sequence() {
        let cache = RouteCache::new();
        let pk = PartitionKey::from("pk");

        cache.store(&pk, addrs(&["a", "b"]));
        let kept = cache.store(&pk, addrs(&["a"]));

        assert_eq!(kept, addrs(&["a", "b"]));
        assert_eq!(cache.write_target(&pk), Some(PartitionAddress::from("b")));
    }

    #[test]
    fn test_invalidate_forgets_route() {
        let cache = RouteCache::new();
        let pk = PartitionKey::from("pk");
        cache.store(&pk, addrs(&["a"]));

        cache.invalidate(&pk);

        assert!(cache.get(&pk).is_none());
        assert!(cache.is_empty());
    }
}
