//! Cluster Tests
//!
//! End-to-end scenarios: client, index and units wired together, first in one
//! process and then through a node served over HTTP.
//!
//! ## Test Scopes
//! - **Scenarios**: Sequential, batched and concurrent writes under both
//!   redirect policies.
//! - **Directory**: Unit limits and releases.
//! - **HTTP**: The same client logic against a live node.

#[cfg(test)]
mod tests {
    use crate::api::{IndexApi, UnitApi, UnitProvisioner, UnitResolver};
    use crate::client::router::RoutingClient;
    use crate::cluster::http::{HttpUnitResolver, connect};
    use crate::cluster::local::{IndexLink, LocalCluster};
    use crate::cluster::server;
    use crate::config::{RedirectPolicy, RouterConfig, ScalingConfig};
    use crate::error::StoreError;
    use crate::types::{PartitionAddress, PartitionKey, ScanRange, SortKey};
    use futures::future::join_all;
    use serde_json::json;

    async fn sizes(client: &RoutingClient, pk: &PartitionKey) -> Vec<u64> {
        client
            .sizes(pk)
            .await
            .unwrap()
            .into_iter()
            .map(|outcome| outcome.result.unwrap())
            .collect()
    }

    fn sk(i: usize) -> SortKey {
        SortKey(format!("entity-{:03}", i))
    }

    // ============================================================
    // SCENARIO TESTS (in-process)
    // ============================================================

    #[tokio::test]
    async fn test_sequential_inserts_stay_on_first_unit() {
        // ARRANGE
        let cluster = LocalCluster::new(ScalingConfig::new(3));
        let client = cluster.client(RouterConfig::default());
        let pk = PartitionKey::from("pk-multiple-single-inserts");
        client.create_partition(&pk).await.unwrap();

        // ACT
        for i in 0..20 {
            client.insert(&pk, sk(i), json!({ "n": i })).await.unwrap();
        }

        // ASSERT: one sibling pre-provisioned, all data on the first unit
        assert_eq!(sizes(&client, &pk).await, vec![20, 0]);
    }

    #[tokio::test]
    async fn test_single_batch_matches_sequential_inserts() {
        let cluster = LocalCluster::new(ScalingConfig::new(3));
        let client = cluster.client(RouterConfig::default());
        let pk = PartitionKey::from("pk-single-batch");
        client.create_partition(&pk).await.unwrap();

        let stored = client.insert_batch(&pk, 20).await.unwrap();

        assert_eq!(stored, 20);
        assert_eq!(sizes(&client, &pk).await, vec![20, 0]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_use_at_most_two_units() {
        let cluster = LocalCluster::new(ScalingConfig::new(3));
        let pk = PartitionKey::from("pk-concurrent-inserts");
        cluster.index().create_partition(&pk).await.unwrap();

        // Cold cache: every writer has to resolve the key first
        let client = cluster.client(RouterConfig::default());
        let writes = (0..20).map(|i| client.insert(&pk, sk(i), json!(i)));
        let results = join_all(writes).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let sizes = sizes(&client, &pk).await;
        assert!(sizes.len() <= 2, "expected at most 2 units, got {:?}", sizes);
        assert_eq!(sizes.iter().sum::<u64>(), 20);
    }

    #[tokio::test]
    async fn test_concurrent_spawned_writers() {
        let cluster = LocalCluster::new(ScalingConfig::new(3));
        let pk = PartitionKey::from("pk-spawned-writers");
        cluster.index().create_partition(&pk).await.unwrap();
        let client = std::sync::Arc::new(cluster.client(RouterConfig::default()));

        let mut handles = Vec::new();
        for i in 0..20 {
            let client = client.clone();
            let pk = pk.clone();
            handles.push(tokio::spawn(async move {
                client.insert(&pk, sk(i), json!(i)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let sizes = sizes(&client, &pk).await;
        assert!(sizes.len() <= 2, "expected at most 2 units, got {:?}", sizes);
        assert_eq!(sizes.iter().sum::<u64>(), 20);
    }

    #[tokio::test]
    async fn test_immediate_policy_spreads_writes() {
        let scaling = ScalingConfig::new(3).redirect(RedirectPolicy::Immediate);
        let cluster = LocalCluster::new(scaling);
        let client = cluster.client(RouterConfig::default());
        let pk = PartitionKey::from("pk-immediate");
        client.create_partition(&pk).await.unwrap();

        for i in 0..20 {
            client.insert(&pk, sk(i), json!(i)).await.unwrap();
        }

        assert_eq!(sizes(&client, &pk).await, vec![3, 3, 3, 3, 3, 3, 2]);
        // Every full unit is closed, the newest one is still open
        let partitions = client.partitions(&pk).await.unwrap();
        let (newest, full) = partitions.split_last().unwrap();
        for address in full {
            assert!(!cluster.directory().unit(address).unwrap().is_open());
        }
        assert!(cluster.directory().unit(newest).unwrap().is_open());
    }

    #[tokio::test]
    async fn test_partition_keys_scale_independently() {
        let cluster = LocalCluster::new(ScalingConfig::new(3));
        let client = cluster.client(RouterConfig::default());
        let busy = PartitionKey::from("busy");
        let quiet = PartitionKey::from("quiet");
        client.create_partition(&busy).await.unwrap();
        client.create_partition(&quiet).await.unwrap();

        for i in 0..5 {
            client.insert(&busy, sk(i), json!(i)).await.unwrap();
        }
        client.insert(&quiet, sk(0), json!(0)).await.unwrap();

        assert_eq!(sizes(&client, &busy).await, vec![5, 0]);
        assert_eq!(sizes(&client, &quiet).await, vec![1]);
        assert_eq!(cluster.directory().len(), 3);
    }

    // ============================================================
    // DIRECTORY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_directory_limit_and_release() {
        let cluster = LocalCluster::new(ScalingConfig::new(3));
        let directory = cluster.directory();
        let pk = PartitionKey::from("pk");
        directory.set_unit_limit(Some(1));

        let first = directory.provision(&pk).await.unwrap();
        let err = directory.provision(&pk).await.unwrap_err();
        assert!(matches!(err, StoreError::ProvisioningFailed(_)));

        directory.release(&first).await.unwrap();
        assert!(directory.is_empty());
        directory.provision(&pk).await.unwrap();

        let ghost = PartitionAddress::from("ghost");
        assert_eq!(
            directory.release(&ghost).await.unwrap_err(),
            StoreError::UnknownPartition(ghost)
        );
    }

    #[tokio::test]
    async fn test_unbound_index_link_is_unreachable() {
        let link = IndexLink::new();

        let err = link
            .resolve_write_target(&PartitionKey::from("pk"))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }

    // ============================================================
    // HTTP TESTS
    // ============================================================

    async fn spawn_node(scaling: ScalingConfig) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cluster = LocalCluster::new(scaling);
        tokio::spawn(server::serve(listener, cluster));
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_sequential_inserts() {
        let url = spawn_node(ScalingConfig::new(3)).await;
        let client = connect(&url, RouterConfig::default()).unwrap();
        let pk = PartitionKey::from("pk over/http");

        client.create_partition(&pk).await.unwrap();
        for i in 0..6 {
            client.insert(&pk, sk(i), json!(i)).await.unwrap();
        }

        assert_eq!(sizes(&client, &pk).await, vec![6, 0]);
    }

    #[tokio::test]
    async fn test_http_batch_with_immediate_redirect() {
        let url = spawn_node(ScalingConfig::new(3).redirect(RedirectPolicy::Immediate)).await;
        let client = connect(&url, RouterConfig::default()).unwrap();
        let pk = PartitionKey::from("pk-http-batch");
        client.create_partition(&pk).await.unwrap();

        let stored = client.insert_batch(&pk, 20).await.unwrap();

        assert_eq!(stored, 20);
        assert_eq!(sizes(&client, &pk).await, vec![3, 3, 3, 3, 3, 3, 2]);
    }

    #[tokio::test]
    async fn test_http_errors_keep_their_kind() {
        let url = spawn_node(ScalingConfig::new(3)).await;
        let client = connect(&url, RouterConfig::default()).unwrap();
        let pk = PartitionKey::from("pk");
        let missing = PartitionKey::from("missing");

        client.create_partition(&pk).await.unwrap();
        let err = client.create_partition(&pk).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists("pk".to_string()));

        let err = client.insert(&missing, sk(0), json!(0)).await.unwrap_err();
        assert_eq!(err, StoreError::UnknownPk(missing));
    }

    #[tokio::test]
    async fn test_http_reads() {
        let url = spawn_node(ScalingConfig::new(100)).await;
        let client = connect(&url, RouterConfig::default()).unwrap();
        let pk = PartitionKey::from("pk");
        client.create_partition(&pk).await.unwrap();
        for i in 0..4 {
            client.insert(&pk, sk(i), json!({ "n": i })).await.unwrap();
        }

        // Point reads: present and missing
        let present = sk(2);
        let hits = client
            .query(&pk, |unit| {
                let present = present.clone();
                async move { unit.get(&present).await }
            })
            .await
            .unwrap();
        assert_eq!(hits[0].value(), Some(&Some(json!({ "n": 2 }))));

        let absent = sk(99);
        let misses = client
            .query(&pk, |unit| {
                let absent = absent.clone();
                async move { unit.get(&absent).await }
            })
            .await
            .unwrap();
        assert_eq!(misses[0].value(), Some(&None));

        // Bounded scan
        let range = ScanRange {
            start: Some(sk(1)),
            end: None,
            limit: Some(2),
        };
        let scans = client
            .query(&pk, |unit| {
                let range = range.clone();
                async move { unit.scan(range).await }
            })
            .await
            .unwrap();
        let entities = scans[0].value().unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].sk, sk(1));
        assert_eq!(entities[1].sk, sk(2));
    }

    #[tokio::test]
    async fn test_http_get_tells_missing_key_from_missing_route() {
        let url = spawn_node(ScalingConfig::new(100)).await;
        let client = connect(&url, RouterConfig::default()).unwrap();
        let pk = PartitionKey::from("pk");
        let address = client.create_partition(&pk).await.unwrap();

        // Missing key on a live unit
        let unit = HttpUnitResolver::new(&url).unwrap().resolve(&address).unwrap();
        assert_eq!(unit.get(&sk(7)).await.unwrap(), None);

        // Missing unit
        let ghost = PartitionAddress::from("ghost");
        let missing = HttpUnitResolver::new(&url).unwrap().resolve(&ghost).unwrap();
        assert_eq!(
            missing.get(&sk(7)).await.unwrap_err(),
            StoreError::UnknownPartition(ghost)
        );

        // Route the node does not serve
        let misrouted = HttpUnitResolver::new(&format!("{}/v0", url))
            .unwrap()
            .resolve(&address)
            .unwrap();
        let err = misrouted.get(&sk(7)).await.unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)), "got {:?}", err);
    }
}
