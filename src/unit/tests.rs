//! Storage Unit Tests
//!
//! Exercises a single unit wired into an in-process cluster.
//!
//! ## Test Scopes
//! - **Insert / Size**: Counting, replacement of existing sort keys.
//! - **Scaling**: Threshold crossing, one sibling per unit, failed scale-outs.
//! - **Redirect Policies**: Deferred units stay open, immediate units close.
//! - **Deduplication**: Resent op ids are answered, not applied again.
//! - **Reads**: Get, delete and ordered scans.

#[cfg(test)]
mod tests {
    use crate::cluster::local::LocalCluster;
    use crate::config::{RedirectPolicy, ScalingConfig};
    use crate::error::StoreError;
    use crate::types::{OpId, PartitionKey, ScanRange, SortKey, SyntheticBatch};
    use crate::unit::storage::StorageUnit;
    use serde_json::json;
    use std::sync::Arc;

    async fn cluster_with_unit(
        scaling: ScalingConfig,
        pk: &str,
    ) -> (LocalCluster, Arc<StorageUnit>) {
        let cluster = LocalCluster::new(scaling);
        let address = cluster
            .index()
            .create_partition(&PartitionKey::from(pk))
            .await
            .unwrap();
        let unit = cluster.directory().unit(&address).unwrap();
        (cluster, unit)
    }

    fn sk(i: usize) -> SortKey {
        SortKey(format!("sk-{:03}", i))
    }

    // ============================================================
    // INSERT / SIZE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_insert_grows_size() {
        let (_cluster, unit) = cluster_with_unit(ScalingConfig::new(100), "pk").await;

        for i in 0..5 {
            let ack = unit.insert(sk(i), json!(i)).await.unwrap();
            assert_eq!(ack.size, i as u64 + 1);
            assert!(!ack.replaced);
        }

        assert_eq!(unit.len(), 5);
        assert_eq!(unit.pk(), &PartitionKey::from("pk"));
    }

    #[tokio::test]
    async fn test_replacing_a_sort_key_keeps_size() {
        let (_cluster, unit) = cluster_with_unit(ScalingConfig::new(100), "pk").await;

        unit.insert(sk(1), json!("first")).await.unwrap();
        let ack = unit.insert(sk(1), json!("second")).await.unwrap();

        assert!(ack.replaced);
        assert_eq!(ack.size, 1);
        assert_eq!(unit.get(&sk(1)).await, Some(json!("second")));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let (cluster, unit) = cluster_with_unit(ScalingConfig::new(1), "pk").await;

        let ack = unit.insert_batch(SyntheticBatch::new(0)).await.unwrap();

        assert_eq!(ack.inserted, 0);
        assert_eq!(ack.size, 0);
        assert!(!unit.is_scaled());
        assert_eq!(cluster.index().partition_count(&PartitionKey::from("pk")), 1);
    }

    // ============================================================
    // SCALING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_unit_scales_once_at_threshold() {
        let (cluster, unit) = cluster_with_unit(ScalingConfig::new(3), "pk").await;
        let pk = PartitionKey::from("pk");

        let first = unit.insert(sk(0), json!(0)).await.unwrap();
        let second = unit.insert(sk(1), json!(1)).await.unwrap();
        assert!(first.sibling.is_none() && second.sibling.is_none());
        assert_eq!(cluster.index().partition_count(&pk), 1);

        // Size reaches the threshold here
        let third = unit.insert(sk(2), json!(2)).await.unwrap();
        assert!(third.sibling.is_some());
        assert!(unit.is_scaled());
        assert_eq!(cluster.index().partition_count(&pk), 2);

        // Deferred: still open, but never scales again
        for i in 3..10 {
            let ack = unit.insert(sk(i), json!(i)).await.unwrap();
            assert!(ack.sibling.is_none());
        }
        assert!(unit.is_open());
        assert_eq!(unit.len(), 10);
        assert_eq!(cluster.index().partition_count(&pk), 2);

        let partitions = cluster.index().resolve_all_partitions(&pk).unwrap();
        assert_eq!(partitions[0], *unit.address());
        assert_eq!(Some(&partitions[1]), third.sibling.as_ref());
    }

    #[tokio::test]
    async fn test_replacement_does_not_trigger_scaling() {
        let (cluster, unit) = cluster_with_unit(ScalingConfig::new(2), "pk").await;

        unit.insert(sk(0), json!(0)).await.unwrap();
        for _ in 0..5 {
            unit.insert(sk(0), json!("again")).await.unwrap();
        }

        assert!(!unit.is_scaled());
        assert_eq!(cluster.index().partition_count(&PartitionKey::from("pk")), 1);
    }

    #[tokio::test]
    async fn test_failed_scale_out_keeps_unit_open_and_retries() {
        let scaling = ScalingConfig::new(2).redirect(RedirectPolicy::Immediate);
        let (cluster, unit) = cluster_with_unit(scaling, "pk").await;
        let pk = PartitionKey::from("pk");

        // ARRANGE: no room for a second unit
        cluster.directory().set_unit_limit(Some(1));

        // ACT
        unit.insert(sk(0), json!(0)).await.unwrap();
        let ack = unit.insert(sk(1), json!(1)).await.unwrap();

        // ASSERT: the write landed, the unit did not scale or close
        assert_eq!(ack.size, 2);
        assert!(ack.sibling.is_none());
        assert!(unit.is_open());
        assert!(!unit.is_scaled());
        assert_eq!(cluster.index().partition_count(&pk), 1);

        // Capacity comes back: the next growing insert scales
        cluster.directory().set_unit_limit(None);
        let ack = unit.insert(sk(2), json!(2)).await.unwrap();

        assert!(ack.sibling.is_some());
        assert!(!unit.is_open());
        assert_eq!(cluster.index().partition_count(&pk), 2);
    }

    // ============================================================
    // REDIRECT POLICY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_immediate_unit_rejects_writes_after_scaling() {
        let scaling = ScalingConfig::new(2).redirect(RedirectPolicy::Immediate);
        let (_cluster, unit) = cluster_with_unit(scaling, "pk").await;

        unit.insert(sk(0), json!(0)).await.unwrap();
        unit.insert(sk(1), json!(1)).await.unwrap();

        let err = unit.insert(sk(2), json!(2)).await.unwrap_err();
        assert_eq!(err, StoreError::AtCapacity(unit.address().clone()));

        let err = unit.insert_batch(SyntheticBatch::new(4)).await.unwrap_err();
        assert!(matches!(err, StoreError::AtCapacity(_)));
        assert_eq!(unit.len(), 2);

        // Reads and deletes keep working
        assert_eq!(unit.get(&sk(0)).await, Some(json!(0)));
        assert_eq!(unit.delete(&sk(0)).await, Some(json!(0)));
        assert_eq!(unit.len(), 1);
        assert!(unit.is_scaled());
    }

    #[tokio::test]
    async fn test_immediate_batch_stops_at_trigger_entity() {
        let scaling = ScalingConfig::new(3).redirect(RedirectPolicy::Immediate);
        let (cluster, unit) = cluster_with_unit(scaling, "pk").await;

        let ack = unit.insert_batch(SyntheticBatch::new(20)).await.unwrap();

        assert_eq!(ack.inserted, 3);
        assert_eq!(ack.size, 3);
        let sibling = ack.redirect.expect("batch should be redirected");
        assert_eq!(
            cluster.index().resolve_write_target(&PartitionKey::from("pk")).unwrap(),
            sibling
        );
    }

    #[tokio::test]
    async fn test_deferred_batch_matches_sequential_inserts() {
        // ARRANGE
        let (seq_cluster, sequential) = cluster_with_unit(ScalingConfig::new(3), "seq").await;
        let (batch_cluster, batched) = cluster_with_unit(ScalingConfig::new(3), "batch").await;
        let batch = SyntheticBatch::new(20);

        // ACT
        for offset in 0..batch.count {
            let entity = batch.entity(offset);
            sequential.insert(entity.sk, entity.value).await.unwrap();
        }
        let ack = batched.insert_batch(batch).await.unwrap();

        // ASSERT
        assert_eq!(ack.inserted, 20);
        assert!(ack.redirect.is_none());
        assert_eq!(sequential.len(), batched.len());
        assert_eq!(sequential.status().scaled, batched.status().scaled);
        assert_eq!(
            seq_cluster.index().partition_count(&PartitionKey::from("seq")),
            batch_cluster.index().partition_count(&PartitionKey::from("batch")),
        );
    }

    #[tokio::test]
    async fn test_batch_remainder_does_not_collide() {
        let (_cluster, unit) = cluster_with_unit(ScalingConfig::new(100), "pk").await;
        let batch = SyntheticBatch::new(6);

        let first = unit.insert_batch(batch.remainder(4)).await.unwrap();
        let second = unit
            .insert_batch(SyntheticBatch { count: 4, ..batch.clone() })
            .await
            .unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 4);
        assert_eq!(unit.len(), 6);
    }

    // ============================================================
    // DEDUPLICATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_resent_insert_is_answered_by_closed_unit() {
        let scaling = ScalingConfig::new(1).redirect(RedirectPolicy::Immediate);
        let (cluster, unit) = cluster_with_unit(scaling, "pk").await;
        let op_id = OpId::new();

        // ARRANGE: the first delivery stores, scales and closes the unit
        let first = unit.insert_with_op(op_id.clone(), sk(0), json!(0)).await.unwrap();
        assert!(!unit.is_open());

        // ACT
        let resent = unit.insert_with_op(op_id, sk(0), json!(0)).await.unwrap();

        // ASSERT: same ack, nothing stored again, no second sibling
        assert_eq!(resent, first);
        assert_eq!(unit.len(), 1);
        assert_eq!(cluster.index().partition_count(&PartitionKey::from("pk")), 2);

        // A new op still meets the closed unit
        let err = unit.insert_with_op(OpId::new(), sk(1), json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::AtCapacity(_)));
    }

    #[tokio::test]
    async fn test_resent_batch_is_answered_once() {
        let scaling = ScalingConfig::new(3).redirect(RedirectPolicy::Immediate);
        let (_cluster, unit) = cluster_with_unit(scaling, "pk").await;
        let batch = SyntheticBatch::new(20);

        let first = unit.insert_batch(batch.clone()).await.unwrap();
        let resent = unit.insert_batch(batch.clone()).await.unwrap();

        assert_eq!(first.inserted, 3);
        assert_eq!(resent, first);
        assert_eq!(unit.len(), 3);

        // The remainder is a new delivery and the unit is closed for it
        let err = unit.insert_batch(batch.remainder(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::AtCapacity(_)));
    }

    #[tokio::test]
    async fn test_op_id_cannot_switch_write_kind() {
        let (_cluster, unit) = cluster_with_unit(ScalingConfig::new(100), "pk").await;
        let batch = SyntheticBatch::new(2);

        unit.insert_batch(batch.clone()).await.unwrap();
        let err = unit
            .insert_with_op(batch.op_id.clone(), sk(0), json!(0))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Internal(_)));
        assert_eq!(unit.len(), 2);
    }

    // ============================================================
    // READ TESTS
    // ============================================================

    #[tokio::test]
    async fn test_scan_is_ordered_and_bounded() {
        let (_cluster, unit) = cluster_with_unit(ScalingConfig::new(100), "pk").await;
        for i in [4, 1, 3, 0, 2] {
            unit.insert(sk(i), json!(i)).await.unwrap();
        }

        let all = unit.scan(&ScanRange::default()).await;
        let keys: Vec<SortKey> = all.iter().map(|e| e.sk.clone()).collect();
        assert_eq!(keys, (0..5).map(sk).collect::<Vec<_>>());

        let range = ScanRange {
            start: Some(sk(1)),
            end: Some(sk(4)),
            limit: Some(2),
        };
        let window = unit.scan(&range).await;
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].sk, sk(1));
        assert_eq!(window[1].value, json!(2));

        let inverted = ScanRange {
            start: Some(sk(4)),
            end: Some(sk(1)),
            limit: None,
        };
        assert!(unit.scan(&inverted).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_reflects_latch() {
        let scaling = ScalingConfig::new(1).redirect(RedirectPolicy::Immediate);
        let (_cluster, unit) = cluster_with_unit(scaling, "pk").await;

        let before = unit.status();
        assert!(before.open && !before.scaled);
        assert_eq!(before.threshold, 1);

        unit.insert(sk(0), json!(0)).await.unwrap();

        let after = unit.status();
        assert_eq!(after.size, 1);
        assert!(!after.open);
        assert!(after.scaled);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (_cluster, unit) = cluster_with_unit(ScalingConfig::default(), "pk").await;
        assert!(unit.get(&sk(9)).await.is_none());
        assert!(unit.delete(&sk(9)).await.is_none());
        assert!(unit.is_empty());
    }
}
