//! HTTP surface of a node: index and unit endpoints over one [`LocalCluster`].

use super::local::LocalCluster;
use crate::index::handlers::*;
use crate::index::protocol::{ENDPOINT_PARTITIONS, ENDPOINT_SIBLINGS, ENDPOINT_SPAWN, ENDPOINT_TARGET};
use crate::unit::handlers::*;
use crate::unit::protocol::{
    ENDPOINT_BATCH, ENDPOINT_ENTITY, ENDPOINT_INSERT, ENDPOINT_SCAN, ENDPOINT_SIZE,
    ENDPOINT_STATUS,
};

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};

const UNIT_ROOT: &str = "/unit/:address";

pub fn router(cluster: &LocalCluster) -> Router {
    let partition = format!("{}/:pk", ENDPOINT_PARTITIONS);

    Router::new()
        // Index
        .route(
            ENDPOINT_PARTITIONS,
            post(handle_create_partition).get(handle_list_partition_keys),
        )
        .route(&partition, get(handle_resolve_all_partitions))
        .route(
            &format!("{}/{}", partition, ENDPOINT_SIBLINGS),
            post(handle_register_sibling),
        )
        .route(
            &format!("{}/{}", partition, ENDPOINT_SPAWN),
            post(handle_spawn_sibling),
        )
        .route(
            &format!("{}/{}", partition, ENDPOINT_TARGET),
            get(handle_resolve_write_target),
        )
        // Units
        .route(&format!("{}/{}", UNIT_ROOT, ENDPOINT_INSERT), post(handle_insert))
        .route(&format!("{}/{}", UNIT_ROOT, ENDPOINT_BATCH), post(handle_insert_batch))
        .route(&format!("{}/{}", UNIT_ROOT, ENDPOINT_SIZE), get(handle_size))
        .route(&format!("{}/{}", UNIT_ROOT, ENDPOINT_STATUS), get(handle_status))
        .route(
            &format!("{}/{}/:sk", UNIT_ROOT, ENDPOINT_ENTITY),
            get(handle_get_entity).delete(handle_delete_entity),
        )
        .route(&format!("{}/{}", UNIT_ROOT, ENDPOINT_SCAN), get(handle_scan))
        .layer(Extension(cluster.index()))
        .layer(Extension(cluster.directory()))
}

/// Serves `cluster` on `listener` until the server fails.
pub async fn serve(listener: tokio::net::TcpListener, cluster: LocalCluster) -> std::io::Result<()> {
    let app = router(&cluster);
    axum::serve(listener, app).await
}
