use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{
    AddressResponse, CreatePartitionRequest, PartitionKeysResponse, PartitionsResponse,
    RegisterSiblingRequest,
};
use super::service::IndexService;
use crate::protocol::{AckResponse, ApiReply, api_error};
use crate::types::PartitionKey;

pub async fn handle_create_partition(
    Extension(index): Extension<Arc<IndexService>>,
    Json(req): Json<CreatePartitionRequest>,
) -> ApiReply<AddressResponse> {
    match index.create_partition(&req.pk).await {
        Ok(address) => Ok((StatusCode::CREATED, Json(AddressResponse { address }))),
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_register_sibling(
    Extension(index): Extension<Arc<IndexService>>,
    Path(pk): Path<String>,
    Json(req): Json<RegisterSiblingRequest>,
) -> ApiReply<AckResponse> {
    match index.register_sibling(&PartitionKey(pk), req.address) {
        Ok(()) => Ok((StatusCode::OK, Json(AckResponse { success: true }))),
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_spawn_sibling(
    Extension(index): Extension<Arc<IndexService>>,
    Path(pk): Path<String>,
) -> ApiReply<AddressResponse> {
    match index.spawn_sibling(&PartitionKey(pk)).await {
        Ok(address) => Ok((StatusCode::CREATED, Json(AddressResponse { address }))),
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_resolve_write_target(
    Extension(index): Extension<Arc<IndexService>>,
    Path(pk): Path<String>,
) -> ApiReply<AddressResponse> {
    match index.resolve_write_target(&PartitionKey(pk)) {
        Ok(address) => Ok((StatusCode::OK, Json(AddressResponse { address }))),
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_resolve_all_partitions(
    Extension(index): Extension<Arc<IndexService>>,
    Path(pk): Path<String>,
) -> ApiReply<PartitionsResponse> {
    let pk = PartitionKey(pk);
    match index.resolve_all_partitions(&pk) {
        Ok(addresses) => Ok((StatusCode::OK, Json(PartitionsResponse { pk, addresses }))),
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_list_partition_keys(
    Extension(index): Extension<Arc<IndexService>>,
) -> (StatusCode, Json<PartitionKeysResponse>) {
    let keys = index.partition_keys();
    (StatusCode::OK, Json(PartitionKeysResponse { keys }))
}
