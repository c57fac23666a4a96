use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use std::sync::Arc;

use super::protocol::{EntityResponse, InsertRequest, ScanParams, ScanResponse, SizeResponse};
use super::storage::StorageUnit;
use crate::cluster::local::UnitDirectory;
use crate::error::StoreError;
use crate::protocol::{ApiError, ApiReply, api_error};
use crate::types::{BatchAck, InsertAck, PartitionAddress, ScanRange, SortKey, SyntheticBatch, UnitStatus};

fn lookup(directory: &UnitDirectory, address: String) -> Result<Arc<StorageUnit>, ApiError> {
    let address = PartitionAddress(address);
    directory
        .unit(&address)
        .ok_or_else(|| api_error(StoreError::UnknownPartition(address)))
}

pub async fn handle_insert(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path(address): Path<String>,
    Json(req): Json<InsertRequest>,
) -> ApiReply<InsertAck> {
    let unit = lookup(&directory, address)?;

    match unit.insert_with_op(req.op_id, req.sk, req.value).await {
        Ok(ack) => Ok((StatusCode::OK, Json(ack))),
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_insert_batch(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path(address): Path<String>,
    Json(batch): Json<SyntheticBatch>,
) -> ApiReply<BatchAck> {
    let unit = lookup(&directory, address)?;

    match unit.insert_batch(batch).await {
        Ok(ack) => {
            tracing::info!(
                "Unit {} stored {} batch entities (size now {})",
                unit.address(),
                ack.inserted,
                ack.size
            );
            Ok((StatusCode::OK, Json(ack)))
        }
        Err(e) => Err(api_error(e)),
    }
}

pub async fn handle_size(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path(address): Path<String>,
) -> ApiReply<SizeResponse> {
    let unit = lookup(&directory, address)?;
    Ok((StatusCode::OK, Json(SizeResponse { size: unit.len() })))
}

pub async fn handle_status(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path(address): Path<String>,
) -> ApiReply<UnitStatus> {
    let unit = lookup(&directory, address)?;
    Ok((StatusCode::OK, Json(unit.status())))
}

pub async fn handle_get_entity(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path((address, sk)): Path<(String, String)>,
) -> ApiReply<EntityResponse> {
    let unit = lookup(&directory, address)?;

    match unit.get(&SortKey(sk)).await {
        Some(value) => Ok((StatusCode::OK, Json(EntityResponse { value: Some(value) }))),
        None => Ok((StatusCode::NOT_FOUND, Json(EntityResponse { value: None }))),
    }
}

pub async fn handle_delete_entity(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path((address, sk)): Path<(String, String)>,
) -> ApiReply<EntityResponse> {
    let unit = lookup(&directory, address)?;
    let removed = unit.delete(&SortKey(sk)).await;
    Ok((StatusCode::OK, Json(EntityResponse { value: removed })))
}

pub async fn handle_scan(
    Extension(directory): Extension<Arc<UnitDirectory>>,
    Path(address): Path<String>,
    Query(params): Query<ScanParams>,
) -> ApiReply<ScanResponse> {
    let unit = lookup(&directory, address)?;
    let range = ScanRange {
        start: params.start.map(SortKey),
        end: params.end.map(SortKey),
        limit: params.limit,
    };

    let entities = unit.scan(&range).await;
    Ok((StatusCode::OK, Json(ScanResponse { entities })))
}
