//! Shared HTTP protocol pieces
//!
//! Error payload and status code mapping used by both the index and the unit
//! endpoints, so a remote client can rebuild the typed [`StoreError`].

use axum::Json;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, StoreError};

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    /// Variant payload (partition key, address or message).
    pub subject: String,
    /// Human readable rendering of the error.
    pub message: String,
}

impl From<&StoreError> for ErrorResponse {
    fn from(err: &StoreError) -> Self {
        Self {
            kind: err.kind(),
            subject: err.subject(),
            message: err.to_string(),
        }
    }
}

impl From<ErrorResponse> for StoreError {
    fn from(resp: ErrorResponse) -> Self {
        StoreError::from_kind(resp.kind, resp.subject)
    }
}

/// Plain acknowledgment for operations without a result.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler return type: a status with a JSON body either way.
pub type ApiReply<T> = Result<(StatusCode, Json<T>), ApiError>;

pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::UnknownPk(_) | StoreError::UnknownPartition(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::AtCapacity(_) | StoreError::StaleTarget(_) => StatusCode::LOCKED,
        StoreError::PartitionUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::ProvisioningFailed(_) => StatusCode::INSUFFICIENT_STORAGE,
        StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error(err: StoreError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected: {}", err);
    }
    (status, Json(ErrorResponse::from(&err)))
}
