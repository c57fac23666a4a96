//! Storage Unit Network Protocol
//!
//! Endpoints and Data Transfer Objects (DTOs) for talking to a storage unit
//! by address. Every path starts with `/unit/:address`.
//!
//! Results that already are plain data (`InsertAck`, `BatchAck`,
//! `UnitStatus`) travel as is; the types below only wrap the rest.

use serde::{Deserialize, Serialize};

use crate::types::{Entity, OpId, SortKey};

// --- API Endpoints (relative to `/unit/:address`) ---

/// Single entity insert.
pub const ENDPOINT_INSERT: &str = "insert";
/// Synthetic batch insert.
pub const ENDPOINT_BATCH: &str = "batch";
/// Current entity count.
pub const ENDPOINT_SIZE: &str = "size";
/// Unit status (size, threshold, open/scaled flags).
pub const ENDPOINT_STATUS: &str = "status";
/// Point read and delete, followed by `/:sk`.
pub const ENDPOINT_ENTITY: &str = "entity";
/// Ordered scan.
pub const ENDPOINT_SCAN: &str = "scan";

// --- Data Transfer Objects ---

/// Single insert. A missing `op_id` gets a fresh one, which disables
/// deduplication for that request.
#[derive(Debug, Serialize, Deserialize)]
pub struct InsertRequest {
    #[serde(default)]
    pub op_id: OpId,
    pub sk: SortKey,
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SizeResponse {
    pub size: u64,
}

/// Point read or delete result. `None` means the key was not there.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntityResponse {
    pub value: Option<serde_json::Value>,
}

/// Query string of a scan. Bounds are raw sort keys.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScanParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub entities: Vec<Entity>,
}
