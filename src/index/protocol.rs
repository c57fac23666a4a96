//! Index Network Protocol
//!
//! Endpoints and DTOs of the index service. Partition keys travel in the
//! path as single (percent-encoded) segments.

use serde::{Deserialize, Serialize};

use crate::types::{PartitionAddress, PartitionKey};

// --- API Endpoints ---

/// Collection of partition sets. POST creates one, `/:pk` lists its units.
pub const ENDPOINT_PARTITIONS: &str = "/index/partitions";
/// Appends an externally provisioned unit (`/index/partitions/:pk/siblings`).
pub const ENDPOINT_SIBLINGS: &str = "siblings";
/// Provisions and appends a new unit (`/index/partitions/:pk/spawn`).
pub const ENDPOINT_SPAWN: &str = "spawn";
/// Newest unit of a key (`/index/partitions/:pk/target`).
pub const ENDPOINT_TARGET: &str = "target";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePartitionRequest {
    pub pk: PartitionKey,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterSiblingRequest {
    pub address: PartitionAddress,
}

/// A single unit address, returned by create, spawn and target lookups.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: PartitionAddress,
}

/// Every unit of a key in creation order.
#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionsResponse {
    pub pk: PartitionKey,
    pub addresses: Vec<PartitionAddress>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionKeysResponse {
    pub keys: Vec<PartitionKey>,
}
