//! Error taxonomy shared by the index, the storage units and the routing client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PartitionAddress, PartitionKey};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The index has no entry for this partition key.
    #[error("unknown partition key: {0}")]
    UnknownPk(PartitionKey),

    /// A partition set (or a sibling address) is already registered.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Write attempted against a unit that is closed for writes.
    #[error("partition {0} is at capacity")]
    AtCapacity(PartitionAddress),

    /// Transport-level failure or timeout talking to a partition or the index.
    #[error("partition unreachable: {0}")]
    PartitionUnreachable(String),

    /// Write dispatched to a unit that no longer is the write target.
    #[error("stale write target {0}")]
    StaleTarget(PartitionAddress),

    /// The directory cannot resolve this address to a unit.
    #[error("unknown partition address: {0}")]
    UnknownPartition(PartitionAddress),

    /// A new storage unit could not be allocated.
    #[error("provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Transport failures may succeed if the same call is simply repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::PartitionUnreachable(_))
    }

    /// The caller routed to the wrong unit and has to resolve the PK again.
    pub fn needs_reroute(&self) -> bool {
        matches!(self, StoreError::AtCapacity(_) | StoreError::StaleTarget(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::UnknownPk(_) => ErrorKind::UnknownPk,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::AtCapacity(_) => ErrorKind::AtCapacity,
            StoreError::PartitionUnreachable(_) => ErrorKind::PartitionUnreachable,
            StoreError::StaleTarget(_) => ErrorKind::StaleTarget,
            StoreError::UnknownPartition(_) => ErrorKind::UnknownPartition,
            StoreError::ProvisioningFailed(_) => ErrorKind::ProvisioningFailed,
            StoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuilds a typed error from the `kind` and `subject` carried over the wire.
    pub fn from_kind(kind: ErrorKind, subject: String) -> Self {
        match kind {
            ErrorKind::UnknownPk => StoreError::UnknownPk(PartitionKey(subject)),
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(subject),
            ErrorKind::AtCapacity => StoreError::AtCapacity(PartitionAddress(subject)),
            ErrorKind::PartitionUnreachable => StoreError::PartitionUnreachable(subject),
            ErrorKind::StaleTarget => StoreError::StaleTarget(PartitionAddress(subject)),
            ErrorKind::UnknownPartition => StoreError::UnknownPartition(PartitionAddress(subject)),
            ErrorKind::ProvisioningFailed => StoreError::ProvisioningFailed(subject),
            ErrorKind::Internal => StoreError::Internal(subject),
        }
    }

    /// The payload of the variant, without the display prefix.
    pub fn subject(&self) -> String {
        match self {
            StoreError::UnknownPk(pk) => pk.0.clone(),
            StoreError::AtCapacity(addr)
            | StoreError::StaleTarget(addr)
            | StoreError::UnknownPartition(addr) => addr.0.clone(),
            StoreError::AlreadyExists(msg)
            | StoreError::PartitionUnreachable(msg)
            | StoreError::ProvisioningFailed(msg)
            | StoreError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Internal(err.to_string())
        } else {
            StoreError::PartitionUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Internal(err.to_string())
    }
}

/// Wire tag for [`StoreError`] variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownPk,
    AlreadyExists,
    AtCapacity,
    PartitionUnreachable,
    StaleTarget,
    UnknownPartition,
    ProvisioningFailed,
    Internal,
}
