use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical shard group. Any number of storage units may serve one key over time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(pub String);

/// Identifies an entity inside a single storage unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortKey(pub String);

/// Opaque, location-transparent handle of a storage unit.
///
/// Addresses are resolved to a concrete unit by a directory (`UnitResolver`),
/// never interpreted as network endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionAddress(pub String);

impl PartitionAddress {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PartitionAddress {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique operation id (UUID) of a write, used to deduplicate retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OpId(pub String);

impl OpId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! string_newtype {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(PartitionKey);
string_newtype!(SortKey);
string_newtype!(PartitionAddress);
string_newtype!(OpId);

/// A stored (sort key, value) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub sk: SortKey,
    pub value: serde_json::Value,
}

/// Acknowledgment of a single insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsertAck {
    /// Unit size after the insert.
    pub size: u64,
    /// `true` when the sort key already existed and its value was replaced.
    pub replaced: bool,
    /// Set when this insert triggered the creation of a sibling unit.
    pub sibling: Option<PartitionAddress>,
}

/// A run of synthetic entities inserted with one call.
///
/// Entity `i` of the run gets sort key `{batch_id}-{start + i}` (zero padded)
/// and the index as its value, so a run continued on a sibling never collides
/// with the part already stored.
///
/// `op_id` identifies this one delivery of the run. Resending the same run
/// after a lost reply reuses it; a remainder gets a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyntheticBatch {
    pub batch_id: String,
    pub start: u64,
    pub count: u64,
    #[serde(default)]
    pub op_id: OpId,
}

impl SyntheticBatch {
    pub fn new(count: u64) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            start: 0,
            count,
            op_id: OpId::new(),
        }
    }

    pub fn entity(&self, offset: u64) -> Entity {
        let index = self.start + offset;
        Entity {
            sk: SortKey(format!("{}-{:010}", self.batch_id, index)),
            value: serde_json::Value::from(index),
        }
    }

    /// The part of this run that was not stored yet.
    pub fn remainder(&self, inserted: u64) -> Self {
        Self {
            batch_id: self.batch_id.clone(),
            start: self.start + inserted,
            count: self.count.saturating_sub(inserted),
            op_id: OpId::new(),
        }
    }
}

/// Outcome of a batch insert on one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchAck {
    /// Entities of the batch stored by this unit.
    pub inserted: u64,
    /// Unit size after the batch.
    pub size: u64,
    /// Set when the unit closed mid-batch; the remainder belongs there.
    pub redirect: Option<PartitionAddress>,
}

/// Bounds of an ordered scan over sort keys. `start` is inclusive, `end`
/// exclusive; missing bounds are open.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanRange {
    pub start: Option<SortKey>,
    pub end: Option<SortKey>,
    pub limit: Option<usize>,
}

/// Point-in-time view of a storage unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitStatus {
    pub address: PartitionAddress,
    pub pk: PartitionKey,
    pub size: u64,
    pub threshold: u64,
    /// Accepts inserts.
    pub open: bool,
    /// A sibling has been created for this unit.
    pub scaled: bool,
}
