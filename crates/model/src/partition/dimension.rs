use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Open dimensions are time-like and unbounded; closed dimensions are
/// hash-partitioned into a fixed number of slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    Open,
    Closed,
}

/// Partitioning transform applied to a column value before it becomes a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitioningFunc {
    /// 31-bit hash of the value's text form.
    Hash,
}

impl PartitioningFunc {
    pub fn apply(&self, value: &Value) -> i32 {
        match self {
            PartitioningFunc::Hash => {
                let text = value.to_string();
                (xxh3_64(text.as_bytes()) & 0x7fff_ffff) as i32
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub column: String,
    pub kind: DimensionKind,
    #[serde(default)]
    pub partitioning: Option<PartitioningFunc>,
    /// Slice width of an open dimension, in normalized time units.
    #[serde(default)]
    pub interval: Option<i64>,
    /// Number of slices of a closed dimension.
    #[serde(default)]
    pub partitions: Option<u16>,
}

impl Dimension {
    pub fn open(column: &str, interval: i64) -> Self {
        Self {
            column: column.to_string(),
            kind: DimensionKind::Open,
            partitioning: None,
            interval: Some(interval),
            partitions: None,
        }
    }

    pub fn closed(column: &str, partitions: u16) -> Self {
        Self {
            column: column.to_string(),
            kind: DimensionKind::Closed,
            partitioning: Some(PartitioningFunc::Hash),
            interval: None,
            partitions: Some(partitions),
        }
    }

    pub fn is_open(&self) -> bool {
        self.kind == DimensionKind::Open
    }
}
