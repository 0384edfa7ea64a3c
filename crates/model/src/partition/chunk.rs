use crate::{
    core::identifiers::{ChunkId, NodeName},
    partition::point::Point,
};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ChunkStatus: u32 {
        const COMPRESSED = 0b0001;
        /// Rows were inserted after compression, so the compressed data is no
        /// longer ordered.
        const UNORDERED = 0b0010;
    }
}

/// Half-open range `[start, end)` of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionSlice {
    pub start: i64,
    pub end: i64,
}

impl DimensionSlice {
    pub fn contains(&self, coordinate: i64) -> bool {
        coordinate >= self.start && coordinate < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub slices: Vec<DimensionSlice>,
    pub data_nodes: Vec<NodeName>,
    pub status: ChunkStatus,
}

impl Chunk {
    pub fn is_compressed(&self) -> bool {
        self.status.contains(ChunkStatus::COMPRESSED)
    }

    pub fn is_unordered(&self) -> bool {
        self.status.contains(ChunkStatus::UNORDERED)
    }

    pub fn contains(&self, point: &Point) -> bool {
        self.slices.len() == point.num_coords()
            && self
                .slices
                .iter()
                .zip(point.coordinates())
                .all(|(slice, coord)| slice.contains(*coord))
    }
}
