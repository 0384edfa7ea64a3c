use crate::{error::IndexError, partition::PartitionIndex};
use async_trait::async_trait;
use model::{
    core::identifiers::{ChunkId, NodeName},
    partition::{Chunk, ChunkStatus, Dimension, DimensionKind, DimensionSlice, Point},
};
use tokio::sync::RwLock;
use tracing::info;

/// Default slice width of an open dimension: one day in microseconds.
pub const DEFAULT_OPEN_INTERVAL: i64 = 86_400_000_000;

/// Chunk catalog kept in process memory.
///
/// Open dimensions are sliced into fixed intervals aligned to zero. Closed
/// dimensions split `[0, 2^31)` into equal ranges, with the first and last
/// slices extended to cover every coordinate. New chunks are placed on
/// `replication_factor` consecutive data nodes starting round-robin from the
/// chunk id.
pub struct InMemoryPartitionIndex {
    dimensions: Vec<Dimension>,
    data_nodes: Vec<NodeName>,
    replication_factor: usize,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryPartitionIndex {
    pub fn new(
        dimensions: Vec<Dimension>,
        data_nodes: Vec<NodeName>,
        replication_factor: usize,
    ) -> Self {
        Self {
            dimensions,
            data_nodes,
            replication_factor: replication_factor.max(1),
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub async fn chunks(&self) -> Vec<Chunk> {
        self.chunks.read().await.clone()
    }

    /// Marks a chunk compressed, as a background compression job would.
    pub async fn compress_chunk(&self, id: ChunkId) -> Result<(), IndexError> {
        let mut chunks = self.chunks.write().await;
        let chunk = chunks
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(IndexError::ChunkNotFound(id))?;
        chunk.status.insert(ChunkStatus::COMPRESSED);
        Ok(())
    }

    fn check_point(&self, point: &Point) -> Result<(), IndexError> {
        if point.num_coords() != self.dimensions.len() {
            return Err(IndexError::DimensionMismatch {
                point: point.clone(),
                expected: self.dimensions.len(),
                actual: point.num_coords(),
            });
        }
        Ok(())
    }

    fn slice_for(dimension: &Dimension, coordinate: i64) -> DimensionSlice {
        match dimension.kind {
            DimensionKind::Open => {
                let interval = dimension
                    .interval
                    .filter(|i| *i > 0)
                    .unwrap_or(DEFAULT_OPEN_INTERVAL);
                let start = coordinate.div_euclid(interval) * interval;
                DimensionSlice {
                    start,
                    end: start.saturating_add(interval),
                }
            }
            DimensionKind::Closed => {
                let partitions = i64::from(dimension.partitions.unwrap_or(1).max(1));
                let width = (i64::from(i32::MAX) + 1) / partitions;
                let index = (coordinate.max(0) / width).min(partitions - 1);

                let start = if index == 0 { i64::MIN } else { index * width };
                let end = if index == partitions - 1 {
                    i64::MAX
                } else {
                    (index + 1) * width
                };
                DimensionSlice { start, end }
            }
        }
    }

    fn place(&self, id: ChunkId) -> Vec<NodeName> {
        let count = self.data_nodes.len();
        let first = (id.0.max(1) as usize - 1) % count;
        (0..self.replication_factor.min(count))
            .map(|offset| self.data_nodes[(first + offset) % count].clone())
            .collect()
    }
}

#[async_trait]
impl PartitionIndex for InMemoryPartitionIndex {
    async fn find_chunk_for_point(&self, point: &Point) -> Result<Option<Chunk>, IndexError> {
        self.check_point(point)?;
        let chunks = self.chunks.read().await;
        Ok(chunks.iter().find(|c| c.contains(point)).cloned())
    }

    async fn create_chunk_for_point(&self, point: &Point) -> Result<Chunk, IndexError> {
        self.check_point(point)?;
        if self.data_nodes.is_empty() {
            return Err(IndexError::NoDataNodes);
        }

        let mut chunks = self.chunks.write().await;
        if let Some(existing) = chunks.iter().find(|c| c.contains(point)) {
            return Ok(existing.clone());
        }

        let id = ChunkId(chunks.len() as i32 + 1);
        let slices = self
            .dimensions
            .iter()
            .zip(point.coordinates())
            .map(|(dim, coord)| Self::slice_for(dim, *coord))
            .collect();

        let chunk = Chunk {
            id,
            slices,
            data_nodes: self.place(id),
            status: ChunkStatus::empty(),
        };

        info!(chunk = %id, point = %point, nodes = ?chunk.data_nodes, "Created chunk");
        chunks.push(chunk.clone());
        Ok(chunk)
    }

    async fn mark_unordered(&self, chunk: &Chunk) -> Result<(), IndexError> {
        let mut chunks = self.chunks.write().await;
        let stored = chunks
            .iter_mut()
            .find(|c| c.id == chunk.id)
            .ok_or(IndexError::ChunkNotFound(chunk.id))?;
        stored.status.insert(ChunkStatus::UNORDERED);
        Ok(())
    }
}
