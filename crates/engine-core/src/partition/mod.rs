pub mod memory;

use crate::error::IndexError;
use async_trait::async_trait;
use model::partition::{Chunk, Point};

pub use memory::InMemoryPartitionIndex;

/// Chunk catalog of one distributed hypertable.
#[async_trait]
pub trait PartitionIndex: Send + Sync {
    async fn find_chunk_for_point(&self, point: &Point) -> Result<Option<Chunk>, IndexError>;

    /// Creates the chunk covering `point` and assigns its data nodes. Returns
    /// the existing chunk if one already covers the point.
    async fn create_chunk_for_point(&self, point: &Point) -> Result<Chunk, IndexError>;

    async fn mark_unordered(&self, chunk: &Chunk) -> Result<(), IndexError>;
}
