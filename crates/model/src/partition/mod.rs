pub mod chunk;
pub mod dimension;
pub mod point;

pub use chunk::{Chunk, ChunkStatus, DimensionSlice};
pub use dimension::{Dimension, DimensionKind, PartitioningFunc};
pub use point::Point;
