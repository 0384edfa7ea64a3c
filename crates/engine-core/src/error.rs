use model::{
    core::identifiers::{ChunkId, DestinationKey},
    partition::Point,
};
use thiserror::Error;

/// Failures reported by a data node connection.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Could not connect to data node {destination}: {message}")]
    Connect {
        destination: DestinationKey,
        message: String,
    },

    #[error("I/O error on data node {destination}: {source}")]
    Io {
        destination: DestinationKey,
        #[source]
        source: std::io::Error,
    },

    #[error("Data node {destination} rejected the request: {message}")]
    Rejected {
        destination: DestinationKey,
        message: String,
    },

    #[error("Connection to data node {destination} is closed")]
    Closed { destination: DestinationKey },
}

impl TransportError {
    pub fn destination(&self) -> &DestinationKey {
        match self {
            TransportError::Connect { destination, .. }
            | TransportError::Io { destination, .. }
            | TransportError::Rejected { destination, .. }
            | TransportError::Closed { destination } => destination,
        }
    }
}

/// Failures of the chunk index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Point {point} has {actual} coordinates, the hypertable has {expected} dimensions")]
    DimensionMismatch {
        point: Point,
        expected: usize,
        actual: usize,
    },

    #[error("Chunk {0} does not exist")]
    ChunkNotFound(ChunkId),

    #[error("No data nodes available to place a chunk")]
    NoDataNodes,
}
