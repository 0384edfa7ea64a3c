use engine_config::settings::error::SettingsError;
use engine_core::error::{IndexError, TransportError};
use model::core::identifiers::{ChunkId, DestinationKey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("Invalid input for column '{column}': {message}")]
    FieldConversion { column: String, message: String },

    #[error("Partitioning column '{column}': {message}")]
    PartitioningViolation { column: String, message: String },

    #[error("Chunk {chunk} has no data nodes to copy to")]
    NoDestinations { chunk: ChunkId },

    #[error("Connection {destination} is in an unexpected state: {message}")]
    ProtocolStateViolation {
        destination: DestinationKey,
        message: String,
    },

    #[error("Transport failure on {destination}: {source}")]
    Transport {
        destination: DestinationKey,
        #[source]
        source: TransportError,
    },

    #[error("Data node {destination} failed the COPY: {message}")]
    Remote {
        destination: DestinationKey,
        message: String,
    },

    #[error("Chunk index error: {0}")]
    Index(#[from] IndexError),

    #[error("Invalid copy settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to read source row: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Copy was cancelled")]
    Cancelled,
}

impl From<TransportError> for CopyError {
    fn from(source: TransportError) -> Self {
        CopyError::Transport {
            destination: source.destination().clone(),
            source,
        }
    }
}
