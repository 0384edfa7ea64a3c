use crate::error::CopyError;
use async_trait::async_trait;
use engine_core::{metrics::Metrics, partition::PartitionIndex};
use model::{
    core::identifiers::{DestinationKey, Principal},
    partition::{Chunk, ChunkStatus, Point},
};
use std::sync::Arc;
use tracing::debug;

/// Called right before a missing chunk is created.
#[async_trait]
pub trait ChunkCreationHook: Send {
    async fn before_chunk_creation(&mut self) -> Result<(), CopyError>;
}

/// Hook for callers with nothing to do before chunk creation.
pub struct NoopHook;

#[async_trait]
impl ChunkCreationHook for NoopHook {
    async fn before_chunk_creation(&mut self) -> Result<(), CopyError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub chunk: Chunk,
    pub destinations: Vec<DestinationKey>,
}

/// Resolves partition points to chunks and the connections that own them.
pub struct ChunkRouter {
    index: Arc<dyn PartitionIndex>,
    principal: Principal,
    metrics: Metrics,
}

impl ChunkRouter {
    pub fn new(index: Arc<dyn PartitionIndex>, principal: Principal, metrics: Metrics) -> Self {
        Self {
            index,
            principal,
            metrics,
        }
    }

    pub async fn route(
        &self,
        point: &Point,
        hook: &mut dyn ChunkCreationHook,
    ) -> Result<Route, CopyError> {
        let mut chunk = match self.index.find_chunk_for_point(point).await? {
            Some(chunk) => chunk,
            None => {
                hook.before_chunk_creation().await?;
                let chunk = self.index.create_chunk_for_point(point).await?;
                self.metrics.increment_chunks_created(1);
                chunk
            }
        };

        if chunk.is_compressed() && !chunk.is_unordered() {
            debug!(chunk = %chunk.id, "Marking compressed chunk unordered");
            self.index.mark_unordered(&chunk).await?;
            chunk.status.insert(ChunkStatus::UNORDERED);
        }

        self.destinations_for(chunk)
    }

    /// Destinations of an already-resolved chunk.
    pub fn destinations_for(&self, chunk: Chunk) -> Result<Route, CopyError> {
        if chunk.data_nodes.is_empty() {
            return Err(CopyError::NoDestinations { chunk: chunk.id });
        }

        let destinations = chunk
            .data_nodes
            .iter()
            .map(|node| DestinationKey::new(node.clone(), self.principal.clone()))
            .collect();

        Ok(Route {
            chunk,
            destinations,
        })
    }
}
