use crate::{
    error::CopyError,
    router::{ChunkCreationHook, ChunkRouter},
};
use bytes::Bytes;
use engine_config::settings::BatchSettings;
use model::{core::identifiers::DestinationKey, partition::Point};
use std::collections::HashMap;

/// One encoded row waiting in the current batch.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub data: Bytes,
    pub point: Point,
}

/// Rows of the current batch owned by one destination, in batch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationBatch {
    pub destination: DestinationKey,
    pub rows: Vec<usize>,
}

/// Collects encoded rows until a size limit is reached and groups them by
/// destination.
#[derive(Debug)]
pub struct BatchAssembler {
    settings: BatchSettings,
    entries: Vec<BatchEntry>,
    bytes: usize,
    destinations: Vec<DestinationBatch>,
    positions: HashMap<DestinationKey, usize>,
}

impl BatchAssembler {
    pub fn new(settings: BatchSettings) -> Self {
        Self {
            entries: Vec::with_capacity(settings.max_rows),
            settings,
            bytes: 0,
            destinations: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn push(&mut self, entry: BatchEntry) {
        self.bytes += entry.data.len();
        self.entries.push(entry);
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.settings.max_rows || self.bytes >= self.settings.max_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn destinations(&self) -> &[DestinationBatch] {
        &self.destinations
    }

    /// Routes every entry and groups entry indices per destination. Groups
    /// are ordered by the first row that reaches them.
    pub async fn plan(
        &mut self,
        router: &ChunkRouter,
        hook: &mut dyn ChunkCreationHook,
    ) -> Result<&[DestinationBatch], CopyError> {
        self.destinations.clear();
        self.positions.clear();

        for row in 0..self.entries.len() {
            let route = router.route(&self.entries[row].point, hook).await?;
            for destination in route.destinations {
                let slot = match self.positions.get(&destination) {
                    Some(slot) => *slot,
                    None => {
                        self.destinations.push(DestinationBatch {
                            destination: destination.clone(),
                            rows: Vec::new(),
                        });
                        self.positions
                            .insert(destination, self.destinations.len() - 1);
                        self.destinations.len() - 1
                    }
                };
                self.destinations[slot].rows.push(row);
            }
        }

        Ok(&self.destinations)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.destinations.clear();
        self.positions.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::NoopHook;
    use engine_core::{metrics::Metrics, partition::InMemoryPartitionIndex};
    use model::partition::Dimension;
    use std::sync::Arc;

    const HOUR: i64 = 3_600_000_000;

    fn entry(time: i64, payload: &'static [u8]) -> BatchEntry {
        BatchEntry {
            data: Bytes::from_static(payload),
            point: Point::new(vec![time]),
        }
    }

    fn router(replication_factor: usize) -> ChunkRouter {
        let index = InMemoryPartitionIndex::new(
            vec![Dimension::open("time", HOUR)],
            vec!["dn1".into(), "dn2".into(), "dn3".into()],
            replication_factor,
        );
        ChunkRouter::new(Arc::new(index), "postgres".into(), Metrics::new())
    }

    #[test]
    fn test_full_on_rows_or_bytes() {
        let mut by_rows = BatchAssembler::new(BatchSettings {
            max_rows: 2,
            max_bytes: 1024,
        });
        by_rows.push(entry(0, b"a\n"));
        assert!(!by_rows.is_full());
        by_rows.push(entry(0, b"b\n"));
        assert!(by_rows.is_full());

        let mut by_bytes = BatchAssembler::new(BatchSettings {
            max_rows: 100,
            max_bytes: 4,
        });
        by_bytes.push(entry(0, b"abcd\n"));
        assert!(by_bytes.is_full());
        assert_eq!(by_bytes.bytes(), 5);
    }

    #[tokio::test]
    async fn test_groups_rows_by_destination_in_first_seen_order() {
        let router = router(1);
        let mut assembler = BatchAssembler::new(BatchSettings::default());
        assembler.push(entry(HOUR, b"1\n"));
        assembler.push(entry(0, b"2\n"));
        assembler.push(entry(HOUR + 1, b"3\n"));

        let plan = assembler.plan(&router, &mut NoopHook).await.unwrap().to_vec();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].destination.node.as_str(), "dn1");
        assert_eq!(plan[0].rows, vec![0, 2]);
        assert_eq!(plan[1].destination.node.as_str(), "dn2");
        assert_eq!(plan[1].rows, vec![1]);
    }

    #[tokio::test]
    async fn test_replicated_rows_reach_every_owner() {
        let router = router(2);
        let mut assembler = BatchAssembler::new(BatchSettings::default());
        assembler.push(entry(0, b"1\n"));

        let plan = assembler.plan(&router, &mut NoopHook).await.unwrap();
        let nodes: Vec<_> = plan.iter().map(|b| b.destination.node.to_string()).collect();
        assert_eq!(nodes, vec!["dn1", "dn2"]);
        assert!(plan.iter().all(|b| b.rows == vec![0]));
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let router = router(1);
        let mut assembler = BatchAssembler::new(BatchSettings::default());
        assembler.push(entry(0, b"1\n"));
        assembler.plan(&router, &mut NoopHook).await.unwrap();

        assembler.reset();
        assert!(assembler.is_empty());
        assert_eq!(assembler.bytes(), 0);
        assert!(assembler.destinations().is_empty());
    }
}
