use crate::{
    batch::{BatchAssembler, BatchEntry},
    driver::TransferDriver,
    encoder::{EncodingFormat, RowEncoder},
    error::CopyError,
    router::{ChunkCreationHook, ChunkRouter},
};
use async_trait::async_trait;
use engine_config::settings::{BatchSettings, CopySettings};
use engine_core::{
    connectors::{ConnectionOpener, ConnectionRegistry, Readiness, SelectReadiness},
    metrics::Metrics,
    partition::PartitionIndex,
};
use model::{
    core::identifiers::{DestinationKey, Principal},
    partition::Dimension,
    records::{column::ColumnSpec, row::RowData},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Supplies the rows of one copy.
#[async_trait]
pub trait RowSource: Send {
    async fn next_row(&mut self) -> Result<Option<RowData>, CopyError>;
}

/// Row source over rows already in memory.
pub struct IterSource<I> {
    rows: I,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = RowData> + Send,
{
    pub fn new(rows: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

#[async_trait]
impl<I> RowSource for IterSource<I>
where
    I: Iterator<Item = RowData> + Send,
{
    async fn next_row(&mut self) -> Result<Option<RowData>, CopyError> {
        Ok(self.rows.next())
    }
}

/// Everything a session needs to start.
pub struct SessionParams {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
    pub dimensions: Vec<Dimension>,
    pub format: EncodingFormat,
    pub command: String,
    pub principal: Principal,
    pub batch: BatchSettings,
    pub poll_timeout: Duration,
    pub index: Arc<dyn PartitionIndex>,
    pub opener: Arc<dyn ConnectionOpener>,
    pub readiness: Arc<dyn Readiness>,
    pub cancel: CancellationToken,
}

impl SessionParams {
    pub fn from_settings(
        settings: &CopySettings,
        index: Arc<dyn PartitionIndex>,
        opener: Arc<dyn ConnectionOpener>,
    ) -> Result<Self, CopyError> {
        let format = match settings.text_format()? {
            Some(text) => EncodingFormat::Text(text),
            None => EncodingFormat::Binary,
        };

        Ok(Self {
            table: settings.table.name.clone(),
            columns: settings.column_specs()?,
            dimensions: settings.dimensions.clone(),
            format,
            command: settings.outgoing_command(),
            principal: Principal::new(settings.principal.clone()),
            batch: settings.batch,
            poll_timeout: settings.poll_timeout(),
            index,
            opener,
            readiness: Arc::new(SelectReadiness),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_readiness(mut self, readiness: Arc<dyn Readiness>) -> Self {
        self.readiness = readiness;
        self
    }
}

/// Final counters of a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopySummary {
    pub rows: u64,
    pub batches: u64,
    pub bytes: u64,
    pub chunks_created: u64,
    pub flushes: u64,
}

/// Flushes the active connections before the first chunk creation of a
/// batch cycle.
struct FlushBeforeCreate<'a> {
    driver: &'a mut TransferDriver,
    registry: &'a mut ConnectionRegistry,
    flushed: bool,
}

#[async_trait]
impl ChunkCreationHook for FlushBeforeCreate<'_> {
    async fn before_chunk_creation(&mut self) -> Result<(), CopyError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        let flushed = self.driver.flush_all(self.registry).await?;
        debug!(connections = flushed, "Flushed data nodes before creating a chunk");
        Ok(())
    }
}

/// One distributed COPY into a partitioned table.
pub struct CopySession {
    table: String,
    encoder: RowEncoder,
    router: ChunkRouter,
    assembler: BatchAssembler,
    driver: TransferDriver,
    registry: ConnectionRegistry,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl CopySession {
    pub fn begin(params: SessionParams) -> Result<Self, CopyError> {
        let metrics = Metrics::new();
        let binary = params.format.is_binary();
        let encoder = RowEncoder::new(params.columns, &params.dimensions, params.format)?;

        info!(
            table = %params.table,
            command = %params.command,
            binary,
            "Starting distributed copy"
        );

        Ok(Self {
            table: params.table,
            encoder,
            router: ChunkRouter::new(params.index, params.principal, metrics.clone()),
            assembler: BatchAssembler::new(params.batch),
            driver: TransferDriver::new(
                params.command,
                binary,
                params.readiness,
                params.poll_timeout,
                params.cancel.clone(),
                metrics.clone(),
            ),
            registry: ConnectionRegistry::new(params.opener),
            metrics,
            cancel: params.cancel,
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Encodes and batches every row of `source`, dispatching each full
    /// batch. Returns the number of rows processed.
    pub async fn process_stream<S>(&mut self, source: &mut S) -> Result<u64, CopyError>
    where
        S: RowSource + ?Sized,
    {
        let mut rows = 0u64;

        while let Some(row) = source.next_row().await? {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }

            let encoded = self.encoder.encode(&row)?;
            self.assembler.push(BatchEntry {
                data: encoded.data,
                point: encoded.point,
            });
            rows += 1;
            self.metrics.increment_rows(1);

            if self.assembler.is_full() {
                self.dispatch_batch().await?;
            }
        }

        if !self.assembler.is_empty() {
            self.dispatch_batch().await?;
        }
        Ok(rows)
    }

    async fn dispatch_batch(&mut self) -> Result<(), CopyError> {
        let mut hook = FlushBeforeCreate {
            driver: &mut self.driver,
            registry: &mut self.registry,
            flushed: false,
        };
        self.assembler.plan(&self.router, &mut hook).await?;

        let stats = self
            .driver
            .dispatch(&mut self.registry, &self.assembler)
            .await?;
        info!(
            table = %self.table,
            rows = stats.rows,
            bytes = stats.bytes,
            destinations = stats.destinations,
            "Dispatched batch"
        );

        self.assembler.reset();
        Ok(())
    }

    /// Sends one row to destinations the caller already resolved, bypassing
    /// batching.
    pub async fn send_routed_row(
        &mut self,
        row: &RowData,
        destinations: &[DestinationKey],
    ) -> Result<(), CopyError> {
        let encoded = self.encoder.encode(row)?;
        self.driver
            .send_routed(&mut self.registry, &encoded.data, destinations)
            .await?;
        self.metrics.increment_rows(1);
        Ok(())
    }

    /// Completes the COPY on every data node and releases the connections.
    /// Both steps always run; the first failure is returned.
    pub async fn end(&mut self) -> Result<(), CopyError> {
        let flushed = self.driver.flush_all(&mut self.registry).await;
        let ended = self.driver.end_remaining(&mut self.registry).await;
        let released = self.registry.release();

        debug!(connections = released, "Released data node connections");
        match (flushed, ended) {
            (Err(first), Err(second)) => {
                warn!(error = %second, "Ending remaining COPY also failed");
                Err(first)
            }
            (Err(err), Ok(())) | (Ok(_), Err(err)) => Err(err),
            (Ok(_), Ok(())) => Ok(()),
        }
    }

    pub fn summary(&self) -> CopySummary {
        let snapshot = self.metrics.snapshot();
        CopySummary {
            rows: snapshot.rows_processed,
            batches: snapshot.batches_dispatched,
            bytes: snapshot.bytes_transferred,
            chunks_created: snapshot.chunks_created,
            flushes: snapshot.flushes,
        }
    }
}

/// Runs a whole copy. `end` runs whether or not processing succeeded; when
/// both fail, the processing error is returned and the cleanup error logged.
pub async fn run<S>(mut session: CopySession, source: &mut S) -> Result<CopySummary, CopyError>
where
    S: RowSource + ?Sized,
{
    let processed = session.process_stream(source).await;
    let ended = session.end().await;

    match (processed, ended) {
        (Ok(rows), Ok(())) => {
            let summary = session.summary();
            info!(
                table = %session.table,
                rows,
                batches = summary.batches,
                chunks_created = summary.chunks_created,
                "Distributed copy finished"
            );
            Ok(summary)
        }
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup)) => {
            warn!(error = %cleanup, "Cleanup after failed copy also failed");
            Err(err)
        }
    }
}
