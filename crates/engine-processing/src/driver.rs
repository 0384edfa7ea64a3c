use crate::{batch::BatchAssembler, error::CopyError};
use bytes::BytesMut;
use engine_core::{
    connectors::{
        ConnectionId, ConnectionMode, ConnectionRegistry, CopyResult, FlushStatus, Interest,
        ReadStatus, Readiness, ReadinessWait,
    },
    metrics::Metrics,
};
use model::core::identifiers::DestinationKey;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Totals of one dispatched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub rows: usize,
    pub bytes: usize,
    pub destinations: usize,
}

/// Moves batches onto data node connections and ends COPY on all of them
/// concurrently.
///
/// Keeps the set of connections that are inside a COPY. Members are only
/// added by activation, and the set is emptied by `flush_all` and
/// `end_remaining`.
pub struct TransferDriver {
    command: String,
    binary: bool,
    active: Vec<ConnectionId>,
    readiness: Arc<dyn Readiness>,
    poll_timeout: Duration,
    cancel: CancellationToken,
    metrics: Metrics,
}

impl TransferDriver {
    pub fn new(
        command: String,
        binary: bool,
        readiness: Arc<dyn Readiness>,
        poll_timeout: Duration,
        cancel: CancellationToken,
        metrics: Metrics,
    ) -> Self {
        Self {
            command,
            binary,
            active: Vec::new(),
            readiness,
            poll_timeout,
            cancel,
            metrics,
        }
    }

    pub fn active(&self) -> &[ConnectionId] {
        &self.active
    }

    /// Resolves the connection for `key` and makes sure it is inside a COPY.
    async fn activate(
        &mut self,
        registry: &mut ConnectionRegistry,
        key: &DestinationKey,
    ) -> Result<ConnectionId, CopyError> {
        let id = registry.resolve(key).await?;
        let connection = registry.get_mut(id);

        match connection.mode() {
            ConnectionMode::Idle => {
                connection.begin_copy(&self.command, self.binary).await?;
                debug!(destination = %key, connection = %id, "Started COPY on data node");
            }
            ConnectionMode::BulkTransfer => {}
            ConnectionMode::Completing => {
                return Err(CopyError::ProtocolStateViolation {
                    destination: key.clone(),
                    message: "connection is still completing a previous COPY".into(),
                });
            }
        }

        if !self.active.contains(&id) {
            self.active.push(id);
        }
        Ok(id)
    }

    /// Sends the planned batch: one COPY data message per destination with
    /// its rows in batch order.
    pub async fn dispatch(
        &mut self,
        registry: &mut ConnectionRegistry,
        assembler: &BatchAssembler,
    ) -> Result<DispatchStats, CopyError> {
        let plan = assembler.destinations();
        let entries = assembler.entries();

        let mut targets = Vec::with_capacity(plan.len());
        for batch in plan {
            targets.push(self.activate(registry, &batch.destination).await?);
        }

        let mut stats = DispatchStats {
            rows: entries.len(),
            destinations: plan.len(),
            ..DispatchStats::default()
        };

        for (batch, id) in plan.iter().zip(targets) {
            let size = batch.rows.iter().map(|&row| entries[row].data.len()).sum();
            let mut payload = BytesMut::with_capacity(size);
            for &row in &batch.rows {
                payload.extend_from_slice(&entries[row].data);
            }

            registry.get_mut(id).put_copy_data(&payload).await?;
            debug!(
                destination = %batch.destination,
                rows = batch.rows.len(),
                bytes = payload.len(),
                "Sent rows to data node"
            );
            stats.bytes += payload.len();
        }

        self.metrics.increment_batches(1);
        self.metrics.increment_bytes(stats.bytes as u64);
        Ok(stats)
    }

    /// Sends one encoded row to destinations that were routed by the caller.
    pub async fn send_routed(
        &mut self,
        registry: &mut ConnectionRegistry,
        data: &[u8],
        destinations: &[DestinationKey],
    ) -> Result<(), CopyError> {
        for destination in destinations {
            let id = self.activate(registry, destination).await?;
            registry.get_mut(id).put_copy_data(data).await?;
        }
        self.metrics
            .increment_bytes((data.len() * destinations.len()) as u64);
        Ok(())
    }

    /// Ends the COPY on every active connection and waits for all of them to
    /// acknowledge, multiplexing the waits. Returns the number of connections
    /// that completed.
    ///
    /// Ended connections are returned to `Idle` and blocking mode even when
    /// draining fails. The completion results are only checked after that.
    pub async fn flush_all(&mut self, registry: &mut ConnectionRegistry) -> Result<usize, CopyError> {
        let mut ended = Vec::with_capacity(self.active.len());
        let mut outcome = self.end_active(registry, &mut ended);

        if outcome.is_ok() && !ended.is_empty() {
            outcome = self.drain(registry, &ended).await;
        }

        for &id in &ended {
            let connection = registry.get_mut(id);
            connection.set_mode(ConnectionMode::Idle);
            if let Err(err) = connection.set_blocking() {
                outcome = outcome.and(Err(err.into()));
            }
        }
        outcome?;

        let mut first_error = None;
        for &id in &ended {
            if let Err(err) = Self::check_results(registry, id) {
                warn!(error = %err, "Data node did not complete the COPY");
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        if !ended.is_empty() {
            self.metrics.increment_flushes(1);
            debug!(connections = ended.len(), "Flushed active data node connections");
        }
        Ok(ended.len())
    }

    /// Queues the end of data on every active connection still inside a COPY.
    fn end_active(
        &mut self,
        registry: &mut ConnectionRegistry,
        ended: &mut Vec<ConnectionId>,
    ) -> Result<(), CopyError> {
        for id in std::mem::take(&mut self.active) {
            let connection = registry.get_mut(id);
            if connection.mode() != ConnectionMode::BulkTransfer {
                continue;
            }
            if !connection.in_copy() {
                let destination = connection.key().clone();
                connection.set_mode(ConnectionMode::Idle);
                return Err(CopyError::ProtocolStateViolation {
                    destination,
                    message: "connection is marked as copying but no COPY is in progress".into(),
                });
            }
            connection.put_copy_end()?;
            connection.set_mode(ConnectionMode::Completing);
            ended.push(id);
        }
        Ok(())
    }

    async fn drain(
        &self,
        registry: &mut ConnectionRegistry,
        ended: &[ConnectionId],
    ) -> Result<(), CopyError> {
        let mut pending = ended.to_vec();
        let mut pass = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }
            pass += 1;

            let mut waiting = Vec::new();
            for &id in &pending {
                let connection = registry.get_mut(id);
                if connection.try_flush()? == FlushStatus::Pending {
                    waiting.push((id, Interest::Writable));
                    continue;
                }
                if connection.try_read()? == ReadStatus::WouldBlock {
                    waiting.push((id, Interest::Readable));
                }
            }

            if waiting.is_empty() {
                debug!(passes = pass, "All data nodes acknowledged end of COPY");
                return Ok(());
            }

            debug!(pass, waiting = waiting.len(), "Waiting for data nodes");
            pending = waiting.iter().map(|(id, _)| *id).collect();

            let waits: Vec<ReadinessWait<'_>> = waiting
                .iter()
                .map(|&(id, interest)| ReadinessWait {
                    connection: registry.get(id),
                    interest,
                })
                .collect();

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CopyError::Cancelled),
                ready = self.readiness.wait(&waits, self.poll_timeout) => {
                    ready?;
                }
            }
        }
    }

    /// Requires exactly one successful completion and nothing after it.
    fn check_results(registry: &mut ConnectionRegistry, id: ConnectionId) -> Result<(), CopyError> {
        let connection = registry.get_mut(id);
        let destination = connection.key().clone();

        match connection.next_result() {
            Some(CopyResult::CommandOk { .. }) => {}
            Some(CopyResult::Failed { message }) => {
                return Err(CopyError::Remote {
                    destination,
                    message,
                });
            }
            other => {
                return Err(CopyError::ProtocolStateViolation {
                    destination,
                    message: format!("unexpected result at end of COPY: {other:?}"),
                });
            }
        }

        if let Some(extra) = connection.next_result() {
            return Err(CopyError::ProtocolStateViolation {
                destination,
                message: format!("unexpected extra result after COPY: {extra:?}"),
            });
        }
        Ok(())
    }

    /// Ends the COPY in blocking mode on every connection still inside one.
    /// Every connection is attempted; the first failure is returned.
    pub async fn end_remaining(&mut self, registry: &mut ConnectionRegistry) -> Result<(), CopyError> {
        self.active.clear();

        let open: Vec<ConnectionId> = registry
            .all()
            .filter(|(_, c)| c.mode() == ConnectionMode::BulkTransfer)
            .map(|(id, _)| id)
            .collect();

        let mut first_error = None;
        for id in open {
            let connection = registry.get_mut(id);
            if let Err(err) = connection.end_copy().await {
                warn!(destination = %connection.key(), error = %err, "Failed to end COPY on data node");
                first_error.get_or_insert(CopyError::from(err));
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
