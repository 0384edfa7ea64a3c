use crate::error::TransportError;
use async_trait::async_trait;
use model::core::identifiers::DestinationKey;

/// Protocol state of a data node connection as seen by the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// No COPY in progress.
    Idle,
    /// Inside the COPY sub-protocol, accepting row data.
    BulkTransfer,
    /// End of data was sent; the completion result is outstanding.
    Completing,
}

/// Outcome of a non-blocking attempt to drain the send buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Flushed,
    /// Unwritten bytes remain; wait for write readiness.
    Pending,
}

/// Outcome of a non-blocking attempt to consume a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A complete result is buffered and can be fetched with `next_result`.
    Ready,
    /// The response has not fully arrived; wait for read readiness.
    WouldBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// A result returned by a data node after the end of a COPY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyResult {
    /// The command completed; `rows` is the count reported by the node, if any.
    CommandOk { rows: Option<u64> },
    /// The node still expects COPY data.
    CopyIn,
    /// The node reported an error.
    Failed { message: String },
}

/// Handle to one data node as one principal.
///
/// `begin_copy` moves an `Idle` connection to `BulkTransfer` and `end_copy`
/// moves it back to `Idle`. The `Completing` state is only entered and left
/// by the caller through `set_mode` while it drives a concurrent flush.
#[async_trait]
pub trait DestinationConnection: Send + Sync {
    fn key(&self) -> &DestinationKey;

    fn mode(&self) -> ConnectionMode;

    fn set_mode(&mut self, mode: ConnectionMode);

    /// Whether the transport itself is inside the COPY sub-protocol and
    /// still accepts data, independent of the recorded mode.
    fn in_copy(&self) -> bool;

    /// Starts the COPY sub-protocol with `command`. The connection is left in
    /// non-blocking mode.
    async fn begin_copy(&mut self, command: &str, binary: bool) -> Result<(), TransportError>;

    /// Queues one COPY data message. May block inside the transport when the
    /// send buffer is full.
    async fn put_copy_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Queues the end-of-data message without waiting for it to be sent.
    fn put_copy_end(&mut self) -> Result<(), TransportError>;

    fn try_flush(&mut self) -> Result<FlushStatus, TransportError>;

    fn try_read(&mut self) -> Result<ReadStatus, TransportError>;

    /// Resolves once the underlying socket is ready for `interest`.
    async fn ready(&self, interest: Interest) -> Result<(), TransportError>;

    /// Switches the connection back to blocking mode.
    fn set_blocking(&mut self) -> Result<(), TransportError>;

    /// Takes the next buffered result; `None` once the results are exhausted.
    fn next_result(&mut self) -> Option<CopyResult>;

    /// Ends the COPY in blocking mode and consumes its result.
    async fn end_copy(&mut self) -> Result<(), TransportError>;
}

/// Acquires new data node connections.
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    async fn open(
        &self,
        key: &DestinationKey,
    ) -> Result<Box<dyn DestinationConnection>, TransportError>;
}
