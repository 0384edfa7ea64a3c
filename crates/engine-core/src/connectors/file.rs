use crate::{
    connectors::transport::{
        ConnectionMode, ConnectionOpener, CopyResult, DestinationConnection, FlushStatus,
        Interest, ReadStatus,
    },
    error::TransportError,
};
use async_trait::async_trait;
use model::core::identifiers::DestinationKey;
use std::{
    collections::VecDeque,
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

const BINARY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";
const BINARY_TRAILER: [u8; 2] = (-1i16).to_be_bytes();

struct Segment {
    path: PathBuf,
    writer: BufWriter<File>,
    binary: bool,
    bytes: u64,
}

/// Data node stand-in that writes every COPY cycle into its own file.
///
/// Cycle `n` of node `dn1` lands in `dn1.000n.copy`; binary cycles carry the
/// binary COPY signature and trailer. Each command that starts a cycle is
/// appended to `dn1.commands.log`.
pub struct FileConnection {
    key: DestinationKey,
    dir: PathBuf,
    mode: ConnectionMode,
    blocking: bool,
    cycles: usize,
    segment: Option<Segment>,
    end_queued: bool,
    results: VecDeque<CopyResult>,
}

impl FileConnection {
    pub fn new(key: DestinationKey, dir: impl Into<PathBuf>) -> Self {
        Self {
            key,
            dir: dir.into(),
            mode: ConnectionMode::Idle,
            blocking: true,
            cycles: 0,
            segment: None,
            end_queued: false,
            results: VecDeque::new(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn segment_path(dir: &Path, key: &DestinationKey, cycle: usize) -> PathBuf {
        dir.join(format!("{}.{:04}.copy", key.node, cycle))
    }

    pub fn command_log_path(dir: &Path, key: &DestinationKey) -> PathBuf {
        dir.join(format!("{}.commands.log", key.node))
    }

    fn io_error(&self, source: std::io::Error) -> TransportError {
        TransportError::Io {
            destination: self.key.clone(),
            source,
        }
    }

    fn expect_mode(&self, expected: ConnectionMode, action: &str) -> Result<(), TransportError> {
        if self.mode != expected {
            return Err(TransportError::Rejected {
                destination: self.key.clone(),
                message: format!("cannot {action} while connection is {:?}", self.mode),
            });
        }
        Ok(())
    }

    fn log_command(&self, command: &str) -> std::io::Result<()> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::command_log_path(&self.dir, &self.key))?;
        writeln!(log, "{command}")
    }
}

#[async_trait]
impl DestinationConnection for FileConnection {
    fn key(&self) -> &DestinationKey {
        &self.key
    }

    fn mode(&self) -> ConnectionMode {
        self.mode
    }

    fn set_mode(&mut self, mode: ConnectionMode) {
        self.mode = mode;
    }

    fn in_copy(&self) -> bool {
        self.segment.is_some() && !self.end_queued
    }

    async fn begin_copy(&mut self, command: &str, binary: bool) -> Result<(), TransportError> {
        self.expect_mode(ConnectionMode::Idle, "begin COPY")?;

        self.cycles += 1;
        let path = Self::segment_path(&self.dir, &self.key, self.cycles);
        let file = File::create(&path).map_err(|e| self.io_error(e))?;
        let mut writer = BufWriter::new(file);

        if binary {
            let mut header = BINARY_SIGNATURE.to_vec();
            header.extend_from_slice(&[0u8; 8]);
            writer.write_all(&header).map_err(|e| self.io_error(e))?;
        }
        self.log_command(command).map_err(|e| self.io_error(e))?;

        debug!(destination = %self.key, path = %path.display(), "Started COPY segment");
        self.segment = Some(Segment {
            path,
            writer,
            binary,
            bytes: 0,
        });
        self.results.clear();
        self.end_queued = false;
        self.blocking = false;
        self.mode = ConnectionMode::BulkTransfer;
        Ok(())
    }

    async fn put_copy_data(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.expect_mode(ConnectionMode::BulkTransfer, "send COPY data")?;
        let Some(segment) = self.segment.as_mut() else {
            return Err(TransportError::Closed {
                destination: self.key.clone(),
            });
        };

        let written = segment.writer.write_all(data);
        segment.bytes += data.len() as u64;
        written.map_err(|e| self.io_error(e))
    }

    fn put_copy_end(&mut self) -> Result<(), TransportError> {
        self.expect_mode(ConnectionMode::BulkTransfer, "end COPY")?;
        let Some(segment) = self.segment.as_mut() else {
            return Err(TransportError::Closed {
                destination: self.key.clone(),
            });
        };

        if segment.binary {
            let written = segment.writer.write_all(&BINARY_TRAILER);
            written.map_err(|e| self.io_error(e))?;
        }
        self.end_queued = true;
        Ok(())
    }

    fn try_flush(&mut self) -> Result<FlushStatus, TransportError> {
        if let Some(segment) = self.segment.as_mut() {
            let flushed = segment.writer.flush();
            flushed.map_err(|e| self.io_error(e))?;
        }

        if self.end_queued {
            if let Some(segment) = self.segment.take() {
                debug!(
                    destination = %self.key,
                    path = %segment.path.display(),
                    bytes = segment.bytes,
                    "Closed COPY segment"
                );
                self.results.push_back(CopyResult::CommandOk { rows: None });
            }
            self.end_queued = false;
        }
        Ok(FlushStatus::Flushed)
    }

    fn try_read(&mut self) -> Result<ReadStatus, TransportError> {
        Ok(ReadStatus::Ready)
    }

    async fn ready(&self, _interest: Interest) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_blocking(&mut self) -> Result<(), TransportError> {
        self.blocking = true;
        Ok(())
    }

    fn next_result(&mut self) -> Option<CopyResult> {
        self.results.pop_front()
    }

    async fn end_copy(&mut self) -> Result<(), TransportError> {
        if self.mode == ConnectionMode::Idle {
            return Ok(());
        }
        if self.mode == ConnectionMode::BulkTransfer {
            self.put_copy_end()?;
        }
        self.try_flush()?;

        let result = self.results.pop_front();
        self.results.clear();
        self.mode = ConnectionMode::Idle;
        self.blocking = true;

        match result {
            Some(CopyResult::CommandOk { .. }) => Ok(()),
            Some(CopyResult::Failed { message }) => Err(TransportError::Rejected {
                destination: self.key.clone(),
                message,
            }),
            other => Err(TransportError::Rejected {
                destination: self.key.clone(),
                message: format!("unexpected result at end of COPY: {other:?}"),
            }),
        }
    }
}

/// Opens [`FileConnection`]s under one output directory.
#[derive(Debug, Clone)]
pub struct FileConnectionOpener {
    dir: PathBuf,
}

impl FileConnectionOpener {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

}

#[async_trait]
impl ConnectionOpener for FileConnectionOpener {
    async fn open(
        &self,
        key: &DestinationKey,
    ) -> Result<Box<dyn DestinationConnection>, TransportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| TransportError::Connect {
                destination: key.clone(),
                message: e.to_string(),
            })?;
        Ok(Box::new(FileConnection::new(key.clone(), self.dir.clone())))
    }
}
