pub mod file;
pub mod readiness;
pub mod registry;
pub mod transport;

pub use readiness::{Readiness, ReadinessWait, SelectReadiness};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use transport::{
    ConnectionMode, ConnectionOpener, CopyResult, DestinationConnection, FlushStatus, Interest,
    ReadStatus,
};
