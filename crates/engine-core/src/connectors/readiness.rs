use crate::{
    connectors::transport::{DestinationConnection, Interest},
    error::TransportError,
};
use async_trait::async_trait;
use futures::future::select_all;
use std::time::Duration;

/// One connection together with the readiness it is waiting for.
pub struct ReadinessWait<'a> {
    pub connection: &'a dyn DestinationConnection,
    pub interest: Interest,
}

/// Waits on several connections at once.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Resolves when any of `waits` becomes ready (`true`) or `timeout`
    /// elapses first (`false`).
    async fn wait<'a>(
        &self,
        waits: &[ReadinessWait<'a>],
        timeout: Duration,
    ) -> Result<bool, TransportError>;
}

/// Races the per-connection readiness futures against a timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectReadiness;

#[async_trait]
impl Readiness for SelectReadiness {
    async fn wait<'a>(
        &self,
        waits: &[ReadinessWait<'a>],
        timeout: Duration,
    ) -> Result<bool, TransportError> {
        if waits.is_empty() {
            return Ok(true);
        }

        let pending = waits
            .iter()
            .map(|wait| wait.connection.ready(wait.interest));

        match tokio::time::timeout(timeout, select_all(pending)).await {
            Ok((result, _, _)) => result.map(|_| true),
            Err(_) => Ok(false),
        }
    }
}
