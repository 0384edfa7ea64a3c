use crate::error::CliError;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels the running copy when the process receives SIGINT or SIGTERM.
///
/// The session observes the token between rows and while waiting on data
/// nodes, so a signal ends the copy through the regular termination path.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Creates a coordinator and spawns the signal listener.
    pub fn install() -> Self {
        let cancel_token = CancellationToken::new();
        let listener_token = cancel_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                name = next_signal() => {
                    info!(signal = name, "Received shutdown signal, cancelling copy");
                    listener_token.cancel();
                }
                _ = listener_token.cancelled() => {}
            }
        });

        Self { cancel_token }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Resolves with the name of the first termination signal delivered.
/// A handler that fails to install never resolves.
async fn next_signal() -> &'static str {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(err) => {
                warn!(error = %err, "Failed to install SIGINT handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}

/// Process exit status of a `distcopy` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// 128 + SIGINT, as shells report an interrupted command.
    ShutdownRequested = 130,
}

impl ExitCode {
    pub fn for_outcome(outcome: &Result<(), CliError>) -> Self {
        match outcome {
            Ok(()) => ExitCode::Success,
            Err(CliError::ShutdownRequested) => ExitCode::ShutdownRequested,
            Err(_) => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
