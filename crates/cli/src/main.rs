use crate::{
    error::CliError,
    output::CopyReport,
    shutdown::{ExitCode, ShutdownCoordinator},
    source::CsvRowSource,
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::CopySettings;
use engine_core::{connectors::file::FileConnectionOpener, partition::InMemoryPartitionIndex};
use engine_processing::{
    error::CopyError,
    session::{self, CopySession, SessionParams},
};
use model::core::identifiers::NodeName;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;
mod source;

#[derive(Parser)]
#[command(
    name = "distcopy",
    version = "0.1.0",
    about = "Distributed COPY into the data nodes of a partitioned table"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let outcome = execute(cli.command).await;
    match &outcome {
        Ok(()) => {}
        Err(CliError::ShutdownRequested) => info!("Copy cancelled by shutdown request"),
        Err(err) => error!("{err}"),
    }

    ExitCode::for_outcome(&outcome).into()
}

async fn execute(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Copy {
            config,
            input,
            out_dir,
            delimiter,
            output,
        } => {
            let settings = CopySettings::load(&config).await?;
            let delimiter =
                u8::try_from(delimiter).map_err(|_| CliError::InvalidDelimiter(delimiter))?;

            let shutdown = ShutdownCoordinator::install();

            let index = InMemoryPartitionIndex::new(
                settings.dimensions.clone(),
                settings.data_nodes.iter().map(NodeName::new).collect(),
                settings.replication_factor,
            );
            let opener = FileConnectionOpener::new(&out_dir);
            let params = SessionParams::from_settings(&settings, Arc::new(index), Arc::new(opener))?
                .with_cancellation(shutdown.cancel_token());
            let command = params.command.clone();

            let mut source =
                CsvRowSource::open(&input, delimiter, &settings.table.name, &params.columns)?;
            let copy = CopySession::begin(params)?;

            let summary = match session::run(copy, &mut source).await {
                Ok(summary) => summary,
                Err(CopyError::Cancelled) if shutdown.is_shutdown_requested() => {
                    return Err(CliError::ShutdownRequested);
                }
                Err(err) => return Err(err.into()),
            };

            let report = CopyReport {
                table: &settings.table.name,
                command: &command,
                out_dir: &out_dir,
                rows_read: source.rows_read(),
                summary,
            };
            match output {
                Some(path) => output::write_report(&report, &path).await?,
                None => output::print_report(&report)?,
            }
        }
        Commands::Command { config } => {
            let settings = CopySettings::load(&config).await?;
            println!("{}", settings.outgoing_command());
        }
    }

    Ok(())
}
