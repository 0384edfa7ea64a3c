use engine_config::settings::error::SettingsError;
use engine_processing::error::CopyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read a file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid copy settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to read the input file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Copy failed: {0}")]
    Copy(#[from] CopyError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Delimiter '{0}' is not a single-byte character")]
    InvalidDelimiter(char),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
