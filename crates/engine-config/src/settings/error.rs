use thiserror::Error;

/// Errors raised when loading or validating copy settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON for `CopySettings`.
    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A COPY option has a value the distributed copy cannot honor.
    #[error("Invalid COPY option '{option}': {message}")]
    InvalidOption { option: String, message: String },

    /// Text transfer was negotiated but the statement asked for binary input.
    #[error("remote copy does not support binary data")]
    BinaryFormatNotSupported,

    /// A column declares a type the encoder does not know.
    #[error("Unknown type for column '{column}': {message}")]
    UnknownColumnType { column: String, message: String },

    /// The settings are structurally inconsistent.
    #[error("Invalid settings: {0}")]
    Invalid(String),
}
