use crate::settings::{
    error::SettingsError,
    options::{TextFormat, validate_text_options},
};
use model::{
    core::data_type::DataType,
    partition::{Dimension, DimensionKind},
    records::column::ColumnSpec,
};
use planner::{
    copy_command::{CopyOptionSpec, deparse_copy_command},
    query::ast::common::TableRef,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};
use tracing::info;

pub mod error;
pub mod options;

/// Maximum number of rows in one batch.
pub const MAX_BATCH_ROWS: usize = 1024;

/// Maximum bytes of encoded COPY data in one batch.
pub const MAX_BATCH_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound of a single readiness wait while flushing data nodes.
pub const DEFAULT_FLUSH_POLL_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_rows: MAX_BATCH_ROWS,
            max_bytes: MAX_BATCH_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Everything the distributed copy needs to know about its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySettings {
    pub table: TableRef,
    pub columns: Vec<ColumnSettings>,
    /// Whether the statement named its columns explicitly.
    #[serde(default)]
    pub explicit_columns: bool,
    pub dimensions: Vec<Dimension>,
    pub data_nodes: Vec<String>,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,
    #[serde(default = "default_principal")]
    pub principal: String,
    /// Send rows to the data nodes in binary COPY format.
    #[serde(default)]
    pub binary: bool,
    #[serde(default)]
    pub options: Vec<CopyOptionSpec>,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default = "default_flush_poll_timeout_ms")]
    pub flush_poll_timeout_ms: u64,
}

impl CopySettings {
    pub fn from_json(source: &str) -> Result<Self, SettingsError> {
        let settings: CopySettings = serde_json::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path).await?;
        let settings = Self::from_json(&source)?;
        info!(
            path = %path.display(),
            table = %settings.table.name,
            data_nodes = settings.data_nodes.len(),
            binary = settings.binary,
            "Loaded copy settings"
        );
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.columns.is_empty() {
            return Err(SettingsError::Invalid("at least one column is required".into()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.to_lowercase()) {
                return Err(SettingsError::Invalid(format!(
                    "column '{}' is listed twice",
                    column.name
                )));
            }
        }

        if self.dimensions.is_empty() {
            return Err(SettingsError::Invalid(
                "at least one partitioning dimension is required".into(),
            ));
        }
        for dim in &self.dimensions {
            match dim.kind {
                DimensionKind::Open if dim.interval.is_none_or(|i| i <= 0) => {
                    return Err(SettingsError::Invalid(format!(
                        "open dimension '{}' needs a positive interval",
                        dim.column
                    )));
                }
                DimensionKind::Closed if dim.partitions.is_none_or(|p| p == 0) => {
                    return Err(SettingsError::Invalid(format!(
                        "closed dimension '{}' needs at least one partition",
                        dim.column
                    )));
                }
                _ => {}
            }
        }

        let specs = self.column_specs()?;
        for dim in self.dimensions.iter().filter(|d| d.is_open()) {
            let declared = specs
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&dim.column));
            if let Some(column) = declared.filter(|c| !c.data_type.is_time_like()) {
                return Err(SettingsError::Invalid(format!(
                    "open dimension '{}' cannot use a column of type {}",
                    dim.column, column.data_type
                )));
            }
        }

        if self.data_nodes.is_empty() {
            return Err(SettingsError::Invalid("no data nodes configured".into()));
        }
        if self.replication_factor == 0 || self.replication_factor > self.data_nodes.len() {
            return Err(SettingsError::Invalid(format!(
                "replication factor {} must be between 1 and the number of data nodes ({})",
                self.replication_factor,
                self.data_nodes.len()
            )));
        }

        if self.batch.max_rows == 0 || self.batch.max_bytes == 0 {
            return Err(SettingsError::Invalid("batch limits must be positive".into()));
        }

        if !self.binary {
            validate_text_options(&self.options)?;
        }
        Ok(())
    }

    pub fn column_specs(&self) -> Result<Vec<ColumnSpec>, SettingsError> {
        self.columns
            .iter()
            .map(|c| {
                DataType::from_postgres_type(&c.type_name)
                    .map(|data_type| ColumnSpec::new(&c.name, data_type))
                    .map_err(|message| SettingsError::UnknownColumnType {
                        column: c.name.clone(),
                        message,
                    })
            })
            .collect()
    }

    /// Text framing for the data node stream; `None` in binary mode.
    pub fn text_format(&self) -> Result<Option<TextFormat>, SettingsError> {
        if self.binary {
            Ok(None)
        } else {
            validate_text_options(&self.options).map(Some)
        }
    }

    pub fn outgoing_command(&self) -> String {
        let columns = self
            .explicit_columns
            .then(|| self.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>());
        deparse_copy_command(&self.table, columns.as_deref(), &self.options, self.binary)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_poll_timeout_ms)
    }
}

fn default_max_rows() -> usize {
    MAX_BATCH_ROWS
}

fn default_max_bytes() -> usize {
    MAX_BATCH_BYTES
}

fn default_replication_factor() -> usize {
    1
}

fn default_principal() -> String {
    "postgres".to_string()
}

fn default_flush_poll_timeout_ms() -> u64 {
    DEFAULT_FLUSH_POLL_TIMEOUT_MS
}
