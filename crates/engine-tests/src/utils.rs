#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use engine_config::settings::CopySettings;
use engine_core::{
    connectors::file::FileConnectionOpener, partition::InMemoryPartitionIndex,
};
use engine_processing::{
    error::CopyError,
    session::{self, CopySession, CopySummary, IterSource, SessionParams},
};
use model::{
    core::{
        data_type::DataType,
        identifiers::NodeName,
        value::{FieldValue, Value},
    },
    records::row::RowData,
};
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

pub const DAY_MICROS: i64 = 86_400_000_000;
pub const DATA_NODES: [&str; 2] = ["dn1", "dn2"];

/// Settings for the `conditions` hypertable: daily time slices and two
/// device partitions spread over [`DATA_NODES`].
pub fn settings(
    binary: bool,
    replication_factor: usize,
    max_rows: usize,
    options: serde_json::Value,
) -> CopySettings {
    let source = json!({
        "table": { "schema": "public", "name": "conditions" },
        "columns": [
            { "name": "time", "type": "timestamptz" },
            { "name": "device", "type": "text" },
            { "name": "temp", "type": "float8" }
        ],
        "explicit_columns": true,
        "dimensions": [
            { "column": "time", "kind": "open", "interval": DAY_MICROS },
            { "column": "device", "kind": "closed", "partitioning": "hash", "partitions": 2 }
        ],
        "data_nodes": DATA_NODES,
        "replication_factor": replication_factor,
        "binary": binary,
        "options": options,
        "batch": { "max_rows": max_rows }
    });
    CopySettings::from_json(&source.to_string()).expect("valid settings")
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// `per_day` evenly spaced readings per device and day, ordered by time.
pub fn readings(days: i64, per_day: i64, devices: &[&str]) -> Vec<RowData> {
    let step = Duration::hours(24 / per_day);
    let mut rows = Vec::new();
    for day in 0..days {
        for slot in 0..per_day {
            let time = start_time() + Duration::days(day) + step * slot as i32;
            for device in devices {
                rows.push(reading(Some(time), device, 20.5));
            }
        }
    }
    rows
}

pub fn reading(time: Option<DateTime<Utc>>, device: &str, temp: f64) -> RowData {
    RowData::new(
        "conditions",
        vec![
            FieldValue::new("time", time.map(Value::Timestamp), DataType::Timestamp),
            FieldValue::new(
                "device",
                Some(Value::String(device.to_string())),
                DataType::String,
            ),
            FieldValue::new("temp", Some(Value::Float(temp)), DataType::Double),
        ],
    )
}

/// Runs a full copy into `out_dir` through the file transport.
pub async fn run_copy(
    settings: &CopySettings,
    rows: Vec<RowData>,
    out_dir: &Path,
) -> Result<CopySummary, CopyError> {
    let index = InMemoryPartitionIndex::new(
        settings.dimensions.clone(),
        settings.data_nodes.iter().map(NodeName::new).collect(),
        settings.replication_factor,
    );
    let opener = FileConnectionOpener::new(out_dir);
    let params = SessionParams::from_settings(settings, Arc::new(index), Arc::new(opener))?;

    let copy = CopySession::begin(params)?;
    session::run(copy, &mut IterSource::new(rows)).await
}

/// COPY segment files written for `node`, in cycle order.
pub fn segments(dir: &Path, node: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let prefix = format!("{node}.");
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".copy"))
        })
        .collect();
    paths.sort();
    paths
}

/// All text received by `node`, segments concatenated.
pub fn node_text(dir: &Path, node: &str) -> String {
    segments(dir, node)
        .iter()
        .map(|p| fs::read_to_string(p).expect("readable segment"))
        .collect()
}

pub fn total_lines(dir: &Path) -> usize {
    DATA_NODES
        .iter()
        .map(|node| node_text(dir, node).lines().count())
        .sum()
}

pub fn command_log(dir: &Path, node: &str) -> String {
    fs::read_to_string(dir.join(format!("{node}.commands.log"))).unwrap_or_default()
}
