use async_trait::async_trait;
use engine_processing::{error::CopyError, session::RowSource};
use model::{
    core::value::{FieldValue, Value},
    records::{column::ColumnSpec, row::RowData},
};
use std::fs::File;

/// Reads rows from a CSV file with a header row.
///
/// Cells are handed over as strings and converted by the encoder; empty cells
/// are NULL. Header names are matched to the target columns
/// case-insensitively and unknown headers are ignored.
pub struct CsvRowSource {
    entity: String,
    records: csv::StringRecordsIntoIter<File>,
    /// Target column and its position in each record.
    mapping: Vec<(ColumnSpec, usize)>,
    rows_read: u64,
}

impl CsvRowSource {
    pub fn open(
        path: &str,
        delimiter: u8,
        entity: &str,
        columns: &[ColumnSpec],
    ) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let mapping = columns
            .iter()
            .filter_map(|column| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(&column.name))
                    .map(|ordinal| (column.clone(), ordinal))
            })
            .collect();

        Ok(Self {
            entity: entity.to_string(),
            records: reader.into_records(),
            mapping,
            rows_read: 0,
        })
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}

#[async_trait]
impl RowSource for CsvRowSource {
    async fn next_row(&mut self) -> Result<Option<RowData>, CopyError> {
        let Some(record) = self.records.next() else {
            return Ok(None);
        };
        let record = record.map_err(|e| CopyError::Source(Box::new(e)))?;
        self.rows_read += 1;

        let fields = self
            .mapping
            .iter()
            .map(|(column, ordinal)| {
                let value = record
                    .get(*ordinal)
                    .filter(|cell| !cell.is_empty())
                    .map(|cell| Value::String(cell.to_string()));
                FieldValue::new(&column.name, value, column.data_type)
            })
            .collect();

        Ok(Some(RowData::new(&self.entity, fields)))
    }
}
