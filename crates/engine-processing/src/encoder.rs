use crate::error::CopyError;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use engine_config::settings::options::{CsvQuoting, TextFormat};
use model::{
    core::{
        data_type::DataType,
        utils::{encode_bytea, escape_copy_text},
        value::Value,
    },
    partition::{Dimension, Point},
    records::{column::ColumnSpec, row::RowData},
};
use uuid::Uuid;

/// Days between 1970-01-01 and the Postgres epoch 2000-01-01.
const PG_EPOCH_DAYS: i64 = 10_957;
const PG_EPOCH_MICROS: i64 = PG_EPOCH_DAYS * 86_400_000_000;

/// 2^63: whole floats in `[-2^63, 2^63)` convert to `i64` without saturating.
const I64_FLOAT_BOUND: f64 = 9_223_372_036_854_775_808.0;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingFormat {
    Text(TextFormat),
    Binary,
}

impl EncodingFormat {
    pub fn is_binary(&self) -> bool {
        matches!(self, EncodingFormat::Binary)
    }
}

/// A row in wire form together with its partition coordinates.
#[derive(Debug, Clone)]
pub struct EncodedRow {
    pub data: Bytes,
    pub point: Point,
}

#[derive(Debug, Clone)]
struct BoundDimension {
    dimension: Dimension,
    column: usize,
}

/// Turns source rows into COPY rows for the target column list.
#[derive(Debug, Clone)]
pub struct RowEncoder {
    columns: Vec<ColumnSpec>,
    dimensions: Vec<BoundDimension>,
    format: EncodingFormat,
}

impl RowEncoder {
    /// Binds every dimension to its position in `columns`.
    ///
    /// Fails when a dimension column is not part of the column list, since
    /// the data nodes would fill it with a default value.
    pub fn new(
        columns: Vec<ColumnSpec>,
        dimensions: &[Dimension],
        format: EncodingFormat,
    ) -> Result<Self, CopyError> {
        let dimensions = dimensions
            .iter()
            .map(|dimension| {
                columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(&dimension.column))
                    .map(|column| BoundDimension {
                        dimension: dimension.clone(),
                        column,
                    })
                    .ok_or_else(|| CopyError::PartitioningViolation {
                        column: dimension.column.clone(),
                        message: "unable to use default value for partitioning column".into(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns,
            dimensions,
            format,
        })
    }

    pub fn encode(&self, row: &RowData) -> Result<EncodedRow, CopyError> {
        let values = self
            .columns
            .iter()
            .map(|column| {
                let value = row.get_value(&column.name);
                if value.is_null() {
                    return Ok(None);
                }
                coerce(value, &column.data_type)
                    .map(Some)
                    .map_err(|message| CopyError::FieldConversion {
                        column: column.name.clone(),
                        message,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let point = self.point_for(&values)?;
        let data = match &self.format {
            EncodingFormat::Text(text) => self.encode_text(&values, text),
            EncodingFormat::Binary => self.encode_binary(&values)?,
        };

        Ok(EncodedRow { data, point })
    }

    fn point_for(&self, values: &[Option<Value>]) -> Result<Point, CopyError> {
        self.dimensions
            .iter()
            .map(|bound| {
                let column = &bound.dimension.column;
                let value = values[bound.column].as_ref();
                if bound.dimension.is_open() {
                    let value = value.ok_or_else(|| CopyError::PartitioningViolation {
                        column: column.clone(),
                        message: "columns used for time partitioning cannot be NULL".into(),
                    })?;
                    normalize_time(value).ok_or_else(|| CopyError::PartitioningViolation {
                        column: column.clone(),
                        message: format!("cannot use '{value}' as a time coordinate"),
                    })
                } else {
                    closed_coordinate(&bound.dimension, value).ok_or_else(|| {
                        CopyError::PartitioningViolation {
                            column: column.clone(),
                            message: "value does not fit a 32-bit partition key".into(),
                        }
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Point::new)
    }

    fn encode_text(&self, values: &[Option<Value>], format: &TextFormat) -> Bytes {
        let mut line = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                line.push(format.delimiter);
            }
            match value {
                None => line.push_str(&format.null_string),
                Some(value) => {
                    let text = text_value(value);
                    match format.csv {
                        Some(quoting) => push_csv_field(&mut line, &text, format, quoting),
                        None => line.push_str(&escape_copy_text(&text, format.delimiter)),
                    }
                }
            }
        }
        line.push('\n');
        Bytes::from(line)
    }

    fn encode_binary(&self, values: &[Option<Value>]) -> Result<Bytes, CopyError> {
        let mut buf = BytesMut::new();
        buf.put_u16(values.len() as u16);

        for (column, value) in self.columns.iter().zip(values) {
            let Some(value) = value else {
                buf.put_i32(-1);
                continue;
            };
            let field = binary_value(value, &column.data_type).map_err(|message| {
                CopyError::FieldConversion {
                    column: column.name.clone(),
                    message,
                }
            })?;
            buf.put_u32(field.len() as u32);
            buf.put_slice(&field);
        }

        Ok(buf.freeze())
    }
}

/// Converts a non-NULL value to the representation of `target`.
fn coerce(value: Value, target: &DataType) -> Result<Value, String> {
    let mismatch = |value: &Value| format!("cannot convert '{value}' to {target}");

    match target {
        DataType::Short | DataType::Int | DataType::Long => {
            let int = match &value {
                Value::Float(f)
                    if f.fract() == 0.0 && (-I64_FLOAT_BOUND..I64_FLOAT_BOUND).contains(f) =>
                {
                    Some(*f as i64)
                }
                Value::Float(_) => None,
                other => other.as_i64(),
            }
            .ok_or_else(|| mismatch(&value))?;
            let fits = match target {
                DataType::Short => i16::try_from(int).is_ok(),
                DataType::Int => i32::try_from(int).is_ok(),
                _ => true,
            };
            if !fits {
                return Err(format!("value {int} is out of range for {target}"));
            }
            Ok(Value::Int(int))
        }
        DataType::Float | DataType::Double => value
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| mismatch(&value)),
        DataType::Boolean => value
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| mismatch(&value)),
        DataType::VarChar | DataType::Char | DataType::String => match value {
            Value::String(_) => Ok(value),
            other => Ok(Value::String(text_value(&other))),
        },
        DataType::Json => match value {
            Value::Json(_) => Ok(value),
            Value::String(s) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|e| format!("invalid json: {e}")),
            Value::Int(i) => Ok(Value::Json(i.into())),
            Value::Float(f) => Ok(Value::Json(f.into())),
            Value::Boolean(b) => Ok(Value::Json(b.into())),
            other => Err(mismatch(&other)),
        },
        DataType::Uuid => match value {
            Value::Uuid(_) => Ok(value),
            Value::String(s) => Uuid::parse_str(s.trim())
                .map(Value::Uuid)
                .map_err(|e| format!("invalid uuid: {e}")),
            other => Err(mismatch(&other)),
        },
        DataType::Bytea => match value {
            Value::Bytes(_) => Ok(value),
            Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(mismatch(&other)),
        },
        DataType::Date => match value {
            Value::Date(_) => Ok(value),
            Value::Timestamp(ts) => Ok(Value::Date(ts.date_naive())),
            Value::String(s) => parse_timestamp(&s)
                .map(|ts| Value::Date(ts.date_naive()))
                .ok_or_else(|| format!("invalid date '{s}'")),
            other => Err(mismatch(&other)),
        },
        DataType::Timestamp => match value {
            Value::Timestamp(_) => Ok(value),
            Value::Date(d) => Ok(Value::Timestamp(midnight(d))),
            Value::String(s) => parse_timestamp(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("invalid timestamp '{s}'")),
            Value::Int(micros) => DateTime::from_timestamp_micros(micros)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("timestamp {micros} is out of range")),
            other => Err(mismatch(&other)),
        },
        DataType::Null => Err(mismatch(&value)),
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(ts) = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
    {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(midnight)
}

/// Maps a time-like value to microseconds since the Unix epoch.
fn normalize_time(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::Timestamp(ts) => Some(ts.timestamp_micros()),
        Value::Date(d) => Some(midnight(*d).timestamp_micros()),
        Value::String(s) => parse_timestamp(s).map(|ts| ts.timestamp_micros()),
        _ => None,
    }
}

fn closed_coordinate(dimension: &Dimension, value: Option<&Value>) -> Option<i64> {
    let Some(value) = value else {
        return Some(0);
    };
    match dimension.partitioning {
        Some(func) => Some(i64::from(func.apply(value))),
        None => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(i64::from),
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::Float(f) if f.is_finite() => ryu::Buffer::new().format_finite(*f).to_string(),
        Value::Float(f) if f.is_nan() => "NaN".to_string(),
        Value::Float(f) if *f > 0.0 => "Infinity".to_string(),
        Value::Float(_) => "-Infinity".to_string(),
        Value::Boolean(b) => (if *b { "t" } else { "f" }).to_string(),
        Value::Bytes(b) => encode_bytea(b),
        Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::Micros, true),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn push_csv_field(out: &mut String, text: &str, format: &TextFormat, quoting: CsvQuoting) {
    let CsvQuoting { quote, escape } = quoting;
    let needs_quotes = text.is_empty()
        || text == format.null_string
        || text
            .chars()
            .any(|c| c == format.delimiter || c == quote || c == '\n' || c == '\r');
    if !needs_quotes {
        out.push_str(text);
        return;
    }

    out.push(quote);
    for c in text.chars() {
        if c == quote || (c == escape && escape != quote) {
            out.push(escape);
        }
        out.push(c);
    }
    out.push(quote);
}

/// Binary send form of a value already coerced to `data_type`.
fn binary_value(value: &Value, data_type: &DataType) -> Result<Vec<u8>, String> {
    let unexpected = || format!("cannot send '{value}' as {data_type}");

    let bytes = match (data_type, value) {
        (DataType::Short, Value::Int(v)) => (*v as i16).to_be_bytes().to_vec(),
        (DataType::Int, Value::Int(v)) => (*v as i32).to_be_bytes().to_vec(),
        (DataType::Long, Value::Int(v)) => v.to_be_bytes().to_vec(),
        (DataType::Float, Value::Float(v)) => (*v as f32).to_be_bytes().to_vec(),
        (DataType::Double, Value::Float(v)) => v.to_be_bytes().to_vec(),
        (DataType::Boolean, Value::Boolean(v)) => vec![u8::from(*v)],
        (DataType::VarChar | DataType::Char | DataType::String, Value::String(s)) => {
            s.as_bytes().to_vec()
        }
        (DataType::Json, Value::Json(j)) => j.to_string().into_bytes(),
        (DataType::Uuid, Value::Uuid(u)) => u.as_bytes().to_vec(),
        (DataType::Bytea, Value::Bytes(b)) => b.clone(),
        (DataType::Date, Value::Date(d)) => {
            let days = midnight(*d).timestamp().div_euclid(86_400) - PG_EPOCH_DAYS;
            i32::try_from(days).map_err(|_| unexpected())?.to_be_bytes().to_vec()
        }
        (DataType::Timestamp, Value::Timestamp(ts)) => {
            (ts.timestamp_micros() - PG_EPOCH_MICROS).to_be_bytes().to_vec()
        }
        _ => return Err(unexpected()),
    };
    match data_type.binary_width() {
        Some(width) if width != bytes.len() => Err(unexpected()),
        _ => Ok(bytes),
    }
}
