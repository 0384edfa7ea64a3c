use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Column types the row encoder can coerce to and send.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Null,
    Date,
    Timestamp,
    VarChar,
    Char,
    String,
    Json,
    Uuid,
    Bytea,
}

lazy_static! {
    /// Catalog spellings, upper-cased, grouped by the type they resolve to.
    static ref TYPE_ALIASES: HashMap<&'static str, DataType> = {
        let groups: [(DataType, &[&'static str]); 14] = [
            (DataType::Boolean, &["BOOLEAN", "BOOL"]),
            (DataType::Short, &["SMALLINT", "INT2"]),
            (DataType::Int, &["INTEGER", "INT", "INT4"]),
            (DataType::Long, &["BIGINT", "INT8"]),
            (DataType::Float, &["REAL", "FLOAT4"]),
            (DataType::Double, &["DOUBLE PRECISION", "FLOAT8"]),
            (DataType::Json, &["JSON", "JSONB"]),
            (DataType::String, &["TEXT", "NAME"]),
            (DataType::VarChar, &["VARCHAR", "CHARACTER VARYING"]),
            (DataType::Char, &["CHAR", "CHARACTER", "BPCHAR"]),
            (DataType::Bytea, &["BYTEA"]),
            (DataType::Uuid, &["UUID"]),
            (DataType::Date, &["DATE"]),
            (
                DataType::Timestamp,
                &[
                    "TIMESTAMPTZ",
                    "TIMESTAMP",
                    "TIMESTAMP WITH TIME ZONE",
                    "TIMESTAMP WITHOUT TIME ZONE",
                ],
            ),
        ];
        groups
            .into_iter()
            .flat_map(|(ty, names)| names.iter().map(move |name| (*name, ty)))
            .collect()
    };
}

impl DataType {
    pub fn from_postgres_type(type_name: &str) -> Result<Self, String> {
        let key = type_name.trim().to_ascii_uppercase();
        TYPE_ALIASES
            .get(key.as_str())
            .copied()
            .ok_or_else(|| format!("Unknown Postgres column type: {type_name}"))
    }

    pub fn postgres_name(&self) -> &'static str {
        match self {
            DataType::Short => "SMALLINT",
            DataType::Int => "INTEGER",
            DataType::Long => "BIGINT",
            DataType::Float => "REAL",
            DataType::Double => "DOUBLE PRECISION",
            DataType::Boolean => "BOOLEAN",
            DataType::Null => "NULL",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMPTZ",
            DataType::VarChar => "VARCHAR",
            DataType::Char => "CHAR",
            DataType::String => "TEXT",
            DataType::Json => "JSON",
            DataType::Uuid => "UUID",
            DataType::Bytea => "BYTEA",
        }
    }

    /// Integer and temporal types; only these can carry an open dimension.
    pub fn is_time_like(&self) -> bool {
        matches!(
            self,
            DataType::Short | DataType::Int | DataType::Long | DataType::Date | DataType::Timestamp
        )
    }

    /// Length of the binary send form for fixed-width types.
    pub fn binary_width(&self) -> Option<usize> {
        match self {
            DataType::Boolean => Some(1),
            DataType::Short => Some(2),
            DataType::Int | DataType::Float | DataType::Date => Some(4),
            DataType::Long | DataType::Double | DataType::Timestamp => Some(8),
            DataType::Uuid => Some(16),
            _ => None,
        }
    }
}

impl TryFrom<&str> for DataType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        DataType::from_postgres_type(s)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.postgres_name())
    }
}
