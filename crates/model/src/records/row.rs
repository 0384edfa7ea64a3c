use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// One source row destined for the partitioned table. Fields are looked up
/// by name, case-insensitively, so the source may order them freely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowData {
    pub entity: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(entity: impl Into<String>, field_values: Vec<FieldValue>) -> Self {
        Self {
            entity: entity.into(),
            field_values,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Missing fields and SQL NULLs both read as `Value::Null`.
    pub fn get_value(&self, name: &str) -> Value {
        self.field(name)
            .and_then(FieldValue::non_null)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn push(&mut self, field: FieldValue) {
        self.field_values.push(field);
    }

    pub fn len(&self) -> usize {
        self.field_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_values.is_empty()
    }
}
