//! Builds the `COPY ... FROM STDIN` command sent to every data node.

use crate::query::{
    ast::{common::TableRef, copy::OptionValue},
    builder::copy::CopyFromBuilder,
    dialect::Postgres,
    renderer::{Render, Renderer},
};
use serde::{Deserialize, Serialize};

/// Argument of a user-supplied COPY option, kept in its parsed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CopyOptionArg {
    Integer(i64),
    Float(f64),
    String(String),
    Columns(Vec<String>),
}

impl CopyOptionArg {
    /// The argument as plain text; column lists are joined with `, `.
    pub fn as_text(&self) -> String {
        match self {
            CopyOptionArg::Integer(v) => v.to_string(),
            CopyOptionArg::Float(v) => v.to_string(),
            CopyOptionArg::String(s) => s.clone(),
            CopyOptionArg::Columns(cols) => cols.join(", "),
        }
    }

    fn column_names(&self) -> Vec<String> {
        match self {
            CopyOptionArg::Columns(cols) => cols.clone(),
            other => vec![other.as_text()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyOptionSpec {
    pub name: String,
    #[serde(default)]
    pub arg: Option<CopyOptionArg>,
}

impl CopyOptionSpec {
    pub fn new(name: &str, arg: Option<CopyOptionArg>) -> Self {
        Self {
            name: name.to_lowercase(),
            arg,
        }
    }

    pub fn string(name: &str, value: &str) -> Self {
        Self::new(name, Some(CopyOptionArg::String(value.to_string())))
    }

    pub fn flag(name: &str) -> Self {
        Self::new(name, None)
    }

    fn value(&self, name: &str) -> OptionValue {
        match &self.arg {
            None => OptionValue::Flag,
            Some(CopyOptionArg::String(v))
                if BARE_BOOLEAN_OPTIONS.contains(&name)
                    && matches!(v.to_lowercase().as_str(), "true" | "on") =>
            {
                OptionValue::Flag
            }
            Some(arg) if QUOTED_OPTIONS.contains(&name) => OptionValue::Literal(arg.as_text()),
            Some(arg) if COLUMN_LIST_OPTIONS.contains(&name) => {
                OptionValue::Columns(arg.column_names())
            }
            Some(arg) => OptionValue::Word(arg.as_text()),
        }
    }
}

/// Options a binary COPY accepts; everything else is text-only.
pub fn is_supported_binary_option(option: &str) -> bool {
    matches!(option, "oids" | "freeze" | "encoding")
}

const QUOTED_OPTIONS: [&str; 5] = ["delimiter", "null", "quote", "escape", "encoding"];
const COLUMN_LIST_OPTIONS: [&str; 2] = ["force_not_null", "force_null"];
const BARE_BOOLEAN_OPTIONS: [&str; 2] = ["oids", "freeze"];

/// Deparses the data node COPY command for `table`.
///
/// `columns` is the explicit column list of the incoming statement, if any.
/// `header` is never forwarded since the encoded stream has no header line.
/// In binary mode text-only options are dropped and `FORMAT binary` is
/// appended.
pub fn deparse_copy_command(
    table: &TableRef,
    columns: Option<&[String]>,
    options: &[CopyOptionSpec],
    binary: bool,
) -> String {
    let mut builder = CopyFromBuilder::new(table.clone());
    if let Some(columns) = columns {
        builder = builder.columns(columns);
    }

    for option in options {
        let name = option.name.to_lowercase();
        if name == "header" || (binary && !is_supported_binary_option(&name)) {
            continue;
        }
        let value = option.value(&name);
        builder = builder.option(&name, value);
    }

    if binary {
        builder = builder.word("FORMAT", "binary");
    }

    let mut renderer = Renderer::new(&Postgres);
    builder.build().render(&mut renderer);
    renderer.finish()
}
