use crate::query::ast::common::TableRef;

/// `COPY <table> [(<columns>)] FROM STDIN [WITH (<options>)]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyFrom {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub options: Vec<CopyOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOption {
    pub name: String,
    pub value: OptionValue,
}

/// How an option argument is written after the option name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// No argument, e.g. `freeze`.
    Flag,
    /// Unquoted keyword or number, e.g. `format csv`.
    Word(String),
    /// String literal, e.g. `delimiter ','`.
    Literal(String),
    /// Parenthesized column list, e.g. `force_null ("a", "b")`. `*` stays bare.
    Columns(Vec<String>),
}
