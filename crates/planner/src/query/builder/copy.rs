use crate::query::ast::{
    common::TableRef,
    copy::{CopyFrom, CopyOption, OptionValue},
};

#[derive(Debug, Clone)]
pub struct CopyFromBuilder {
    ast: CopyFrom,
}

impl CopyFromBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            ast: CopyFrom {
                table,
                columns: Vec::new(),
                options: Vec::new(),
            },
        }
    }

    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.ast.columns = columns.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn option(mut self, name: &str, value: OptionValue) -> Self {
        self.ast.options.push(CopyOption {
            name: name.to_string(),
            value,
        });
        self
    }

    pub fn flag(self, name: &str) -> Self {
        self.option(name, OptionValue::Flag)
    }

    pub fn word(self, name: &str, word: &str) -> Self {
        self.option(name, OptionValue::Word(word.to_string()))
    }

    pub fn literal(self, name: &str, literal: &str) -> Self {
        self.option(name, OptionValue::Literal(literal.to_string()))
    }

    pub fn build(self) -> CopyFrom {
        self.ast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_option_order() {
        let copy = CopyFromBuilder::new(TableRef::new(Some("public"), "conditions"))
            .columns(&["time", "device"])
            .literal("delimiter", ",")
            .flag("freeze")
            .word("format", "csv")
            .build();

        assert_eq!(copy.columns, vec!["time", "device"]);
        let names: Vec<_> = copy.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["delimiter", "freeze", "format"]);
        assert_eq!(copy.options[1].value, OptionValue::Flag);
    }
}
