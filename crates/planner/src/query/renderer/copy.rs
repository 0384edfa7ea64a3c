use crate::query::{
    ast::copy::{CopyFrom, OptionValue},
    renderer::{Render, Renderer},
};

impl Render for CopyFrom {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("COPY ");
        r.table(&self.table);

        if !self.columns.is_empty() {
            r.sql.push(' ');
            r.identifier_list(&self.columns);
        }
        r.sql.push_str(" FROM STDIN");

        if self.options.is_empty() {
            return;
        }

        r.sql.push_str(" WITH (");
        for (i, option) in self.options.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            r.sql.push_str(&option.name);
            match &option.value {
                OptionValue::Flag => {}
                OptionValue::Word(word) => {
                    r.sql.push(' ');
                    r.sql.push_str(word);
                }
                OptionValue::Literal(literal) => {
                    r.sql.push(' ');
                    let quoted = r.dialect.quote_literal(literal);
                    r.sql.push_str(&quoted);
                }
                OptionValue::Columns(columns) => {
                    r.sql.push(' ');
                    r.identifier_list(columns);
                }
            }
        }
        r.sql.push(')');
    }
}
