use crate::query::{ast::common::TableRef, dialect::Dialect};

pub mod copy;

/// An AST node that can be written as SQL.
pub trait Render {
    fn render(&self, renderer: &mut Renderer);
}

/// Accumulates SQL text for one statement.
pub struct Renderer<'a> {
    pub sql: String,
    pub dialect: &'a dyn Dialect,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            sql: String::new(),
            dialect,
        }
    }

    pub fn finish(self) -> String {
        self.sql
    }

    pub fn table(&mut self, table: &TableRef) {
        if let Some(schema) = &table.schema {
            self.sql.push_str(&self.dialect.quote_identifier(schema));
            self.sql.push('.');
        }
        self.sql.push_str(&self.dialect.quote_identifier(&table.name));
    }

    /// Writes `(a, b, ...)` with every name quoted except `*`.
    pub fn identifier_list(&mut self, names: &[String]) {
        let quoted: Vec<String> = names
            .iter()
            .map(|name| {
                if name == "*" {
                    name.clone()
                } else {
                    self.dialect.quote_identifier(name)
                }
            })
            .collect();
        self.sql.push('(');
        self.sql.push_str(&quoted.join(", "));
        self.sql.push(')');
    }
}
