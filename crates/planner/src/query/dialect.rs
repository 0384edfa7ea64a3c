/// Identifier and literal quoting of the target database.
pub trait Dialect: Send + Sync {
    fn quote_identifier(&self, ident: &str) -> String;

    fn quote_literal(&self, literal: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_literal(&self, literal: &str) -> String {
        format!("'{}'", literal.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_quotes_are_doubled() {
        assert_eq!(Postgres.quote_identifier(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(Postgres.quote_literal("it's"), "'it''s'");
    }
}
