use std::fmt::Write;

/// Escapes a value for the Postgres text COPY format.
///
/// Backslash, the row/field separators and NUL are written as backslash
/// sequences. A delimiter other than tab is escaped as `\<delimiter>`.
pub fn escape_copy_text(value: &str, delimiter: char) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => escaped.push_str(r"\n"),
            '\r' => escaped.push_str(r"\r"),
            '\t' => escaped.push_str(r"\t"),
            '\\' => escaped.push_str(r"\\"),
            '\0' => escaped.push_str(r"\000"),
            c if c == delimiter => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn encode_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + 2 * bytes.len());
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_copy_text_escapes_delimiter_and_controls() {
        assert_eq!(escape_copy_text("a,b", ','), r"a\,b");
        assert_eq!(escape_copy_text("line\nbreak\t", ','), r"line\nbreak\t");
        assert_eq!(escape_copy_text(r"back\slash", '\t'), r"back\\slash");
    }

    #[test]
    fn test_encode_bytea() {
        assert_eq!(encode_bytea(&[0xde, 0xad, 0x01]), "\\xdead01");
    }
}
