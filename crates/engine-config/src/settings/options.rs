use crate::settings::error::SettingsError;
use planner::copy_command::{CopyOptionArg, CopyOptionSpec};

pub const DEFAULT_DELIMITER: char = '\t';
pub const DEFAULT_NULL_STRING: &str = "\\N";
pub const DEFAULT_CSV_DELIMITER: char = ',';
pub const DEFAULT_CSV_QUOTE: char = '"';

/// Framing of text rows sent to the data nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFormat {
    pub delimiter: char,
    pub null_string: String,
    pub csv: Option<CsvQuoting>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvQuoting {
    pub quote: char,
    pub escape: char,
}

impl Default for TextFormat {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            null_string: DEFAULT_NULL_STRING.to_string(),
            csv: None,
        }
    }
}

/// Derives the text framing from the statement's COPY options.
///
/// Postgres defaults apply (tab, `\N`); `format csv` switches to a comma
/// and an empty NULL marker unless those were given explicitly. The delimiter and NULL marker are
/// reused for the data node stream since they cannot conflict with the data.
pub fn validate_text_options(options: &[CopyOptionSpec]) -> Result<TextFormat, SettingsError> {
    let mut format = TextFormat::default();
    let mut delimiter_found = false;
    let mut null_found = false;
    let mut quote = None;
    let mut escape = None;

    for option in options {
        match option.name.to_lowercase().as_str() {
            "format" => {
                let fmt = required_string(option)?.to_lowercase();
                match fmt.as_str() {
                    "binary" => return Err(SettingsError::BinaryFormatNotSupported),
                    "csv" => {
                        if !delimiter_found {
                            format.delimiter = DEFAULT_CSV_DELIMITER;
                        }
                        format.csv = Some(CsvQuoting {
                            quote: DEFAULT_CSV_QUOTE,
                            escape: DEFAULT_CSV_QUOTE,
                        });
                    }
                    "text" => {}
                    other => {
                        return Err(SettingsError::InvalidOption {
                            option: option.name.clone(),
                            message: format!("unknown format '{other}'"),
                        });
                    }
                }
            }
            "delimiter" => {
                format.delimiter = single_char(option)?;
                delimiter_found = true;
            }
            "null" => {
                format.null_string = required_string(option)?;
                null_found = true;
            }
            "quote" => quote = Some(single_char(option)?),
            "escape" => escape = Some(single_char(option)?),
            _ => {}
        }
    }

    if let Some(csv) = format.csv.as_mut() {
        if !null_found {
            format.null_string.clear();
        }
        if let Some(q) = quote {
            csv.quote = q;
            csv.escape = q;
        }
        if let Some(e) = escape {
            csv.escape = e;
        }
    }

    Ok(format)
}

fn required_string(option: &CopyOptionSpec) -> Result<String, SettingsError> {
    match &option.arg {
        Some(CopyOptionArg::String(s)) => Ok(s.clone()),
        Some(CopyOptionArg::Integer(v)) => Ok(v.to_string()),
        Some(CopyOptionArg::Float(v)) => Ok(v.to_string()),
        _ => Err(SettingsError::InvalidOption {
            option: option.name.clone(),
            message: "requires a parameter".to_string(),
        }),
    }
}

fn single_char(option: &CopyOptionSpec) -> Result<char, SettingsError> {
    let value = required_string(option)?;
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(SettingsError::InvalidOption {
            option: option.name.clone(),
            message: "must be a single one-byte character".to_string(),
        }),
    }
}
