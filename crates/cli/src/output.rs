use crate::error::CliError;
use engine_processing::session::CopySummary;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CopyReport<'a> {
    pub table: &'a str,
    pub command: &'a str,
    pub out_dir: &'a str,
    pub rows_read: u64,
    #[serde(flatten)]
    pub summary: CopySummary,
}

pub async fn write_report(report: &CopyReport<'_>, path: &str) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub fn print_report(report: &CopyReport<'_>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{json}");
    Ok(())
}
