//! Codes command implementation.

use docsync_engine::ReportCode;
use serde::Serialize;

use super::OutputFormat;

#[derive(Serialize)]
struct CodeRow {
    code: u16,
    name: &'static str,
    severity: docsync_engine::Severity,
}

fn rows() -> Vec<CodeRow> {
    ReportCode::ALL
        .iter()
        .map(|code| CodeRow {
            code: code.code(),
            name: code.as_str(),
            severity: code.severity(),
        })
        .collect()
}

/// Runs the codes command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format: OutputFormat = format.parse()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows())?),
        OutputFormat::Text => {
            println!("{:>5}  {:<8} NAME", "CODE", "SEVERITY");
            for row in rows() {
                let severity = format!("{:?}", row.severity).to_lowercase();
                println!("{:>5}  {severity:<8} {}", row.code, row.name);
            }
        }
    }
    Ok(())
}
