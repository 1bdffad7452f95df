//! Report writers
//!
//! Thin rendering layer over the finished `ScanReport`. Every writer is a
//! pure `report -> String` function; the scan core never formats.

mod html;
mod json;
mod markdown;
mod sarif;
mod table;

use clap::ValueEnum;

use crate::scan::ScanReport;

pub use markdown::ComplianceFramework;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Table,
    Yaml,
    Sarif,
    Markdown,
    Html,
}

/// Render `report` in the requested format.
pub fn render(
    report: &ScanReport,
    format: OutputFormat,
    show_all: bool,
    compliance: Option<ComplianceFramework>,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => json::render(report),
        OutputFormat::Table => Ok(table::render(report, show_all)),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(report)?),
        OutputFormat::Sarif => sarif::render(report),
        OutputFormat::Markdown => Ok(markdown::render(report, show_all, compliance)),
        OutputFormat::Html => Ok(html::render(report, show_all)),
    }
}
