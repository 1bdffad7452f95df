//! JSON report output

use crate::scan::ScanReport;

pub fn render(report: &ScanReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
