//! Table report output

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use owo_colors::OwoColorize;

use crate::cli::style;
use crate::core::Severity;
use crate::scan::ScanReport;

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::DarkYellow,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Green,
    }
}

pub fn render(report: &ScanReport, show_all: bool) -> String {
    let use_color = style::colors_enabled();
    let visible = report.visible_threats(show_all);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Severity", "Type", "Location", "Message"]);

    for threat in &visible {
        let location = match threat.line_number {
            Some(line) => format!("{}:{line}", threat.file_path),
            None => threat.file_path.clone(),
        };
        let severity_cell = if use_color {
            Cell::new(threat.severity.to_string()).fg(severity_color(threat.severity))
        } else {
            Cell::new(threat.severity.to_string())
        };
        table.add_row(vec![
            severity_cell,
            Cell::new(threat.kind.rule_id()),
            Cell::new(location),
            Cell::new(&threat.message),
        ]);
    }

    let summary_line = format!(
        "{} threat(s) across {} file(s), {} package(s) in {} ms — overall risk {:.2}",
        report.summary.threats_found,
        report.summary.total_files,
        report.summary.total_packages,
        report.summary.scan_duration,
        report.risk_assessment.overall,
    );
    let summary_line = if use_color && report.exit_code() == 1 {
        summary_line.red().bold().to_string()
    } else {
        summary_line
    };

    if visible.is_empty() {
        format!("No threats to display.\n\n{summary_line}\n")
    } else {
        format!("{table}\n\n{summary_line}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::sample_report;

    #[test]
    fn test_table_lists_threats_and_summary() {
        let rendered = super::render(&sample_report(), true);
        assert!(rendered.contains("WALLET_HIJACKING"));
        assert!(rendered.contains("index.js:12"));
        assert!(rendered.contains("2 threat(s)"));
    }

    #[test]
    fn test_table_filters_without_all() {
        let rendered = super::render(&sample_report(), false);
        assert!(!rendered.contains("HIGH_ENTROPY"));
    }
}
