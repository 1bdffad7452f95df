//! HTML report output

use std::fmt::Write;

use crate::scan::ScanReport;

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render(report: &ScanReport, show_all: bool) -> String {
    let visible = report.visible_threats(show_all);
    let mut rows = String::new();
    for threat in &visible {
        let location = match threat.line_number {
            Some(line) => format!("{}:{line}", threat.file_path),
            None => threat.file_path.clone(),
        };
        let _ = write!(
            rows,
            "<tr class=\"sev-{}\"><td>{}</td><td>{}</td><td><code>{}</code></td><td>{}</td></tr>",
            threat.severity.to_string().to_lowercase(),
            threat.severity,
            escape(&threat.kind.rule_id()),
            escape(&location),
            escape(&threat.message),
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>NullVoid Scan Report — {target}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 0.4rem 0.6rem; text-align: left; }}
tr.sev-critical td:first-child {{ color: #c0392b; font-weight: bold; }}
tr.sev-high td:first-child {{ color: #e67e22; font-weight: bold; }}
tr.sev-medium td:first-child {{ color: #b7950b; }}
tr.sev-low td:first-child {{ color: #27ae60; }}
</style>
</head>
<body>
<h1>NullVoid Scan Report</h1>
<p><strong>Target:</strong> <code>{target}</code> — scanned {scan_time}</p>
<p>{threats} threat(s) across {files} file(s) and {packages} package(s);
overall risk {risk:.2}</p>
<table>
<thead><tr><th>Severity</th><th>Type</th><th>Location</th><th>Message</th></tr></thead>
<tbody>{rows}</tbody>
</table>
</body>
</html>
"#,
        target = escape(&report.metadata.target),
        scan_time = escape(&report.metadata.scan_time),
        threats = report.summary.threats_found,
        files = report.summary.total_files,
        packages = report.summary.total_packages,
        risk = report.risk_assessment.overall,
        rows = rows,
    )
}
