//! Markdown report output

use std::fmt::Write;

use clap::ValueEnum;

use crate::cli::style::severity_emoji;
use crate::core::{Threat, ThreatKind};
use crate::scan::ScanReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ComplianceFramework {
    #[value(name = "soc2")]
    Soc2,
    #[value(name = "iso27001")]
    Iso27001,
}

/// Controls and the threat types they cover, per framework.
fn controls(framework: ComplianceFramework) -> Vec<(&'static str, Vec<ThreatKind>)> {
    match framework {
        ComplianceFramework::Soc2 => vec![
            (
                "CC6.1 Logical access controls",
                vec![ThreatKind::PathTraversal, ThreatKind::CommandInjection],
            ),
            (
                "CC6.8 Unauthorized software detection",
                vec![
                    ThreatKind::ObfuscatedCode,
                    ThreatKind::MaliciousCodeStructure,
                    ThreatKind::WalletHijacking,
                    ThreatKind::SuspiciousModule,
                ],
            ),
            (
                "CC7.1 Vulnerability management",
                vec![ThreatKind::VulnerablePackage],
            ),
            (
                "CC9.2 Vendor risk management",
                vec![
                    ThreatKind::DependencyConfusionTimeline,
                    ThreatKind::DependencyConfusionScope,
                    ThreatKind::DependencyConfusionPattern,
                ],
            ),
        ],
        ComplianceFramework::Iso27001 => vec![
            (
                "A.8.8 Management of technical vulnerabilities",
                vec![ThreatKind::VulnerablePackage],
            ),
            (
                "A.8.28 Secure coding",
                vec![
                    ThreatKind::ObfuscatedCode,
                    ThreatKind::MaliciousCodeStructure,
                    ThreatKind::DynamicRequire,
                ],
            ),
            (
                "A.5.19 Supplier relationships",
                vec![
                    ThreatKind::DependencyConfusionTimeline,
                    ThreatKind::DependencyConfusionScope,
                    ThreatKind::DependencyConfusionActivity,
                ],
            ),
            (
                "A.8.7 Protection against malware",
                vec![ThreatKind::WalletHijacking, ThreatKind::SuspiciousModule],
            ),
        ],
    }
}

pub fn render(
    report: &ScanReport,
    show_all: bool,
    compliance: Option<ComplianceFramework>,
) -> String {
    let mut out = String::new();
    let visible = report.visible_threats(show_all);

    let _ = writeln!(out, "# NullVoid Scan Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Target:** `{}`", report.metadata.target);
    let _ = writeln!(out, "- **Scanned:** {}", report.metadata.scan_time);
    let _ = writeln!(
        out,
        "- **Files / Packages:** {} / {}",
        report.summary.total_files, report.summary.total_packages
    );
    let _ = writeln!(
        out,
        "- **Duration:** {} ms",
        report.summary.scan_duration
    );
    let _ = writeln!(out);

    let risk = &report.risk_assessment;
    let _ = writeln!(out, "## Risk Assessment");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Overall | Confidentiality | Integrity | Availability |");
    let _ = writeln!(out, "|---------|-----------------|-----------|--------------|");
    let _ = writeln!(
        out,
        "| {:.2} | {:.2} | {:.2} | {:.2} |",
        risk.overall,
        risk.by_category.confidentiality,
        risk.by_category.integrity,
        risk.by_category.availability
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Threats ({})", visible.len());
    let _ = writeln!(out);
    if visible.is_empty() {
        let _ = writeln!(out, "No threats at the reported severity levels.");
    }
    for threat in &visible {
        let _ = writeln!(
            out,
            "### {} {} `{}`",
            severity_emoji(threat.severity),
            threat.severity,
            threat.kind.rule_id()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", threat.message);
        let _ = writeln!(out);
        let location = match threat.line_number {
            Some(line) => format!("{}:{line}", threat.file_path),
            None => threat.file_path.clone(),
        };
        let _ = writeln!(out, "- **Location:** `{location}`");
        let _ = writeln!(out, "- **Confidence:** {:.2}", threat.confidence);
        if let Some(sample) = &threat.sample_code {
            let _ = writeln!(out, "- **Evidence:** `{sample}`");
        }
        let _ = writeln!(out);
    }

    if let Some(framework) = compliance {
        render_compliance(&mut out, framework, &visible);
    }

    out
}

fn render_compliance(
    out: &mut String,
    framework: ComplianceFramework,
    visible: &[&Threat],
) {
    let title = match framework {
        ComplianceFramework::Soc2 => "SOC 2",
        ComplianceFramework::Iso27001 => "ISO 27001",
    };
    let _ = writeln!(out, "## Compliance: {title}");
    let _ = writeln!(out);
    for (control, kinds) in controls(framework) {
        let findings = visible
            .iter()
            .filter(|t| kinds.contains(&t.kind))
            .count();
        let kinds_list = kinds
            .iter()
            .map(ThreatKind::rule_id)
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "- **{control}** — covers {kinds_list}: {findings} finding(s)"
        );
    }
    let _ = writeln!(out);
}
