//! Scan report assembly
//!
//! Owns the final threat list: stable ordering, exact-duplicate removal,
//! and the merge of IoC advisory results into vulnerable-package threats.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{IocResult, RiskAssessment, Severity, Threat, ThreatKind};

use super::pool::PoolMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetadata {
    pub target: String,
    pub scan_id: String,
    /// ISO-8601 instant the scan started.
    pub scan_time: String,
    pub tool_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub threats_found: usize,
    pub total_files: usize,
    pub total_packages: usize,
    /// Milliseconds of wall-clock scan time.
    pub scan_duration: u64,
    pub failed_items: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub metadata: ScanMetadata,
    pub summary: ScanSummary,
    pub threats: Vec<Threat>,
    pub risk_assessment: RiskAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_metrics: Option<PoolMetrics>,
}

impl ScanReport {
    /// Process exit code: 0 when nothing at or above High severity, 1
    /// otherwise. (2 is reserved for invalid input and config errors.)
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let significant = self
            .threats
            .iter()
            .any(|t| t.severity >= Severity::High);
        i32::from(significant)
    }

    /// Threats filtered the way the reporters show them: low/medium only
    /// with `--all`.
    #[must_use]
    pub fn visible_threats(&self, show_all: bool) -> Vec<&Threat> {
        self.threats
            .iter()
            .filter(|t| show_all || t.severity >= Severity::High)
            .collect()
    }
}

/// Sort by `(severity desc, file_path asc, line_number asc)` and drop
/// exact duplicates on `(type, file_path, line_number, sample_code)`.
///
/// Sorting runs first so when two family mappings produce the same key at
/// different severities, the stricter one survives the dedup.
pub fn sort_and_dedup(threats: &mut Vec<Threat>) {
    threats.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.line_number.cmp(&b.line_number))
            // Not part of the documented order, just a stable tiebreaker.
            .then_with(|| a.kind.rule_id().cmp(&b.kind.rule_id()))
    });

    let mut seen = HashSet::new();
    threats.retain(|threat| seen.insert(threat.dedup_key()));
}

/// Merge advisory results into the threat list.
///
/// A result whose vulnerability key is already present as a
/// `VulnerablePackage` threat upgrades that threat's severity to the max
/// and concatenates details; otherwise a new threat is appended.
pub fn merge_ioc_results(threats: &mut Vec<Threat>, results: &[IocResult], manifest: &Path) {
    for result in results {
        let key = result
            .cve_id
            .clone()
            .unwrap_or_else(|| result.vulnerability_id.clone());

        let existing = threats.iter_mut().find(|t| {
            t.kind == ThreatKind::VulnerablePackage
                && t.metadata
                    .get("vulnKey")
                    .and_then(|v| v.as_str())
                    .is_some_and(|k| k == key)
        });

        match existing {
            Some(threat) => {
                threat.severity = threat.severity.max(result.severity);
                if !threat.details.contains(&result.source_provider) {
                    threat.details = format!(
                        "{}; also reported by {}",
                        threat.details, result.source_provider
                    );
                }
            }
            None => {
                let mut threat = Threat::new(
                    ThreatKind::VulnerablePackage,
                    result.severity,
                    format!(
                        "{}@{} affected by {}",
                        result.package_name, result.version, key
                    ),
                    manifest,
                )
                .with_confidence(0.95)
                .with_details(format!(
                    "{} (reported by {})",
                    result.summary, result.source_provider
                ))
                .with_meta("vulnKey", serde_json::json!(key))
                .with_meta("vulnerabilityId", serde_json::json!(result.vulnerability_id))
                .with_meta("package", serde_json::json!(format!(
                    "{}@{}",
                    result.package_name, result.version
                )))
                .with_meta("source", serde_json::json!(result.source_provider));
                if let Some(cve) = &result.cve_id {
                    threat = threat.with_meta("cve", serde_json::json!(cve));
                }
                if !result.fixed_versions.is_empty() {
                    threat = threat
                        .with_meta("fixedVersions", serde_json::json!(result.fixed_versions));
                }
                threats.push(threat);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threat(kind: ThreatKind, severity: Severity, path: &str, line: Option<usize>) -> Threat {
        let mut t = Threat::new(kind, severity, "m", path);
        t.line_number = line;
        t
    }

    fn ioc(id: &str, cve: Option<&str>, severity: Severity, source: &str) -> IocResult {
        IocResult {
            package_name: "acme-utils".to_string(),
            version: "0.1.2".to_string(),
            vulnerability_id: id.to_string(),
            cve_id: cve.map(str::to_string),
            severity,
            summary: "bad".to_string(),
            affected_ranges: vec![],
            fixed_versions: vec!["0.2.0".to_string()],
            references: vec![],
            source_provider: source.to_string(),
        }
    }

    #[test]
    fn test_sort_order() {
        let mut threats = vec![
            threat(ThreatKind::HighEntropy, Severity::Medium, "/b.js", Some(3)),
            threat(ThreatKind::WalletHijacking, Severity::Critical, "/z.js", Some(1)),
            threat(ThreatKind::ObfuscatedCode, Severity::High, "/a.js", Some(9)),
            threat(ThreatKind::ObfuscatedCode, Severity::High, "/a.js", Some(2)),
        ];
        sort_and_dedup(&mut threats);

        assert_eq!(threats[0].severity, Severity::Critical);
        assert_eq!(threats[1].file_path, "/a.js");
        assert_eq!(threats[1].line_number, Some(2));
        assert_eq!(threats[2].line_number, Some(9));
        assert_eq!(threats[3].severity, Severity::Medium);
    }

    #[test]
    fn test_exact_duplicates_dropped() {
        let mut threats = vec![
            threat(ThreatKind::ObfuscatedCode, Severity::High, "/a.js", Some(2)),
            threat(ThreatKind::ObfuscatedCode, Severity::High, "/a.js", Some(2)),
        ];
        sort_and_dedup(&mut threats);
        assert_eq!(threats.len(), 1);
    }

    #[test]
    fn test_stricter_severity_survives_dedup() {
        // Same key at two severities: after sorting, Critical leads and
        // the High duplicate is dropped.
        let mut threats = vec![
            threat(ThreatKind::DynamicRequire, Severity::High, "/a.js", Some(5)),
            threat(ThreatKind::DynamicRequire, Severity::Critical, "/a.js", Some(5)),
        ];
        sort_and_dedup(&mut threats);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].severity, Severity::Critical);
    }

    #[test]
    fn test_ioc_merge_dedupes_by_cve() {
        let mut threats = Vec::new();
        let manifest = Path::new("/project/package.json");
        merge_ioc_results(
            &mut threats,
            &[
                ioc("GHSA-1", Some("CVE-2024-0001"), Severity::High, "github"),
                ioc("OSV-7", Some("CVE-2024-0001"), Severity::Critical, "osv"),
            ],
            manifest,
        );

        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].severity, Severity::Critical);
        assert_eq!(threats[0].metadata["cve"], serde_json::json!("CVE-2024-0001"));
        assert!(threats[0].details.contains("osv"));
    }

    #[test]
    fn test_ioc_distinct_keys_append() {
        let mut threats = Vec::new();
        merge_ioc_results(
            &mut threats,
            &[
                ioc("GHSA-1", Some("CVE-2024-0001"), Severity::High, "github"),
                ioc("GHSA-2", Some("CVE-2024-0002"), Severity::Low, "github"),
            ],
            Path::new("/project/package.json"),
        );
        assert_eq!(threats.len(), 2);
    }

    #[test]
    fn test_exit_codes() {
        let metadata = ScanMetadata {
            target: "t".into(),
            scan_id: "id".into(),
            scan_time: "2026-08-01T00:00:00Z".into(),
            tool_version: "2.1.0".into(),
        };
        let mut report = ScanReport {
            metadata,
            summary: ScanSummary::default(),
            threats: vec![threat(ThreatKind::HighEntropy, Severity::Medium, "/a.js", None)],
            risk_assessment: super::super::risk::assess(&[]),
            pool_metrics: None,
        };
        assert_eq!(report.exit_code(), 0);

        report
            .threats
            .push(threat(ThreatKind::WalletHijacking, Severity::Critical, "/a.js", None));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_visible_threats_filtering() {
        let metadata = ScanMetadata {
            target: "t".into(),
            scan_id: "id".into(),
            scan_time: "2026-08-01T00:00:00Z".into(),
            tool_version: "2.1.0".into(),
        };
        let report = ScanReport {
            metadata,
            summary: ScanSummary::default(),
            threats: vec![
                threat(ThreatKind::WalletHijacking, Severity::Critical, "/a.js", None),
                threat(ThreatKind::HighEntropy, Severity::Medium, "/a.js", None),
            ],
            risk_assessment: super::super::risk::assess(&[]),
            pool_metrics: None,
        };
        assert_eq!(report.visible_threats(false).len(), 1);
        assert_eq!(report.visible_threats(true).len(), 2);
    }

    #[test]
    fn test_report_json_roundtrip() {
        let metadata = ScanMetadata {
            target: "./pkg".into(),
            scan_id: "abc".into(),
            scan_time: "2026-08-01T00:00:00Z".into(),
            tool_version: "2.1.0".into(),
        };
        let threats = vec![threat(
            ThreatKind::WalletHijacking,
            Severity::Critical,
            "/a.js",
            Some(3),
        )];
        let report = ScanReport {
            metadata,
            summary: ScanSummary {
                threats_found: 1,
                total_files: 10,
                total_packages: 2,
                scan_duration: 120,
                failed_items: 0,
            },
            risk_assessment: super::super::risk::assess(&threats),
            threats,
            pool_metrics: None,
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed: ScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.threats.len(), 1);
        assert_eq!(parsed.summary.total_files, 10);
        assert_eq!(parsed.risk_assessment.overall, report.risk_assessment.overall);
        // Wire keys are camelCase.
        assert!(json.contains("\"riskAssessment\""));
        assert!(json.contains("\"threatsFound\""));
    }
}
