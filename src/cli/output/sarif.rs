//! SARIF 2.1.0 report output

use std::collections::BTreeSet;

use serde_json::json;

use crate::core::Severity;
use crate::scan::ScanReport;

const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const INFORMATION_URI: &str = "https://github.com/nullvoid-scan/nullvoid";

fn sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical | Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low => "note",
    }
}

pub fn render(report: &ScanReport) -> anyhow::Result<String> {
    let rule_ids: BTreeSet<String> = report
        .threats
        .iter()
        .map(|t| t.kind.rule_id())
        .collect();
    let rules: Vec<serde_json::Value> = rule_ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "shortDescription": { "text": id.replace('_', " ").to_lowercase() }
            })
        })
        .collect();

    let results: Vec<serde_json::Value> = report
        .threats
        .iter()
        .map(|threat| {
            json!({
                "ruleId": threat.kind.rule_id(),
                "level": sarif_level(threat.severity),
                "message": { "text": threat.message },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": threat.file_path },
                        "region": {
                            "startLine": threat.line_number.unwrap_or(1),
                            "startColumn": 1
                        }
                    }
                }],
                "properties": {
                    "severity": threat.severity.to_string(),
                    "confidence": threat.confidence,
                    "excerpt": threat.sample_code.clone().unwrap_or_default()
                }
            })
        })
        .collect();

    let document = json!({
        "$schema": SARIF_SCHEMA,
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "NullVoid",
                    "version": report.metadata.tool_version,
                    "informationUri": INFORMATION_URI,
                    "rules": rules
                }
            },
            "invocations": [{
                "executionSuccessful": true,
                "exitCode": report.exit_code(),
                "startTimeUtc": report.metadata.scan_time,
                "endTimeUtc": report.metadata.scan_time
            }],
            "results": results
        }]
    });

    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::sample_report;
    use super::*;

    #[test]
    fn test_sarif_structure() {
        let rendered = render(&sample_report()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(doc["version"], "2.1.0");
        assert!(doc["$schema"].as_str().unwrap().contains("sarif-schema-2.1.0"));

        let run = &doc["runs"][0];
        assert_eq!(run["tool"]["driver"]["name"], "NullVoid");
        assert!(run["tool"]["driver"]["rules"].as_array().unwrap().len() >= 2);
        assert_eq!(run["invocations"][0]["exitCode"], 1);

        let first = &run["results"][0];
        assert_eq!(first["ruleId"], "WALLET_HIJACKING");
        assert_eq!(first["level"], "error");
        assert_eq!(
            first["locations"][0]["physicalLocation"]["region"]["startColumn"],
            1
        );
        assert_eq!(
            first["locations"][0]["physicalLocation"]["region"]["startLine"],
            12
        );
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(sarif_level(Severity::Critical), "error");
        assert_eq!(sarif_level(Severity::High), "error");
        assert_eq!(sarif_level(Severity::Medium), "warning");
        assert_eq!(sarif_level(Severity::Low), "note");
    }
}
