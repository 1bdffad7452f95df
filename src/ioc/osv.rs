//! OSV.dev advisory provider

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::{NullVoidError, Result};
use crate::core::{IocResult, Severity, http};

use super::{IocProvider, ProviderHealth, severity_from_cvss, severity_from_label};

const OSV_QUERY_URL: &str = "https://api.osv.dev/v1/query";

/// OSV needs no credentials and covers the npm ecosystem natively.
pub struct OsvProvider;

#[derive(Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVuln>,
}

#[derive(Deserialize)]
struct OsvVuln {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    severity: Vec<OsvSeverity>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    #[serde(default)]
    references: Vec<OsvReference>,
    #[serde(default)]
    database_specific: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    kind: String,
    score: String,
}

#[derive(Deserialize)]
struct OsvAffected {
    #[serde(default)]
    ranges: Vec<OsvRange>,
}

#[derive(Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct OsvReference {
    url: String,
}

impl OsvVuln {
    fn severity(&self) -> Severity {
        if let Some(label) = self
            .database_specific
            .as_ref()
            .and_then(|db| db.get("severity"))
            .and_then(|s| s.as_str())
        {
            return severity_from_label(label);
        }
        // Fall back to the CVSS vector's numeric score when present.
        for entry in &self.severity {
            if entry.kind.starts_with("CVSS")
                && let Some(score) = parse_cvss_base_score(&entry.score)
            {
                return severity_from_cvss(score);
            }
        }
        Severity::Medium
    }

    fn cve_id(&self) -> Option<String> {
        self.aliases
            .iter()
            .find(|alias| alias.starts_with("CVE-"))
            .cloned()
    }

    fn affected_ranges(&self) -> Vec<String> {
        let mut ranges = Vec::new();
        for affected in &self.affected {
            for range in &affected.ranges {
                let mut introduced = None;
                let mut fixed = None;
                for event in &range.events {
                    if let Some(v) = event.get("introduced").and_then(|v| v.as_str()) {
                        introduced = Some(v.to_string());
                    }
                    if let Some(v) = event.get("fixed").and_then(|v| v.as_str()) {
                        fixed = Some(v.to_string());
                    }
                }
                match (introduced, &fixed) {
                    (Some(i), Some(f)) => ranges.push(format!(">={i}, <{f}")),
                    (Some(i), None) => ranges.push(format!(">={i}")),
                    _ => {}
                }
            }
        }
        ranges
    }

    fn fixed_versions(&self) -> Vec<String> {
        let mut fixed = Vec::new();
        for affected in &self.affected {
            for range in &affected.ranges {
                for event in &range.events {
                    if let Some(v) = event.get("fixed").and_then(|v| v.as_str()) {
                        fixed.push(v.to_string());
                    }
                }
            }
        }
        fixed
    }
}

/// Pull the base score out of a CVSS v3 vector string, e.g.
/// `CVSS:3.1/AV:N/.../A:H` scores are not embedded, so OSV usually sends a
/// plain number instead; accept both.
fn parse_cvss_base_score(score: &str) -> Option<f64> {
    score.parse::<f64>().ok()
}

#[async_trait]
impl IocProvider for OsvProvider {
    fn name(&self) -> &'static str {
        "osv"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn query(&self, package: &str, version: &str) -> Result<Vec<IocResult>> {
        let body = serde_json::json!({
            "package": { "name": package, "ecosystem": "npm" },
            "version": version,
        });

        let response = http::advisory_client()
            .post(OSV_QUERY_URL)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(NullVoidError::RateLimit {
                identifier: self.name().to_string(),
                retry_after_ms: 3_600_000,
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NullVoidError::RateLimit {
                identifier: self.name().to_string(),
                retry_after_ms: retry_after_ms(&response),
            });
        }
        if !status.is_success() {
            return Err(NullVoidError::Other(format!(
                "osv query failed with status {status}"
            )));
        }

        let parsed: OsvResponse = response.json().await?;
        Ok(parsed
            .vulns
            .iter()
            .map(|vuln| IocResult {
                package_name: package.to_string(),
                version: version.to_string(),
                vulnerability_id: vuln.id.clone(),
                cve_id: vuln.cve_id(),
                severity: vuln.severity(),
                summary: vuln
                    .summary
                    .clone()
                    .or_else(|| vuln.details.clone())
                    .unwrap_or_default(),
                affected_ranges: vuln.affected_ranges(),
                fixed_versions: vuln.fixed_versions(),
                references: vuln.references.iter().map(|r| r.url.clone()).collect(),
                source_provider: self.name().to_string(),
            })
            .collect())
    }

    async fn health(&self) -> ProviderHealth {
        // An empty query against a known-clean name answers quickly and
        // exercises the whole path.
        match self.query("nullvoid-healthcheck", "0.0.0").await {
            Ok(_) => ProviderHealth {
                healthy: true,
                message: None,
            },
            Err(err) => ProviderHealth {
                healthy: false,
                message: Some(err.to_string()),
            },
        }
    }
}

/// Parse a `Retry-After` header (seconds form), defaulting to one minute.
pub(super) fn retry_after_ms(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(60_000, |secs| secs * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vuln_from_json(value: serde_json::Value) -> OsvVuln {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_severity_from_database_specific() {
        let vuln = vuln_from_json(serde_json::json!({
            "id": "GHSA-xxxx-yyyy",
            "database_specific": { "severity": "HIGH" }
        }));
        assert_eq!(vuln.severity(), Severity::High);
    }

    #[test]
    fn test_severity_from_numeric_cvss() {
        let vuln = vuln_from_json(serde_json::json!({
            "id": "OSV-2024-1",
            "severity": [{ "type": "CVSS_V3", "score": "9.8" }]
        }));
        assert_eq!(vuln.severity(), Severity::Critical);
    }

    #[test]
    fn test_cve_alias_extraction() {
        let vuln = vuln_from_json(serde_json::json!({
            "id": "GHSA-abcd",
            "aliases": ["SNYK-JS-1", "CVE-2024-0001"]
        }));
        assert_eq!(vuln.cve_id().as_deref(), Some("CVE-2024-0001"));
    }

    #[test]
    fn test_affected_range_formatting() {
        let vuln = vuln_from_json(serde_json::json!({
            "id": "OSV-2024-2",
            "affected": [{
                "ranges": [{
                    "events": [{ "introduced": "0" }, { "fixed": "1.2.3" }]
                }]
            }]
        }));
        assert_eq!(vuln.affected_ranges(), vec![">=0, <1.2.3".to_string()]);
        assert_eq!(vuln.fixed_versions(), vec!["1.2.3".to_string()]);
    }
}
