//! NVD (National Vulnerability Database) provider
//!
//! Keyword search over the CVE 2.0 API. The feed is slow-moving and its
//! anonymous quota tiny, so results cache for a full day and an
//! `NVD_API_KEY` is strongly preferred.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::{NullVoidError, Result};
use crate::core::{IocResult, Severity, http};

use super::osv::retry_after_ms;
use super::{IocProvider, ProviderHealth, severity_from_cvss};

const NVD_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

pub struct NvdProvider {
    api_key: Option<String>,
}

impl NvdProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("NVD_API_KEY").ok().filter(|k| !k.is_empty()),
        }
    }
}

impl Default for NvdProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdEntry>,
}

#[derive(Deserialize)]
struct NvdEntry {
    cve: NvdCve,
}

#[derive(Deserialize)]
struct NvdCve {
    id: String,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    #[serde(default)]
    metrics: Option<serde_json::Value>,
    #[serde(default)]
    references: Vec<NvdReference>,
}

#[derive(Deserialize)]
struct NvdDescription {
    lang: String,
    value: String,
}

#[derive(Deserialize)]
struct NvdReference {
    url: String,
}

impl NvdCve {
    fn summary(&self) -> String {
        self.descriptions
            .iter()
            .find(|d| d.lang == "en")
            .or_else(|| self.descriptions.first())
            .map(|d| d.value.clone())
            .unwrap_or_default()
    }

    fn severity(&self) -> Severity {
        let score = self
            .metrics
            .as_ref()
            .and_then(|metrics| {
                for key in ["cvssMetricV31", "cvssMetricV30", "cvssMetricV2"] {
                    if let Some(score) = metrics
                        .get(key)
                        .and_then(|list| list.get(0))
                        .and_then(|entry| entry.get("cvssData"))
                        .and_then(|data| data.get("baseScore"))
                        .and_then(serde_json::Value::as_f64)
                    {
                        return Some(score);
                    }
                }
                None
            })
            .unwrap_or(5.0);
        severity_from_cvss(score)
    }
}

#[async_trait]
impl IocProvider for NvdProvider {
    fn name(&self) -> &'static str {
        "nvd"
    }

    fn is_available(&self) -> bool {
        // NVD works anonymously, just with a much lower quota.
        true
    }

    async fn query(&self, package: &str, version: &str) -> Result<Vec<IocResult>> {
        let mut request = http::advisory_client()
            .get(NVD_URL)
            .query(&[
                ("keywordSearch", package),
                ("resultsPerPage", "20"),
            ]);
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await?;
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
                "nvd query failed with status {status}"
            )));
        }

        let parsed: NvdResponse = response.json().await?;
        Ok(parsed
            .vulnerabilities
            .into_iter()
            .filter(|entry| {
                // Keyword search is broad; keep only CVEs that actually
                // mention the package name.
                entry
                    .cve
                    .summary()
                    .to_lowercase()
                    .contains(&package.to_lowercase())
            })
            .map(|entry| IocResult {
                package_name: package.to_string(),
                version: version.to_string(),
                vulnerability_id: entry.cve.id.clone(),
                cve_id: Some(entry.cve.id.clone()),
                severity: entry.cve.severity(),
                summary: entry.cve.summary(),
                affected_ranges: Vec::new(),
                fixed_versions: Vec::new(),
                references: entry.cve.references.iter().map(|r| r.url.clone()).collect(),
                source_provider: self.name().to_string(),
            })
            .collect())
    }

    async fn health(&self) -> ProviderHealth {
        match self.query("express", "4.17.1").await {
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

    fn cache_ttl(&self) -> Duration {
        // Slow feed: a day of freshness is plenty.
        Duration::from_secs(24 * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_v31_metrics() {
        let cve: NvdCve = serde_json::from_value(serde_json::json!({
            "id": "CVE-2024-0001",
            "descriptions": [{ "lang": "en", "value": "acme-utils allows RCE" }],
            "metrics": {
                "cvssMetricV31": [{ "cvssData": { "baseScore": 8.1 } }]
            }
        }))
        .unwrap();
        assert_eq!(cve.severity(), Severity::High);
        assert_eq!(cve.summary(), "acme-utils allows RCE");
    }

    #[test]
    fn test_missing_metrics_default_medium() {
        let cve: NvdCve = serde_json::from_value(serde_json::json!({
            "id": "CVE-2024-0002",
            "descriptions": [{ "lang": "en", "value": "something" }]
        }))
        .unwrap();
        assert_eq!(cve.severity(), Severity::Medium);
    }
}
