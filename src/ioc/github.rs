//! GitHub Security Advisories provider
//!
//! Uses the REST advisory endpoint filtered to the npm ecosystem. A
//! `GITHUB_TOKEN` is required; without one the provider reports itself
//! unavailable rather than burning the tiny anonymous quota.

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::{NullVoidError, Result};
use crate::core::{IocResult, http};

use super::osv::retry_after_ms;
use super::{IocProvider, ProviderHealth, severity_from_label};

const ADVISORY_URL: &str = "https://api.github.com/advisories";

pub struct GithubAdvisoryProvider {
    token: Option<String>,
}

impl GithubAdvisoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    #[must_use]
    pub fn with_token(token: String) -> Self {
        Self { token: Some(token) }
    }
}

impl Default for GithubAdvisoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct Advisory {
    ghsa_id: String,
    #[serde(default)]
    cve_id: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    vulnerabilities: Vec<AdvisoryVulnerability>,
}

#[derive(Deserialize)]
struct AdvisoryVulnerability {
    #[serde(default)]
    vulnerable_version_range: Option<String>,
    #[serde(default)]
    first_patched_version: Option<String>,
}

#[async_trait]
impl IocProvider for GithubAdvisoryProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn is_available(&self) -> bool {
        self.token.is_some()
    }

    async fn query(&self, package: &str, version: &str) -> Result<Vec<IocResult>> {
        let Some(token) = &self.token else {
            return Ok(Vec::new());
        };

        let affects = format!("{package}@{version}");
        let response = http::advisory_client()
            .get(ADVISORY_URL)
            .query(&[
                ("ecosystem", "npm"),
                ("affects", affects.as_str()),
                ("per_page", "50"),
            ])
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            // GitHub answers 403 both for bad credentials and for abuse
            // limits; either way the provider has to back off for a while.
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
                "github advisories query failed with status {status}"
            )));
        }

        let advisories: Vec<Advisory> = response.json().await?;
        Ok(advisories
            .into_iter()
            .map(|advisory| {
                let affected_ranges = advisory
                    .vulnerabilities
                    .iter()
                    .filter_map(|v| v.vulnerable_version_range.clone())
                    .collect();
                let fixed_versions = advisory
                    .vulnerabilities
                    .iter()
                    .filter_map(|v| v.first_patched_version.clone())
                    .collect();
                IocResult {
                    package_name: package.to_string(),
                    version: version.to_string(),
                    vulnerability_id: advisory.ghsa_id,
                    cve_id: advisory.cve_id,
                    severity: severity_from_label(&advisory.severity),
                    summary: advisory.summary,
                    affected_ranges,
                    fixed_versions,
                    references: advisory.references,
                    source_provider: self.name().to_string(),
                }
            })
            .collect())
    }

    async fn health(&self) -> ProviderHealth {
        if !self.is_available() {
            return ProviderHealth {
                healthy: false,
                message: Some("GITHUB_TOKEN not set".to_string()),
            };
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    #[test]
    fn test_unavailable_without_token() {
        let provider = GithubAdvisoryProvider { token: None };
        assert!(!provider.is_available());
    }

    #[test]
    fn test_advisory_mapping() {
        let advisory: Advisory = serde_json::from_value(serde_json::json!({
            "ghsa_id": "GHSA-abcd-1234",
            "cve_id": "CVE-2024-0001",
            "summary": "Prototype pollution",
            "severity": "high",
            "references": ["https://github.com/advisories/GHSA-abcd-1234"],
            "vulnerabilities": [{
                "vulnerable_version_range": "< 0.2.0",
                "first_patched_version": "0.2.0"
            }]
        }))
        .unwrap();

        assert_eq!(advisory.ghsa_id, "GHSA-abcd-1234");
        assert_eq!(severity_from_label(&advisory.severity), Severity::High);
        assert_eq!(
            advisory.vulnerabilities[0].first_patched_version.as_deref(),
            Some("0.2.0")
        );
    }
}
