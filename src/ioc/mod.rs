//! IoC (Indicator of Compromise) providers
//!
//! A uniform capability surface over several advisory feeds. The
//! integration manager owns caching, per-provider rate limiting, and
//! result aggregation; providers only know how to talk to their feed.

mod github;
mod manager;
mod nvd;
mod osv;

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::{IocResult, Severity};

pub use github::GithubAdvisoryProvider;
pub use manager::IocIntegrationManager;
pub use nvd::NvdProvider;
pub use osv::OsvProvider;

/// Provider self-diagnosis.
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub healthy: bool,
    pub message: Option<String>,
}

/// Capability set every advisory provider satisfies.
#[async_trait]
pub trait IocProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider can be queried at all (e.g. required API key
    /// present). Unavailable providers are skipped silently.
    fn is_available(&self) -> bool;

    /// Look up advisories for an exact `name@version`.
    async fn query(&self, package: &str, version: &str) -> Result<Vec<IocResult>>;

    async fn health(&self) -> ProviderHealth;

    /// How long results from this feed stay fresh. Slow feeds use a day.
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

/// Map a CVSS base score to the scanner's severity scale.
#[must_use]
pub fn severity_from_cvss(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Parse a provider severity label.
#[must_use]
pub fn severity_from_label(label: &str) -> Severity {
    match label.to_ascii_lowercase().as_str() {
        "critical" => Severity::Critical,
        "high" => Severity::High,
        "medium" | "moderate" => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Aggregate results across providers: deduplicate by CVE id first, then
/// by `(vulnerability_id, source)`. Duplicates merge into the survivor,
/// keeping the maximum severity and the union of references.
#[must_use]
pub fn aggregate(results: Vec<IocResult>) -> Vec<IocResult> {
    let mut out: Vec<IocResult> = Vec::new();

    'next: for result in results {
        for existing in &mut out {
            let same_cve = match (&existing.cve_id, &result.cve_id) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            let same_id = existing.vulnerability_id == result.vulnerability_id
                && existing.source_provider == result.source_provider;
            if same_cve || same_id {
                existing.severity = existing.severity.max(result.severity);
                for reference in result.references {
                    if !existing.references.contains(&reference) {
                        existing.references.push(reference);
                    }
                }
                for fixed in result.fixed_versions {
                    if !existing.fixed_versions.contains(&fixed) {
                        existing.fixed_versions.push(fixed);
                    }
                }
                continue 'next;
            }
        }
        out.push(result);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, cve: Option<&str>, source: &str, severity: Severity) -> IocResult {
        IocResult {
            package_name: "acme-utils".to_string(),
            version: "0.1.2".to_string(),
            vulnerability_id: id.to_string(),
            cve_id: cve.map(str::to_string),
            severity,
            summary: "test advisory".to_string(),
            affected_ranges: vec![],
            fixed_versions: vec![],
            references: vec![format!("https://{source}.example/{id}")],
            source_provider: source.to_string(),
        }
    }

    #[test]
    fn test_cvss_mapping() {
        assert_eq!(severity_from_cvss(9.8), Severity::Critical);
        assert_eq!(severity_from_cvss(7.5), Severity::High);
        assert_eq!(severity_from_cvss(5.0), Severity::Medium);
        assert_eq!(severity_from_cvss(2.0), Severity::Low);
    }

    #[test]
    fn test_same_cve_across_providers_merges() {
        let merged = aggregate(vec![
            result("GHSA-xxxx", Some("CVE-2024-0001"), "github", Severity::High),
            result("OSV-2024-1", Some("CVE-2024-0001"), "osv", Severity::Critical),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].severity, Severity::Critical);
        assert_eq!(merged[0].references.len(), 2);
    }

    #[test]
    fn test_distinct_cves_kept() {
        let merged = aggregate(vec![
            result("GHSA-aaaa", Some("CVE-2024-0001"), "github", Severity::High),
            result("GHSA-bbbb", Some("CVE-2024-0002"), "github", Severity::Low),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_no_cve_dedupes_by_id_and_source() {
        let merged = aggregate(vec![
            result("OSV-2024-1", None, "osv", Severity::Medium),
            result("OSV-2024-1", None, "osv", Severity::Medium),
            result("OSV-2024-1", None, "github", Severity::Medium),
        ]);
        // Same id from the same source collapses; same id from another
        // source is a distinct record.
        assert_eq!(merged.len(), 2);
    }
}
