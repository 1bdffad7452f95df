//! Registry creation-date lookup
//!
//! Resolves when a package name first appeared on the public registry,
//! cascading through the configured registry endpoints with retries. The
//! source is a trait so analysis code tests against a fake.

use std::time::Duration;

use jiff::Timestamp;

use crate::core::error::{NullVoidError, Result};
use crate::core::rate_limit::{SlidingWindowLimiter, Throttler, run_limited};

/// Where package creation dates come from.
pub trait CreationDateSource: Send + Sync {
    /// `Ok(None)` means the registry does not know the package at all
    /// (which is itself a meaningful signal: no public conflict exists).
    fn creation_date(&self, name: &str) -> Result<Option<Timestamp>>;
}

/// npm-compatible registry client. Endpoints are tried in order; the first
/// definitive answer (found or confirmed-absent) wins.
pub struct NpmRegistrySource {
    registries: Vec<String>,
    runtime: tokio::runtime::Handle,
    limiter: SlidingWindowLimiter,
    throttler: Throttler,
}

impl NpmRegistrySource {
    /// Registry metadata endpoints tolerate far more than this; the budget
    /// keeps bulk scans polite.
    const MAX_REQUESTS_PER_MINUTE: usize = 100;

    #[must_use]
    pub fn new(registries: Vec<String>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            registries,
            runtime,
            limiter: SlidingWindowLimiter::new(
                Self::MAX_REQUESTS_PER_MINUTE,
                Duration::from_secs(60),
            ),
            throttler: Throttler::default(),
        }
    }

    async fn fetch_created(registry: &str, name: &str) -> Result<Option<Timestamp>> {
        let url = format!("{}/{}", registry.trim_end_matches('/'), name);
        let response = crate::core::http::shared_client()
            .get(&url)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(NullVoidError::Other(format!(
                "registry {registry} answered {} for {name}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let created = body
            .get("time")
            .and_then(|t| t.get("created"))
            .and_then(|c| c.as_str())
            .and_then(|raw| raw.parse::<Timestamp>().ok());
        Ok(created)
    }
}

impl CreationDateSource for NpmRegistrySource {
    fn creation_date(&self, name: &str) -> Result<Option<Timestamp>> {
        let mut last_err: Option<NullVoidError> = None;
        for registry in &self.registries {
            let attempt = run_limited(&self.limiter, &self.throttler, registry, || {
                self.runtime
                    .block_on(Self::fetch_created(registry, name))
            });
            match attempt {
                Ok(found) => return Ok(found),
                Err(err) => {
                    tracing::warn!(registry, package = name, error = %err, "registry lookup failed");
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}
