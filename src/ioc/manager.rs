//! IoC integration manager
//!
//! Routes `name@version` queries across the registered providers through
//! the shared cache and per-provider rate limiters, staggers concurrent
//! provider calls, and aggregates the results.

use std::sync::Arc;
use std::time::Duration;

use crate::core::cache::MultiLayerCache;
use crate::core::error::NullVoidError;
use crate::core::rate_limit::SlidingWindowLimiter;
use crate::core::IocResult;

use super::{IocProvider, ProviderHealth, aggregate};

/// Delay inserted before each additional provider to smooth load.
const PROVIDER_STAGGER: Duration = Duration::from_millis(100);
/// Longest limiter block worth sleeping through; anything longer (403-class
/// hour blocks) skips the provider for this scan instead of stalling it.
const MAX_INLINE_WAIT: Duration = Duration::from_secs(30);

pub struct IocIntegrationManager {
    providers: Vec<Arc<dyn IocProvider>>,
    cache: Arc<MultiLayerCache<Vec<IocResult>>>,
    limiter: Arc<SlidingWindowLimiter>,
    runtime: tokio::runtime::Handle,
}

impl IocIntegrationManager {
    #[must_use]
    pub fn new(
        cache: Arc<MultiLayerCache<Vec<IocResult>>>,
        limiter: Arc<SlidingWindowLimiter>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            providers: Vec::new(),
            cache,
            limiter,
            runtime,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn IocProvider>) {
        self.providers.push(provider);
    }

    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Per-layer cache statistics for diagnostics.
    #[must_use]
    pub fn cache_stats(&self) -> Vec<(&'static str, crate::core::cache::CacheStats)> {
        self.cache.layer_stats()
    }

    /// Query every available provider for `package@version`, aggregated
    /// and deduplicated. Callable from worker threads; provider I/O runs
    /// on the manager's runtime.
    #[must_use]
    pub fn lookup(&self, package: &str, version: &str) -> Vec<IocResult> {
        let mut combined = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            if !provider.is_available() {
                tracing::debug!(provider = provider.name(), "provider unavailable, skipped");
                continue;
            }
            if index > 0 {
                std::thread::sleep(PROVIDER_STAGGER);
            }

            let key = format!("{}:{}:{}", provider.name(), package, version);
            if let Some(results) = self.cache.get(&key) {
                combined.extend(results);
                continue;
            }

            if !self.wait_if_blocked(provider.name()) {
                continue;
            }

            // The cache coalesces concurrent misses: at most one fill per
            // key reaches the provider, and a failed fill caches nothing.
            let filled = self.cache.get_or_fill(&key, provider.cache_ttl(), || {
                self.runtime.block_on(provider.query(package, version))
            });
            match filled {
                Ok(results) => combined.extend(results),
                Err(NullVoidError::RateLimit {
                    identifier,
                    retry_after_ms,
                }) => {
                    // 403/429-class response: extend the block, cache nothing.
                    tracing::warn!(
                        provider = identifier,
                        retry_after_ms,
                        "provider rate-limited, backing off"
                    );
                    self.limiter
                        .block_for(provider.name(), Duration::from_millis(retry_after_ms));
                }
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "provider query failed");
                }
            }
        }

        aggregate(combined)
    }

    /// Honor the limiter for `identifier`. Short blocks are waited out;
    /// hour-class blocks skip the provider so a single 403 cannot stall a
    /// whole scan.
    fn wait_if_blocked(&self, identifier: &str) -> bool {
        if self.limiter.check(identifier).is_allowed() {
            return true;
        }
        match self.limiter.blocked_remaining(identifier) {
            Some(remaining) if remaining <= MAX_INLINE_WAIT => {
                self.limiter.wait_for_reset(identifier);
                self.limiter.check(identifier).is_allowed()
            }
            _ => {
                tracing::debug!(identifier, "provider blocked, skipping for this scan");
                false
            }
        }
    }

    /// Health of every registered provider.
    #[must_use]
    pub fn health_report(&self) -> Vec<(&'static str, ProviderHealth)> {
        self.providers
            .iter()
            .map(|provider| {
                let health = if provider.is_available() {
                    self.runtime.block_on(provider.health())
                } else {
                    ProviderHealth {
                        healthy: false,
                        message: Some("unavailable".to_string()),
                    }
                };
                (provider.name(), health)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use crate::core::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        results: Vec<IocResult>,
    }

    #[async_trait]
    impl IocProvider for CountingProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn query(&self, _package: &str, _version: &str) -> Result<Vec<IocResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.clone())
        }
        async fn health(&self) -> ProviderHealth {
            ProviderHealth {
                healthy: true,
                message: None,
            }
        }
    }

    struct RateLimitedProvider;

    #[async_trait]
    impl IocProvider for RateLimitedProvider {
        fn name(&self) -> &'static str {
            "limited"
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn query(&self, _package: &str, _version: &str) -> Result<Vec<IocResult>> {
            Err(NullVoidError::RateLimit {
                identifier: "limited".to_string(),
                retry_after_ms: 3_600_000,
            })
        }
        async fn health(&self) -> ProviderHealth {
            ProviderHealth {
                healthy: false,
                message: Some("limited".to_string()),
            }
        }
    }

    fn sample_result(id: &str, cve: &str) -> IocResult {
        IocResult {
            package_name: "acme-utils".to_string(),
            version: "0.1.2".to_string(),
            vulnerability_id: id.to_string(),
            cve_id: Some(cve.to_string()),
            severity: Severity::High,
            summary: "advisory".to_string(),
            affected_ranges: vec![],
            fixed_versions: vec![],
            references: vec![],
            source_provider: "counting".to_string(),
        }
    }

    fn manager(runtime: &tokio::runtime::Runtime) -> IocIntegrationManager {
        IocIntegrationManager::new(
            Arc::new(MultiLayerCache::new(64, Duration::from_secs(60))),
            Arc::new(SlidingWindowLimiter::new(100, Duration::from_secs(60))),
            runtime.handle().clone(),
        )
    }

    #[test]
    fn test_lookup_caches_per_provider() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut manager = manager(&runtime);
        manager.register(Arc::new(CountingProvider {
            name: "alpha",
            calls: Arc::clone(&calls),
            results: vec![sample_result("GHSA-1", "CVE-2024-0001")],
        }));

        let first = manager.lookup("acme-utils", "0.1.2");
        let second = manager.lookup("acme-utils", "0.1.2");
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        // Second lookup came from cache.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rate_limited_provider_blocks_and_caches_nothing() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut manager = manager(&runtime);
        manager.register(Arc::new(RateLimitedProvider));

        let results = manager.lookup("acme-utils", "0.1.2");
        assert!(results.is_empty());
        // Hour-class block is recorded; the next lookup skips the provider
        // without stalling.
        assert!(manager.limiter.blocked_remaining("limited").is_some());
        let again = manager.lookup("acme-utils", "0.1.2");
        assert!(again.is_empty());
    }

    #[test]
    fn test_duplicate_cve_across_providers_deduped() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut manager = manager(&runtime);
        manager.register(Arc::new(CountingProvider {
            name: "alpha",
            calls: Arc::clone(&calls),
            results: vec![sample_result("GHSA-1", "CVE-2024-0001")],
        }));
        manager.register(Arc::new(CountingProvider {
            name: "beta",
            calls: Arc::clone(&calls),
            results: vec![sample_result("OSV-9", "CVE-2024-0001")],
        }));

        let results = manager.lookup("acme-utils", "0.1.2");
        assert_eq!(results.len(), 1);
    }
}
