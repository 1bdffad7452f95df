//! The `doctor` command
//!
//! Checks that the advisory providers are reachable and reports cache
//! health, so misconfigured tokens surface before a long scan does.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;

use crate::config::Settings;
use crate::core::cache::MultiLayerCache;
use crate::core::rate_limit::SlidingWindowLimiter;
use crate::ioc::{GithubAdvisoryProvider, IocIntegrationManager, NvdProvider, OsvProvider};

pub fn run() -> anyhow::Result<i32> {
    let settings = Settings::load(None)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let cache = Arc::new(MultiLayerCache::new(
        settings.cache.l1_max_entries,
        settings.cache.ttl,
    ));
    let limiter = Arc::new(SlidingWindowLimiter::new(100, Duration::from_secs(60)));
    let mut manager = IocIntegrationManager::new(cache, limiter, runtime.handle().clone());

    let enabled = &settings.detector.ioc_providers_enabled;
    if enabled.contains("osv") {
        manager.register(Arc::new(OsvProvider));
    }
    if enabled.contains("github") {
        manager.register(Arc::new(GithubAdvisoryProvider::new()));
    }
    if enabled.contains("nvd") {
        manager.register(Arc::new(NvdProvider::new()));
    }

    let use_color = super::style::colors_enabled();
    let mut failures = 0;

    println!("advisory providers ({}):", manager.provider_count());
    for (name, health) in manager.health_report() {
        let status = if health.healthy {
            if use_color {
                "ok".green().to_string()
            } else {
                "ok".to_string()
            }
        } else {
            failures += 1;
            if use_color {
                "unhealthy".red().to_string()
            } else {
                "unhealthy".to_string()
            }
        };
        match health.message {
            Some(message) => println!("  {name:<8} {status} ({message})"),
            None => println!("  {name:<8} {status}"),
        }
    }

    println!(
        "\ncache: L2 {} at {}",
        if settings.cache.l2_enabled {
            "enabled"
        } else {
            "disabled"
        },
        settings.cache.dir.display()
    );

    Ok(i32::from(failures > 0))
}
