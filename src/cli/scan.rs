//! The `scan` command
//!
//! Wires settings, cache, rate limiting, providers, and detectors into an
//! orchestrator, runs the scan, and renders the report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::Settings;
use crate::core::cache::{DiskCache, MultiLayerCache};
use crate::core::error::NullVoidError;
use crate::core::rate_limit::SlidingWindowLimiter;
use crate::core::{IocResult, ScanTarget};
use crate::detect::confusion::{ConfusionAnalyzer, NpmRegistrySource};
use crate::detect::{DetectorRegistry, PatternCatalogue, PatternDetector};
use crate::ioc::{GithubAdvisoryProvider, IocIntegrationManager, NvdProvider, OsvProvider};
use crate::scan::{Orchestrator, ScanReport};

use super::output::{ComplianceFramework, OutputFormat};

/// Per-provider request budget inside one sliding window.
const PROVIDER_MAX_REQUESTS: usize = 100;
const PROVIDER_WINDOW: Duration = Duration::from_secs(60);

#[allow(clippy::fn_params_excessive_bools, clippy::too_many_arguments)]
pub fn run(
    target: Option<String>,
    depth: Option<u32>,
    workers: Option<usize>,
    output: OutputFormat,
    rules: Option<PathBuf>,
    all: bool,
    compliance: Option<ComplianceFramework>,
    parallel: bool,
    quiet: bool,
) -> anyhow::Result<i32> {
    let (target, mut settings) = match target {
        Some(raw) => {
            let target = resolve_target_spec(Some(raw.as_str()))?;
            let search_dir = match &target {
                ScanTarget::Directory(dir) => Some(dir.clone()),
                ScanTarget::SingleFile(file) => file.parent().map(Path::to_path_buf),
                ScanTarget::PackageByName { .. } => None,
            };
            let settings = Settings::load(search_dir.as_deref())
                .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
            (target, settings)
        }
        None => {
            // No argument: the configured default target, then the cwd.
            let settings = Settings::load(None)
                .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
            let target = resolve_target_spec(settings.default_target.as_deref())?;
            (target, settings)
        }
    };
    if let Some(depth) = depth {
        settings.depth = depth;
    }
    match workers {
        Some(0) | None => {} // auto: keep the settings default
        Some(n) => settings.detector.max_workers = n,
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build I/O runtime")?;

    let report = build_and_scan(&settings, &target, rules.as_deref(), parallel, quiet, &runtime)?;

    let rendered = super::output::render(&report, output, all, compliance)?;
    println!("{rendered}");

    Ok(report.exit_code())
}

fn build_and_scan(
    settings: &Settings,
    target: &ScanTarget,
    rules: Option<&Path>,
    parallel: bool,
    quiet: bool,
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ScanReport> {
    let cache = build_cache(settings)?;
    let limiter = Arc::new(SlidingWindowLimiter::new(
        PROVIDER_MAX_REQUESTS,
        PROVIDER_WINDOW,
    ));

    let mut ioc = IocIntegrationManager::new(
        Arc::clone(&cache),
        Arc::clone(&limiter),
        runtime.handle().clone(),
    );
    let enabled = &settings.detector.ioc_providers_enabled;
    if enabled.contains("osv") {
        ioc.register(Arc::new(OsvProvider));
    }
    if enabled.contains("github") {
        ioc.register(Arc::new(GithubAdvisoryProvider::new()));
    }
    if enabled.contains("nvd") {
        ioc.register(Arc::new(NvdProvider::new()));
    }

    let pattern_detector = match rules {
        Some(path) => {
            let catalogue = PatternCatalogue::with_custom_rules(path)
                .map_err(|e| anyhow::anyhow!("invalid rules file: {e}"))?;
            PatternDetector::with_catalogue(catalogue)
        }
        None => PatternDetector::new(),
    };
    let detectors = DetectorRegistry::with_defaults(pattern_detector);

    let analyzer = ConfusionAnalyzer::new(settings.confusion.clone());
    let dates = Arc::new(NpmRegistrySource::new(
        settings.confusion.registries.clone(),
        runtime.handle().clone(),
    ));

    let ioc = Arc::new(ioc);
    let orchestrator = Orchestrator::new(settings.clone(), detectors)
        .with_ioc(Arc::clone(&ioc))
        .with_confusion(analyzer, dates)
        .with_parallelism(parallel);

    let progress = (!quiet && std::io::IsTerminal::is_terminal(&std::io::stderr())).then(|| {
        let bar = indicatif::ProgressBar::new_spinner();
        bar.set_message(format!("scanning {}", target.display_name()));
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    });

    let report = orchestrator.scan(target);

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    for (layer, stats) in ioc.cache_stats() {
        tracing::debug!(
            layer,
            size = stats.size,
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = format!("{:.2}", stats.hit_rate()),
            "cache layer stats"
        );
    }

    report.map_err(|err| anyhow::anyhow!("scan failed: {err}"))
}

fn build_cache(settings: &Settings) -> anyhow::Result<Arc<MultiLayerCache<Vec<IocResult>>>> {
    let mut cache = MultiLayerCache::new(settings.cache.l1_max_entries, settings.cache.ttl);
    if settings.cache.l2_enabled {
        let disk = DiskCache::new(
            &settings.cache.dir,
            settings.cache.l2_max_bytes,
            settings.cache.l2_compress,
        )
        .map_err(|e| anyhow::anyhow!("cannot open cache directory: {e}"))?;
        disk.sweep_expired();
        cache = cache.with_disk(disk);
    }
    #[cfg(feature = "remote-cache")]
    if settings.cache.l3_enabled
        && let Some(url) = &settings.cache.redis_url
    {
        use crate::core::cache::{RedisStore, RemoteLayer};
        match RedisStore::connect(url) {
            Ok(store) => {
                cache = cache.with_remote(Box::new(RemoteLayer::new(Box::new(store))));
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote cache unavailable, continuing without L3");
            }
        }
    }
    Ok(Arc::new(cache))
}

/// Interpret the target argument: an existing path wins; otherwise a
/// `name@version` specifier; otherwise the current directory.
fn resolve_target_spec(raw: Option<&str>) -> anyhow::Result<ScanTarget> {
    let Some(raw) = raw else {
        return Ok(ScanTarget::Directory(PathBuf::from(".")));
    };

    let as_path = PathBuf::from(raw);
    if as_path.is_dir() {
        return Ok(ScanTarget::Directory(as_path));
    }
    if as_path.is_file() {
        return Ok(ScanTarget::SingleFile(as_path));
    }

    if let Some(target) = parse_package_spec(raw) {
        return Ok(target);
    }

    Err(anyhow::anyhow!(NullVoidError::Validation(format!(
        "target is neither an existing path nor a name@version specifier: {raw}"
    ))))
}

/// Split `name@version`, handling the `@scope/name@version` form.
fn parse_package_spec(raw: &str) -> Option<ScanTarget> {
    let at = raw.rfind('@')?;
    if at == 0 {
        // "@scope/name" with no version.
        return None;
    }
    let (name, version) = raw.split_at(at);
    let version = &version[1..];
    if name.is_empty() || version.is_empty() {
        return None;
    }
    semver::Version::parse(version).ok()?;
    Some(ScanTarget::PackageByName {
        name: name.to_string(),
        version: version.to_string(),
    })
}
