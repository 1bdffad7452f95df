//! Scan orchestration
//!
//! Resolves the target through path safety, enumerates files and packages,
//! fans the work out over the pool, merges detector and advisory findings,
//! scores the result, and emits a stable report. The orchestrator is the
//! only component that turns errors into threats.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::Settings;
use crate::core::error::{NullVoidError, Result};
use crate::core::reader::{DEFAULT_CHUNK_SIZE, ReadOutcome, StreamingReader};
use crate::core::{
    PackageDescriptor, ScanTarget, Severity, Threat, ThreatKind, path_safety,
};
use crate::detect::confusion::{ConfusionAnalyzer, CreationDateSource};
use crate::detect::{DetectorRegistry, FileContext};
use crate::ioc::IocIntegrationManager;

use super::package;
use super::pool::{CancelFlag, PoolConfig, PoolMetrics, run_parallel};
use super::report::{ScanMetadata, ScanReport, ScanSummary, merge_ioc_results, sort_and_dedup};
use super::risk;

/// Scan lifecycle states. `Cancelled` is reachable from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Init,
    Enumerating,
    Scanning,
    Aggregating,
    Scoring,
    Done,
    Cancelled,
}

pub struct Orchestrator {
    settings: Settings,
    detectors: Arc<DetectorRegistry>,
    ioc: Option<Arc<IocIntegrationManager>>,
    confusion: Option<Arc<ConfusionAnalyzer>>,
    dates: Option<Arc<dyn CreationDateSource>>,
    cancel: CancelFlag,
    phase: Mutex<ScanPhase>,
    parallel: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(settings: Settings, detectors: DetectorRegistry) -> Self {
        Self {
            settings,
            detectors: Arc::new(detectors),
            ioc: None,
            confusion: None,
            dates: None,
            cancel: CancelFlag::new(),
            phase: Mutex::new(ScanPhase::Init),
            parallel: true,
        }
    }

    #[must_use]
    pub fn with_ioc(mut self, ioc: Arc<IocIntegrationManager>) -> Self {
        self.ioc = Some(ioc);
        self
    }

    #[must_use]
    pub fn with_confusion(
        mut self,
        analyzer: ConfusionAnalyzer,
        dates: Arc<dyn CreationDateSource>,
    ) -> Self {
        self.confusion = Some(Arc::new(analyzer));
        self.dates = Some(dates);
        self
    }

    /// Disable the worker pool: everything runs on one worker.
    #[must_use]
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Handle for external cancellation (signal handlers, tests).
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock()
    }

    fn enter(&self, phase: ScanPhase) -> bool {
        if self.cancel.is_cancelled() {
            *self.phase.lock() = ScanPhase::Cancelled;
            return false;
        }
        *self.phase.lock() = phase;
        true
    }

    /// Run a full scan. Validation and configuration failures surface as
    /// errors (exit code 2 territory); detection findings, traversal
    /// attempts, and per-file failures become threats in the report.
    pub fn scan(&self, target: &ScanTarget) -> Result<ScanReport> {
        let started = Instant::now();
        self.enter(ScanPhase::Init);

        let metadata = ScanMetadata {
            target: target.display_name(),
            scan_id: uuid::Uuid::new_v4().to_string(),
            scan_time: jiff::Timestamp::now().to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let mut threats: Vec<Threat> = Vec::new();

        let resolved = match self.resolve_target(target) {
            Ok(resolved) => resolved,
            Err(err @ (NullVoidError::PathTraversal(_) | NullVoidError::CommandInjection(_))) => {
                // Attack-shaped input is a finding, not a crash.
                threats.push(threat_from_security_error(&err, &target.display_name()));
                return Ok(self.finish(metadata, threats, 0, 0, None, started));
            }
            Err(err) => return Err(err),
        };

        if !self.enter(ScanPhase::Enumerating) {
            return Ok(self.finish(metadata, threats, 0, 0, None, started));
        }
        let files = resolved.files;
        let packages = resolved.packages;
        tracing::info!(
            files = files.len(),
            packages = packages.len(),
            target = %metadata.target,
            "enumeration complete"
        );

        if !self.enter(ScanPhase::Scanning) {
            return Ok(self.finish(metadata, threats, files.len(), packages.len(), None, started));
        }
        let (file_threats, metrics) = self.scan_files(&files, &packages);
        threats.extend(file_threats);

        if !self.enter(ScanPhase::Aggregating) {
            return Ok(self.finish(
                metadata,
                threats,
                files.len(),
                packages.len(),
                Some(metrics),
                started,
            ));
        }
        self.analyze_packages(&packages, &mut threats);

        self.enter(ScanPhase::Scoring);
        let report = self.finish(
            metadata,
            threats,
            files.len(),
            packages.len(),
            Some(metrics),
            started,
        );
        self.enter(ScanPhase::Done);
        Ok(report)
    }

    fn finish(
        &self,
        metadata: ScanMetadata,
        mut threats: Vec<Threat>,
        total_files: usize,
        total_packages: usize,
        pool_metrics: Option<PoolMetrics>,
        started: Instant,
    ) -> ScanReport {
        sort_and_dedup(&mut threats);
        let risk_assessment = risk::assess(&threats);
        let summary = ScanSummary {
            threats_found: threats.len(),
            total_files,
            total_packages,
            scan_duration: started.elapsed().as_millis() as u64,
            failed_items: pool_metrics.as_ref().map_or(0, |m| m.failed_items),
        };
        ScanReport {
            metadata,
            summary,
            threats,
            risk_assessment,
            pool_metrics,
        }
    }

    fn resolve_target(&self, target: &ScanTarget) -> Result<ResolvedTarget> {
        match target {
            ScanTarget::Directory(dir) => {
                // The target establishes the base; everything below is
                // resolved and contained under it.
                let root = path_safety::validate_target(dir)?;
                if !root.is_dir() {
                    return Err(NullVoidError::Validation(format!(
                        "not a directory: {}",
                        root.display()
                    )));
                }
                let mut files = Vec::new();
                walk_directory(&root, &mut files)?;
                let packages = package::enumerate_packages(&root, self.settings.depth)?;
                Ok(ResolvedTarget { files, packages })
            }
            ScanTarget::SingleFile(file) => {
                let path = path_safety::validate_target(file)?;
                if !path.is_file() {
                    return Err(NullVoidError::Validation(format!(
                        "not a file: {}",
                        path.display()
                    )));
                }
                let packages = path
                    .parent()
                    .map(|dir| package::parse_manifest(dir))
                    .transpose()?
                    .flatten()
                    .into_iter()
                    .collect();
                Ok(ResolvedTarget {
                    files: vec![path],
                    packages,
                })
            }
            ScanTarget::PackageByName { name, version } => {
                path_safety::validate_package_name(name)?;
                let base = std::env::current_dir().map_err(NullVoidError::Io)?;
                // Anchor the install dir under node_modules; a hostile name
                // cannot resolve outside it.
                let node_modules = base.join("node_modules");
                let installed = path_safety::validate_path(Path::new(name), &node_modules)?;
                if installed.is_dir() {
                    let mut files = Vec::new();
                    walk_directory(&installed, &mut files)?;
                    let packages = package::enumerate_packages(&installed, self.settings.depth)?;
                    Ok(ResolvedTarget { files, packages })
                } else {
                    // Not installed locally: registry-facing analysis only.
                    tracing::info!(
                        package = %name,
                        "package not installed locally, running registry analysis only"
                    );
                    Ok(ResolvedTarget {
                        files: Vec::new(),
                        packages: vec![PackageDescriptor {
                            name: name.clone(),
                            version: version.clone(),
                            path: base,
                            declared_dependencies: Default::default(),
                            scripts: Default::default(),
                            repository_url: None,
                        }],
                    })
                }
            }
        }
    }

    /// Fixed in-file order: size-capped streaming read, pattern/entropy
    /// pass, structural analysis. Across files, no ordering guarantee.
    fn scan_files(
        &self,
        files: &[PathBuf],
        packages: &[PackageDescriptor],
    ) -> (Vec<Threat>, PoolMetrics) {
        let pool_config = PoolConfig {
            max_workers: if self.parallel {
                self.settings.detector.max_workers
            } else {
                1
            },
            chunk_size: self.settings.detector.chunk_size,
            timeout_per_item: self.settings.detector.timeout_per_item,
            retry_attempts: self.settings.detector.retry_attempts,
        };

        let detectors = Arc::clone(&self.detectors);
        let detector_config = &self.settings.detector;
        let reader = StreamingReader::new(DEFAULT_CHUNK_SIZE, detector_config.max_file_size);

        let (results, metrics) = run_parallel(
            files.to_vec(),
            &pool_config,
            &self.cancel,
            move |file, signal| {
                if signal.should_stop() {
                    return Err(NullVoidError::Timeout(0));
                }

                let mut content = String::new();
                let outcome = reader.stream_file(file, |_, line, _| {
                    content.push_str(line);
                    content.push('\n');
                })?;

                if let ReadOutcome::TooLarge { bytes_read } = outcome {
                    // Partial work is discarded; the size finding stands alone.
                    return Ok(vec![
                        Threat::new(
                            ThreatKind::FileTooLarge,
                            Severity::Medium,
                            format!("File exceeds size cap after {bytes_read} bytes"),
                            file,
                        )
                        .with_confidence(1.0)
                        .with_meta("bytesRead", serde_json::json!(bytes_read)),
                    ]);
                }

                if signal.should_stop() {
                    return Err(NullVoidError::Timeout(0));
                }

                let owning = owning_package(file, packages);
                let ctx = FileContext {
                    path: file,
                    content: &content,
                    config: detector_config,
                    package: owning,
                };
                Ok(detectors.run_all(&ctx))
            },
        );

        let mut threats = Vec::new();
        for (index, result) in results {
            match result {
                Ok(found) => threats.extend(found),
                Err(err) => {
                    let path = &files[index];
                    tracing::warn!(file = %path.display(), error = %err, "file analysis failed");
                    threats.push(
                        Threat::new(
                            ThreatKind::AnalysisError,
                            Severity::Low,
                            format!("Analysis failed: {err}"),
                            path,
                        )
                        .with_confidence(1.0),
                    );
                }
            }
        }
        (threats, metrics)
    }

    /// Package-level passes: dependency confusion and advisory lookups.
    fn analyze_packages(&self, packages: &[PackageDescriptor], threats: &mut Vec<Threat>) {
        for descriptor in packages {
            if self.cancel.is_cancelled() {
                return;
            }

            if self.settings.detector.dependency_confusion_enabled
                && let (Some(confusion), Some(dates)) = (&self.confusion, &self.dates)
            {
                threats.extend(confusion.analyze(descriptor, dates.as_ref()));
            }

            if let Some(ioc) = &self.ioc {
                let results = ioc.lookup(&descriptor.name, &descriptor.version);
                let manifest = descriptor.path.join("package.json");
                merge_ioc_results(threats, &results, &manifest);

                // Declared dependencies may not be installed; query them by
                // their cleaned range so missing installs still get advisory
                // coverage.
                for (name, range) in &descriptor.declared_dependencies {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    if packages.iter().any(|p| &p.name == name) {
                        continue;
                    }
                    let version = clean_version_range(range);
                    let results = ioc.lookup(name, &version);
                    merge_ioc_results(threats, &results, &manifest);
                }
            }
        }
    }
}

struct ResolvedTarget {
    files: Vec<PathBuf>,
    packages: Vec<PackageDescriptor>,
}

/// Recursive walk under path safety: hidden entries and the denylist are
/// excluded by `safe_list_dir`, off-list extensions are silently skipped,
/// and symlinks are never followed so nothing escapes the base.
fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for name in path_safety::safe_list_dir(dir)? {
        let entry = dir.join(&name);
        if entry
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(true)
        {
            continue;
        }
        if entry.is_dir() {
            walk_directory(&entry, files)?;
        } else if path_safety::has_allowed_extension(&entry) {
            files.push(entry);
        }
    }
    Ok(())
}

fn owning_package<'a>(
    file: &Path,
    packages: &'a [PackageDescriptor],
) -> Option<&'a PackageDescriptor> {
    packages
        .iter()
        .filter(|p| file.starts_with(&p.path))
        .max_by_key(|p| p.path.components().count())
}

/// Strip range operators off a declared version so advisory lookups get a
/// concrete-looking version.
fn clean_version_range(range: &str) -> String {
    range
        .trim_start_matches(['^', '~', '>', '<', '='])
        .trim()
        .split_whitespace()
        .next()
        .unwrap_or("0.0.0")
        .to_string()
}

fn threat_from_security_error(err: &NullVoidError, target: &str) -> Threat {
    let kind = match err {
        NullVoidError::CommandInjection(_) => ThreatKind::CommandInjection,
        _ => ThreatKind::PathTraversal,
    };
    Threat::new(
        kind,
        Severity::High,
        format!("Rejected unsafe target path: {err}"),
        target,
    )
    .with_confidence(0.95)
}
