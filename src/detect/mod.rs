//! Detection pipeline
//!
//! Independent detectors behind one capability trait. Each detector
//! declares what it applies to and returns threats; the registry runs the
//! applicable ones in a fixed order and isolates panics so one bad
//! detector cannot take down a worker.

pub mod catalogue;
pub mod confusion;
pub mod entropy;
pub mod legitimacy;
pub mod patterns;
pub mod scripts;

use std::path::Path;

use crate::config::DetectorConfig;
use crate::core::{PackageDescriptor, Threat};

pub use catalogue::{PatternCatalogue, PatternFamily};
pub use patterns::PatternDetector;

/// Everything a detector may look at for one file. Content is already in
/// memory; detectors never touch the filesystem themselves.
pub struct FileContext<'a> {
    pub path: &'a Path,
    pub content: &'a str,
    pub config: &'a DetectorConfig,
    pub package: Option<&'a PackageDescriptor>,
}

/// Capability set every file-level detector satisfies.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;
    fn applicable(&self, path: &Path) -> bool;
    fn run(&self, ctx: &FileContext<'_>) -> Vec<Threat>;
}

/// Pattern + entropy detection (the streaming pass).
pub struct PatternEntropyDetector {
    inner: PatternDetector,
}

impl PatternEntropyDetector {
    #[must_use]
    pub fn new(detector: PatternDetector) -> Self {
        Self { inner: detector }
    }
}

impl Detector for PatternEntropyDetector {
    fn name(&self) -> &'static str {
        "pattern-entropy"
    }

    fn applicable(&self, path: &Path) -> bool {
        crate::core::path_safety::has_allowed_extension(path)
    }

    fn run(&self, ctx: &FileContext<'_>) -> Vec<Threat> {
        self.inner.scan_content(ctx.content, ctx.path, ctx.config)
    }
}

/// Structural analysis of package manifests (lifecycle scripts).
pub struct StructureDetector;

impl Detector for StructureDetector {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn applicable(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|n| n == "package.json")
    }

    fn run(&self, ctx: &FileContext<'_>) -> Vec<Threat> {
        match ctx.package {
            Some(package) => scripts::analyze_scripts(package),
            None => Vec::new(),
        }
    }
}

/// Ordered collection of detectors. Order is fixed per scan: the pattern
/// pass runs before structural analysis.
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Registry with the default pipeline.
    #[must_use]
    pub fn with_defaults(pattern_detector: PatternDetector) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PatternEntropyDetector::new(pattern_detector)));
        registry.register(Box::new(StructureDetector));
        registry
    }

    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every applicable detector over the context, in registration
    /// order. A panicking detector is logged and skipped.
    #[must_use]
    pub fn run_all(&self, ctx: &FileContext<'_>) -> Vec<Threat> {
        let mut threats = Vec::new();
        for detector in &self.detectors {
            if !detector.applicable(ctx.path) {
                continue;
            }
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                detector.run(ctx)
            }));
            match result {
                Ok(found) => threats.extend(found),
                Err(_) => {
                    tracing::error!(detector = detector.name(), "detector panicked");
                }
            }
        }
        threats
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_defaults(PatternDetector::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickyDetector;

    impl Detector for PanickyDetector {
        fn name(&self) -> &'static str {
            "panicky"
        }
        fn applicable(&self, _path: &Path) -> bool {
            true
        }
        fn run(&self, _ctx: &FileContext<'_>) -> Vec<Threat> {
            panic!("boom");
        }
    }

    #[test]
    fn test_registry_runs_applicable_detectors() {
        let registry = DetectorRegistry::default();
        let config = DetectorConfig::default();
        let ctx = FileContext {
            path: Path::new("/pkg/index.js"),
            content: "var _0x4f2a = 1; var _0x5b3c = 2;",
            config: &config,
            package: None,
        };
        let threats = registry.run_all(&ctx);
        assert!(!threats.is_empty());
    }

    #[test]
    fn test_panicking_detector_is_isolated() {
        let mut registry = DetectorRegistry::default();
        registry.register(Box::new(PanickyDetector));

        let config = DetectorConfig::default();
        let ctx = FileContext {
            path: Path::new("/pkg/index.js"),
            content: "var _0x4f2a = 1;",
            config: &config,
            package: None,
        };
        // The panicking detector is skipped, the rest still report.
        let threats = registry.run_all(&ctx);
        assert!(!threats.is_empty());
    }

    #[test]
    fn test_extension_gating() {
        let registry = DetectorRegistry::default();
        let config = DetectorConfig::default();
        let ctx = FileContext {
            path: Path::new("/pkg/binary.node"),
            content: "var _0x4f2a = 1;",
            config: &config,
            package: None,
        };
        assert!(registry.run_all(&ctx).is_empty());
    }
}
