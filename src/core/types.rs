//! Shared scan types - threats, targets, packages, risk

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Severity levels for threats
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Severity {
    /// Numeric weight used by the risk scorer.
    #[must_use]
    pub fn score(self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.75,
            Self::Medium => 0.5,
            Self::Low => 0.25,
        }
    }

    /// One step down, used for config-file downgrades.
    #[must_use]
    pub fn downgraded(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Threat classification
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    WalletHijacking,
    ObfuscatedCode,
    MaliciousCodeStructure,
    SuspiciousModule,
    DynamicRequire,
    PathTraversal,
    CommandInjection,
    DependencyConfusionTimeline,
    DependencyConfusionScope,
    DependencyConfusionPattern,
    DependencyConfusionActivity,
    DependencyConfusionMlAnomaly,
    DependencyConfusionPredictive,
    VulnerablePackage,
    SuspiciousFile,
    HighEntropy,
    SandboxViolation,
    SandboxTimeout,
    FileTooLarge,
    AnalysisError,
    Other(String),
}

impl ThreatKind {
    /// Stable identifier used as SARIF `ruleId` and in machine output.
    #[must_use]
    pub fn rule_id(&self) -> String {
        match self {
            Self::WalletHijacking => "WALLET_HIJACKING".to_string(),
            Self::ObfuscatedCode => "OBFUSCATED_CODE".to_string(),
            Self::MaliciousCodeStructure => "MALICIOUS_CODE_STRUCTURE".to_string(),
            Self::SuspiciousModule => "SUSPICIOUS_MODULE".to_string(),
            Self::DynamicRequire => "DYNAMIC_REQUIRE".to_string(),
            Self::PathTraversal => "PATH_TRAVERSAL".to_string(),
            Self::CommandInjection => "COMMAND_INJECTION".to_string(),
            Self::DependencyConfusionTimeline => "DEPENDENCY_CONFUSION_TIMELINE".to_string(),
            Self::DependencyConfusionScope => "DEPENDENCY_CONFUSION_SCOPE".to_string(),
            Self::DependencyConfusionPattern => "DEPENDENCY_CONFUSION_PATTERN".to_string(),
            Self::DependencyConfusionActivity => "DEPENDENCY_CONFUSION_ACTIVITY".to_string(),
            Self::DependencyConfusionMlAnomaly => "DEPENDENCY_CONFUSION_ML_ANOMALY".to_string(),
            Self::DependencyConfusionPredictive => "DEPENDENCY_CONFUSION_PREDICTIVE".to_string(),
            Self::VulnerablePackage => "VULNERABLE_PACKAGE".to_string(),
            Self::SuspiciousFile => "SUSPICIOUS_FILE".to_string(),
            Self::HighEntropy => "HIGH_ENTROPY".to_string(),
            Self::SandboxViolation => "SANDBOX_VIOLATION".to_string(),
            Self::SandboxTimeout => "SANDBOX_TIMEOUT".to_string(),
            Self::FileTooLarge => "FILE_TOO_LARGE".to_string(),
            Self::AnalysisError => "ANALYSIS_ERROR".to_string(),
            Self::Other(name) => name.to_uppercase().replace([' ', '-'], "_"),
        }
    }
}

/// A structured finding with type, severity, confidence, location, and evidence.
///
/// The central record of a scan. Produced by detectors on worker threads and
/// moved back to the orchestrator via channel; owned by the final report.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Threat {
    #[serde(rename = "type")]
    pub kind: ThreatKind,
    pub severity: Severity,
    /// Detector confidence in [0.0, 1.0].
    pub confidence: f64,
    pub message: String,
    pub details: String,
    pub file_path: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    /// Shortest contiguous excerpt containing the matched pattern, with an
    /// ellipsis marker when legitimate prefix code was elided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_code: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Threat {
    pub fn new(
        kind: ThreatKind,
        severity: Severity,
        message: impl Into<String>,
        file_path: impl AsRef<Path>,
    ) -> Self {
        let file_path = file_path.as_ref();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            kind,
            severity,
            confidence: 0.7,
            message: message.into(),
            details: String::new(),
            file_path: file_path.to_string_lossy().into_owned(),
            file_name,
            line_number: None,
            sample_code: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        self.line_number = Some(line);
        self
    }

    #[must_use]
    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample_code = Some(sample.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Key used to drop exact duplicates from the final threat list.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String, Option<usize>, Option<String>) {
        (
            self.kind.rule_id(),
            self.file_path.clone(),
            self.line_number,
            self.sample_code.clone(),
        )
    }
}

/// What the scanner was pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    Directory(PathBuf),
    PackageByName { name: String, version: String },
    SingleFile(PathBuf),
}

impl ScanTarget {
    /// The base path all later resolved paths must remain descendants of.
    ///
    /// For `PackageByName` the base is fixed once the package directory has
    /// been located under `node_modules`.
    #[must_use]
    pub fn base_path(&self) -> Option<&Path> {
        match self {
            Self::Directory(p) => Some(p),
            Self::SingleFile(p) => p.parent(),
            Self::PackageByName { .. } => None,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Directory(p) | Self::SingleFile(p) => p.display().to_string(),
            Self::PackageByName { name, version } => format!("{name}@{version}"),
        }
    }
}

/// Content class used for entropy thresholds and severity downgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Config,
    Data,
}

impl ContentType {
    /// Classify by file extension. Unknown extensions are treated as data.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("js" | "mjs" | "ts" | "jsx" | "tsx") => Self::Code,
            Some("json" | "yml" | "yaml") => Self::Config,
            _ => Self::Data,
        }
    }
}

/// Parsed package manifest, immutable for the duration of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    #[serde(default)]
    pub declared_dependencies: HashMap<String, String>,
    #[serde(default)]
    pub scripts: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
}

impl PackageDescriptor {
    /// Stable `name@version` key; threats reference packages by this key
    /// rather than holding the package record itself.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Package scope classification for dependency-confusion analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Private,
    Public,
    Unknown,
}

/// Registry/repository timeline evidence for one package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyTimeline {
    pub registry_created: Option<Timestamp>,
    pub first_commit: Option<Timestamp>,
    pub recent_commit_count: usize,
    pub scope_kind: ScopeKind,
    pub suspicious_name_patterns: Vec<String>,
}

/// One advisory hit from an IoC provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocResult {
    pub package_name: String,
    pub version: String,
    pub vulnerability_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve_id: Option<String>,
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub affected_ranges: Vec<String>,
    #[serde(default)]
    pub fixed_versions: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    pub source_provider: String,
}

/// Per-category CIA scores in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryScores {
    pub confidentiality: f64,
    pub integrity: f64,
    pub availability: f64,
}

/// Severity histogram over a threat set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SeverityHistogram {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityHistogram {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }
}

/// Composite risk produced once per scan, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall: f64,
    pub by_category: CategoryScores,
    pub by_severity: SeverityHistogram,
}
