//! Settings and configuration
//!
//! Configuration merges three sources, lowest precedence first: built-in
//! defaults, a `.nullvoidrc` / `.nullvoidrc.json` file found in the target
//! directory (then the working directory), and `NULLVOID_*` environment
//! variables. The `DEPENDENCY_CONFUSION_CONFIG` subtree deep-merges over
//! the built-in defaults; unknown file keys are ignored with a warning.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{NullVoidError, Result};
use crate::core::{ContentType, paths};

const CONFIG_FILE_NAMES: &[&str] = &[".nullvoidrc", ".nullvoidrc.json"];
const RECOGNIZED_KEYS: &[&str] = &["depth", "defaultTarget", "DEPENDENCY_CONFUSION_CONFIG"];

/// Detection pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Files above this size emit `FileTooLarge` and are skipped.
    pub max_file_size: u64,
    pub allowed_extensions: HashSet<String>,
    pub entropy_thresholds: HashMap<ContentType, f64>,
    pub dependency_confusion_enabled: bool,
    pub ioc_providers_enabled: HashSet<String>,
    pub max_workers: usize,
    pub chunk_size: usize,
    pub timeout_per_item: Duration,
    pub retry_attempts: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|v| v.get())
            .unwrap_or(1);
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: crate::core::path_safety::ALLOWED_EXTENSIONS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            entropy_thresholds: HashMap::from([
                (ContentType::Code, 4.5),
                (ContentType::Config, 5.0),
                (ContentType::Data, 5.5),
            ]),
            dependency_confusion_enabled: true,
            ioc_providers_enabled: ["osv", "github", "nvd"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_workers: cpus.min(8),
            chunk_size: 10,
            timeout_per_item: Duration::from_secs(30),
            retry_attempts: 2,
        }
    }
}

/// Dependency-confusion analyzer configuration; the file's
/// `DEPENDENCY_CONFUSION_CONFIG` subtree deep-merges over these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DependencyConfusionConfig {
    /// Scopes treated as organization-internal.
    pub private_scopes: Vec<String>,
    /// Regex sources matched against package names.
    pub suspicious_name_patterns: Vec<String>,
    /// Popular packages used for typosquat similarity checks.
    pub popular_packages: Vec<String>,
    /// Registry endpoints tried in order for creation dates.
    pub registries: Vec<String>,
    /// Feature weights for the linear threat score; informally sum to 1.
    pub weights: HashMap<String, f64>,
    /// Threat score above which an ML-anomaly threat is emitted.
    pub anomaly_threshold: f64,
    /// Threat score above which a lower-confidence predictive warning fires.
    pub predictive_threshold: f64,
}

impl Default for DependencyConfusionConfig {
    fn default() -> Self {
        Self {
            private_scopes: Vec::new(),
            suspicious_name_patterns: vec![
                r"^@[a-z0-9-]+/(internal|private|corp|dev|test|stage|staging)-".to_string(),
                r"(internal|private|corp)[-_]".to_string(),
                r"^[a-z]+-(utils|tools|common|core)-v?\d+$".to_string(),
                r"\d{4,}$".to_string(),
            ],
            popular_packages: vec![
                "react".to_string(),
                "lodash".to_string(),
                "express".to_string(),
                "axios".to_string(),
                "chalk".to_string(),
                "moment".to_string(),
                "webpack".to_string(),
                "typescript".to_string(),
                "jest".to_string(),
                "eslint".to_string(),
            ],
            registries: vec!["https://registry.npmjs.org".to_string()],
            weights: HashMap::from([
                ("timeline".to_string(), 0.30),
                ("scope".to_string(), 0.20),
                ("naming".to_string(), 0.20),
                ("activity".to_string(), 0.15),
                ("similarity".to_string(), 0.15),
            ]),
            anomaly_threshold: 0.7,
            predictive_threshold: 0.5,
        }
    }
}

/// Cache layer enablement and sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub l1_max_entries: usize,
    pub l2_enabled: bool,
    pub l2_max_bytes: u64,
    pub l2_compress: bool,
    pub l3_enabled: bool,
    pub redis_url: Option<String>,
    pub dir: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            l1_max_entries: 1024,
            l2_enabled: true,
            l2_max_bytes: 64 * 1024 * 1024,
            l2_compress: true,
            l3_enabled: false,
            redis_url: None,
            dir: paths::cache_dir(),
        }
    }
}

/// Fully resolved scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub depth: u32,
    pub default_target: Option<String>,
    pub detector: DetectorConfig,
    pub confusion: DependencyConfusionConfig,
    pub cache: CacheSettings,
    pub network_timeout: Duration,
    pub no_color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            depth: 3,
            default_target: None,
            detector: DetectorConfig::default(),
            confusion: DependencyConfusionConfig::default(),
            cache: CacheSettings::default(),
            network_timeout: Duration::from_secs(15),
            no_color: false,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then the first config file found under
    /// `search_dir` or the working directory, then environment overrides.
    pub fn load(search_dir: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = find_config_file(search_dir) {
            settings.apply_file(&path)?;
        }
        settings.apply_env();
        Ok(settings)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| NullVoidError::file(path, e))?;
        let root: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            NullVoidError::Configuration(format!("invalid config {}: {e}", path.display()))
        })?;

        let serde_json::Value::Object(map) = root else {
            return Err(NullVoidError::Configuration(format!(
                "config {} must be a JSON object",
                path.display()
            )));
        };

        tracing::debug!(path = %path.display(), "loaded config file");

        for (key, value) in &map {
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                tracing::warn!(key, "ignoring unknown config key");
            } else {
                match key.as_str() {
                    "depth" => {
                        if let Some(depth) = value.as_u64() {
                            self.depth = depth.min(10) as u32;
                        }
                    }
                    "defaultTarget" => {
                        self.default_target = value.as_str().map(str::to_string);
                    }
                    "DEPENDENCY_CONFUSION_CONFIG" => {
                        let mut merged = serde_json::to_value(&self.confusion)
                            .map_err(|e| NullVoidError::Configuration(e.to_string()))?;
                        deep_merge(&mut merged, value);
                        self.confusion = serde_json::from_value(merged).map_err(|e| {
                            NullVoidError::Configuration(format!(
                                "invalid DEPENDENCY_CONFUSION_CONFIG: {e}"
                            ))
                        })?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(secs) = env_u64("NULLVOID_CACHE_TTL") {
            self.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("NULLVOID_NETWORK_TIMEOUT") {
            self.network_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = env_u64("NULLVOID_MAX_WORKERS") {
            self.detector.max_workers = (workers as usize).clamp(1, 16);
        }
        if let Some(bytes) = env_u64("NULLVOID_MAX_FILE_SIZE") {
            self.detector.max_file_size = bytes;
        }
        if let Some(depth) = env_u64("NULLVOID_MAX_DEPTH") {
            self.depth = (depth as u32).min(10);
        }
        if let Some(no_color) = env_bool("NULLVOID_NO_COLOR") {
            self.no_color = no_color;
        }
        if let Some(enabled) = env_bool("NULLVOID_CACHE_L2_ENABLED") {
            self.cache.l2_enabled = enabled;
        }
        if let Some(enabled) = env_bool("NULLVOID_CACHE_L3_ENABLED") {
            self.cache.l3_enabled = enabled;
        }

        for provider in ["osv", "github", "nvd"] {
            let var = format!("NULLVOID_IOC_{}_ENABLED", provider.to_uppercase());
            if let Some(enabled) = env_bool(&var) {
                if enabled {
                    self.detector.ioc_providers_enabled.insert(provider.into());
                } else {
                    self.detector.ioc_providers_enabled.remove(provider);
                }
            }
        }

        self.cache.dir = paths::cache_dir();
        self.cache.redis_url = resolve_redis_url();
    }
}

/// Assemble the Redis connection URL from `NULLVOID_REDIS_*`.
/// `NULLVOID_REDIS_URL` wins outright; otherwise host/port/password/db
/// compose one, and absence of a host means no L3.
fn resolve_redis_url() -> Option<String> {
    if let Ok(url) = std::env::var("NULLVOID_REDIS_URL") {
        return Some(url);
    }
    let host = std::env::var("NULLVOID_REDIS_HOST").ok()?;
    let port = std::env::var("NULLVOID_REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    let db = std::env::var("NULLVOID_REDIS_DB").unwrap_or_else(|_| "0".to_string());
    let auth = std::env::var("NULLVOID_REDIS_PASSWORD")
        .map(|p| format!(":{p}@"))
        .unwrap_or_default();
    Some(format!("redis://{auth}{host}:{port}/{db}"))
}

fn find_config_file(search_dir: Option<&Path>) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(dir) = search_dir {
        dirs.push(dir.to_path_buf());
    }
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }

    for dir in dirs {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Recursively merge `overlay` into `base`: objects merge key-wise,
/// everything else replaces.
pub fn deep_merge(base: &mut serde_json::Value, overlay: &serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Environment value coercion: `true`/`false` become booleans, decimal
/// digit strings become numbers, everything else stays a string.
#[must_use]
pub fn coerce_env_value(raw: &str) -> serde_json::Value {
    match raw {
        "true" => serde_json::Value::Bool(true),
        "false" => serde_json::Value::Bool(false),
        _ if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => raw
            .parse::<u64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
        _ => serde_json::Value::String(raw.to_string()),
    }
}

fn env_u64(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match coerce_env_value(&raw) {
        serde_json::Value::Number(n) => n.as_u64(),
        _ => {
            tracing::warn!(var, raw, "expected numeric environment value");
            None
        }
    }
}

fn env_bool(var: &str) -> Option<bool> {
    let raw = std::env::var(var).ok()?;
    match coerce_env_value(&raw) {
        serde_json::Value::Bool(b) => Some(b),
        // "1"/"0" show up in CI environments.
        serde_json::Value::Number(n) => Some(n.as_u64() == Some(1)),
        _ => {
            tracing::warn!(var, raw, "expected boolean environment value");
            None
        }
    }
}
