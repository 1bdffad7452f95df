//! Dependency-confusion analysis
//!
//! Correlates a package's public-registry timeline with its local
//! repository history and name shape, producing timeline, scope, pattern,
//! activity, and score-driven threats. Every threat carries the feature
//! snapshot in its metadata for explainability.

pub mod gitinfo;
pub mod naming;
pub mod registry;
pub mod scoring;

use jiff::Timestamp;

use crate::config::DependencyConfusionConfig;
use crate::core::{
    DependencyTimeline, PackageDescriptor, ScopeKind, Severity, Threat, ThreatKind,
};

pub use gitinfo::RepoActivity;
pub use registry::{CreationDateSource, NpmRegistrySource};
pub use scoring::{FeatureVector, LinearScorer, ScoreOutcome, ThreatScorer};

/// Name similarity above which a typosquat finding fires.
const SIMILARITY_ALERT: f64 = 0.8;
/// Commits per year below which a package counts as dormant.
const LOW_ACTIVITY_COMMITS: usize = 5;

pub struct ConfusionAnalyzer {
    config: DependencyConfusionConfig,
    linear: LinearScorer,
    external_scorer: Option<Box<dyn ThreatScorer>>,
}

impl ConfusionAnalyzer {
    #[must_use]
    pub fn new(config: DependencyConfusionConfig) -> Self {
        let linear = LinearScorer::new(config.weights.clone());
        Self {
            config,
            linear,
            external_scorer: None,
        }
    }

    /// Replace the linear scorer with an external one; the linear default
    /// remains the fallback.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Box<dyn ThreatScorer>) -> Self {
        self.external_scorer = Some(scorer);
        self
    }

    /// Full analysis for one package.
    ///
    /// Registry and repository failures degrade to unknown features rather
    /// than failing the scan.
    pub fn analyze(
        &self,
        package: &PackageDescriptor,
        dates: &dyn CreationDateSource,
    ) -> Vec<Threat> {
        let registry_created = match dates.creation_date(&package.name) {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(package = %package.name, error = %err, "registry date unavailable");
                None
            }
        };
        let activity = gitinfo::read_repo_activity(&package.path).unwrap_or_default();

        self.evaluate(package, registry_created, &activity)
    }

    /// Analysis core, separated from I/O for testability.
    #[must_use]
    pub fn evaluate(
        &self,
        package: &PackageDescriptor,
        registry_created: Option<Timestamp>,
        activity: &RepoActivity,
    ) -> Vec<Threat> {
        let manifest = package.path.join("package.json");
        let scope_kind = naming::classify_scope(&package.name, &self.config.private_scopes);
        let matched_patterns =
            naming::suspicious_matches(&package.name, &self.config.suspicious_name_patterns);
        let similar = naming::most_similar_popular(&package.name, &self.config.popular_packages);

        let days_difference = match (registry_created, activity.first_commit) {
            (Some(created), Some(first)) => {
                Some(((created.as_second() - first.as_second()).abs() as f64) / 86_400.0)
            }
            _ => None,
        };

        let timeline = DependencyTimeline {
            registry_created,
            first_commit: activity.first_commit,
            recent_commit_count: activity.commits_last_year,
            scope_kind,
            suspicious_name_patterns: matched_patterns.clone(),
        };

        let features = self.build_features(
            days_difference,
            scope_kind,
            registry_created.is_some(),
            &matched_patterns,
            similar.as_ref(),
            activity,
        );
        let outcome = scoring::score_with_fallback(
            self.external_scorer.as_deref(),
            &self.linear,
            &features,
        );

        let mut threats = Vec::new();

        // Timeline: gap between public creation and first local commit.
        if let Some(days) = days_difference {
            let severity = timeline_bucket(days);
            if severity > Severity::Low {
                threats.push(
                    self.threat(
                        ThreatKind::DependencyConfusionTimeline,
                        severity,
                        format!(
                            "Package appeared on the public registry {days:.0} day(s) from the repository's first commit",
                        ),
                        &manifest,
                        package,
                        &features,
                        &outcome,
                    )
                    .with_meta(
                        "timeline",
                        serde_json::to_value(&timeline).unwrap_or(serde_json::Value::Null),
                    ),
                );
            }
        }

        // Scope: a private scope that resolves on the public registry.
        if scope_kind == ScopeKind::Private && registry_created.is_some() {
            threats.push(self.threat(
                ThreatKind::DependencyConfusionScope,
                Severity::High,
                format!(
                    "Private scope {} conflicts with a public registry package",
                    naming::parse_scope(&package.name).unwrap_or(&package.name),
                ),
                &manifest,
                package,
                &features,
                &outcome,
            ));
        }

        // Naming patterns.
        if !matched_patterns.is_empty() {
            let severity = if matched_patterns.len() >= 2 {
                Severity::High
            } else {
                Severity::Medium
            };
            threats.push(
                self.threat(
                    ThreatKind::DependencyConfusionPattern,
                    severity,
                    format!(
                        "Package name matches {} suspicious naming pattern(s)",
                        matched_patterns.len()
                    ),
                    &manifest,
                    package,
                    &features,
                    &outcome,
                )
                .with_meta("matchedPatterns", serde_json::json!(matched_patterns)),
            );
        }

        // Activity: dormant repository behind a live registry name.
        let old_first_commit = activity.first_commit.is_some_and(|first| {
            Timestamp::now().as_second() - first.as_second() > 365 * 24 * 60 * 60
        });
        if old_first_commit && activity.commits_last_year < LOW_ACTIVITY_COMMITS {
            threats.push(self.threat(
                ThreatKind::DependencyConfusionActivity,
                Severity::Medium,
                format!(
                    "Repository is dormant: {} commit(s) in the last year",
                    activity.commits_last_year
                ),
                &manifest,
                package,
                &features,
                &outcome,
            ));
        }

        // Score-driven findings, independent of the timeline bucket.
        if outcome.score >= self.config.anomaly_threshold {
            threats.push(
                self.threat(
                    ThreatKind::DependencyConfusionMlAnomaly,
                    Severity::High,
                    format!("Composite threat score {:.2} crosses anomaly threshold", outcome.score),
                    &manifest,
                    package,
                    &features,
                    &outcome,
                )
                .with_confidence(0.8),
            );
        } else if outcome.score >= self.config.predictive_threshold {
            threats.push(
                self.threat(
                    ThreatKind::DependencyConfusionPredictive,
                    Severity::Low,
                    format!("Early-warning threat score {:.2}", outcome.score),
                    &manifest,
                    package,
                    &features,
                    &outcome,
                )
                .with_confidence(0.5),
            );
        }

        threats
    }

    fn build_features(
        &self,
        days_difference: Option<f64>,
        scope_kind: ScopeKind,
        on_public_registry: bool,
        matched_patterns: &[String],
        similar: Option<&(String, f64)>,
        activity: &RepoActivity,
    ) -> FeatureVector {
        let timeline_risk = days_difference
            .map(|days| timeline_bucket(days).score())
            .unwrap_or(0.0);
        let scope_risk = match (scope_kind, on_public_registry) {
            (ScopeKind::Private, true) => 1.0,
            (ScopeKind::Private, false) => 0.3,
            (ScopeKind::Unknown, _) => 0.2,
            (ScopeKind::Public, _) => 0.0,
        };
        let naming_risk =
            (matched_patterns.len() as f64 / 2.0).min(1.0);
        let similarity = similar.map(|(_, s)| *s).unwrap_or(0.0);
        // Identical names are the package itself, not a squat.
        let similarity_risk = if similarity >= SIMILARITY_ALERT && similarity < 1.0 {
            similarity
        } else {
            0.0
        };
        let activity_risk = if activity.commits_last_year < LOW_ACTIVITY_COMMITS {
            0.6 + 0.4 * activity.trivial_message_ratio
        } else {
            0.4 * activity.trivial_message_ratio
                + 0.2 * (activity.dominant_author_share - 0.9).max(0.0) * 10.0
        };

        FeatureVector {
            days_difference,
            timeline_risk,
            scope_risk,
            naming_risk,
            activity_risk: activity_risk.min(1.0),
            similarity_risk,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn threat(
        &self,
        kind: ThreatKind,
        severity: Severity,
        message: String,
        manifest: &std::path::Path,
        package: &PackageDescriptor,
        features: &FeatureVector,
        outcome: &ScoreOutcome,
    ) -> Threat {
        let mut threat = Threat::new(kind, severity, message, manifest)
            .with_details(format!("Dependency-confusion analysis of {}", package.key()))
            .with_meta("package", serde_json::json!(package.key()))
            .with_meta(
                "features",
                serde_json::to_value(features).unwrap_or(serde_json::Value::Null),
            )
            .with_meta("threatScore", serde_json::json!(outcome.score));
        if let Some(days) = features.days_difference {
            threat = threat.with_meta("daysDifference", serde_json::json!(days.round()));
        }
        if let Some(importance) = &outcome.importance {
            threat = threat.with_meta(
                "featureImportance",
                serde_json::to_value(importance).unwrap_or(serde_json::Value::Null),
            );
        }
        threat
    }
}

/// Bucket a timeline gap: ≤1 day Critical, ≤3 High, ≤7 Medium, else Low.
#[must_use]
pub fn timeline_bucket(days: f64) -> Severity {
    if days <= 1.0 {
        Severity::Critical
    } else if days <= 3.0 {
        Severity::High
    } else if days <= 7.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
