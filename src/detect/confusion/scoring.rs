//! Threat scoring for dependency confusion
//!
//! A weighted linear combination over the feature vector is the default;
//! an external scorer can replace it through the `ThreatScorer` trait and
//! the analyzer degrades back to the linear default when the external
//! scorer is absent or fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// Features extracted for one package, all normalized to [0, 1] except the
/// raw day gap carried for explainability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Days between registry creation and first local commit, if both known.
    pub days_difference: Option<f64>,
    pub timeline_risk: f64,
    pub scope_risk: f64,
    pub naming_risk: f64,
    pub activity_risk: f64,
    pub similarity_risk: f64,
}

impl FeatureVector {
    /// Map of feature name to value, in the weight map's vocabulary.
    #[must_use]
    pub fn as_map(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("timeline".to_string(), self.timeline_risk),
            ("scope".to_string(), self.scope_risk),
            ("naming".to_string(), self.naming_risk),
            ("activity".to_string(), self.activity_risk),
            ("similarity".to_string(), self.similarity_risk),
        ])
    }
}

/// Outcome of a scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// Composite threat score in [0, 1].
    pub score: f64,
    /// Optional per-feature importance for explainability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<HashMap<String, f64>>,
}

/// Pluggable scorer capability.
pub trait ThreatScorer: Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, features: &FeatureVector) -> Result<ScoreOutcome>;
}

/// The built-in weighted linear scorer.
pub struct LinearScorer {
    weights: HashMap<String, f64>,
}

impl LinearScorer {
    #[must_use]
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self { weights }
    }
}

impl ThreatScorer for LinearScorer {
    fn name(&self) -> &'static str {
        "weighted-linear"
    }

    fn score(&self, features: &FeatureVector) -> Result<ScoreOutcome> {
        let values = features.as_map();
        let mut score = 0.0;
        let mut importance = HashMap::new();
        for (feature, value) in &values {
            let weight = self.weights.get(feature).copied().unwrap_or(0.0);
            let contribution = weight * value;
            score += contribution;
            importance.insert(feature.clone(), contribution);
        }
        Ok(ScoreOutcome {
            score: score.clamp(0.0, 1.0),
            importance: Some(importance),
        })
    }
}

/// Score with the external scorer when present, falling back to the linear
/// default on absence or failure.
pub fn score_with_fallback(
    external: Option<&dyn ThreatScorer>,
    linear: &LinearScorer,
    features: &FeatureVector,
) -> ScoreOutcome {
    if let Some(scorer) = external {
        match scorer.score(features) {
            Ok(outcome) if (0.0..=1.0).contains(&outcome.score) => return outcome,
            Ok(outcome) => {
                tracing::warn!(
                    scorer = scorer.name(),
                    score = outcome.score,
                    "external scorer returned out-of-range score, using linear default"
                );
            }
            Err(err) => {
                tracing::warn!(
                    scorer = scorer.name(),
                    error = %err,
                    "external scorer failed, using linear default"
                );
            }
        }
    }
    linear
        .score(features)
        .unwrap_or(ScoreOutcome {
            score: 0.0,
            importance: None,
        })
}
