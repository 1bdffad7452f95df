//! Composite CIA risk scoring
//!
//! Each threat type maps to one of confidentiality, integrity, or
//! availability; severity times confidence weighs each threat into its
//! category, categories clip to [0, 1], and the overall score is the
//! doubled weighted sum. Deterministic for a given threat set.

use crate::core::{CategoryScores, RiskAssessment, SeverityHistogram, Threat, ThreatKind};

const CONFIDENTIALITY_WEIGHT: f64 = 0.35;
const INTEGRITY_WEIGHT: f64 = 0.45;
const AVAILABILITY_WEIGHT: f64 = 0.20;

/// CIA category a threat type counts toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Confidentiality,
    Integrity,
    Availability,
}

#[must_use]
pub fn category_for(kind: &ThreatKind) -> RiskCategory {
    match kind {
        // Data leaves the machine or becomes readable.
        ThreatKind::SuspiciousModule
        | ThreatKind::PathTraversal
        | ThreatKind::SuspiciousFile
        | ThreatKind::HighEntropy
        | ThreatKind::VulnerablePackage => RiskCategory::Confidentiality,

        // Code or dependency resolution is tampered with.
        ThreatKind::WalletHijacking
        | ThreatKind::ObfuscatedCode
        | ThreatKind::MaliciousCodeStructure
        | ThreatKind::DynamicRequire
        | ThreatKind::CommandInjection
        | ThreatKind::DependencyConfusionTimeline
        | ThreatKind::DependencyConfusionScope
        | ThreatKind::DependencyConfusionPattern
        | ThreatKind::DependencyConfusionActivity
        | ThreatKind::DependencyConfusionMlAnomaly
        | ThreatKind::DependencyConfusionPredictive
        | ThreatKind::SandboxViolation
        | ThreatKind::Other(_) => RiskCategory::Integrity,

        // The scan or the system degrades.
        ThreatKind::SandboxTimeout | ThreatKind::FileTooLarge | ThreatKind::AnalysisError => {
            RiskCategory::Availability
        }
    }
}

/// Score a threat set. Produced once per scan and never mutated.
#[must_use]
pub fn assess(threats: &[Threat]) -> RiskAssessment {
    let mut confidentiality = 0.0;
    let mut integrity = 0.0;
    let mut availability = 0.0;
    let mut by_severity = SeverityHistogram::default();

    for threat in threats {
        by_severity.record(threat.severity);
        let weight = threat.severity.score() * threat.confidence;
        match category_for(&threat.kind) {
            RiskCategory::Confidentiality => confidentiality += weight,
            RiskCategory::Integrity => integrity += weight,
            RiskCategory::Availability => availability += weight,
        }
    }

    let by_category = CategoryScores {
        confidentiality: confidentiality.clamp(0.0, 1.0),
        integrity: integrity.clamp(0.0, 1.0),
        availability: availability.clamp(0.0, 1.0),
    };

    let weighted = CONFIDENTIALITY_WEIGHT * by_category.confidentiality
        + INTEGRITY_WEIGHT * by_category.integrity
        + AVAILABILITY_WEIGHT * by_category.availability;

    RiskAssessment {
        overall: (2.0 * weighted).clamp(0.0, 1.0),
        by_category,
        by_severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    fn threat(kind: ThreatKind, severity: Severity, confidence: f64) -> Threat {
        Threat::new(kind, severity, "test", "/pkg/index.js").with_confidence(confidence)
    }

    #[test]
    fn test_empty_set_scores_zero() {
        let assessment = assess(&[]);
        assert_eq!(assessment.overall, 0.0);
        assert_eq!(assessment.by_category.integrity, 0.0);
    }

    #[test]
    fn test_single_critical_integrity_threat() {
        let threats = vec![threat(ThreatKind::WalletHijacking, Severity::Critical, 1.0)];
        let assessment = assess(&threats);
        // weight = 1.0; integrity = 1.0; overall = 2 * 0.45 = 0.9
        assert!((assessment.by_category.integrity - 1.0).abs() < 1e-9);
        assert!((assessment.overall - 0.9).abs() < 1e-9);
        assert_eq!(assessment.by_severity.critical, 1);
    }

    #[test]
    fn test_categories_clip_at_one() {
        let threats: Vec<Threat> = (0..10)
            .map(|_| threat(ThreatKind::ObfuscatedCode, Severity::Critical, 1.0))
            .collect();
        let assessment = assess(&threats);
        assert_eq!(assessment.by_category.integrity, 1.0);
        assert!(assessment.overall <= 1.0);
    }

    #[test]
    fn test_confidence_scales_weight() {
        let strong = assess(&[threat(ThreatKind::HighEntropy, Severity::Medium, 1.0)]);
        let weak = assess(&[threat(ThreatKind::HighEntropy, Severity::Medium, 0.3)]);
        assert!(strong.overall > weak.overall);
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let threats = vec![
            threat(ThreatKind::WalletHijacking, Severity::Critical, 0.9),
            threat(ThreatKind::HighEntropy, Severity::Medium, 0.7),
            threat(ThreatKind::AnalysisError, Severity::Low, 0.5),
        ];
        let first = assess(&threats);
        let second = assess(&threats);
        assert_eq!(first.overall, second.overall);
        assert_eq!(first.by_category.availability, second.by_category.availability);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            category_for(&ThreatKind::PathTraversal),
            RiskCategory::Confidentiality
        );
        assert_eq!(
            category_for(&ThreatKind::DependencyConfusionScope),
            RiskCategory::Integrity
        );
        assert_eq!(
            category_for(&ThreatKind::FileTooLarge),
            RiskCategory::Availability
        );
    }
}
