//! Pattern and entropy detection over file content
//!
//! Runs the frozen catalogue against a whole file, applies the legitimacy
//! filters, computes whole-content and per-line entropy, and shapes the
//! evidence excerpt so reports show the malicious span rather than the
//! legitimate code around it.

use std::collections::HashMap;
use std::path::Path;

use crate::config::DetectorConfig;
use crate::core::{ContentType, Severity, Threat};

use super::catalogue::{PatternCatalogue, PatternFamily};
use super::entropy::{MIN_LINE_LENGTH, shannon_entropy};
use super::legitimacy;

/// Cap on the shaped evidence excerpt.
const SAMPLE_LENGTH: usize = 60;

pub struct PatternDetector {
    catalogue: &'static PatternCatalogue,
    custom: Option<PatternCatalogue>,
}

struct FamilyMatch {
    pattern_id: String,
    start: usize,
    line: usize,
}

impl PatternDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalogue: PatternCatalogue::builtin(),
            custom: None,
        }
    }

    /// Use a catalogue extended with custom rules instead of the built-in.
    #[must_use]
    pub fn with_catalogue(catalogue: PatternCatalogue) -> Self {
        Self {
            catalogue: PatternCatalogue::builtin(),
            custom: Some(catalogue),
        }
    }

    fn active_catalogue(&self) -> &PatternCatalogue {
        self.custom.as_ref().unwrap_or(self.catalogue)
    }

    /// Scan one file's content. `path` is used for classification and
    /// threat locations only; no I/O happens here.
    #[must_use]
    pub fn scan_content(
        &self,
        content: &str,
        path: &Path,
        config: &DetectorConfig,
    ) -> Vec<Threat> {
        if legitimacy::is_test_path(path) || legitimacy::is_project_owned(path) {
            return Vec::new();
        }

        let content_type = ContentType::from_path(path);
        let (neutralized, suppress_entropy) = legitimacy::neutralized_families(content);
        let line_starts = line_start_offsets(content);

        let mut threats = Vec::new();

        // Cheap pre-pass gates the regex evaluation; entropy is cheap
        // enough to always run.
        if legitimacy::quick_suspicion(content) {
            threats.extend(self.match_patterns(
                content,
                path,
                content_type,
                &neutralized,
                &line_starts,
            ));
        }

        if !suppress_entropy {
            threats.extend(entropy_threats(content, path, content_type, config));
        }

        threats
    }

    fn match_patterns(
        &self,
        content: &str,
        path: &Path,
        content_type: ContentType,
        neutralized: &[PatternFamily],
        line_starts: &[usize],
    ) -> Vec<Threat> {
        let catalogue = self.active_catalogue();
        let mut per_family: HashMap<PatternFamily, Vec<FamilyMatch>> = HashMap::new();

        for spec in catalogue.patterns() {
            if neutralized.contains(&spec.family) {
                continue;
            }
            for found in spec.regex.find_iter(content) {
                per_family.entry(spec.family).or_default().push(FamilyMatch {
                    pattern_id: spec.id.clone(),
                    start: found.start(),
                    line: line_for_offset(line_starts, found.start()),
                });
            }
        }

        let mut threats = Vec::new();
        for (family, mut matches) in per_family {
            matches.sort_by_key(|m| m.start);
            let match_count = matches.len();
            let confidence = (0.7 + 0.1 * match_count as f64).min(0.95);

            let severity = if content_type == ContentType::Config {
                family.default_severity().downgraded()
            } else {
                family.default_severity()
            };

            // One threat per line a family fires on; the count still feeds
            // confidence so dense hits read stronger.
            let mut seen_lines = std::collections::HashSet::new();
            for m in &matches {
                if !seen_lines.insert(m.line) {
                    continue;
                }
                let sample =
                    shape_evidence(content, m.start, catalogue.legitimate_patterns());
                let pattern_ids: Vec<&str> = matches
                    .iter()
                    .filter(|other| other.line == m.line)
                    .map(|other| other.pattern_id.as_str())
                    .collect();

                threats.push(
                    Threat::new(
                        family.threat_kind(),
                        severity,
                        format!("Suspicious {} pattern detected", family.name()),
                        path,
                    )
                    .with_confidence(confidence)
                    .with_details(format!(
                        "Matched pattern(s) {} from the {} family",
                        pattern_ids.join(", "),
                        family.name()
                    ))
                    .with_line(m.line)
                    .with_sample(sample)
                    .with_meta("family", serde_json::json!(family.name()))
                    .with_meta("matchCount", serde_json::json!(match_count)),
                );
            }
        }
        threats
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn entropy_threats(
    content: &str,
    path: &Path,
    content_type: ContentType,
    config: &DetectorConfig,
) -> Vec<Threat> {
    let Some(&threshold) = config.entropy_thresholds.get(&content_type) else {
        return Vec::new();
    };

    let mut threats = Vec::new();

    let whole = shannon_entropy(content);
    if whole > threshold {
        threats.push(
            Threat::new(
                crate::core::ThreatKind::HighEntropy,
                Severity::Medium,
                format!("File entropy {whole:.2} exceeds threshold {threshold:.1}"),
                path,
            )
            .with_details("Whole-file Shannon entropy suggests packed or encoded data")
            .with_meta("entropy", serde_json::json!(whole))
            .with_meta("threshold", serde_json::json!(threshold)),
        );
    }

    for (idx, line) in content.lines().enumerate() {
        if line.len() < MIN_LINE_LENGTH {
            continue;
        }
        let line_entropy = shannon_entropy(line);
        if line_entropy > threshold {
            let mut end = SAMPLE_LENGTH.min(line.len());
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            threats.push(
                Threat::new(
                    crate::core::ThreatKind::HighEntropy,
                    Severity::Medium,
                    format!("Line entropy {line_entropy:.2} exceeds threshold {threshold:.1}"),
                    path,
                )
                .with_line(idx + 1)
                .with_sample(format!("{}...", &line[..end]))
                .with_meta("entropy", serde_json::json!(line_entropy)),
            );
        }
    }
    threats
}

/// Byte offsets where each line starts.
fn line_start_offsets(content: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// 1-based line number containing `offset`.
fn line_for_offset(line_starts: &[usize], offset: usize) -> usize {
    match line_starts.binary_search(&offset) {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    }
}

/// Build the reported excerpt.
///
/// `malware_start` is the offset of the first suspicious match. Everything
/// before it - up to the end of the longest legitimate pattern match - is
/// elided and replaced with an ellipsis marker, so the evidence shown is
/// the shortest contiguous span containing the pattern.
fn shape_evidence(content: &str, malware_start: usize, legitimate: &[regex::Regex]) -> String {
    let before = &content[..malware_start];
    let mut legitimate_end = 0usize;
    for pattern in legitimate {
        for m in pattern.find_iter(before) {
            if m.end() <= malware_start {
                legitimate_end = legitimate_end.max(m.end());
            }
        }
    }
    // Whitespace between the legitimate prefix and the match carries no
    // evidence either.
    let elided = before[legitimate_end..].trim();
    let prefix_elided = legitimate_end > 0 || !before.trim().is_empty() || !elided.is_empty();

    let mut end = (malware_start + SAMPLE_LENGTH).min(content.len());
    if let Some(newline) = content[malware_start..end].find('\n') {
        end = malware_start + newline;
    }
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    let excerpt = &content[malware_start..end];

    if prefix_elided {
        format!("... {excerpt}...")
    } else {
        format!("{excerpt}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_obfuscated_trailing_code_scenario() {
        let content = "module.exports = router;\nconst b3=I,c4=J,d5=K;";
        let detector = PatternDetector::new();
        let threats = detector.scan_content(content, Path::new("/pkg/lib/index.js"), &config());

        let structural: Vec<_> = threats
            .iter()
            .filter(|t| t.kind == crate::core::ThreatKind::MaliciousCodeStructure)
            .collect();
        assert_eq!(structural.len(), 1);

        let threat = structural[0];
        assert_eq!(threat.severity, Severity::Critical);
        assert_eq!(threat.line_number, Some(2));
        assert!(threat.confidence >= 0.7);
        let sample = threat.sample_code.as_deref().unwrap();
        assert!(
            sample.starts_with("... const b3=I"),
            "unexpected sample: {sample}"
        );
    }

    #[test]
    fn test_clean_react_component_produces_no_findings() {
        let content = r#"
import React from 'react';
import { useState, useEffect } from 'react';

export default function Panel({ items }) {
    const [open, setOpen] = useState(false);
    useEffect(() => { setOpen(items.length > 0); }, [items]);
    return <div className="panel">{open ? 'yes' : 'no'}</div>;
}
"#;
        let detector = PatternDetector::new();
        let threats = detector.scan_content(content, Path::new("/app/src/Panel.jsx"), &config());

        assert!(
            !threats.iter().any(|t| matches!(
                t.kind,
                crate::core::ThreatKind::ObfuscatedCode | crate::core::ThreatKind::HighEntropy
            )),
            "react component should not trip obfuscation or entropy"
        );
    }

    #[test]
    fn test_test_files_skipped_globally() {
        let content = "const b3=I,c4=J,d5=K; eval(atob(payload));";
        let detector = PatternDetector::new();
        let threats =
            detector.scan_content(content, Path::new("/pkg/app.test.js"), &config());
        assert!(threats.is_empty());
    }

    #[test]
    fn test_config_file_downgraded_one_step() {
        let content = r#"{"script": "var _0x4f2a=1; var _0x9bd3=2;"}"#;
        let detector = PatternDetector::new();
        let threats = detector.scan_content(content, Path::new("/pkg/config.json"), &config());

        let structural = threats
            .iter()
            .find(|t| t.kind == crate::core::ThreatKind::MaliciousCodeStructure)
            .expect("mangled names should still match in config files");
        // VariableMangling is Critical in code, High in config files.
        assert_eq!(structural.severity, Severity::High);
    }

    #[test]
    fn test_confidence_scales_with_match_count() {
        let one = "var _0x4f2a = 1;";
        let many = "var _0x4f2a=1; var _0x5b3c=2; var _0x6d4e=3; var _0x7f5a=4;";
        let detector = PatternDetector::new();

        let single = detector.scan_content(one, Path::new("/p/a.js"), &config());
        let multi = detector.scan_content(many, Path::new("/p/b.js"), &config());

        let single_conf = single
            .iter()
            .find(|t| t.kind == crate::core::ThreatKind::MaliciousCodeStructure)
            .unwrap()
            .confidence;
        let multi_conf = multi
            .iter()
            .find(|t| t.kind == crate::core::ThreatKind::MaliciousCodeStructure)
            .unwrap()
            .confidence;
        assert!(multi_conf > single_conf);
        assert!(multi_conf <= 0.95);
    }

    #[test]
    fn test_wallet_patterns_fire_without_blockchain_context() {
        let content = r#"
navigator.clipboard.readText().then(t => {
    navigator.clipboard.writeText('0x1111111111111111111111111111111111111111');
});
"#;
        let detector = PatternDetector::new();
        let threats = detector.scan_content(content, Path::new("/pkg/steal.js"), &config());
        assert!(
            threats
                .iter()
                .any(|t| t.kind == crate::core::ThreatKind::WalletHijacking)
        );
    }

    #[test]
    fn test_evidence_prefix_only_when_elided() {
        let legit = PatternCatalogue::builtin().legitimate_patterns();
        let content = "const b3=I,c4=J,d5=K;";
        let sample = shape_evidence(content, 0, legit);
        assert!(sample.starts_with("const b3=I"));
        assert!(sample.ends_with("..."));
    }

    #[test]
    fn test_line_offsets() {
        let starts = line_start_offsets("ab\ncd\nef");
        assert_eq!(starts, vec![0, 3, 6]);
        assert_eq!(line_for_offset(&starts, 0), 1);
        assert_eq!(line_for_offset(&starts, 2), 1);
        assert_eq!(line_for_offset(&starts, 3), 2);
        assert_eq!(line_for_offset(&starts, 7), 3);
    }
}
