//! Package name analysis
//!
//! Scope extraction and classification, suspicious-name pattern matching,
//! and Levenshtein similarity against a short list of popular packages for
//! typosquat detection.

use regex::Regex;

use crate::core::ScopeKind;

/// The `@scope` prefix of a scoped package name, without the slash.
#[must_use]
pub fn parse_scope(name: &str) -> Option<&str> {
    if !name.starts_with('@') {
        return None;
    }
    name.split('/').next()
}

/// Classify a package's scope against the configured private scopes.
/// Unscoped packages are `Unknown`.
#[must_use]
pub fn classify_scope(name: &str, private_scopes: &[String]) -> ScopeKind {
    match parse_scope(name) {
        Some(scope) => {
            if private_scopes.iter().any(|p| p == scope) {
                ScopeKind::Private
            } else {
                ScopeKind::Public
            }
        }
        None => ScopeKind::Unknown,
    }
}

/// Pattern sources from `patterns` that match `name`. Invalid patterns are
/// skipped with a warning rather than failing the scan.
#[must_use]
pub fn suspicious_matches(name: &str, patterns: &[String]) -> Vec<String> {
    let mut matched = Vec::new();
    for source in patterns {
        match Regex::new(source) {
            Ok(regex) => {
                if regex.is_match(name) {
                    matched.push(source.clone());
                }
            }
            Err(err) => {
                tracing::warn!(pattern = source, error = %err, "skipping invalid name pattern");
            }
        }
    }
    matched
}

/// Classic dynamic-programming Levenshtein distance.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Similarity in [0, 1]: 1.0 is identical.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// The popular package most similar to `name`, with its similarity. The
/// scope prefix is stripped first so `@acme/lodash` still rings the
/// `lodash` bell.
#[must_use]
pub fn most_similar_popular(name: &str, popular: &[String]) -> Option<(String, f64)> {
    let bare = name.rsplit('/').next().unwrap_or(name);
    popular
        .iter()
        .map(|candidate| (candidate.clone(), similarity(bare, candidate)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
}
