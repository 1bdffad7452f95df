//! Shannon entropy over character frequencies
//!
//! High entropy flags packed or encoded data. Thresholds are content-type
//! specific; the caller decides what to do with a crossing.

use std::collections::HashMap;

/// `-Σ p_i·log2(p_i)` over character frequencies. Empty input is 0.
#[must_use]
pub fn shannon_entropy(content: &str) -> f64 {
    if content.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<char, u32> = HashMap::new();
    let mut total = 0u32;
    for c in content.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }

    let total = f64::from(total);
    counts
        .values()
        .map(|&count| {
            let p = f64::from(count) / total;
            -p * p.log2()
        })
        .sum()
}

/// Minimum line length considered for per-line entropy checks; shorter
/// lines produce noisy estimates.
pub const MIN_LINE_LENGTH: usize = 40;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn test_single_repeated_char_is_zero() {
        assert_eq!(shannon_entropy("aaaaaaaaaa"), 0.0);
    }

    #[test]
    fn test_two_symbols_is_one_bit() {
        let entropy = shannon_entropy("abababab");
        assert!((entropy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_base64_blob_is_high() {
        let blob = "dGhpcyBpcyBhIHNlY3JldCBwYXlsb2FkIGZvciB0ZXN0aW5nIGVudHJvcHkgY2FsY3VsYXRpb25zIQ==";
        assert!(shannon_entropy(blob) > 4.5);
    }

    #[test]
    fn test_plain_prose_is_moderate() {
        let prose = "the quick brown fox jumps over the lazy dog and keeps running";
        let entropy = shannon_entropy(prose);
        assert!(entropy > 3.0 && entropy < 4.5);
    }
}
