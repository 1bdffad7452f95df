//! Terminal styling helpers

use crate::core::Severity;

/// Whether colored output is appropriate right now.
#[must_use]
pub fn colors_enabled() -> bool {
    if std::env::var_os("NULLVOID_NO_COLOR").is_some_and(|v| v == "true" || v == "1") {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

/// Severity marker used in markdown and table output.
#[must_use]
pub fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::High => "🟠",
        Severity::Medium => "🟡",
        Severity::Low => "🟢",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_mapping() {
        assert_eq!(severity_emoji(Severity::Critical), "🔴");
        assert_eq!(severity_emoji(Severity::Low), "🟢");
    }
}
