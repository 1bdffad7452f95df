//! Frozen pattern catalogue
//!
//! One catalogue keyed by family; each family compiles its regex set once
//! at startup. A pattern that appears under two families keeps both
//! mappings, and the stricter severity wins downstream in dedup/merge.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::{NullVoidError, Result};
use crate::core::{Severity, ThreatKind};

/// Pattern families the detector knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFamily {
    VariableMangling,
    HexArrays,
    DynamicRequire,
    WalletHijacking,
    NetworkManipulation,
    FileSystemManipulation,
    CryptoManipulation,
    AntiAnalysis,
    DataExfiltration,
}

impl PatternFamily {
    pub const ALL: &'static [Self] = &[
        Self::VariableMangling,
        Self::HexArrays,
        Self::DynamicRequire,
        Self::WalletHijacking,
        Self::NetworkManipulation,
        Self::FileSystemManipulation,
        Self::CryptoManipulation,
        Self::AntiAnalysis,
        Self::DataExfiltration,
    ];

    /// Threat classification a match in this family maps to.
    #[must_use]
    pub fn threat_kind(self) -> ThreatKind {
        match self {
            Self::VariableMangling | Self::AntiAnalysis => ThreatKind::MaliciousCodeStructure,
            Self::HexArrays => ThreatKind::ObfuscatedCode,
            Self::DynamicRequire => ThreatKind::DynamicRequire,
            Self::WalletHijacking => ThreatKind::WalletHijacking,
            Self::NetworkManipulation
            | Self::FileSystemManipulation
            | Self::CryptoManipulation
            | Self::DataExfiltration => ThreatKind::SuspiciousModule,
        }
    }

    /// Default severity before config-file downgrades.
    #[must_use]
    pub fn default_severity(self) -> Severity {
        match self {
            Self::WalletHijacking
            | Self::DynamicRequire
            | Self::VariableMangling
            | Self::NetworkManipulation
            | Self::DataExfiltration => Severity::Critical,
            Self::HexArrays
            | Self::AntiAnalysis
            | Self::FileSystemManipulation
            | Self::CryptoManipulation => Severity::High,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::VariableMangling => "variable-mangling",
            Self::HexArrays => "hex-arrays",
            Self::DynamicRequire => "dynamic-require",
            Self::WalletHijacking => "wallet-hijacking",
            Self::NetworkManipulation => "network-manipulation",
            Self::FileSystemManipulation => "filesystem-manipulation",
            Self::CryptoManipulation => "crypto-manipulation",
            Self::AntiAnalysis => "anti-analysis",
            Self::DataExfiltration => "data-exfiltration",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

/// A compiled detection pattern.
pub struct PatternSpec {
    pub id: String,
    pub family: PatternFamily,
    pub regex: Regex,
}

/// The catalogue: detection patterns per family plus the legitimate-code
/// patterns used for evidence shaping.
pub struct PatternCatalogue {
    patterns: Vec<PatternSpec>,
    legitimate: Vec<Regex>,
}

static BUILTIN: LazyLock<PatternCatalogue> = LazyLock::new(PatternCatalogue::build_builtin);

impl PatternCatalogue {
    /// The built-in catalogue, compiled once per process.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    #[must_use]
    pub fn patterns(&self) -> &[PatternSpec] {
        &self.patterns
    }

    #[must_use]
    pub fn legitimate_patterns(&self) -> &[Regex] {
        &self.legitimate
    }

    /// Clone of the built-in catalogue with extra rules appended from a
    /// custom rules file: a JSON object mapping family names to arrays of
    /// regex sources.
    pub fn with_custom_rules(rules_path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(rules_path)
            .map_err(|e| NullVoidError::file(rules_path, e))?;
        let parsed: std::collections::HashMap<String, Vec<String>> =
            serde_json::from_str(&content).map_err(|e| {
                NullVoidError::Configuration(format!(
                    "invalid rules file {}: {e}",
                    rules_path.display()
                ))
            })?;

        let mut catalogue = Self::build_builtin();
        for (family_name, sources) in parsed {
            let Some(family) = PatternFamily::from_name(&family_name) else {
                tracing::warn!(family = family_name, "ignoring unknown pattern family");
                continue;
            };
            for (i, source) in sources.iter().enumerate() {
                let regex = Regex::new(source).map_err(|e| {
                    NullVoidError::Configuration(format!(
                        "invalid custom pattern for {family_name}: {e}"
                    ))
                })?;
                catalogue.patterns.push(PatternSpec {
                    id: format!("custom-{family_name}-{i}"),
                    family,
                    regex,
                });
            }
        }
        Ok(catalogue)
    }

    #[allow(clippy::too_many_lines)]
    fn build_builtin() -> Self {
        // Regex literals are static and known-valid; a failure here is a
        // programming error caught by the catalogue tests.
        #[allow(clippy::unwrap_used)]
        fn spec(id: &str, family: PatternFamily, source: &str) -> PatternSpec {
            PatternSpec {
                id: id.to_string(),
                family,
                regex: Regex::new(source).unwrap(),
            }
        }

        use PatternFamily::*;

        let patterns = vec![
            // Variable mangling
            spec("mangled-hex-names", VariableMangling, r"_0x[a-f0-9]{4,}"),
            spec(
                "chained-short-assignments",
                VariableMangling,
                r"(?:const|var|let)\s+[a-z]\d{1,2}\s*=\s*[A-Za-z_$][\w$]*\s*(?:,\s*[a-z]\d{1,2}\s*=\s*[A-Za-z_$][\w$]*){2,}",
            ),
            // Hex / base64 arrays and packed strings
            spec("hex-byte-array", HexArrays, r"(?:0x[a-fA-F0-9]{1,2}\s*,\s*){8,}"),
            spec("hex-string-array", HexArrays, r#"\[\s*(?:['"][0-9a-fA-F]{2}['"]\s*,\s*){6,}"#),
            spec("escaped-hex-run", HexArrays, r"(?:\\x[0-9a-fA-F]{2}){10,}"),
            spec(
                "base64-blob",
                HexArrays,
                r#"['"][A-Za-z0-9+/]{120,}={0,2}['"]"#,
            ),
            spec(
                "base64-decode-buffer",
                HexArrays,
                r#"Buffer\.from\s*\(\s*['"][A-Za-z0-9+/=]{40,}['"]\s*,\s*['"]base64['"]"#,
            ),
            // Dynamic requires / imports
            spec(
                "require-variable",
                DynamicRequire,
                r"require\s*\(\s*[a-zA-Z_$][\w$]*\s*\)",
            ),
            spec(
                "require-concat",
                DynamicRequire,
                r#"require\s*\(\s*['"][^'"]*['"]\s*\+"#,
            ),
            spec(
                "bracket-require",
                DynamicRequire,
                r#"module\[['"]require['"]\]"#,
            ),
            spec(
                "main-module-require",
                DynamicRequire,
                r"process\.mainModule\.require",
            ),
            spec(
                "webpack-escape-require",
                DynamicRequire,
                r"__non_webpack_require__",
            ),
            // Wallet hijacking
            spec(
                "ethereum-provider-calls",
                WalletHijacking,
                r"(?:window\.)?ethereum\.(?:request|send|sendAsync|enable)\s*\(",
            ),
            spec("eth-send-transaction", WalletHijacking, r"eth_sendTransaction"),
            spec("eth-address-constant", WalletHijacking, r"0x[a-fA-F0-9]{40}"),
            spec("btc-bech32-constant", WalletHijacking, r"\bbc1[a-z0-9]{25,}"),
            spec(
                "clipboard-write",
                WalletHijacking,
                r"\.clipboard\s*\.\s*(?:writeText|readText)\s*\(",
            ),
            spec(
                "wallet-address-assign",
                WalletHijacking,
                r"(?i)wallet[_-]?address\s*[:=]",
            ),
            // Network manipulation
            spec(
                "xhr-prototype-override",
                NetworkManipulation,
                r"XMLHttpRequest\.prototype\.(?:open|send)\s*=",
            ),
            spec(
                "fetch-override",
                NetworkManipulation,
                r"(?:globalThis|global|window)\.fetch\s*=",
            ),
            spec(
                "raw-ip-url",
                NetworkManipulation,
                r"https?://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}",
            ),
            // Filesystem manipulation
            spec(
                "ssh-key-paths",
                FileSystemManipulation,
                r"\.ssh/(?:id_rsa|id_ed25519|id_ecdsa|authorized_keys)",
            ),
            spec(
                "system-credential-files",
                FileSystemManipulation,
                r"/etc/(?:passwd|shadow)",
            ),
            spec(
                "homedir-dotfile-reach",
                FileSystemManipulation,
                r"homedir\s*\(\s*\)[^\n)]{0,60}(?:\.ssh|\.aws|\.npmrc|\.gitconfig|\.env)",
            ),
            spec(
                "recursive-delete-home",
                FileSystemManipulation,
                r"fs\.(?:rmSync|rmdirSync|unlinkSync|rm|rmdir|unlink)\s*\(\s*(?:process\.env\.HOME|os\.homedir)",
            ),
            // Crypto manipulation
            spec(
                "random-override",
                CryptoManipulation,
                r"(?:Math\.random|crypto\.getRandomValues)\s*=",
            ),
            spec(
                "key-material-assign",
                CryptoManipulation,
                r"(?i)(?:privateKey|private_key|mnemonic|seed[_-]?phrase)\s*[:=]\s*['\x22]",
            ),
            // Anti-analysis
            spec(
                "debugger-loop",
                AntiAnalysis,
                r"(?:setInterval|while|for)\s*\([^)]*\)\s*\{?\s*debugger",
            ),
            spec(
                "function-debugger",
                AntiAnalysis,
                r#"new Function\s*\(\s*['"]debugger['"]"#,
            ),
            spec(
                "console-silencing",
                AntiAnalysis,
                r"console\.(?:log|warn|error)\s*=\s*(?:function\s*\(\s*\)\s*\{\s*\}|\(\s*\)\s*=>)",
            ),
            spec(
                "eval-decode",
                AntiAnalysis,
                r"eval\s*\(\s*(?:atob|unescape|decodeURIComponent|Buffer\.from)\s*\(",
            ),
            // Data exfiltration
            spec(
                "env-serialization",
                DataExfiltration,
                r"JSON\.stringify\s*\(\s*process\.env",
            ),
            spec(
                "env-to-network",
                DataExfiltration,
                r"(?:fetch|axios\.(?:post|get)|https?\.request)\s*\([^\n]{0,120}process\.env",
            ),
            spec(
                "cookie-to-network",
                DataExfiltration,
                r"document\.cookie[^\n]{0,80}(?:fetch|XMLHttpRequest|sendBeacon)",
            ),
            spec("send-beacon", DataExfiltration, r"navigator\.sendBeacon\s*\("),
            spec(
                "webhook-endpoints",
                DataExfiltration,
                r"(?:hooks\.slack\.com/services|discord(?:app)?\.com/api/webhooks)",
            ),
            spec(
                "shell-download",
                DataExfiltration,
                r#"(?:exec|execSync|spawn|spawnSync)\s*\(\s*['"](?:curl|wget)"#,
            ),
        ];

        #[allow(clippy::unwrap_used)]
        let legitimate = [
            r"module\.exports\s*=\s*[\w$.]+\s*;?",
            r"exports\.[\w$]+\s*=",
            r"export\s+(?:default\s+)?(?:const|let|var|function|class)?\s*[\w$]*",
            r#"(?:const|let|var)\s+\{?[\w$,\s]+\}?\s*=\s*require\(['"][\w@/.-]+['"]\)\s*;?"#,
            r#"import\s+[^;\n]+from\s+['"][^'"]+['"]\s*;?"#,
            r#"['"]use strict['"]\s*;?"#,
            r"function\s+[\w$]+\s*\([^)]*\)\s*\{",
        ]
        .iter()
        .map(|source| Regex::new(source).unwrap())
        .collect();

        Self {
            patterns,
            legitimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_compiles_and_covers_all_families() {
        let catalogue = PatternCatalogue::builtin();
        for family in PatternFamily::ALL {
            assert!(
                catalogue.patterns().iter().any(|p| p.family == *family),
                "family {} has no patterns",
                family.name()
            );
        }
    }

    #[test]
    fn test_chained_assignment_pattern_matches() {
        let catalogue = PatternCatalogue::builtin();
        let pattern = catalogue
            .patterns()
            .iter()
            .find(|p| p.id == "chained-short-assignments")
            .unwrap();
        assert!(pattern.regex.is_match("const b3=I,c4=J,d5=K;"));
        assert!(!pattern.regex.is_match("const value = compute();"));
    }

    #[test]
    fn test_mangled_hex_names() {
        let catalogue = PatternCatalogue::builtin();
        let pattern = catalogue
            .patterns()
            .iter()
            .find(|p| p.id == "mangled-hex-names")
            .unwrap();
        assert!(pattern.regex.is_match("var _0x4f2a = ['push'];"));
        assert!(!pattern.regex.is_match("var offset = 0x10;"));
    }

    #[test]
    fn test_dynamic_require_patterns() {
        let catalogue = PatternCatalogue::builtin();
        let dynamic: Vec<_> = catalogue
            .patterns()
            .iter()
            .filter(|p| p.family == PatternFamily::DynamicRequire)
            .collect();
        assert!(dynamic.iter().any(|p| p.regex.is_match("require(moduleName)")));
        assert!(dynamic.iter().any(|p| p.regex.is_match("require('ch' + 'ild')")));
        assert!(
            dynamic
                .iter()
                .any(|p| p.regex.is_match("process.mainModule.require('fs')"))
        );
    }

    #[test]
    fn test_plain_require_is_not_dynamic() {
        let catalogue = PatternCatalogue::builtin();
        let line = "const express = require('express');";
        for pattern in catalogue
            .patterns()
            .iter()
            .filter(|p| p.family == PatternFamily::DynamicRequire)
        {
            assert!(!pattern.regex.is_match(line), "{} matched", pattern.id);
        }
    }

    #[test]
    fn test_family_severity_mapping() {
        assert_eq!(
            PatternFamily::WalletHijacking.default_severity(),
            Severity::Critical
        );
        assert_eq!(
            PatternFamily::HexArrays.default_severity(),
            Severity::High
        );
        assert_eq!(
            PatternFamily::VariableMangling.threat_kind(),
            ThreatKind::MaliciousCodeStructure
        );
    }

    #[test]
    fn test_custom_rules_append() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.json");
        std::fs::write(
            &rules,
            serde_json::json!({
                "wallet-hijacking": ["evil_wallet_fn\\s*\\("],
                "not-a-family": ["ignored"]
            })
            .to_string(),
        )
        .unwrap();

        let catalogue = PatternCatalogue::with_custom_rules(&rules).unwrap();
        assert!(
            catalogue
                .patterns()
                .iter()
                .any(|p| p.id == "custom-wallet-hijacking-0")
        );
    }

    #[test]
    fn test_custom_rules_bad_regex_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.json");
        std::fs::write(
            &rules,
            serde_json::json!({"anti-analysis": ["(unclosed"]}).to_string(),
        )
        .unwrap();
        assert!(PatternCatalogue::with_custom_rules(&rules).is_err());
    }

    #[test]
    fn test_legitimate_patterns_match_common_prefixes() {
        let catalogue = PatternCatalogue::builtin();
        let line = "module.exports = router;";
        assert!(
            catalogue
                .legitimate_patterns()
                .iter()
                .any(|p| p.is_match(line))
        );
    }
}
