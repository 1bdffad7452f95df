//! Legitimate-code filters
//!
//! Count-of-match heuristics that recognize common benign file classes and
//! neutralize the pattern families those classes trip by accident. Filters
//! are family-scoped: a shader file stops hex-array findings but not a
//! wallet-drainer match. Test files and the scanner's own codebase are
//! skipped globally by path.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::catalogue::PatternFamily;

/// One benign-content heuristic.
pub struct LegitimacyFilter {
    pub name: &'static str,
    indicators: Vec<Regex>,
    /// Minimum number of indicator hits before the filter accepts.
    min_matches: usize,
    /// Families this filter neutralizes when it accepts.
    pub neutralizes: &'static [PatternFamily],
    /// Whether entropy findings are suppressed too (JSX and shader sources
    /// run hot on entropy without being packed).
    pub suppresses_entropy: bool,
}

impl LegitimacyFilter {
    /// Does this filter accept `content` as benign?
    #[must_use]
    pub fn accepts(&self, content: &str) -> bool {
        let mut hits = 0usize;
        for indicator in &self.indicators {
            hits += indicator.find_iter(content).count();
            if hits >= self.min_matches {
                return true;
            }
        }
        false
    }
}

static FILTERS: LazyLock<Vec<LegitimacyFilter>> = LazyLock::new(build_filters);

/// All built-in filters.
#[must_use]
pub fn filters() -> &'static [LegitimacyFilter] {
    &FILTERS
}

/// Families neutralized for `content`, plus whether entropy is suppressed.
#[must_use]
pub fn neutralized_families(content: &str) -> (Vec<PatternFamily>, bool) {
    let mut families = Vec::new();
    let mut suppress_entropy = false;
    for filter in filters() {
        if filter.accepts(content) {
            tracing::trace!(filter = filter.name, "legitimacy filter accepted");
            families.extend_from_slice(filter.neutralizes);
            suppress_entropy |= filter.suppresses_entropy;
        }
    }
    families.sort_by_key(|f| f.name());
    families.dedup();
    (families, suppress_entropy)
}

/// Test files are skipped globally, not per family.
#[must_use]
pub fn is_test_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if name.contains(".test.") || name.contains(".spec.") {
        return true;
    }
    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("__tests__" | "__mocks__" | "test" | "tests" | "spec")
        )
    })
}

/// The scanner's own source files are never flagged.
#[must_use]
pub fn is_project_owned(path: &Path) -> bool {
    let lossy = path.to_string_lossy();
    lossy.contains("/nullvoid/src/") || lossy.contains("node_modules/nullvoid/")
}

/// Cheap pre-pass: files with none of these markers skip the full regex
/// evaluation entirely.
#[must_use]
pub fn quick_suspicion(content: &str) -> bool {
    const MARKERS: &[&str] = &[
        "require",
        "import(",
        "eval",
        "atob",
        "0x",
        "\\x",
        "process.env",
        "child_process",
        "http",
        "wallet",
        "ethereum",
        "debugger",
        "clipboard",
        "Function(",
        "sendBeacon",
        "homedir",
        "document.cookie",
        // Declaration keywords: anything that is code at all gets the full
        // pass; the pre-pass only skips inert data and prose.
        "const ",
        "var ",
        "let ",
        "function",
        "=>",
    ];
    MARKERS.iter().any(|m| content.contains(m))
}

#[allow(clippy::unwrap_used)] // static regex literals, covered by tests
fn build_filters() -> Vec<LegitimacyFilter> {
    fn compile(sources: &[&str]) -> Vec<Regex> {
        sources.iter().map(|s| Regex::new(s).unwrap()).collect()
    }

    use PatternFamily::*;

    vec![
        LegitimacyFilter {
            name: "utility-math",
            indicators: compile(&[
                r"Math\.(?:floor|ceil|round|abs|min|max|pow|sqrt)",
                r"\bparseInt\s*\(",
                r"\bparseFloat\s*\(",
                r"\.toFixed\s*\(",
                r"Number\.(?:isInteger|isFinite|EPSILON)",
                r"\bisNaN\s*\(",
            ]),
            min_matches: 3,
            neutralizes: &[VariableMangling, HexArrays],
            suppresses_entropy: false,
        },
        LegitimacyFilter {
            name: "server-socket",
            indicators: compile(&[
                r#"require\s*\(\s*['"](?:http|https|net|express|fastify|koa|socket\.io)['"]"#,
                r"\.listen\s*\(\s*\d",
                r"createServer\s*\(",
                r"app\.(?:get|post|put|delete|use)\s*\(",
                r"res\.(?:send|json|status)\s*\(",
            ]),
            min_matches: 3,
            neutralizes: &[NetworkManipulation, DataExfiltration],
            suppresses_entropy: false,
        },
        LegitimacyFilter {
            name: "test-library",
            indicators: compile(&[
                r"\bdescribe\s*\(\s*['\x22]",
                r"\b(?:it|test)\s*\(\s*['\x22]",
                r"\bexpect\s*\(",
                r"\bbeforeEach\s*\(",
                r"jest\.(?:mock|fn|spyOn)",
                r"sinon\.(?:stub|spy|mock)",
            ]),
            min_matches: 3,
            neutralizes: &[
                VariableMangling,
                DynamicRequire,
                AntiAnalysis,
                NetworkManipulation,
            ],
            suppresses_entropy: false,
        },
        LegitimacyFilter {
            name: "web-framework-view",
            indicators: compile(&[
                r"res\.render\s*\(",
                r"router\.(?:get|post|put|delete)\s*\(",
                r"\bmiddleware\b",
                r"next\s*\(\s*\)",
                r"req\.(?:params|query|body)\.",
            ]),
            min_matches: 3,
            neutralizes: &[NetworkManipulation],
            suppresses_entropy: false,
        },
        LegitimacyFilter {
            name: "shader-webgl",
            indicators: compile(&[
                r"\bgl_FragColor\b",
                r"\bgl_Position\b",
                r"\b(?:vec[234]|mat[234])\s*\(",
                r"\buniform\s+(?:float|vec|mat|sampler)",
                r"\b(?:attribute|varying)\s+(?:float|vec)",
                r"getContext\s*\(\s*['\x22](?:webgl2?|experimental-webgl)",
            ]),
            min_matches: 3,
            neutralizes: &[VariableMangling, HexArrays],
            suppresses_entropy: true,
        },
        LegitimacyFilter {
            name: "react-jsx",
            indicators: compile(&[
                r#"(?:import\s+React|from\s+['"]react['"])"#,
                r"\buse(?:State|Effect|Memo|Callback|Ref|Context)\s*\(",
                r"className=",
                r"<[A-Z][\w]*[\s/>]",
                r"export\s+default\s+function\s+[A-Z]",
                r"React\.(?:Component|createElement|Fragment)",
            ]),
            min_matches: 3,
            neutralizes: &[VariableMangling, HexArrays],
            suppresses_entropy: true,
        },
        LegitimacyFilter {
            name: "blockchain-constants",
            indicators: compile(&[
                r#"(?:contractAddress|CONTRACT_ADDRESS)\s*[:=]"#,
                r#"\babi\s*[:=]\s*\["#,
                r#"(?:chainId|CHAIN_ID)\s*[:=]"#,
                r"(?:tokenAddress|TOKEN_ADDRESS|ROUTER_ADDRESS)\s*[:=]",
                r#"['\x22]0x[a-fA-F0-9]{40}['\x22]\s*,\s*//"#,
            ]),
            min_matches: 3,
            neutralizes: &[WalletHijacking],
            suppresses_entropy: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_react_component_neutralizes_obfuscation_and_entropy() {
        let content = r#"
import React from 'react';
import { useState, useEffect } from 'react';

export default function Dashboard() {
    const [items, setItems] = useState([]);
    useEffect(() => { setItems(['a']); }, []);
    return <List className="wide" items={items} />;
}
"#;
        let (families, suppress_entropy) = neutralized_families(content);
        assert!(families.contains(&PatternFamily::VariableMangling));
        assert!(families.contains(&PatternFamily::HexArrays));
        assert!(suppress_entropy);
    }

    #[test]
    fn test_react_filter_is_family_scoped() {
        let content = r#"
import React from 'react';
const useStateful = useState(0); useEffect(() => {});
"#;
        let (families, _) = neutralized_families(content);
        assert!(!families.contains(&PatternFamily::WalletHijacking));
        assert!(!families.contains(&PatternFamily::DataExfiltration));
    }

    #[test]
    fn test_utility_math_threshold() {
        let below = "const x = Math.floor(y);";
        let (families, _) = neutralized_families(below);
        assert!(!families.contains(&PatternFamily::HexArrays));

        let above = r"
const a = Math.floor(x);
const b = Math.ceil(parseInt(s, 10) / 2);
const c = (a / b).toFixed(2);
";
        let (families, _) = neutralized_families(above);
        assert!(families.contains(&PatternFamily::HexArrays));
    }

    #[test]
    fn test_blockchain_constants_neutralize_wallet_family() {
        let content = r#"
const CONTRACT_ADDRESS = '0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D';
const TOKEN_ADDRESS = '0x6B175474E89094C44Da98b954EedeAC495271d0F';
const CHAIN_ID = 1;
const abi = [{ "inputs": [] }];
"#;
        let (families, _) = neutralized_families(content);
        assert!(families.contains(&PatternFamily::WalletHijacking));
    }

    #[test]
    fn test_test_paths_detected() {
        assert!(is_test_path(Path::new("src/app.test.js")));
        assert!(is_test_path(Path::new("src/app.spec.ts")));
        assert!(is_test_path(Path::new("pkg/__tests__/helper.js")));
        assert!(is_test_path(Path::new("pkg/test/fixture.js")));
        assert!(!is_test_path(Path::new("src/index.js")));
        assert!(!is_test_path(Path::new("src/latest.js")));
    }

    #[test]
    fn test_quick_suspicion_skips_inert_content() {
        assert!(!quick_suspicion("a plain text file\nwith no code in it\n"));
        assert!(!quick_suspicion("{\"name\": \"pkg\", \"version\": \"1.0.0\"}"));
        assert!(quick_suspicion("const fs = require('fs');"));
        assert!(quick_suspicion("var _0x4f = [];"));
    }
}
