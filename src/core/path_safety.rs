//! Path validation and safe filesystem access
//!
//! Every path the scanner touches goes through this layer. Validation
//! rejects traversal and injection tokens before any filesystem call;
//! resolution anchors the path to a base directory and refuses escapes.

use std::path::{Component, Path, PathBuf};

use crate::core::error::{NullVoidError, Result};

/// Maximum accepted path length in bytes.
const MAX_PATH_LENGTH: usize = 4096;

/// npm package name length limit.
const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Extensions the directory walk will hand to detectors. Anything else is
/// silently skipped, never an error.
pub const ALLOWED_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "jsx", "tsx", "json", "yml", "yaml"];

/// Names excluded from directory listings: lockfiles, credential files and
/// VCS directories carry no scannable code and frequently hold secrets.
const LISTING_DENYLIST: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "npm-shrinkwrap.json",
    ".npmrc",
    ".env",
    ".netrc",
    "credentials",
    "id_rsa",
    "id_ed25519",
    ".git",
    ".svn",
    ".hg",
];

/// Shell metacharacters that have no business inside a filesystem path.
const SHELL_METACHARACTERS: &[char] = &[
    ';', '&', '|', '`', '$', '{', '}', '(', ')', '[', ']', '<', '>',
];

/// Validate an input path and resolve it to an absolute path under `base`.
///
/// Fails with `PathTraversal` when the resolved path is not a descendant of
/// `base`, with `CommandInjection` on shell metacharacters, and with
/// `Validation` on length or encoding problems.
pub fn validate_path(input: &Path, base: &Path) -> Result<PathBuf> {
    let raw = input.to_str().ok_or_else(|| {
        NullVoidError::Validation(format!("path is not valid UTF-8: {}", input.display()))
    })?;

    if raw.is_empty() {
        return Err(NullVoidError::Validation("path cannot be empty".into()));
    }
    if raw.len() > MAX_PATH_LENGTH {
        return Err(NullVoidError::Validation(format!(
            "path exceeds {MAX_PATH_LENGTH} bytes"
        )));
    }
    if raw.contains('\0') {
        return Err(NullVoidError::Validation("path contains null byte".into()));
    }

    reject_traversal_tokens(raw)?;
    reject_shell_metacharacters(raw)?;

    let base_abs = absolutize(base);
    let resolved = if input.is_absolute() {
        normalize_lexically(input)
    } else {
        normalize_lexically(&base_abs.join(input))
    };

    if !resolved.starts_with(&base_abs) {
        return Err(NullVoidError::PathTraversal(format!(
            "{} escapes base {}",
            input.display(),
            base_abs.display()
        )));
    }

    Ok(resolved)
}

/// Validate a scan target path.
///
/// Same token and length checks as `validate_path`, but no containment
/// requirement: the target itself establishes the base every later path
/// must stay under.
pub fn validate_target(input: &Path) -> Result<PathBuf> {
    let raw = input.to_str().ok_or_else(|| {
        NullVoidError::Validation(format!("path is not valid UTF-8: {}", input.display()))
    })?;
    if raw.is_empty() {
        return Err(NullVoidError::Validation("path cannot be empty".into()));
    }
    if raw.len() > MAX_PATH_LENGTH {
        return Err(NullVoidError::Validation(format!(
            "path exceeds {MAX_PATH_LENGTH} bytes"
        )));
    }
    if raw.contains('\0') {
        return Err(NullVoidError::Validation("path contains null byte".into()));
    }
    reject_traversal_tokens(raw)?;
    reject_shell_metacharacters(raw)?;
    Ok(absolutize(input))
}

/// Join path segments onto `base`, validating each segment individually.
///
/// Segments may not contain separators; the joined result is re-checked for
/// descendant containment.
pub fn safe_join(base: &Path, segments: &[&str]) -> Result<PathBuf> {
    let mut joined = absolutize(base);
    for segment in segments {
        if segment.is_empty() {
            return Err(NullVoidError::Validation("empty path segment".into()));
        }
        if segment.contains('/') || segment.contains('\\') {
            return Err(NullVoidError::Validation(format!(
                "path segment contains separator: {segment}"
            )));
        }
        reject_traversal_tokens(segment)?;
        reject_shell_metacharacters(segment)?;
        joined.push(segment);
    }

    let base_abs = absolutize(base);
    if !joined.starts_with(&base_abs) {
        return Err(NullVoidError::PathTraversal(format!(
            "joined path escapes base {}",
            base_abs.display()
        )));
    }
    Ok(joined)
}

/// Read a file's bytes. Fatal I/O errors propagate unchanged as `File`
/// errors carrying the offending path; there are no retries at this layer.
pub fn safe_read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| NullVoidError::file(path, e))
}

/// List entry names in a directory, excluding hidden files and the fixed
/// denylist. Order is unspecified.
pub fn safe_list_dir(path: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(path).map_err(|e| NullVoidError::file(path, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| NullVoidError::file(path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if LISTING_DENYLIST.contains(&name.as_str()) {
            continue;
        }
        names.push(name);
    }
    Ok(names)
}

/// Whether a file's extension is on the scan allow-list.
#[must_use]
pub fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext))
}

/// Validate an npm package name.
///
/// Names are at most 214 characters, lowercase, URL-safe, with an optional
/// `@scope/` prefix. Shell metacharacters and traversal tokens are rejected
/// outright.
pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NullVoidError::Validation(
            "package name cannot be empty".into(),
        ));
    }
    if name.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(NullVoidError::Validation(format!(
            "package name too long (max {MAX_PACKAGE_NAME_LENGTH} characters)"
        )));
    }
    if name.contains("..") {
        return Err(NullVoidError::PathTraversal(format!(
            "package name contains traversal token: {name}"
        )));
    }
    if name.starts_with('/') {
        return Err(NullVoidError::Validation(
            "package name cannot start with '/'".into(),
        ));
    }

    for c in name.chars() {
        match c {
            'a'..='z' | '0'..='9' | '-' | '_' | '.' | '@' | '/' => {}
            _ => {
                return Err(NullVoidError::Validation(format!(
                    "invalid character '{c}' in package name"
                )));
            }
        }
    }
    Ok(())
}

fn reject_traversal_tokens(raw: &str) -> Result<()> {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("..") || lower.contains("%2e%2e") {
        return Err(NullVoidError::PathTraversal(format!(
            "path contains traversal token: {raw}"
        )));
    }
    if raw.contains('\\') {
        return Err(NullVoidError::PathTraversal(format!(
            "path contains backslash separator: {raw}"
        )));
    }
    // A doubled separator past the first byte hides traversal on some
    // platforms; a single leading "//" is already covered by absolutize.
    if raw.contains("//") {
        return Err(NullVoidError::PathTraversal(format!(
            "path contains doubled separator: {raw}"
        )));
    }
    Ok(())
}

fn reject_shell_metacharacters(raw: &str) -> Result<()> {
    if let Some(c) = raw.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(NullVoidError::CommandInjection(format!(
            "path contains shell metacharacter '{c}': {raw}"
        )));
    }
    Ok(())
}

/// Resolve to an absolute path. Prefers the kernel's view when the path
/// exists; falls back to lexical resolution against the current directory.
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        normalize_lexically(&cwd.join(path))
    }
}

/// Remove `.` components without touching `..` (those were rejected earlier).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traversal_rejected() {
        let base = Path::new("/tmp/scan");
        let err = validate_path(Path::new("./pkg/../../etc/passwd"), base).unwrap_err();
        assert!(matches!(err, NullVoidError::PathTraversal(_)));
    }

    #[test]
    fn test_encoded_traversal_rejected() {
        let base = Path::new("/tmp/scan");
        let err = validate_path(Path::new("pkg/%2e%2e/secret"), base).unwrap_err();
        assert!(matches!(err, NullVoidError::PathTraversal(_)));

        let err = validate_path(Path::new("pkg/%2E%2E/secret"), base).unwrap_err();
        assert!(matches!(err, NullVoidError::PathTraversal(_)));
    }

    #[test]
    fn test_backslash_rejected() {
        let base = Path::new("/tmp/scan");
        let err = validate_path(Path::new("pkg\\evil"), base).unwrap_err();
        assert!(matches!(err, NullVoidError::PathTraversal(_)));
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        let base = Path::new("/tmp/scan");
        for bad in ["pkg;rm -rf", "pkg|cat", "pkg$(whoami)", "pkg`id`", "pkg<x"] {
            let err = validate_path(Path::new(bad), base).unwrap_err();
            assert!(
                matches!(err, NullVoidError::CommandInjection(_)),
                "expected injection error for {bad}"
            );
        }
    }

    #[test]
    fn test_relative_path_resolves_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = validate_path(Path::new("pkg/index.js"), dir.path()).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_absolute_path_outside_base_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_path(Path::new("/etc/passwd"), dir.path()).unwrap_err();
        assert!(matches!(err, NullVoidError::PathTraversal(_)));
    }

    #[test]
    fn test_path_length_limit() {
        let base = Path::new("/tmp/scan");
        let long = "a/".repeat(2049);
        let err = validate_path(Path::new(&long), base).unwrap_err();
        assert!(matches!(err, NullVoidError::Validation(_)));
    }

    #[test]
    fn test_safe_join_rejects_separator_segments() {
        let base = Path::new("/tmp/scan");
        assert!(safe_join(base, &["node_modules", "lodash"]).is_ok());
        assert!(safe_join(base, &["a/b"]).is_err());
        assert!(safe_join(base, &[".."]).is_err());
    }

    #[test]
    fn test_safe_list_dir_filters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.js"), "ok").unwrap();
        std::fs::write(dir.path().join(".hidden"), "no").unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();

        let names = safe_list_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["index.js".to_string()]);
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension(Path::new("a.js")));
        assert!(has_allowed_extension(Path::new("a.tsx")));
        assert!(has_allowed_extension(Path::new("a.yaml")));
        assert!(!has_allowed_extension(Path::new("a.exe")));
        assert!(!has_allowed_extension(Path::new("a.node")));
        assert!(!has_allowed_extension(Path::new("Makefile")));
    }

    #[test]
    fn test_package_name_length_boundary() {
        let ok = "a".repeat(214);
        assert!(validate_package_name(&ok).is_ok());
        let too_long = "a".repeat(215);
        assert!(validate_package_name(&too_long).is_err());
    }

    #[test]
    fn test_package_name_charset() {
        assert!(validate_package_name("@acme/internal-tools").is_ok());
        assert!(validate_package_name("lodash").is_ok());
        assert!(validate_package_name("foo;rm").is_err());
        assert!(validate_package_name("../evil").is_err());
        assert!(validate_package_name("/abs").is_err());
        assert!(validate_package_name("").is_err());
    }
}
