//! Package manifest parsing and enumeration

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::core::error::{NullVoidError, Result};
use crate::core::{PackageDescriptor, path_safety};

#[derive(Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: HashMap<String, String>,
    #[serde(default)]
    scripts: HashMap<String, String>,
    #[serde(default)]
    repository: Option<serde_json::Value>,
}

/// Parse a `package.json` in `dir` into a descriptor.
///
/// A missing manifest is `Ok(None)`; a malformed one is a `Validation`
/// error the orchestrator records as an `AnalysisError` threat.
pub fn parse_manifest(dir: &Path) -> Result<Option<PackageDescriptor>> {
    let manifest_path = dir.join("package.json");
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let bytes = path_safety::safe_read_file(&manifest_path)?;
    let raw: RawManifest = serde_json::from_slice(&bytes).map_err(|e| {
        NullVoidError::Validation(format!(
            "malformed manifest {}: {e}",
            manifest_path.display()
        ))
    })?;

    let name = raw.name.unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    });
    path_safety::validate_package_name(&name)?;

    let mut declared_dependencies = raw.dependencies;
    declared_dependencies.extend(raw.dev_dependencies);

    Ok(Some(PackageDescriptor {
        name,
        version: raw.version.unwrap_or_else(|| "0.0.0".to_string()),
        path: dir.to_path_buf(),
        declared_dependencies,
        scripts: raw.scripts,
        repository_url: repository_url(raw.repository.as_ref()),
    }))
}

fn repository_url(repository: Option<&serde_json::Value>) -> Option<String> {
    match repository? {
        serde_json::Value::String(url) => Some(url.clone()),
        serde_json::Value::Object(map) => map
            .get("url")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    }
}

/// Enumerate installed packages under `root/node_modules`, descending
/// through nested `node_modules` trees up to `depth` levels. The root
/// package itself (when present) comes first.
pub fn enumerate_packages(root: &Path, depth: u32) -> Result<Vec<PackageDescriptor>> {
    let mut packages = Vec::new();
    if let Some(descriptor) = parse_manifest(root)? {
        packages.push(descriptor);
    }
    collect_node_modules(root, depth, &mut packages)?;
    Ok(packages)
}

fn collect_node_modules(
    dir: &Path,
    depth: u32,
    packages: &mut Vec<PackageDescriptor>,
) -> Result<()> {
    if depth == 0 {
        return Ok(());
    }
    let node_modules = dir.join("node_modules");
    if !node_modules.is_dir() {
        return Ok(());
    }

    for name in path_safety::safe_list_dir(&node_modules)? {
        let Ok(entry) = path_safety::safe_join(&node_modules, &[name.as_str()]) else {
            tracing::warn!(name, "skipping package directory with unsafe name");
            continue;
        };
        if !entry.is_dir() {
            continue;
        }
        if name.starts_with('@') {
            // Scope directory: one more level of packages inside.
            for scoped in path_safety::safe_list_dir(&entry)? {
                let Ok(scoped_dir) = path_safety::safe_join(&entry, &[scoped.as_str()]) else {
                    continue;
                };
                if scoped_dir.is_dir() {
                    visit_package(&scoped_dir, depth, packages)?;
                }
            }
        } else {
            visit_package(&entry, depth, packages)?;
        }
    }
    Ok(())
}

fn visit_package(
    dir: &Path,
    depth: u32,
    packages: &mut Vec<PackageDescriptor>,
) -> Result<()> {
    match parse_manifest(dir) {
        Ok(Some(descriptor)) => packages.push(descriptor),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "skipping unreadable manifest");
        }
    }
    collect_node_modules(dir, depth - 1, packages)
}
