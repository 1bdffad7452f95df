//! Shared filesystem paths with environment overrides.

use std::path::PathBuf;

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var).map(PathBuf::from)
}

fn fallback_home_dir() -> PathBuf {
    home::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Data directory (default: XDG data dir/nullvoid or ~/.nullvoid).
#[must_use]
pub fn data_dir() -> PathBuf {
    env_path("NULLVOID_DATA_DIR").unwrap_or_else(|| {
        dirs::data_dir().map_or_else(
            || fallback_home_dir().join(".nullvoid"),
            |d| d.join("nullvoid"),
        )
    })
}

/// On-disk (L2) cache directory.
///
/// Defaults to `.nullvoid-cache/` in the current directory so cache entries
/// travel with the project being scanned; `NULLVOID_CACHE_DIR` overrides.
#[must_use]
pub fn cache_dir() -> PathBuf {
    env_path("NULLVOID_CACHE_DIR").unwrap_or_else(|| PathBuf::from(".nullvoid-cache"))
}

/// Config directory (default: XDG config dir/nullvoid or ~/.config/nullvoid).
#[must_use]
pub fn config_dir() -> PathBuf {
    env_path("NULLVOID_CONFIG_DIR").unwrap_or_else(|| {
        dirs::config_dir().map_or_else(
            || fallback_home_dir().join(".config/nullvoid"),
            |d| d.join("nullvoid"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_returns_path() {
        let path = data_dir();
        assert!(!path.as_os_str().is_empty());
    }

    #[test]
    fn test_cache_dir_default() {
        // Only assert the default shape when the override is unset.
        if std::env::var_os("NULLVOID_CACHE_DIR").is_none() {
            assert!(cache_dir().to_string_lossy().contains(".nullvoid-cache"));
        }
    }

    #[test]
    fn test_config_dir_returns_path() {
        let path = config_dir();
        assert!(!path.as_os_str().is_empty());
    }
}
