//! The `cache` command

use crate::config::Settings;

/// Show entry count and total size of the on-disk cache.
pub fn stats() -> anyhow::Result<i32> {
    let settings = Settings::load(None)?;
    let dir = &settings.cache.dir;

    let mut entries = 0usize;
    let mut bytes = 0u64;
    if let Ok(listing) = std::fs::read_dir(dir) {
        for entry in listing.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "bin")
                && let Ok(meta) = entry.metadata()
            {
                entries += 1;
                bytes += meta.len();
            }
        }
    }

    println!("cache directory: {}", dir.display());
    println!("entries:         {entries}");
    println!("size:            {bytes} bytes");
    println!(
        "budget:          {} bytes ({})",
        settings.cache.l2_max_bytes,
        if settings.cache.l2_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(0)
}

/// Delete every cached entry.
pub fn clear() -> anyhow::Result<i32> {
    let settings = Settings::load(None)?;
    let dir = &settings.cache.dir;

    let mut removed = 0usize;
    if let Ok(listing) = std::fs::read_dir(dir) {
        for entry in listing.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "bin")
                && std::fs::remove_file(&path).is_ok()
            {
                removed += 1;
            }
        }
    }
    println!("removed {removed} cache entrie(s) from {}", dir.display());
    Ok(0)
}
