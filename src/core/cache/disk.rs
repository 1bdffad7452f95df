//! On-disk cache layer (L2)
//!
//! One file per entry, named `{sha256(key)}.bin`. Each file starts with a
//! small fixed header (magic, version, algorithm, created-at, TTL) followed
//! by the serde_json payload, optionally zlib-compressed. A size budget is
//! enforced by evicting the oldest files; expired entries are dropped on
//! read and by the periodic sweep.

use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use super::{CacheHit, CacheLayer, CacheStats};
use crate::core::error::{NullVoidError, Result};

const MAGIC: &[u8; 4] = b"NVC1";
const VERSION: u8 = 1;
const ALGO_RAW: u8 = 0;
const ALGO_ZLIB: u8 = 1;
/// magic + version + algorithm + created_at(i64) + ttl_secs(u64)
const HEADER_LEN: usize = 4 + 1 + 1 + 8 + 8;

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct DiskCache<T> {
    dir: PathBuf,
    max_bytes: u64,
    compress: bool,
    counters: Mutex<Counters>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DiskCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(dir: impl AsRef<Path>, max_bytes: u64, compress: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| NullVoidError::file(&dir, e))?;
        Ok(Self {
            dir,
            max_bytes,
            compress,
            counters: Mutex::new(Counters::default()),
            _marker: PhantomData,
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.bin", hex::encode(digest)))
    }

    fn encode(&self, value: &T, ttl: Duration) -> Result<Vec<u8>> {
        let payload =
            serde_json::to_vec(value).map_err(|e| NullVoidError::Cache(e.to_string()))?;
        let (algo, body) = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&payload)
                .and_then(|()| encoder.finish())
                .map(|compressed| (ALGO_ZLIB, compressed))
                .map_err(|e| NullVoidError::Cache(e.to_string()))?
        } else {
            (ALGO_RAW, payload)
        };

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.push(algo);
        out.extend_from_slice(&jiff::Timestamp::now().as_second().to_le_bytes());
        out.extend_from_slice(&ttl.as_secs().to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<(i64, u64, T)> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(NullVoidError::Cache("malformed cache entry".into()));
        }
        if bytes[4] != VERSION {
            return Err(NullVoidError::Cache(format!(
                "unsupported cache entry version {}",
                bytes[4]
            )));
        }
        let algo = bytes[5];
        let created_at = i64::from_le_bytes(
            bytes[6..14]
                .try_into()
                .map_err(|_| NullVoidError::Cache("truncated header".into()))?,
        );
        let ttl_secs = u64::from_le_bytes(
            bytes[14..HEADER_LEN]
                .try_into()
                .map_err(|_| NullVoidError::Cache("truncated header".into()))?,
        );

        let body = &bytes[HEADER_LEN..];
        let payload = match algo {
            ALGO_RAW => body.to_vec(),
            ALGO_ZLIB => {
                let mut decoder = ZlibDecoder::new(body);
                let mut out = Vec::new();
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| NullVoidError::Cache(e.to_string()))?;
                out
            }
            other => {
                return Err(NullVoidError::Cache(format!(
                    "unknown compression algorithm {other}"
                )));
            }
        };

        let value =
            serde_json::from_slice(&payload).map_err(|e| NullVoidError::Cache(e.to_string()))?;
        Ok((created_at, ttl_secs, value))
    }

    /// Delete expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = jiff::Timestamp::now().as_second();
        let mut removed = 0;
        for path in self.entry_files() {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let expired = match Self::decode(&bytes) {
                Ok((created_at, ttl_secs, _)) => created_at + ttl_secs as i64 <= now,
                Err(_) => true, // malformed entries are removed outright
            };
            if expired && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.counters.lock().evictions += removed as u64;
            tracing::debug!(removed, "disk cache sweep");
        }
        removed
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn total_bytes(&self) -> u64 {
        self.entry_files()
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    /// Drop the oldest files (by modification time) until the budget fits.
    fn enforce_budget(&self) {
        if self.max_bytes == 0 || self.total_bytes() <= self.max_bytes {
            return;
        }
        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = self
            .entry_files()
            .into_iter()
            .filter_map(|p| {
                let meta = std::fs::metadata(&p).ok()?;
                let mtime = meta.modified().ok()?;
                Some((p, mtime, meta.len()))
            })
            .collect();
        files.sort_by_key(|(_, mtime, _)| *mtime);

        let mut total: u64 = files.iter().map(|(_, _, len)| len).sum();
        let mut evicted = 0u64;
        for (path, _, len) in files {
            if total <= self.max_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(len);
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.counters.lock().evictions += evicted;
        }
    }
}

impl<T> CacheLayer<T> for DiskCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &str) -> Option<CacheHit<T>> {
        let path = self.entry_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.counters.lock().misses += 1;
                return None;
            }
        };

        match Self::decode(&bytes) {
            Ok((created_at, ttl_secs, value)) => {
                let now = jiff::Timestamp::now().as_second();
                let expires_at = created_at + ttl_secs as i64;
                if expires_at <= now {
                    let _ = std::fs::remove_file(&path);
                    let mut counters = self.counters.lock();
                    counters.misses += 1;
                    counters.evictions += 1;
                    return None;
                }
                self.counters.lock().hits += 1;
                Some(CacheHit {
                    value,
                    remaining_ttl: Duration::from_secs((expires_at - now).max(0) as u64),
                })
            }
            Err(err) => {
                // Corrupt entry: invalidate and continue without caching.
                tracing::warn!(key, error = %err, "removing malformed disk cache entry");
                let _ = std::fs::remove_file(&path);
                self.counters.lock().misses += 1;
                None
            }
        }
    }

    fn set(&self, key: &str, value: T, ttl: Duration) {
        let path = self.entry_path(key);
        match self.encode(&value, ttl) {
            Ok(bytes) => {
                // Write via temp + rename so readers never see a torn entry.
                let tmp = path.with_extension("tmp");
                let write = std::fs::write(&tmp, &bytes)
                    .and_then(|()| std::fs::rename(&tmp, &path));
                if let Err(err) = write {
                    tracing::warn!(key, error = %err, "disk cache write failed");
                    let _ = std::fs::remove_file(&tmp);
                    return;
                }
                self.enforce_budget();
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "disk cache encode failed");
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        std::fs::remove_file(self.entry_path(key)).is_ok()
    }

    fn clear(&self) {
        for path in self.entry_files() {
            let _ = std::fs::remove_file(path);
        }
    }

    fn stats(&self) -> CacheStats {
        let counters = self.counters.lock();
        CacheStats {
            size: self.entry_files().len(),
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_roundtrip_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let cache: DiskCache<Vec<String>> = DiskCache::new(dir.path(), 1 << 20, false).unwrap();

        cache.set("k", vec!["a".to_string(), "b".to_string()], TTL);
        let hit = cache.get("k").unwrap();
        assert_eq!(hit.value, vec!["a".to_string(), "b".to_string()]);
        assert!(hit.remaining_ttl <= TTL);
    }

    #[test]
    fn test_roundtrip_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let cache: DiskCache<String> = DiskCache::new(dir.path(), 1 << 20, true).unwrap();

        let big = "x".repeat(10_000);
        cache.set("k", big.clone(), TTL);
        assert_eq!(cache.get("k").unwrap().value, big);

        // Compressed entry should be much smaller than the payload.
        let on_disk = std::fs::metadata(cache.entry_path("k")).unwrap().len();
        assert!(on_disk < 1_000);
    }

    #[test]
    fn test_expired_entry_removed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache: DiskCache<u32> = DiskCache::new(dir.path(), 1 << 20, false).unwrap();

        cache.set("k", 7, Duration::from_secs(0));
        assert!(cache.get("k").is_none());
        assert!(!cache.entry_path("k").exists());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache: DiskCache<u32> = DiskCache::new(dir.path(), 1 << 20, false).unwrap();

        cache.set("live", 1, TTL);
        cache.set("dead", 2, Duration::from_secs(0));

        assert_eq!(cache.sweep_expired(), 1);
        assert!(cache.get("live").is_some());
    }

    #[test]
    fn test_malformed_entry_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let cache: DiskCache<u32> = DiskCache::new(dir.path(), 1 << 20, false).unwrap();

        std::fs::write(cache.entry_path("bad"), b"not a cache entry").unwrap();
        assert!(cache.get("bad").is_none());
        assert!(!cache.entry_path("bad").exists());
    }

    #[test]
    fn test_budget_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        // Each entry is a few hundred bytes; budget fits roughly two.
        let cache: DiskCache<String> = DiskCache::new(dir.path(), 700, false).unwrap();

        cache.set("a", "x".repeat(200), TTL);
        std::thread::sleep(Duration::from_millis(20));
        cache.set("b", "x".repeat(200), TTL);
        std::thread::sleep(Duration::from_millis(20));
        cache.set("c", "x".repeat(200), TTL);

        // The oldest entry went first.
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }
}
