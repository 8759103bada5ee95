//! Memo table of resolved dates
//!
//! Entries are keyed by path, size and modification time (unix seconds).
//! A changed file produces a different key, so stale entries are never
//! returned and no explicit invalidation is needed.

use crate::error::{Error, Result};
use crate::time::ResolvedDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// Identity of one version of a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub path: PathBuf,
    pub size: u64,
    pub modified: i64,
}

impl CacheKey {
    pub fn new(path: &Path, size: u64, modified: i64) -> Self {
        Self {
            path: path.to_path_buf(),
            size,
            modified,
        }
    }

    /// Build a key from freshly read metadata
    pub fn from_metadata(path: &Path, metadata: &fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .ok()
            .map(|time| match time.duration_since(UNIX_EPOCH) {
                Ok(after) => after.as_secs() as i64,
                Err(before) => -(before.duration().as_secs() as i64),
            })
            .unwrap_or(0);
        Self::new(path, metadata.len(), modified)
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheFileEntry>,
}

#[derive(Serialize, Deserialize)]
struct CacheFileEntry {
    key: CacheKey,
    date: ResolvedDate,
}

/// Thread-safe date cache shared by all workers of a run
#[derive(Debug)]
pub struct MetadataCache {
    entries: RwLock<HashMap<CacheKey, ResolvedDate>>,
    capacity: usize,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl MetadataCache {
    /// Cache file format version
    const VERSION: u32 = 1;

    /// Create an empty cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolvedDate> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a result. Returns false when the cache is full and the key is new.
    pub fn insert(&self, key: CacheKey, date: ResolvedDate) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, date);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Load a cache saved by [`MetadataCache::save`]. A missing file or a
    /// version mismatch yields an empty cache.
    pub fn load(path: &Path, capacity: usize) -> Result<Self> {
        let cache = Self::new(capacity);
        if !path.exists() {
            debug!(?path, "Cache file does not exist, starting empty");
            return Ok(cache);
        }

        let file = File::open(path)
            .map_err(|e| Error::CacheFile(format!("Failed to open cache file: {}", e)))?;
        let stored: CacheFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::CacheFile(format!("Failed to parse cache file: {}", e)))?;

        if stored.version != Self::VERSION {
            warn!(
                cache_version = stored.version,
                current_version = Self::VERSION,
                "Cache file version mismatch, starting empty"
            );
            return Ok(cache);
        }

        for entry in stored.entries {
            if !cache.insert(entry.key, entry.date) {
                break;
            }
        }
        info!(entries = cache.len(), "Loaded metadata cache");
        Ok(cache)
    }

    /// Persist the cache as JSON (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries: Vec<CacheFileEntry> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(key, date)| CacheFileEntry {
                key: key.clone(),
                date: date.clone(),
            })
            .collect();
        let count = entries.len();

        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)
            .map_err(|e| Error::CacheFile(format!("Failed to create temp cache file: {}", e)))?;
        serde_json::to_writer(
            BufWriter::new(file),
            &CacheFile {
                version: Self::VERSION,
                entries,
            },
        )
        .map_err(|e| Error::CacheFile(format!("Failed to write cache file: {}", e)))?;

        fs::rename(&temp_path, path)
            .map_err(|e| Error::CacheFile(format!("Failed to rename temp cache file: {}", e)))?;

        info!(entries = count, "Saved metadata cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::DateSource;
    use chrono::NaiveDateTime;
    use tempfile::tempdir;

    fn date(s: &str) -> ResolvedDate {
        ResolvedDate {
            timestamp: NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap(),
            source: DateSource::ExifDateTimeOriginal,
        }
    }

    #[test]
    fn test_key_includes_size_and_mtime() {
        let cache = MetadataCache::new(10);
        let path = Path::new("/photos/a.jpg");
        cache.insert(CacheKey::new(path, 100, 1_700_000_000), date("2024-12-25 10:00:00"));

        assert!(cache.get(&CacheKey::new(path, 100, 1_700_000_000)).is_some());
        assert!(cache.get(&CacheKey::new(path, 101, 1_700_000_000)).is_none());
        assert!(cache.get(&CacheKey::new(path, 100, 1_700_000_001)).is_none());
    }

    #[test]
    fn test_capacity_stops_new_entries() {
        let cache = MetadataCache::new(1);
        assert!(cache.insert(CacheKey::new(Path::new("/a"), 1, 1), date("2024-01-01 00:00:00")));
        assert!(!cache.insert(CacheKey::new(Path::new("/b"), 1, 1), date("2024-01-02 00:00:00")));
        // Existing keys can still be refreshed
        assert!(cache.insert(CacheKey::new(Path::new("/a"), 1, 1), date("2024-01-03 00:00:00")));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("cache").join("dates.json");

        let cache = MetadataCache::new(100);
        let key = CacheKey::new(Path::new("/photos/b.jpg"), 42, 1_700_000_000);
        cache.insert(key.clone(), date("2023-06-01 08:30:00"));
        cache.save(&cache_path).unwrap();

        let loaded = MetadataCache::load(&cache_path, 100).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&key), Some(date("2023-06-01 08:30:00")));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let loaded = MetadataCache::load(&dir.path().join("none.json"), 10).unwrap();
        assert!(loaded.is_empty());
    }
}
