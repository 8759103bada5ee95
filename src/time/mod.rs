//! Date resolution
//!
//! This module provides functionality to decide "when" a media file was
//! created:
//! - EXIF metadata in images (JPEG, TIFF-based RAW, HEIF, PNG, WebP)
//! - File system modification time as the fallback, and as the only
//!   source for videos
//!
//! Results are memoized in a [`MetadataCache`] keyed by path, size and
//! modification time.

pub mod cache;
pub mod exif;

pub use cache::{CacheKey, MetadataCache};

use crate::error::{Error, Result};
use crate::stats::{Statistics, bump};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Source of the resolved timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    /// EXIF DateTimeOriginal tag
    ExifDateTimeOriginal,
    /// EXIF DateTimeDigitized tag
    ExifDateTimeDigitized,
    /// EXIF DateTime tag
    ExifDateTime,
    /// File system modification time
    ModificationTime,
}

impl DateSource {
    pub fn is_exif(&self) -> bool {
        !matches!(self, DateSource::ModificationTime)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DateSource::ExifDateTimeOriginal => "EXIF DateTimeOriginal",
            DateSource::ExifDateTimeDigitized => "EXIF DateTimeDigitized",
            DateSource::ExifDateTime => "EXIF DateTime",
            DateSource::ModificationTime => "File Modification Time",
        }
    }
}

/// A timestamp plus the fallback tier that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDate {
    pub timestamp: NaiveDateTime,
    pub source: DateSource,
}

/// Resolves dates through the fallback chain, consulting the cache first
#[derive(Debug, Clone, Copy)]
pub struct DateResolver<'a> {
    cache: &'a MetadataCache,
    stats: &'a Statistics,
    video_extensions: &'a [String],
}

impl<'a> DateResolver<'a> {
    pub fn new(cache: &'a MetadataCache, stats: &'a Statistics, video_extensions: &'a [String]) -> Self {
        Self {
            cache,
            stats,
            video_extensions,
        }
    }

    fn is_video(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.video_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Resolve the date of a file.
    ///
    /// The extraction priority is:
    /// 1. Cached result for the same (path, size, mtime)
    /// 2. EXIF DateTimeOriginal, DateTimeDigitized, DateTime (images)
    /// 3. File system modification time
    ///
    /// Unsupported or unreadable files are an error and count as an
    /// extraction error; nothing here aborts the run.
    pub fn resolve(&self, path: &Path) -> Result<ResolvedDate> {
        let result = self.resolve_inner(path);
        if result.is_err() {
            bump(&self.stats.extraction_errors);
        }
        result
    }

    fn resolve_inner(&self, path: &Path) -> Result<ResolvedDate> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let exif_capable = exif::supports_extension(ext);
        if !exif_capable && !self.is_video(ext) {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }

        let metadata = fs::metadata(path)?;
        let key = CacheKey::from_metadata(path, &metadata);

        if let Some(cached) = self.cache.get(&key) {
            bump(&self.stats.cache_hits);
            trace!(?path, "Date cache hit");
            return Ok(cached);
        }
        bump(&self.stats.cache_misses);

        let resolved = if exif_capable {
            match exif::extract_exif_time(path) {
                Ok((timestamp, source)) => {
                    debug!(?path, ?source, "Extracted time from EXIF");
                    ResolvedDate { timestamp, source }
                }
                Err(e) => {
                    debug!(?path, error = %e, "No EXIF time found, using modification time");
                    modification_time(&metadata)?
                }
            }
        } else {
            modification_time(&metadata)?
        };

        if !self.cache.insert(key, resolved.clone()) {
            trace!(?path, capacity = self.cache.capacity(), "Date cache full, not memoizing");
        }
        Ok(resolved)
    }
}

fn modification_time(metadata: &fs::Metadata) -> Result<ResolvedDate> {
    let modified = metadata.modified()?;
    let local: DateTime<Local> = modified.into();
    Ok(ResolvedDate {
        timestamp: local.naive_local(),
        source: DateSource::ModificationTime,
    })
}


#[cfg(test)]
mod tests {
    use super::testutil::{jpeg_taken, jpeg_without_exif};
    use super::*;
    use chrono::Datelike;
    use filetime::FileTime;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn videos() -> Vec<String> {
        vec!["mp4".to_string(), "mpg".to_string()]
    }

    #[test]
    fn test_second_resolve_hits_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xmas.jpg");
        fs::write(&path, jpeg_taken("2024:12:25 18:00:00")).unwrap();

        let cache = MetadataCache::new(100);
        let stats = Statistics::new();
        let exts = videos();
        let resolver = DateResolver::new(&cache, &stats, &exts);

        let first = resolver.resolve(&path).unwrap();
        assert_eq!(first.source, DateSource::ExifDateTimeOriginal);
        assert_eq!(stats.cache_misses.load(Ordering::Relaxed), 1);
        assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 0);

        let second = resolver.resolve(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_changed_mtime_forces_miss() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, jpeg_taken("2024:12:25 18:00:00")).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        let cache = MetadataCache::new(100);
        let stats = Statistics::new();
        let exts = videos();
        let resolver = DateResolver::new(&cache, &stats, &exts);

        resolver.resolve(&path).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_600_000_100, 0)).unwrap();
        resolver.resolve(&path).unwrap();

        assert_eq!(stats.cache_misses.load(Ordering::Relaxed), 2);
        assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_no_exif_falls_back_to_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        fs::write(&path, jpeg_without_exif()).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        let cache = MetadataCache::new(100);
        let stats = Statistics::new();
        let exts = videos();
        let resolved = DateResolver::new(&cache, &stats, &exts).resolve(&path).unwrap();

        let expected: DateTime<Local> = (std::time::UNIX_EPOCH
            + std::time::Duration::from_secs(1_700_000_000))
        .into();
        assert_eq!(resolved.source, DateSource::ModificationTime);
        assert_eq!(resolved.timestamp, expected.naive_local());
    }

    #[test]
    fn test_video_uses_mtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.MPG");
        fs::write(&path, b"not really mpeg").unwrap();

        let cache = MetadataCache::new(100);
        let stats = Statistics::new();
        let exts = videos();
        let resolved = DateResolver::new(&cache, &stats, &exts).resolve(&path).unwrap();
        assert_eq!(resolved.source, DateSource::ModificationTime);
        assert!(resolved.timestamp.year() >= 2000);
    }

    #[test]
    fn test_unsupported_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        fs::write(&path, b"GIF89a").unwrap();

        let cache = MetadataCache::new(100);
        let stats = Statistics::new();
        let exts = videos();
        let resolver = DateResolver::new(&cache, &stats, &exts);

        assert!(matches!(
            resolver.resolve(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
        assert_eq!(stats.extraction_errors.load(Ordering::Relaxed), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let cache = MetadataCache::new(100);
        let stats = Statistics::new();
        let exts = videos();
        let resolver = DateResolver::new(&cache, &stats, &exts);
        assert!(matches!(
            resolver.resolve(&dir.path().join("gone.jpg")),
            Err(Error::Io(_))
        ));
    }
}
