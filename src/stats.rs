//! Run statistics shared by every worker
//!
//! Counters are plain atomics so a worker never waits on another to bump
//! one. The error log and the per-extension table sit behind short-lived
//! mutexes that are never held across I/O. Derived metrics are computed
//! once by [`Statistics::finalize`] after all workers have joined.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Error log entries kept in memory; later ones are only counted
pub const ERROR_LOG_CAPACITY: usize = 1000;

/// Error log entries shown in summaries
pub const ERROR_DISPLAY_LIMIT: usize = 10;

/// Pipeline step that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    DateExtraction,
    PathGeneration,
    DuplicateHandling,
    DirectoryCreation,
    MoveFile,
    CopyFile,
    ThumbnailProcessing,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DateExtraction => "date_extraction",
            Operation::PathGeneration => "path_generation",
            Operation::DuplicateHandling => "duplicate_handling",
            Operation::DirectoryCreation => "directory_creation",
            Operation::MoveFile => "move_file",
            Operation::CopyFile => "copy_file",
            Operation::ThumbnailProcessing => "thumbnail_processing",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded per-file error
#[derive(Debug, Clone, Serialize)]
pub struct StatError {
    pub path: PathBuf,
    pub operation: Operation,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Default)]
struct ErrorLog {
    entries: Vec<StatError>,
    total: u64,
}

/// Metrics derived once at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinalMetrics {
    pub duration: Duration,
    pub files_per_second: f64,
    pub average_file_size: u64,
    pub cache_hit_rate: f64,
}

/// Counters and error log for one run
#[derive(Debug)]
pub struct Statistics {
    pub files_found: AtomicU64,
    pub files_processed: AtomicU64,
    pub files_organized: AtomicU64,
    pub files_moved: AtomicU64,
    pub files_copied: AtomicU64,
    pub files_skipped: AtomicU64,
    pub files_with_errors: AtomicU64,
    pub files_without_dates: AtomicU64,

    pub video_files_found: AtomicU64,
    pub video_files_processed: AtomicU64,
    pub thumbnails_found: AtomicU64,

    pub duplicates_found: AtomicU64,
    pub duplicates_renamed: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub duplicates_replaced: AtomicU64,

    pub directories_created: AtomicU64,
    pub directories_scanned: AtomicU64,

    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,

    pub dates_from_exif: AtomicU64,
    pub dates_from_mod_time: AtomicU64,
    pub extraction_errors: AtomicU64,

    pub bytes_processed: AtomicU64,

    started: Instant,
    started_at: DateTime<Local>,
    file_types: Mutex<BTreeMap<String, u64>>,
    errors: Mutex<ErrorLog>,
    finalized: OnceLock<FinalMetrics>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Increment a counter by one
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl Statistics {
    /// Create statistics for a run starting now
    pub fn new() -> Self {
        Self {
            files_found: AtomicU64::new(0),
            files_processed: AtomicU64::new(0),
            files_organized: AtomicU64::new(0),
            files_moved: AtomicU64::new(0),
            files_copied: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            files_with_errors: AtomicU64::new(0),
            files_without_dates: AtomicU64::new(0),
            video_files_found: AtomicU64::new(0),
            video_files_processed: AtomicU64::new(0),
            thumbnails_found: AtomicU64::new(0),
            duplicates_found: AtomicU64::new(0),
            duplicates_renamed: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            duplicates_replaced: AtomicU64::new(0),
            directories_created: AtomicU64::new(0),
            directories_scanned: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            dates_from_exif: AtomicU64::new(0),
            dates_from_mod_time: AtomicU64::new(0),
            extraction_errors: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Local::now(),
            file_types: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(ErrorLog::default()),
            finalized: OnceLock::new(),
        }
    }

    /// Count one file of the given extension (stored upper-case, without dot)
    pub fn record_file_type(&self, extension: &str) {
        let key = extension.trim_start_matches('.').to_uppercase();
        let mut types = self.file_types.lock().unwrap_or_else(PoisonError::into_inner);
        *types.entry(key).or_insert(0) += 1;
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Append to the error log. Entries past [`ERROR_LOG_CAPACITY`] are counted but not kept.
    pub fn add_error(&self, path: &Path, operation: Operation, message: impl Into<String>) {
        let mut log = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        log.total += 1;
        if log.entries.len() < ERROR_LOG_CAPACITY {
            log.entries.push(StatError {
                path: path.to_path_buf(),
                operation,
                message: message.into(),
                timestamp: Local::now(),
            });
        }
    }

    /// Total errors recorded, including those beyond the log capacity
    pub fn error_count(&self) -> u64 {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).total
    }

    /// Copy of the retained error log, in insertion order
    pub fn errors(&self) -> Vec<StatError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    /// Compute derived metrics. The first call wins; later calls return the same values.
    pub fn finalize(&self) -> FinalMetrics {
        *self.finalized.get_or_init(|| {
            let metrics = self.compute_metrics(self.started.elapsed());

            let processed = load(&self.files_processed);
            let accounted = load(&self.files_organized)
                + load(&self.files_skipped)
                + load(&self.files_with_errors)
                + load(&self.files_without_dates);
            if processed != accounted {
                warn!(processed, accounted, "Per-file outcome counters do not add up");
            }

            metrics
        })
    }

    /// Derived metrics, if the run has been finalized
    pub fn final_metrics(&self) -> Option<FinalMetrics> {
        self.finalized.get().copied()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.get().is_some()
    }

    fn compute_metrics(&self, duration: Duration) -> FinalMetrics {
        let processed = load(&self.files_processed);
        let organized = load(&self.files_organized);
        let bytes = load(&self.bytes_processed);
        let hits = load(&self.cache_hits);
        let misses = load(&self.cache_misses);

        let secs = duration.as_secs_f64();
        FinalMetrics {
            duration,
            files_per_second: if secs > 0.0 { processed as f64 / secs } else { 0.0 },
            average_file_size: if organized > 0 { bytes / organized } else { 0 },
            cache_hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }

    /// Point-in-time copy of every counter, usable during or after a run
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let metrics = self
            .final_metrics()
            .unwrap_or_else(|| self.compute_metrics(self.started.elapsed()));
        let (errors, errors_total) = {
            let log = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
            (log.entries.clone(), log.total)
        };

        StatisticsSnapshot {
            started_at: self.started_at,
            finalized: self.is_finalized(),
            files_found: load(&self.files_found),
            files_processed: load(&self.files_processed),
            files_organized: load(&self.files_organized),
            files_moved: load(&self.files_moved),
            files_copied: load(&self.files_copied),
            files_skipped: load(&self.files_skipped),
            files_with_errors: load(&self.files_with_errors),
            files_without_dates: load(&self.files_without_dates),
            video_files_found: load(&self.video_files_found),
            video_files_processed: load(&self.video_files_processed),
            thumbnails_found: load(&self.thumbnails_found),
            duplicates_found: load(&self.duplicates_found),
            duplicates_renamed: load(&self.duplicates_renamed),
            duplicates_skipped: load(&self.duplicates_skipped),
            duplicates_replaced: load(&self.duplicates_replaced),
            directories_created: load(&self.directories_created),
            directories_scanned: load(&self.directories_scanned),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            dates_from_exif: load(&self.dates_from_exif),
            dates_from_mod_time: load(&self.dates_from_mod_time),
            extraction_errors: load(&self.extraction_errors),
            bytes_processed: load(&self.bytes_processed),
            metrics,
            file_types: self
                .file_types
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            errors,
            errors_total,
        }
    }

    /// Multi-section text summary
    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }

    /// Capped error listing
    pub fn error_summary(&self) -> String {
        self.snapshot().error_summary()
    }
}

/// Serializable copy of [`Statistics`]
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsSnapshot {
    pub started_at: DateTime<Local>,
    pub finalized: bool,
    pub files_found: u64,
    pub files_processed: u64,
    pub files_organized: u64,
    pub files_moved: u64,
    pub files_copied: u64,
    pub files_skipped: u64,
    pub files_with_errors: u64,
    pub files_without_dates: u64,
    pub video_files_found: u64,
    pub video_files_processed: u64,
    pub thumbnails_found: u64,
    pub duplicates_found: u64,
    pub duplicates_renamed: u64,
    pub duplicates_skipped: u64,
    pub duplicates_replaced: u64,
    pub directories_created: u64,
    pub directories_scanned: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub dates_from_exif: u64,
    pub dates_from_mod_time: u64,
    pub extraction_errors: u64,
    pub bytes_processed: u64,
    pub metrics: FinalMetrics,
    pub file_types: BTreeMap<String, u64>,
    pub errors: Vec<StatError>,
    pub errors_total: u64,
}

impl StatisticsSnapshot {
    pub fn summary(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = write!(
            out,
            "Media Sorter Statistics Summary:

Files:
    Total Found: {}
    Total Processed: {}
    Organized: {}
    Moved: {}
    Copied: {}
    Skipped: {}
    Errors: {}
    Without Dates: {}

Videos:
    Videos Found: {}
    Videos Processed: {}
    Thumbnails Found: {}

Duplicates:
    Found: {}
    Renamed: {}
    Skipped: {}
    Replaced: {}

Performance:
    Duration: {:.2?}
    Files/Second: {:.2}
    Bytes Processed: {}
    Average File Size: {}

Cache:
    Hits: {}
    Misses: {}
    Hit Rate: {:.2}%

Date Extraction:
    From EXIF: {}
    From ModTime: {}
    Extraction Errors: {}

Directories:
    Created: {}
    Scanned: {}",
            self.files_found,
            self.files_processed,
            self.files_organized,
            self.files_moved,
            self.files_copied,
            self.files_skipped,
            self.files_with_errors,
            self.files_without_dates,
            self.video_files_found,
            self.video_files_processed,
            self.thumbnails_found,
            self.duplicates_found,
            self.duplicates_renamed,
            self.duplicates_skipped,
            self.duplicates_replaced,
            m.duration,
            m.files_per_second,
            format_bytes(self.bytes_processed),
            format_bytes(m.average_file_size),
            self.cache_hits,
            self.cache_misses,
            m.cache_hit_rate * 100.0,
            self.dates_from_exif,
            self.dates_from_mod_time,
            self.extraction_errors,
            self.directories_created,
            self.directories_scanned,
        );
        out
    }

    /// Per-extension breakdown, one line per extension
    pub fn file_type_breakdown(&self) -> String {
        if self.file_types.is_empty() {
            return "No file type statistics available".to_string();
        }
        let mut out = String::from("File Type Breakdown:\n");
        for (ext, count) in &self.file_types {
            let _ = writeln!(out, "  {}: {}", ext, count);
        }
        out
    }

    /// First [`ERROR_DISPLAY_LIMIT`] errors plus a count of the rest
    pub fn error_summary(&self) -> String {
        if self.errors_total == 0 {
            return "No errors occurred during processing".to_string();
        }
        let mut out = format!("Errors ({} total):\n", self.errors_total);
        for err in self.errors.iter().take(ERROR_DISPLAY_LIMIT) {
            let _ = writeln!(
                out,
                "  [{}] {}: {} - {}",
                err.timestamp.format("%H:%M:%S"),
                err.operation,
                err.path.display(),
                err.message
            );
        }
        let shown = self.errors.len().min(ERROR_DISPLAY_LIMIT) as u64;
        if self.errors_total > shown {
            let _ = writeln!(out, "  ... and {} more errors", self.errors_total - shown);
        }
        out
    }
}

/// Human-readable byte count (`1.5 MB`)
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_finalize_computes_derived_metrics() {
        let stats = Statistics::new();
        for _ in 0..4 {
            bump(&stats.files_processed);
        }
        bump(&stats.files_organized);
        bump(&stats.files_organized);
        bump(&stats.files_skipped);
        bump(&stats.files_without_dates);
        stats.add_bytes(3000);
        bump(&stats.cache_hits);
        bump(&stats.cache_misses);
        bump(&stats.cache_misses);
        bump(&stats.cache_misses);

        let metrics = stats.finalize();
        assert_eq!(metrics.average_file_size, 1500);
        assert!((metrics.cache_hit_rate - 0.25).abs() < f64::EPSILON);
        assert!(metrics.files_per_second >= 0.0);
        assert!(stats.is_finalized());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let stats = Statistics::new();
        bump(&stats.files_processed);
        bump(&stats.files_organized);
        let first = stats.finalize();
        std::thread::sleep(Duration::from_millis(5));
        let second = stats.finalize();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_run_metrics_are_zero() {
        let stats = Statistics::new();
        let metrics = stats.finalize();
        assert_eq!(metrics.average_file_size, 0);
        assert_eq!(metrics.cache_hit_rate, 0.0);
    }

    #[test]
    fn test_error_log_is_bounded_and_ordered() {
        let stats = Statistics::new();
        for i in 0..(ERROR_LOG_CAPACITY + 5) {
            stats.add_error(
                Path::new(&format!("/src/{}.jpg", i)),
                Operation::CopyFile,
                "disk full",
            );
        }
        let errors = stats.errors();
        assert_eq!(errors.len(), ERROR_LOG_CAPACITY);
        assert_eq!(errors[0].path, PathBuf::from("/src/0.jpg"));
        assert_eq!(stats.error_count(), (ERROR_LOG_CAPACITY + 5) as u64);

        let summary = stats.error_summary();
        assert!(summary.contains("1005 total"));
        assert!(summary.contains("copy_file"));
        assert!(summary.contains("... and 995 more errors"));
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(Statistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        bump(&stats.files_processed);
                        stats.record_file_type("jpg");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.files_processed, 8000);
        assert_eq!(snapshot.file_types.get("JPG"), Some(&8000));
    }

    #[test]
    fn test_summary_and_snapshot_json() {
        let stats = Statistics::new();
        bump(&stats.files_found);
        bump(&stats.duplicates_renamed);
        stats.record_file_type(".mov");
        stats.finalize();

        let summary = stats.summary();
        assert!(summary.contains("Total Found: 1"));
        assert!(summary.contains("Renamed: 1"));

        let snapshot = stats.snapshot();
        assert!(snapshot.finalized);
        assert!(snapshot.file_type_breakdown().contains("MOV: 1"));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["files_found"], 1);
        assert_eq!(json["file_types"]["MOV"], 1);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_operation_tags() {
        assert_eq!(Operation::DateExtraction.to_string(), "date_extraction");
        assert_eq!(
            serde_json::to_value(Operation::ThumbnailProcessing).unwrap(),
            "thumbnail_processing"
        );
    }
}
