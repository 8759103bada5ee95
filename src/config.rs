//! Configuration types for the media sorter

use crate::plan::DateLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What happens to a file once its destination is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    /// Move files into the date layout (source no longer exists afterwards)
    #[default]
    Move,
    /// Copy files into the date layout, leaving the source untouched
    Copy,
}

impl FileOperation {
    pub fn verb(&self) -> &'static str {
        match self {
            FileOperation::Move => "move",
            FileOperation::Copy => "copy",
        }
    }
}

/// How to handle a file whose destination is already occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateStrategy {
    /// Leave both files untouched and count the source as skipped
    Skip,
    /// Replace the existing destination file
    Overwrite,
    /// Place the file under the first free `name_N.ext`
    #[default]
    Rename,
}

/// Broad media kind of a discovered file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Configuration for the media sorter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tree to organize
    pub source_dir: PathBuf,

    /// Root of the date layout (defaults to the source directory: in-place organization)
    pub target_dir: Option<PathBuf>,

    /// Date layout pattern (`YYYY/MM/DD`) or preset name (`year_month_day`)
    pub date_format: String,

    /// Recognized image extensions
    pub image_extensions: Vec<String>,

    /// Recognized video extensions
    pub video_extensions: Vec<String>,

    /// Video extensions that may carry a sibling thumbnail file
    pub paired_video_extensions: Vec<String>,

    /// Extension of sibling thumbnail files
    pub thumbnail_extension: String,

    /// Directories to exclude from scanning (absolute paths or folder names)
    pub exclude_dirs: Vec<PathBuf>,

    /// Move or copy
    pub operation: FileOperation,

    /// Strategy used when the destination already exists
    pub duplicate_handling: DuplicateStrategy,

    /// Skip directories whose name looks like a date (`2024`, `2024-12`, `2024-12-25`)
    pub skip_organized: bool,

    /// Copy each file to `<name>.backup` next to it before moving
    pub create_backups: bool,

    /// Number of worker threads (0 = available parallelism)
    pub threads: usize,

    /// Capacity of the queue between discovery and the workers
    pub batch_size: usize,

    /// Stop discovery after this many files (0 = unlimited)
    pub max_files: usize,

    /// Maximum number of memoized dates
    pub cache_size: usize,

    /// Optional JSON file to persist the metadata cache across runs
    pub cache_file: Option<PathBuf>,

    /// Simulate only: log decisions without touching the filesystem
    pub dry_run: bool,

    /// Verbose output
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            target_dir: None,
            date_format: "YYYY/MM/DD".to_string(),
            image_extensions: vec![
                "jpg".into(), "jpeg".into(), "png".into(), "tiff".into(), "tif".into(),
                "cr2".into(), "nef".into(), "arw".into(), "dng".into(), "raw".into(),
            ],
            video_extensions: vec!["mp4".into(), "avi".into(), "mov".into(), "mpg".into()],
            paired_video_extensions: vec!["mpg".into()],
            thumbnail_extension: "thm".into(),
            exclude_dirs: vec![],
            operation: FileOperation::default(),
            duplicate_handling: DuplicateStrategy::default(),
            skip_organized: true,
            create_backups: false,
            threads: 4,
            batch_size: 100,
            max_files: 0,
            cache_size: 10_000,
            cache_file: None,
            dry_run: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Check if a file extension is a recognized image format
    pub fn is_image(&self, ext: &str) -> bool {
        let ext_lower = normalize_extension(ext);
        self.image_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a file extension is a recognized video format
    pub fn is_video(&self, ext: &str) -> bool {
        let ext_lower = normalize_extension(ext);
        self.video_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if a video extension may carry a sibling thumbnail
    pub fn is_paired_video(&self, ext: &str) -> bool {
        let ext_lower = normalize_extension(ext);
        self.paired_video_extensions.iter().any(|e| e == &ext_lower)
    }

    /// Check if an extension is the thumbnail extension
    pub fn is_thumbnail(&self, ext: &str) -> bool {
        normalize_extension(ext) == self.thumbnail_extension
    }

    /// Get the media kind for an extension; images win when both lists contain it
    pub fn media_kind(&self, ext: &str) -> Option<MediaKind> {
        if self.is_image(ext) {
            Some(MediaKind::Image)
        } else if self.is_video(ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Root of the date layout
    pub fn target_root(&self) -> &Path {
        self.target_dir.as_deref().unwrap_or(&self.source_dir)
    }

    /// True when files are organized inside the source tree itself
    pub fn is_in_place(&self) -> bool {
        match &self.target_dir {
            None => true,
            Some(target) => target == &self.source_dir,
        }
    }

    /// Effective worker count
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    /// Normalize extension lists to lowercase without a leading dot
    pub fn normalize(&mut self) {
        for list in [
            &mut self.image_extensions,
            &mut self.video_extensions,
            &mut self.paired_video_extensions,
        ] {
            for ext in list.iter_mut() {
                *ext = normalize_extension(ext);
            }
        }
        self.thumbnail_extension = normalize_extension(&self.thumbnail_extension);
    }

    /// Validate the configuration once, before any processing.
    ///
    /// Normalizes extensions, canonicalizes the source and target roots and
    /// parses the date layout. Every error returned here is fatal.
    pub fn validate(&mut self) -> Result<DateLayout, ConfigError> {
        self.normalize();

        if !self.source_dir.is_dir() {
            return Err(ConfigError::SourceMissing(self.source_dir.clone()));
        }
        self.source_dir = fs::canonicalize(&self.source_dir).map_err(|e| ConfigError::ReadError {
            path: self.source_dir.clone(),
            source: e,
        })?;

        if let Some(target) = self.target_dir.take() {
            if target.as_os_str().is_empty() {
                // An empty target means in-place organization
            } else if !target.is_dir() {
                return Err(ConfigError::TargetMissing(target));
            } else {
                let canonical = fs::canonicalize(&target).map_err(|e| ConfigError::ReadError {
                    path: target.clone(),
                    source: e,
                })?;
                self.target_dir = Some(canonical);
            }
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }

        DateLayout::parse(&self.date_format)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.normalize();

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            source: e,
        })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# Media Sorter Configuration File
# This file uses TOML format (https://toml.io)

# Directory tree to organize
source_dir = "/home/me/Pictures/Inbox"

# Root of the date layout. Leave out to organize in place.
target_dir = "/home/me/Pictures/Sorted"

# Date layout. Tokens: YYYY, YY, MM, DD; everything else is literal.
# Presets: "year_month_day", "year_month", "year_only",
#          "year_dash_month_dash_day", "year_dash_month"
date_format = "YYYY/MM/DD"

# Recognized extensions (case-insensitive, with or without the dot)
image_extensions = ["jpg", "jpeg", "png", "tiff", "tif", "cr2", "nef", "arw", "dng", "raw"]
video_extensions = ["mp4", "avi", "mov", "mpg"]

# Videos whose sibling thumbnail (same base name) travels with them
paired_video_extensions = ["mpg"]
thumbnail_extension = "thm"

# Directories to exclude from scanning (absolute paths or folder names)
exclude_dirs = [".thumbnails", "@eaDir"]

# File operation: "move" or "copy"
operation = "move"

# Duplicate handling: "skip", "overwrite" or "rename"
# - rename: photo.jpg -> photo_1.jpg, photo_2.jpg, ...
duplicate_handling = "rename"

# Skip directories named like 2024, 2024-12 or 2024-12-25
skip_organized = true

# Copy each file to <name>.backup before moving it
create_backups = false

# Worker threads (0 = available parallelism)
threads = 4

# Queue capacity between discovery and workers
batch_size = 100

# Stop after this many files (0 = unlimited)
max_files = 0

# Memoized dates kept in memory, and an optional file to keep them across runs
cache_size = 10000
# cache_file = "/home/me/.cache/media-sorter/dates.json"

# Dry run mode - show what would be done without actually doing it
dry_run = false

# Verbose output
verbose = false
"#
        .to_string()
    }
}

/// Lowercase an extension and strip any leading dot
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Errors that can occur when loading, saving or validating configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file or resolve a configured path
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write configuration file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize configuration
    SerializeError {
        source: toml::ser::Error,
    },
    /// Source directory does not exist or is not a directory
    SourceMissing(PathBuf),
    /// Target directory does not exist or is not a directory
    TargetMissing(PathBuf),
    /// Date layout pattern is unusable
    InvalidDateFormat {
        pattern: String,
        reason: String,
    },
    /// Any other invalid setting
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
            ConfigError::SourceMissing(path) => {
                write!(f, "Source directory does not exist or is not accessible: {}", path.display())
            }
            ConfigError::TargetMissing(path) => {
                write!(f, "Target directory does not exist or is not accessible: {}", path.display())
            }
            ConfigError::InvalidDateFormat { pattern, reason } => {
                write!(f, "Invalid date format '{}': {}", pattern, reason)
            }
            ConfigError::Invalid(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
            _ => None,
        }
    }
}
