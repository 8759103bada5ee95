//! Error types for the media sorter

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media sorter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the media sorter
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("File type not supported by date resolver: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Path has no usable file name: {path}")]
    InvalidFileName { path: PathBuf },

    #[error("No free name found for {path} after {attempts} attempts")]
    RenameExhausted { path: PathBuf, attempts: u32 },

    #[error("Metadata cache file error: {0}")]
    CacheFile(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
