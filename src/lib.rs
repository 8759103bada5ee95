//! Media Sorter - organize photos and videos into a date-based layout
//!
//! This library provides:
//! - Single-pass discovery of images and videos, with paired thumbnails
//! - Date resolution from EXIF metadata with a modification-time fallback
//! - A memoizing date cache keyed by path, size and modification time
//! - Destination planning from date layout patterns such as `YYYY/MM/DD`
//! - Skip, overwrite or rename handling of occupied destinations
//! - A bounded queue drained by a Rayon worker pool, or a simulated run
//! - Thread-safe run statistics with a capped error log

pub mod cli;
pub mod config;
pub mod conflict;
pub mod discover;
pub mod error;
pub mod fileops;
pub mod plan;
pub mod process;
pub mod stats;
pub mod time;

pub use cli::Cli;
pub use config::{Config, ConfigError, DuplicateStrategy, FileOperation, MediaKind};
pub use discover::{CandidateFile, Discovery};
pub use error::{Error, Result};
pub use plan::{DateLayout, plan_destination};
pub use process::{Mode, Organizer, OutcomeKind, ProcessingOutcome, RunReport};
pub use stats::{Operation, Statistics, StatisticsSnapshot};
pub use time::{DateResolver, DateSource, MetadataCache, ResolvedDate};
