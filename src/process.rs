//! Worker pool that places media files into the date layout
//!
//! Handles the core logic of:
//! - Feeding discovered files through a bounded queue
//! - Resolving dates and planning destinations
//! - Resolving destination conflicts across workers
//! - Moving or copying files, or only logging in simulated runs

use crate::config::{Config, DuplicateStrategy, FileOperation, MediaKind};
use crate::conflict::{Claim, Occupancy, Resolution, resolve_conflict};
use crate::discover::{CandidateFile, Discovery};
use crate::error::{Error, Result};
use crate::fileops::{backup_file, copy_file, ensure_dir, move_file};
use crate::plan::{DateLayout, plan_destination};
use crate::stats::{Operation, Statistics, StatisticsSnapshot, bump};
use crate::time::{DateResolver, MetadataCache, ResolvedDate};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::{Level, debug, error, info, span, warn};

/// Whether the terminal action touches the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Simulate,
}

/// Terminal decision for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Placed at its planned destination
    Organized,
    /// Placed after a rename or over an existing file
    DuplicateHandled,
    /// Left where it is
    Skipped,
    /// Date resolver rejected the file
    NoDate,
    /// A step after date resolution failed
    Error,
}

/// Result of processing a single file
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub kind: OutcomeKind,
    pub bytes: u64,
    pub date: Option<ResolvedDate>,
    /// Why a file was skipped
    pub reason: Option<String>,
    /// Step that failed
    pub operation: Option<Operation>,
    pub error: Option<String>,
    pub simulated: bool,
}

impl ProcessingOutcome {
    fn new(file: &CandidateFile, kind: OutcomeKind, mode: Mode) -> Self {
        Self {
            source: file.path.clone(),
            destination: None,
            kind,
            bytes: 0,
            date: None,
            reason: None,
            operation: None,
            error: None,
            simulated: mode == Mode::Simulate,
        }
    }

    /// Whether the file ended up (or would end up) in the date layout
    pub fn is_placed(&self) -> bool {
        matches!(self.kind, OutcomeKind::Organized | OutcomeKind::DuplicateHandled)
    }
}

/// Outcomes and statistics of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub outcomes: Vec<ProcessingOutcome>,
    pub statistics: StatisticsSnapshot,
}

type OutcomeHook = Box<dyn Fn(&ProcessingOutcome) + Send + Sync>;

/// Shared per-run state handed to every worker
struct RunContext<'a> {
    resolver: DateResolver<'a>,
    occupancy: &'a Occupancy,
    stats: &'a Statistics,
    mode: Mode,
}

/// Main organizer for media files
pub struct Organizer {
    config: Config,
    layout: DateLayout,
    hook: Option<OutcomeHook>,
}

impl std::fmt::Debug for Organizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Organizer")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl Organizer {
    /// Validate the configuration and build an organizer.
    ///
    /// Every configuration problem surfaces here, before any file is touched.
    pub fn new(mut config: Config) -> Result<Self> {
        let layout = config.validate()?;
        Ok(Self {
            config,
            layout,
            hook: None,
        })
    }

    /// Receive one event per file once its outcome is final
    pub fn with_outcome_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ProcessingOutcome) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &DateLayout {
        &self.layout
    }

    pub fn mode(&self) -> Mode {
        if self.config.dry_run {
            Mode::Simulate
        } else {
            Mode::Live
        }
    }

    /// Run with a fresh cache (loaded from `cache_file` when set) and fresh
    /// statistics. The cache is saved back after live runs.
    pub fn organize(&self) -> Result<RunReport> {
        let cache = match &self.config.cache_file {
            Some(path) => MetadataCache::load(path, self.config.cache_size).unwrap_or_else(|e| {
                warn!(?path, error = %e, "Ignoring unreadable metadata cache");
                MetadataCache::new(self.config.cache_size)
            }),
            None => MetadataCache::new(self.config.cache_size),
        };
        let stats = Statistics::new();

        let outcomes = self.run(&cache, &stats)?;

        if self.mode() == Mode::Live
            && let Some(path) = &self.config.cache_file
            && let Err(e) = cache.save(path)
        {
            warn!(?path, error = %e, "Failed to save metadata cache");
        }

        Ok(RunReport {
            mode: self.mode(),
            outcomes,
            statistics: stats.snapshot(),
        })
    }

    /// Run the pipeline against caller-owned cache and statistics.
    ///
    /// Discovery walks the whole source tree on its own thread, then feeds
    /// a bounded queue that a dedicated pool of workers drains. Statistics are finalized after every
    /// worker has finished. Only failing to start the pool is an error here;
    /// per-file failures end up in the returned outcomes.
    pub fn run(&self, cache: &MetadataCache, stats: &Statistics) -> Result<Vec<ProcessingOutcome>> {
        let mode = self.mode();
        let workers = self.config.worker_threads();
        let _span = span!(
            Level::INFO,
            "organize",
            source = %self.config.source_dir.display(),
            target = %self.config.target_root().display(),
            ?mode
        )
        .entered();

        info!(
            workers,
            batch_size = self.config.batch_size,
            date_format = self.layout.pattern(),
            operation = self.config.operation.verb(),
            duplicates = ?self.config.duplicate_handling,
            "Starting run"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("media-worker-{}", i))
            .build()?;

        let occupancy = match mode {
            Mode::Live => Occupancy::new(),
            Mode::Simulate => Occupancy::sticky(),
        };
        let ctx = RunContext {
            resolver: DateResolver::new(cache, stats, &self.config.video_extensions),
            occupancy: &occupancy,
            stats,
            mode,
        };

        let discovery = Discovery::new(&self.config, stats);
        let (tx, rx) = crossbeam_channel::bounded::<CandidateFile>(self.config.batch_size);

        let outcomes = std::thread::scope(|scope| {
            scope.spawn(move || {
                // The walk completes before anything is queued, so files
                // placed during this run are never discovered again
                let files = discovery.discover();
                debug!(files = files.len(), "Discovery finished");
                for candidate in files {
                    if tx.send(candidate).is_err() {
                        break;
                    }
                }
            });

            pool.install(|| {
                rx.into_iter()
                    .par_bridge()
                    .map(|file| self.process_file(file, &ctx))
                    .collect::<Vec<_>>()
            })
        });

        let metrics = stats.finalize();
        info!(
            found = stats.files_found.load(Ordering::Relaxed),
            organized = stats.files_organized.load(Ordering::Relaxed),
            skipped = stats.files_skipped.load(Ordering::Relaxed),
            errors = stats.files_with_errors.load(Ordering::Relaxed),
            duration = ?metrics.duration,
            "Run finished"
        );

        Ok(outcomes)
    }

    fn process_file(&self, file: CandidateFile, ctx: &RunContext<'_>) -> ProcessingOutcome {
        let _span = span!(Level::DEBUG, "file", path = %file.path.display()).entered();

        bump(&ctx.stats.files_processed);
        if file.kind == MediaKind::Video {
            bump(&ctx.stats.video_files_processed);
        }

        let outcome = self.place(&file, ctx);
        if let Some(hook) = &self.hook {
            hook(&outcome);
        }
        outcome
    }

    fn place(&self, file: &CandidateFile, ctx: &RunContext<'_>) -> ProcessingOutcome {
        let stats = ctx.stats;

        let date = match ctx.resolver.resolve(&file.path) {
            Ok(date) => date,
            Err(e) => {
                warn!(path = ?file.path, error = %e, "No usable date");
                bump(&stats.files_without_dates);
                stats.add_error(&file.path, Operation::DateExtraction, e.to_string());
                let mut outcome = ProcessingOutcome::new(file, OutcomeKind::NoDate, ctx.mode);
                outcome.operation = Some(Operation::DateExtraction);
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };
        if date.source.is_exif() {
            bump(&stats.dates_from_exif);
        } else {
            bump(&stats.dates_from_mod_time);
        }

        let planned = match plan_destination(
            &file.path,
            &date.timestamp,
            self.config.target_root(),
            &self.layout,
        ) {
            Ok(path) => path,
            Err(e) => return self.fail(file, ctx, Operation::PathGeneration, None, e),
        };

        if planned == file.path {
            debug!(path = ?file.path, "Already in place");
            bump(&stats.files_skipped);
            let mut outcome = ProcessingOutcome::new(file, OutcomeKind::Skipped, ctx.mode);
            outcome.destination = Some(planned);
            outcome.date = Some(date);
            outcome.reason = Some("already in place".to_string());
            return outcome;
        }

        let resolution = match resolve_conflict(&planned, self.config.duplicate_handling, ctx.occupancy) {
            Ok(resolution) => resolution,
            Err(e) => {
                bump(&stats.duplicates_found);
                return self.fail(file, ctx, Operation::DuplicateHandling, Some(planned), e);
            }
        };

        let (claim, kind) = match resolution {
            Resolution::Free(claim) => (claim, OutcomeKind::Organized),
            Resolution::Skip => {
                bump(&stats.duplicates_found);
                bump(&stats.duplicates_skipped);
                bump(&stats.files_skipped);
                info!(source = ?file.path, destination = ?planned, "Skipping duplicate");
                let mut outcome = ProcessingOutcome::new(file, OutcomeKind::Skipped, ctx.mode);
                outcome.destination = Some(planned);
                outcome.date = Some(date);
                outcome.reason = Some("destination exists".to_string());
                return outcome;
            }
            Resolution::Overwrite(claim) => {
                bump(&stats.duplicates_found);
                bump(&stats.duplicates_replaced);
                (claim, OutcomeKind::DuplicateHandled)
            }
            Resolution::Renamed(claim) => {
                bump(&stats.duplicates_found);
                bump(&stats.duplicates_renamed);
                (claim, OutcomeKind::DuplicateHandled)
            }
        };

        match ctx.mode {
            Mode::Simulate => self.simulate(file, &claim, ctx),
            Mode::Live => {
                if let Err((operation, e)) = self.transfer(file, &claim, ctx) {
                    return self.fail(file, ctx, operation, Some(claim.path().to_path_buf()), e);
                }
            }
        }

        match self.config.operation {
            FileOperation::Move => bump(&stats.files_moved),
            FileOperation::Copy => bump(&stats.files_copied),
        }
        bump(&stats.files_organized);
        stats.add_bytes(file.size);

        let duplicate = kind == OutcomeKind::DuplicateHandled;
        info!(
            source = ?file.path,
            destination = ?claim.path(),
            date_source = ?date.source,
            timestamp = %date.timestamp,
            duplicate,
            "Organized file"
        );

        let mut outcome = ProcessingOutcome::new(file, kind, ctx.mode);
        outcome.destination = Some(claim.path().to_path_buf());
        outcome.bytes = file.size;
        outcome.date = Some(date);
        outcome
    }

    /// Log what a live run would do
    fn simulate(&self, file: &CandidateFile, claim: &Claim<'_>, ctx: &RunContext<'_>) {
        let verb = self.config.operation.verb();
        info!(
            "DRY-RUN: would {} {} -> {}",
            verb,
            file.path.display(),
            claim.path().display()
        );
        if self.config.operation == FileOperation::Move && self.config.create_backups {
            info!("DRY-RUN: would back up {}", file.path.display());
        }
        if let Some(thumbnail) = &file.thumbnail {
            let dest = thumbnail_destination(thumbnail, claim.path());
            info!(
                "DRY-RUN: would {} thumbnail {} -> {}",
                verb,
                thumbnail.display(),
                dest.display()
            );
        }
        debug!(mode = ?ctx.mode, "Simulated placement");
    }

    /// Create the directory and move or copy the file (and its thumbnail)
    fn transfer(
        &self,
        file: &CandidateFile,
        claim: &Claim<'_>,
        ctx: &RunContext<'_>,
    ) -> std::result::Result<(), (Operation, Error)> {
        let dest = claim.path();

        if let Some(dir) = dest.parent() {
            let created = ensure_dir(dir).map_err(|e| (Operation::DirectoryCreation, e))?;
            ctx.stats
                .directories_created
                .fetch_add(created, Ordering::Relaxed);
        }

        match self.config.operation {
            FileOperation::Move => {
                if self.config.create_backups
                    && let Err(e) = backup_file(&file.path)
                {
                    warn!(path = ?file.path, error = %e, "Backup failed, moving anyway");
                }
                move_file(&file.path, dest).map_err(|e| (Operation::MoveFile, e))?;
            }
            FileOperation::Copy => {
                copy_file(&file.path, dest).map_err(|e| (Operation::CopyFile, e))?;
            }
        }

        if let Some(thumbnail) = &file.thumbnail {
            self.transfer_thumbnail(thumbnail, dest, ctx);
        }
        Ok(())
    }

    /// Place a paired thumbnail next to its video.
    ///
    /// Failures are logged and recorded but leave the video's outcome alone.
    fn transfer_thumbnail(&self, thumbnail: &Path, video_dest: &Path, ctx: &RunContext<'_>) {
        let dest = thumbnail_destination(thumbnail, video_dest);

        let result = if fs::symlink_metadata(&dest).is_ok()
            && self.config.duplicate_handling != DuplicateStrategy::Overwrite
        {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("thumbnail destination exists: {}", dest.display()),
            )))
        } else {
            match self.config.operation {
                FileOperation::Move => move_file(thumbnail, &dest),
                FileOperation::Copy => copy_file(thumbnail, &dest).map(|_| ()),
            }
        };

        match result {
            Ok(()) => debug!(?thumbnail, destination = ?dest, "Placed thumbnail"),
            Err(e) => {
                warn!(?thumbnail, error = %e, "Failed to place thumbnail");
                ctx.stats
                    .add_error(thumbnail, Operation::ThumbnailProcessing, e.to_string());
            }
        }
    }

    fn fail(
        &self,
        file: &CandidateFile,
        ctx: &RunContext<'_>,
        operation: Operation,
        destination: Option<PathBuf>,
        err: Error,
    ) -> ProcessingOutcome {
        error!(path = ?file.path, %operation, error = %err, "Failed to process file");
        bump(&ctx.stats.files_with_errors);
        ctx.stats.add_error(&file.path, operation, err.to_string());

        let mut outcome = ProcessingOutcome::new(file, OutcomeKind::Error, ctx.mode);
        outcome.destination = destination;
        outcome.operation = Some(operation);
        outcome.error = Some(err.to_string());
        outcome
    }
}

/// `<video dest stem>.<thumbnail ext>` in the video's destination directory
fn thumbnail_destination(thumbnail: &Path, video_dest: &Path) -> PathBuf {
    match thumbnail.extension() {
        Some(ext) => video_dest.with_extension(ext),
        None => video_dest.to_path_buf(),
    }
}
