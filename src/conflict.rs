//! Destination conflict resolution
//!
//! Workers share one [`Occupancy`] table of destinations that are being
//! written. Reserving a path and checking it on disk happen in that order,
//! so two workers can never both decide the same destination is free.

use crate::config::DuplicateStrategy;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::debug;

/// Highest `_N` suffix tried before giving up
pub const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Destinations reserved by in-flight workers
#[derive(Debug, Default)]
pub struct Occupancy {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
    waiting: AtomicUsize,
    sticky: bool,
}

impl Occupancy {
    /// Reservations are released when their [`Claim`] drops
    pub fn new() -> Self {
        Self::default()
    }

    /// Reservations are kept for the whole run.
    ///
    /// Used by simulated runs: nothing reaches the disk, so later files must
    /// still see the destinations earlier files would have taken.
    pub fn sticky() -> Self {
        Self {
            sticky: true,
            ..Self::default()
        }
    }

    /// Reserve a path unless someone else holds it
    pub fn try_claim(&self, path: &Path) -> Option<Claim<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.insert(path.to_path_buf()) {
            Some(Claim::new(self, path))
        } else {
            None
        }
    }

    /// Reserve a path, waiting for its current holder to finish.
    ///
    /// In sticky mode holders never finish, so the claim is shared instead.
    pub fn claim(&self, path: &Path) -> Claim<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.sticky && held.contains(path) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            while held.contains(path) {
                held = self
                    .released
                    .wait(held)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        held.insert(path.to_path_buf());
        Claim::new(self, path)
    }

    /// Blocking claims currently waiting for a holder to finish
    #[cfg(test)]
    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn is_held(&self, path: &Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    fn release(&self, path: &Path) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        self.released.notify_all();
    }
}

/// A reserved destination; released on drop unless the table is sticky
#[derive(Debug)]
pub struct Claim<'a> {
    occupancy: &'a Occupancy,
    path: PathBuf,
}

impl<'a> Claim<'a> {
    fn new(occupancy: &'a Occupancy, path: &Path) -> Self {
        Self {
            occupancy,
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.occupancy.sticky {
            self.occupancy.release(&self.path);
        }
    }
}

/// Outcome of checking a planned destination
#[derive(Debug)]
pub enum Resolution<'a> {
    /// Destination was free and is now reserved
    Free(Claim<'a>),
    /// Destination is occupied and the strategy is to leave it alone
    Skip,
    /// Destination is occupied and will be replaced
    Overwrite(Claim<'a>),
    /// Destination is occupied; the file goes to a suffixed name instead
    Renamed(Claim<'a>),
}

/// Whether anything (including a dangling symlink) sits at `path`
fn exists_on_disk(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Decide where a file planned for `planned` actually goes.
///
/// A destination reserved by another worker counts as occupied even if it
/// is not on disk yet.
pub fn resolve_conflict<'a>(
    planned: &Path,
    strategy: DuplicateStrategy,
    occupancy: &'a Occupancy,
) -> Result<Resolution<'a>> {
    let claim = match occupancy.try_claim(planned) {
        Some(claim) if !exists_on_disk(planned) => return Ok(Resolution::Free(claim)),
        other => other,
    };

    debug!(?planned, ?strategy, "Destination already occupied");
    match strategy {
        DuplicateStrategy::Skip => Ok(Resolution::Skip),
        DuplicateStrategy::Overwrite => {
            let claim = claim.unwrap_or_else(|| occupancy.claim(planned));
            Ok(Resolution::Overwrite(claim))
        }
        DuplicateStrategy::Rename => {
            drop(claim);
            unique_name(planned, occupancy).map(Resolution::Renamed)
        }
    }
}

/// Reserve the first free `name_N.ext` next to `path`, starting at 1
pub fn unique_name<'a>(path: &Path, occupancy: &'a Occupancy) -> Result<Claim<'a>> {
    unique_name_within(path, occupancy, MAX_RENAME_ATTEMPTS)
}

fn unique_name_within<'a>(path: &Path, occupancy: &'a Occupancy, attempts: u32) -> Result<Claim<'a>> {
    let stem = path.file_stem().ok_or_else(|| Error::InvalidFileName {
        path: path.to_path_buf(),
    })?;
    let extension = path.extension();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1..=attempts {
        let mut name = OsString::from(stem);
        name.push(format!("_{}", i));
        if let Some(ext) = extension {
            name.push(".");
            name.push(ext);
        }

        let candidate = parent.join(name);
        if let Some(claim) = occupancy.try_claim(&candidate)
            && !exists_on_disk(&candidate)
        {
            debug!(original = ?path, renamed = ?candidate, "Resolved name conflict");
            return Ok(claim);
        }
    }

    Err(Error::RenameExhausted {
        path: path.to_path_buf(),
        attempts,
    })
}
