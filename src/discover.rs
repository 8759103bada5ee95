//! Source tree discovery
//!
//! Walks the source directory once and classifies each media file into a
//! [`CandidateFile`].

use crate::config::{Config, MediaKind, normalize_extension};
use crate::stats::{Statistics, bump};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Directory names that look like an existing date layout
static DATE_DIR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn date_dir_pattern() -> &'static Regex {
    DATE_DIR_PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}(-(0[1-9]|1[0-2])(-(0[1-9]|[12]\d|3[01]))?)?$").unwrap()
    })
}

/// Whether a directory name matches `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
pub fn is_date_named(name: &str) -> bool {
    date_dir_pattern().is_match(name)
}

/// A media file found during the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub size: u64,
    pub kind: MediaKind,
    /// Lowercase, without the leading dot
    pub extension: String,
    /// Sibling thumbnail that travels with a paired video
    pub thumbnail: Option<PathBuf>,
}

/// Single-pass walker over the source tree
#[derive(Debug, Clone, Copy)]
pub struct Discovery<'a> {
    config: &'a Config,
    stats: &'a Statistics,
}

impl<'a> Discovery<'a> {
    pub fn new(config: &'a Config, stats: &'a Statistics) -> Self {
        Self { config, stats }
    }

    /// Walk the source tree.
    ///
    /// Symlinks are not followed. Date-named directories are pruned when
    /// `skip_organized` is set, excluded directories always are, and so is
    /// a target directory nested inside the source. The walk stops once
    /// `max_files` candidates have been produced.
    pub fn candidates(self) -> impl Iterator<Item = CandidateFile> + 'a {
        let limit = match self.config.max_files {
            0 => usize::MAX,
            n => n,
        };

        WalkDir::new(&self.config.source_dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| self.should_visit(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(path = ?e.path(), error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| self.classify(&entry))
            .take(limit)
    }

    /// Walk the whole tree eagerly
    pub fn discover(self) -> Vec<CandidateFile> {
        self.candidates().collect()
    }

    fn should_visit(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }

        // The root itself is always walked
        if entry.depth() > 0 {
            let path = entry.path();
            if self.is_excluded_dir(entry) {
                return false;
            }
            if self.is_nested_target(path) {
                debug!(?path, "Skipping target directory inside source");
                return false;
            }
            if self.config.skip_organized
                && let Some(name) = entry.file_name().to_str()
                && is_date_named(name)
            {
                debug!(?path, "Skipping already organized directory");
                return false;
            }
        }

        bump(&self.stats.directories_scanned);
        true
    }

    /// Check if a directory is excluded by absolute path or by folder name
    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        let path = entry.path();
        for exclude in &self.config.exclude_dirs {
            if exclude.is_absolute() {
                if path.starts_with(exclude) {
                    debug!(?path, ?exclude, "Excluding directory (absolute path match)");
                    return true;
                }
            } else if exclude.file_name() == Some(entry.file_name()) {
                debug!(?path, ?exclude, "Excluding directory (folder name match)");
                return true;
            }
        }
        false
    }

    fn is_nested_target(&self, path: &Path) -> bool {
        match &self.config.target_dir {
            Some(target) if target != &self.config.source_dir => path == target,
            _ => false,
        }
    }

    fn classify(&self, entry: &DirEntry) -> Option<CandidateFile> {
        let path = entry.path();
        let extension = normalize_extension(path.extension()?.to_str()?);

        // Thumbnails only travel with their video
        if self.config.is_thumbnail(&extension) {
            return None;
        }
        let kind = self.config.media_kind(&extension)?;

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(?path, error = %e, "Failed to read metadata, skipping");
                return None;
            }
        };

        bump(&self.stats.files_found);
        self.stats.record_file_type(&extension);

        let thumbnail = if kind == MediaKind::Video {
            bump(&self.stats.video_files_found);
            if self.config.is_paired_video(&extension) {
                self.find_thumbnail(path)
            } else {
                None
            }
        } else {
            None
        };

        Some(CandidateFile {
            path: path.to_path_buf(),
            size: metadata.len(),
            kind,
            extension,
            thumbnail,
        })
    }

    /// Sibling file with the same base name and the thumbnail extension
    fn find_thumbnail(&self, video: &Path) -> Option<PathBuf> {
        let ext = &self.config.thumbnail_extension;
        let found = [ext.clone(), ext.to_uppercase()]
            .into_iter()
            .map(|candidate| video.with_extension(candidate))
            .find(|candidate| candidate.is_file())?;

        debug!(?video, thumbnail = ?found, "Found paired thumbnail");
        bump(&self.stats.thumbnails_found);
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    fn names(files: &[CandidateFile]) -> Vec<String> {
        let mut names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_date_named_directories() {
        assert!(is_date_named("2024"));
        assert!(is_date_named("2024-12"));
        assert!(is_date_named("2024-12-25"));
        assert!(!is_date_named("2024-13"));
        assert!(!is_date_named("2024-12-32"));
        assert!(!is_date_named("holiday 2024"));
        assert!(!is_date_named("12"));
    }

    #[test]
    fn test_classifies_and_counts() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.JPG"));
        touch(&dir.path().join("sub/b.png"));
        touch(&dir.path().join("sub/c.mov"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("noext"));

        let config = Config {
            source_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let stats = Statistics::new();
        let files = Discovery::new(&config, &stats).discover();

        assert_eq!(names(&files), vec!["a.JPG", "b.png", "c.mov"]);
        let jpg = files.iter().find(|f| f.extension == "jpg").unwrap();
        assert_eq!(jpg.kind, MediaKind::Image);
        assert_eq!(jpg.size, 4);

        assert_eq!(stats.files_found.load(Ordering::Relaxed), 3);
        assert_eq!(stats.video_files_found.load(Ordering::Relaxed), 1);
        assert_eq!(stats.directories_scanned.load(Ordering::Relaxed), 2);
        assert_eq!(stats.snapshot().file_types.get("JPG"), Some(&1));
    }

    #[test]
    fn test_pairs_thumbnail_with_video() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("clip.mpg"));
        touch(&dir.path().join("clip.THM"));
        touch(&dir.path().join("other.mp4"));
        touch(&dir.path().join("other.thm"));

        let config = Config {
            source_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let stats = Statistics::new();
        let files = Discovery::new(&config, &stats).discover();

        // Thumbnails are never candidates on their own
        assert_eq!(names(&files), vec!["clip.mpg", "other.mp4"]);
        let clip = files.iter().find(|f| f.extension == "mpg").unwrap();
        assert_eq!(clip.thumbnail, Some(dir.path().join("clip.THM")));
        // mp4 is not a paired extension
        let other = files.iter().find(|f| f.extension == "mp4").unwrap();
        assert_eq!(other.thumbnail, None);
        assert_eq!(stats.thumbnails_found.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_skips_organized_directories() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("2024/12/25/done.jpg"));
        touch(&dir.path().join("2023-07/done2.jpg"));
        touch(&dir.path().join("2024-13/todo.jpg"));
        touch(&dir.path().join("inbox/todo2.jpg"));

        let mut config = Config {
            source_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let stats = Statistics::new();
        let files = Discovery::new(&config, &stats).discover();
        assert_eq!(names(&files), vec!["todo.jpg", "todo2.jpg"]);

        config.skip_organized = false;
        let files = Discovery::new(&config, &stats).discover();
        assert_eq!(files.len(), 4);
    }

    #[test]
    fn test_date_named_root_is_walked() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("2024");
        touch(&root.join("a.jpg"));

        let config = Config {
            source_dir: root,
            ..Config::default()
        };
        let stats = Statistics::new();
        assert_eq!(Discovery::new(&config, &stats).discover().len(), 1);
    }

    #[test]
    fn test_excluded_and_nested_target_dirs() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("@eaDir/thumb.jpg"));
        touch(&dir.path().join("private/secret.jpg"));
        touch(&dir.path().join("sorted/2020/x.jpg"));
        touch(&dir.path().join("keep/photo.jpg"));

        let config = Config {
            source_dir: dir.path().to_path_buf(),
            target_dir: Some(dir.path().join("sorted")),
            exclude_dirs: vec![PathBuf::from("@eaDir"), dir.path().join("private")],
            skip_organized: false,
            ..Config::default()
        };
        let stats = Statistics::new();
        let files = Discovery::new(&config, &stats).discover();
        assert_eq!(names(&files), vec!["photo.jpg"]);
    }

    #[test]
    fn test_max_files_stops_early() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            touch(&dir.path().join(format!("{}.jpg", i)));
        }

        let config = Config {
            source_dir: dir.path().to_path_buf(),
            max_files: 3,
            ..Config::default()
        };
        let stats = Statistics::new();
        let files = Discovery::new(&config, &stats).discover();
        assert_eq!(files.len(), 3);
        assert_eq!(stats.files_found.load(Ordering::Relaxed), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let outside = tempdir().unwrap();
        touch(&outside.path().join("linked.jpg"));

        let dir = tempdir().unwrap();
        touch(&dir.path().join("real.jpg"));
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("linked.jpg"),
            dir.path().join("alias.jpg"),
        )
        .unwrap();

        let config = Config {
            source_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let stats = Statistics::new();
        let files = Discovery::new(&config, &stats).discover();
        assert_eq!(names(&files), vec!["real.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_entries_do_not_stop_the_walk() {
        use std::os::unix::fs::{PermissionsExt, symlink};

        let dir = tempdir().unwrap();
        touch(&dir.path().join("a/real.jpg"));
        touch(&dir.path().join("z/next.jpg"));
        symlink(dir.path().join("gone.jpg"), dir.path().join("broken.jpg")).unwrap();
        symlink(dir.path().join("gone"), dir.path().join("broken-dir")).unwrap();
        let locked = dir.path().join("m/locked");
        touch(&locked.join("hidden.jpg"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let config = Config {
            source_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let stats = Statistics::new();
        let found = names(&Discovery::new(&config, &stats).discover());

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // `hidden.jpg` is only readable when running with elevated rights
        assert!(found.contains(&"real.jpg".to_string()));
        assert!(found.contains(&"next.jpg".to_string()));
        assert!(!found.contains(&"broken.jpg".to_string()));
    }
}
