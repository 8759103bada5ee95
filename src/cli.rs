//! CLI argument parsing with clap

use crate::config::{Config, DuplicateStrategy, FileOperation};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Media Sorter - organize photos and videos into a date-based layout
///
/// Resolves each file's date from EXIF metadata (falling back to the
/// modification time) and moves or copies it under the target directory,
/// for example `target/2024/12/25/IMG_0001.jpg`.
#[derive(Parser, Debug)]
#[command(name = "media-sorter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory tree to organize
    #[arg(short, long, global = true)]
    pub source: Option<PathBuf>,

    /// Root of the date layout (defaults to the source directory)
    #[arg(short, long, global = true)]
    pub target: Option<PathBuf>,

    /// Date layout pattern (`YYYY/MM/DD`) or preset name (`year_month`)
    #[arg(short = 'f', long, global = true)]
    pub date_format: Option<String>,

    /// Move or copy files
    #[arg(short = 'O', long, value_enum, global = true)]
    pub operation: Option<FileOperation>,

    /// What to do when the destination already exists
    #[arg(short = 'd', long, value_enum, global = true)]
    pub duplicates: Option<DuplicateStrategy>,

    /// Also descend into directories named like 2024, 2024-12 or 2024-12-25
    #[arg(long, global = true)]
    pub no_skip_organized: bool,

    /// Copy each file to `<name>.backup` before moving it
    #[arg(long, global = true)]
    pub backup: bool,

    /// Number of worker threads (0 = auto)
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,

    /// Capacity of the queue between discovery and workers
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Stop after this many files (0 = unlimited)
    #[arg(long, global = true)]
    pub max_files: Option<usize>,

    /// JSON file that keeps resolved dates across runs
    #[arg(long, global = true)]
    pub cache_file: Option<PathBuf>,

    /// Dry run mode - show what would be done without doing it
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write the log file as JSON
    #[arg(long, global = true)]
    pub json_log: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Simulate a run over a directory without touching any file
    Scan {
        /// Directory to scan (defaults to the configured source)
        dir: Option<PathBuf>,
    },
    /// Print the resolved date of one file and where it came from
    TestExif {
        /// File to inspect
        file: PathBuf,
    },
    /// Print a commented sample configuration
    SampleConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref source) = self.source {
            config.source_dir = source.clone();
        }
        if let Some(ref target) = self.target {
            config.target_dir = Some(target.clone());
        }
        if let Some(ref date_format) = self.date_format {
            config.date_format = date_format.clone();
        }
        if let Some(operation) = self.operation {
            config.operation = operation;
        }
        if let Some(duplicates) = self.duplicates {
            config.duplicate_handling = duplicates;
        }
        if self.no_skip_organized {
            config.skip_organized = false;
        }
        if self.backup {
            config.create_backups = true;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(max_files) = self.max_files {
            config.max_files = max_files;
        }
        if let Some(ref cache_file) = self.cache_file {
            config.cache_file = Some(cache_file.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.verbose {
            config.verbose = true;
        }

        if let Some(Command::Scan { dir }) = &self.command {
            if let Some(dir) = dir {
                config.source_dir = dir.clone();
            }
            config.dry_run = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "media-sorter",
            "--source",
            "/in",
            "--target",
            "/out",
            "--operation",
            "copy",
            "--duplicates",
            "skip",
            "--no-skip-organized",
            "-j",
            "8",
            "-n",
        ])
        .unwrap();

        let base = Config {
            date_format: "YYYY-MM".into(),
            ..Config::default()
        };
        let config = cli.merge_with_config(base);
        assert_eq!(config.source_dir, Path::new("/in"));
        assert_eq!(config.target_dir.as_deref(), Some(Path::new("/out")));
        assert_eq!(config.operation, FileOperation::Copy);
        assert_eq!(config.duplicate_handling, DuplicateStrategy::Skip);
        assert_eq!(config.date_format, "YYYY-MM");
        assert_eq!(config.threads, 8);
        assert!(!config.skip_organized);
        assert!(config.dry_run);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["media-sorter", "--duplicates", "merge"]).is_err());
    }

    #[test]
    fn test_scan_forces_dry_run() {
        let cli = Cli::try_parse_from(["media-sorter", "scan", "/photos", "-v"]).unwrap();
        let config = cli.to_config();
        assert!(config.dry_run);
        assert!(config.verbose);
        assert_eq!(config.source_dir, Path::new("/photos"));
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["media-sorter", "test-exif", "a.jpg"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::TestExif {
                file: PathBuf::from("a.jpg")
            })
        );

        let cli = Cli::try_parse_from(["media-sorter", "sample-config"]).unwrap();
        assert_eq!(cli.command, Some(Command::SampleConfig { output: None }));
    }
}
