//! Media Sorter - organize photos and videos by date
//!
//! A CLI tool that resolves each media file's date from EXIF metadata or
//! its modification time and places it into a date-based directory layout.

use anyhow::{Context, Result};
use clap::Parser;
use media_sorter::cli::Command;
use media_sorter::process::{Mode, OutcomeKind, RunReport};
use media_sorter::stats::format_bytes;
use media_sorter::time::{DateResolver, MetadataCache};
use media_sorter::{Cli, Config, Organizer, Statistics};
use std::path::Path;
use tracing::{Level, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

// CLI Output Module
mod cli_output {
    //! Colored terminal output for summaries

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    /// CLI theme colors
    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(format!("{}\n", "─".repeat(60))));
    }

    /// Print a centered title
    pub fn print_title(title: &str) {
        let width: usize = 60;
        let padding = width.saturating_sub(title.len()) / 2;
        let left_pad = " ".repeat(padding.saturating_sub(1));

        let _ = stdout().execute(Print(format!(
            "{}{} {} {}\n",
            left_pad,
            "╔".bold(),
            title.bold(),
            "╗".bold(),
        )));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_hint(msg: &str) {
        let _ = stdout().execute(Print(style("→ ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    /// Print a statistic line
    pub fn print_stat(key: &str, value: &str, color: Color) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(key).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(style(value).with(color).bold()));
        let _ = stdout().execute(Print("\n"));
    }

    /// Print one processed file
    pub fn print_result(status_icon: &str, status_color: Color, source: &str, dest_or_msg: &str) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(status_icon).with(status_color).bold()));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(style(source).italic()));
        let _ = stdout().execute(Print(" "));
        let _ = stdout().execute(Print(style(dest_or_msg).with(CliTheme::HINT)));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::SampleConfig { output }) = &cli.command {
        return write_sample_config(output.as_deref());
    }

    let _guard = setup_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Media Sorter starting");

    let config = load_config(&cli)?;
    if cli.verbose {
        info!(?config, "Configuration loaded");
    }

    match &cli.command {
        Some(Command::TestExif { file }) => test_exif(&config, file),
        _ => run_organizer(&cli, config),
    }
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        let resolved_path = if config_path.exists() || config_path.extension().is_some() {
            config_path.clone()
        } else {
            config_path.with_extension("toml")
        };
        info!(config_file = %resolved_path.display(), "Loading configuration from file");
        let file_config = Config::load_from_file(&resolved_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    Ok(config)
}

/// Setup logging: stderr always, plus an optional file layer
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_layer, guard) = match &cli.log_file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(log_path)
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);

            let layer = if cli.json_log {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .boxed()
            } else {
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn write_sample_config(output: Option<&Path>) -> Result<()> {
    let sample = Config::sample_config();
    match output {
        Some(path) => {
            std::fs::write(path, sample)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Sample configuration written to {}", path.display());
        }
        None => print!("{}", sample),
    }
    Ok(())
}

/// Resolve and print the date of a single file
fn test_exif(config: &Config, file: &Path) -> Result<()> {
    use cli_output::*;

    let mut config = config.clone();
    config.normalize();
    let cache = MetadataCache::new(1);
    let stats = Statistics::new();
    let resolver = DateResolver::new(&cache, &stats, &config.video_extensions);

    print_separator();
    print_stat("File", &file.display().to_string(), CliTheme::ACCENT);
    match resolver.resolve(file) {
        Ok(resolved) => {
            print_stat(
                "Date",
                &resolved.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                CliTheme::SUCCESS,
            );
            print_stat("Source", resolved.source.describe(), CliTheme::SUCCESS);
        }
        Err(e) => print_error(&format!("No usable date: {}", e)),
    }
    print_separator();
    Ok(())
}

/// Validate, run and print the summary
fn run_organizer(cli: &Cli, config: Config) -> Result<()> {
    let organizer = Organizer::new(config).context("Invalid configuration")?;
    let report = organizer.organize()?;
    print_report(&report, cli.verbose);
    // Per-file errors are reported in the summary, not through the exit code
    Ok(())
}

fn print_report(report: &RunReport, verbose: bool) {
    use cli_output::*;

    let s = &report.statistics;
    let m = &s.metrics;
    print_separator();
    print_title(match report.mode {
        Mode::Live => "Organizing Complete",
        Mode::Simulate => "Dry Run Complete",
    });
    print_separator();

    print_blank();
    print_stat("Found", &s.files_found.to_string(), CliTheme::ACCENT);
    print_stat("Processed", &s.files_processed.to_string(), CliTheme::ACCENT);
    print_stat("Organized", &s.files_organized.to_string(), CliTheme::SUCCESS);
    print_stat("Moved", &s.files_moved.to_string(), CliTheme::SUCCESS);
    print_stat("Copied", &s.files_copied.to_string(), CliTheme::SUCCESS);
    print_stat("Skipped", &s.files_skipped.to_string(), CliTheme::WARNING);
    print_stat(
        "Duplicates",
        &format!(
            "{} (renamed {}, skipped {}, replaced {})",
            s.duplicates_found, s.duplicates_renamed, s.duplicates_skipped, s.duplicates_replaced
        ),
        CliTheme::ACCENT,
    );
    print_stat("Without dates", &s.files_without_dates.to_string(), CliTheme::WARNING);
    print_stat("Errors", &s.files_with_errors.to_string(), CliTheme::ERROR);
    print_blank();
    print_stat("Bytes", &format_bytes(s.bytes_processed), CliTheme::ACCENT);
    print_stat("Duration", &format!("{:.2?}", m.duration), CliTheme::ACCENT);
    print_stat("Files/second", &format!("{:.2}", m.files_per_second), CliTheme::ACCENT);
    print_stat(
        "Cache hit rate",
        &format!("{:.1}%", m.cache_hit_rate * 100.0),
        CliTheme::ACCENT,
    );
    print_blank();

    if verbose {
        print_separator();
        print_hint("Detailed results");
        print_blank();
        for outcome in &report.outcomes {
            let source = outcome.source.display().to_string();
            let dest = outcome
                .destination
                .as_ref()
                .map(|p| format!("→ {}", p.display()))
                .unwrap_or_default();
            match outcome.kind {
                OutcomeKind::Organized => print_result("✓", CliTheme::SUCCESS, &source, &dest),
                OutcomeKind::DuplicateHandled => print_result("≡", CliTheme::ACCENT, &source, &dest),
                OutcomeKind::Skipped => print_result(
                    "⊘",
                    CliTheme::WARNING,
                    &source,
                    outcome.reason.as_deref().unwrap_or("skipped"),
                ),
                OutcomeKind::NoDate | OutcomeKind::Error => print_result(
                    "✗",
                    CliTheme::ERROR,
                    &source,
                    outcome.error.as_deref().unwrap_or("unknown error"),
                ),
            }
        }
        print_blank();
        for line in s.file_type_breakdown().lines() {
            print_hint(line);
        }
    }

    if s.errors_total > 0 {
        print_separator();
        print_error(&format!("{} errors recorded", s.errors_total));
        for line in s.error_summary().lines().skip(1) {
            print_hint(line.trim_start());
        }
    }

    if report.mode == Mode::Simulate {
        print_separator();
        print_warning("Dry run: no files were moved, copied or created");
    }
    print_separator();
}
