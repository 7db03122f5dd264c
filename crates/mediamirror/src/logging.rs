//! Logging initialization and log file housekeeping.
//!
//! Uses the `tracing` ecosystem for structured logging with support for
//! both human-readable and JSON output formats. Optionally each run also
//! writes a timestamped log file, and old log files are compressed and
//! eventually deleted.

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// # Arguments
///
/// * `default_level` - Filter directive used when RUST_LOG is not set,
///   e.g. `warn` or `mediamirror_core=debug`; an invalid one falls back to INFO.
/// * `json_format` - If true, outputs structured JSON logs; otherwise pretty-printed.
/// * `log_file` - Also append plain-text logs to this file.
///
/// # Notes
///
/// - Log output goes to stderr (stdout is reserved for data output)
/// - The RUST_LOG environment variable can override the log level
/// - The returned guard must be held until exit so buffered file logs are flushed
pub fn init(
    default_level: &str,
    json_format: bool,
    log_file: Option<&Path>,
) -> Option<WorkerGuard> {
    // Build the filter, respecting RUST_LOG if set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = if json_format {
        // JSON format for machine parsing
        fmt::layer().json().with_writer(io::stderr).boxed()
    } else {
        // Pretty format for humans
        fmt::layer()
            .with_target(false)
            .with_writer(io::stderr)
            .with_ansi(true)
            .boxed()
    };

    let (file_layer, guard) = match log_file.map(open_log_file) {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Warning: Failed to open log file: {e}");
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}

/// Initialize logging with configuration from Config.
///
/// This variant reads settings from the MediaMirror configuration file and
/// runs log maintenance first when it is enabled.
pub fn init_from_config(
    config: &mediamirror_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) -> Option<WorkerGuard> {
    let level = default_level(&config.logging.level, verbose_override);
    let json_format = json_logs_override || config.logging.format == "json";
    let log_dir = config.log_dir();

    let maintenance = config.logging.maintenance.then(|| {
        maintain_logs(
            &log_dir,
            config.logging.compress_after_days,
            config.logging.retention_days,
            Local::now(),
        )
    });

    let log_file = config
        .logging
        .file
        .then(|| log_dir.join(log_file_name(Local::now())));
    let guard = init(level, json_format, log_file.as_deref());

    match maintenance {
        Some(Ok(stats)) if stats.compressed + stats.deleted > 0 => tracing::info!(
            "Log maintenance in {:?}: {} compressed, {} deleted",
            log_dir,
            stats.compressed,
            stats.deleted
        ),
        Some(Err(e)) => tracing::warn!("Log maintenance in {:?} failed: {}", log_dir, e),
        _ => {}
    }
    guard
}

/// The configured level, raised to DEBUG by `--verbose` unless it is
/// already TRACE.
fn default_level(configured: &str, verbose: bool) -> &str {
    match configured.trim() {
        "" if verbose => "debug",
        "" => "info",
        "trace" => "trace",
        _ if verbose => "debug",
        level => level,
    }
}

/// Per-run log file name, e.g. `20240102_030405_mediamirror.log`.
pub fn log_file_name(now: DateTime<Local>) -> String {
    format!("{}_mediamirror.log", now.format("%Y%m%d_%H%M%S"))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::options().create(true).append(true).open(path)
}

/// What one maintenance pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MaintenanceStats {
    pub compressed: usize,
    pub deleted: usize,
}

/// Gzip `.log` files older than `compress_after_days` and delete log files
/// (compressed or not) older than `retention_days`.
///
/// Age is taken from the file's modification time; compressed files keep the
/// original's, so retention counts from when the log was last written.
pub fn maintain_logs(
    dir: &Path,
    compress_after_days: u32,
    retention_days: u32,
    now: DateTime<Local>,
) -> io::Result<MaintenanceStats> {
    let mut stats = MaintenanceStats::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_log = name.ends_with(".log");
        if !(is_log || name.ends_with(".log.gz")) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }

        let modified: DateTime<Local> = meta.modified()?.into();
        let age_days = (now - modified).num_days();
        if age_days >= i64::from(retention_days) {
            fs::remove_file(&path)?;
            stats.deleted += 1;
        } else if is_log && age_days >= i64::from(compress_after_days) {
            compress(&path)?;
            stats.compressed += 1;
        }
    }
    Ok(stats)
}

/// Replace `path` with `path.gz`, keeping its modification time.
fn compress(path: &Path) -> io::Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let modified = fs::metadata(path)?.modified()?;
    let mut source = File::open(path)?;
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    let file = encoder.finish()?;
    file.set_times(FileTimes::new().set_modified(modified))?;

    fs::remove_file(path)?;
    Ok(gz_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_default_level_follows_config() {
        assert_eq!(default_level("warn", false), "warn");
        assert_eq!(default_level("error", false), "error");
        assert_eq!(default_level("info", false), "info");
        assert_eq!(default_level("", false), "info");
    }

    #[test]
    fn test_verbose_raises_to_debug() {
        assert_eq!(default_level("warn", true), "debug");
        assert_eq!(default_level("trace", true), "trace");
        assert_eq!(default_level("", true), "debug");
    }

    #[test]
    fn test_config_level_is_a_valid_filter() {
        let config = mediamirror_core::Config::default();
        let level = default_level(&config.logging.level, false);
        assert!(EnvFilter::try_new(level).is_ok());
        assert_eq!(level, "info");
    }

    fn write_aged(dir: &Path, name: &str, now: DateTime<Local>, days: i64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("log line from {name}\n")).unwrap();
        let mtime = now - Duration::days(days);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_times(FileTimes::new().set_modified(mtime.into()))
            .unwrap();
        path
    }

    #[test]
    fn test_log_file_name() {
        let now = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(log_file_name(now), "20240102_030405_mediamirror.log");
    }

    #[test]
    fn test_maintenance_compresses_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let fresh = write_aged(dir.path(), "fresh.log", now, 1);
        let week_old = write_aged(dir.path(), "week_old.log", now, 10);
        let ancient = write_aged(dir.path(), "ancient.log", now, 200);
        let ancient_gz = write_aged(dir.path(), "ancient_gz.log.gz", now, 200);
        let other = write_aged(dir.path(), "notes.txt", now, 400);

        let stats = maintain_logs(dir.path(), 7, 180, now).unwrap();
        assert_eq!(
            stats,
            MaintenanceStats {
                compressed: 1,
                deleted: 2
            }
        );

        assert!(fresh.exists());
        assert!(!week_old.exists());
        assert!(!ancient.exists());
        assert!(!ancient_gz.exists());
        assert!(other.exists());

        let gz = dir.path().join("week_old.log.gz");
        let mut text = String::new();
        GzDecoder::new(File::open(&gz).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "log line from week_old.log\n");

        // Compressed logs keep aging from the original mtime
        let stats = maintain_logs(dir.path(), 7, 5, now).unwrap();
        assert_eq!(stats.deleted, 1);
        assert!(!gz.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_maintenance_of_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let stats = maintain_logs(&dir.path().join("logs"), 7, 180, Local::now()).unwrap();
        assert_eq!(stats, MaintenanceStats::default());
    }
}
