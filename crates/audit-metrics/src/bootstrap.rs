use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use audit_core::data_processors::TimestampProcessor;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Application directory, `~/.audit-metrics/`.
pub fn app_dir() -> PathBuf {
    app_dir_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
}

fn app_dir_in(home: &Path) -> PathBuf {
    home.join(".audit-metrics")
}

/// Ensure `~/.audit-metrics/` and its `logs/` and `data/` subdirectories exist.
pub fn ensure_directories() -> anyhow::Result<()> {
    ensure_directories_in(&app_dir())
}

fn ensure_directories_in(base: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(base.join("logs"))?;
    std::fs::create_dir_all(base.join("data"))?;
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `DEBUG/INFO/WARNING/ERROR/CRITICAL` level to a filter directive.
///
/// Unknown names pass through so `RUST_LOG`-style directives still work.
pub fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr, or is appended to `log_file` when given. Stdout is
/// left for the JSON report.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()?;
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}

// ── Inputs ─────────────────────────────────────────────────────────────────────

/// `--data-path` when given, else `~/.audit-metrics/data/` if it exists.
pub fn resolve_data_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.clone());
    }
    let default = app_dir().join("data");
    default.exists().then_some(default)
}

/// Reference instant: `--now` parsed in the report timezone, else the clock.
pub fn reference_time(raw: Option<&str>, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    match raw {
        Some(value) => TimestampProcessor::new(tz)
            .parse_required(value)
            .context("invalid --now value"),
        None => Ok(Utc::now()),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directories_in() {
        let tmp = TempDir::new().expect("tempdir");
        let base = app_dir_in(tmp.path());
        ensure_directories_in(&base).expect("directories created");

        assert!(base.join("logs").is_dir());
        assert!(base.join("data").is_dir());
        // second run is a no-op
        ensure_directories_in(&base).expect("idempotent");
    }

    #[test]
    fn test_filter_directive_maps_levels() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("CRITICAL"), "error");
        assert_eq!(filter_directive("audit_data=trace"), "audit_data=trace");
    }

    #[test]
    fn test_resolve_data_path_prefers_explicit() {
        let explicit = PathBuf::from("/srv/exports");
        assert_eq!(resolve_data_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_reference_time_parses_in_report_timezone() {
        let tz: Tz = "Europe/Brussels".parse().unwrap();
        let now = reference_time(Some("2024-01-17 19:00:00"), tz).unwrap();
        assert_eq!(now, Utc.with_ymd_and_hms(2024, 1, 17, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_reference_time_rejects_garbage() {
        let err = reference_time(Some("yesterday-ish"), Tz::UTC).unwrap_err();
        assert!(err.to_string().contains("invalid --now value"));
    }

    #[test]
    fn test_reference_time_defaults_to_clock() {
        let before = Utc::now();
        let now = reference_time(None, Tz::UTC).unwrap();
        assert!(now >= before);
    }
}
