//! History export discovery and loading.
//!
//! Reads audit-trail rows exported as JSON Lines (one row object per line) or
//! as a JSON array, and hands them to the normaliser untouched. Only this
//! module performs I/O; everything downstream works on the loaded snapshot.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use audit_core::error::{AuditError, Result};
use audit_core::models::RawEventRow;
use tracing::{debug, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.jsonl` / `.json` files recursively under `data_path`, sorted by path.
///
/// A path pointing at a single file yields just that file.
pub fn find_history_files(data_path: &Path) -> Vec<PathBuf> {
    if data_path.is_file() {
        return vec![data_path.to_path_buf()];
    }
    if !data_path.is_dir() {
        warn!("history path {} is not a directory", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file() && is_history_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort_unstable();
    files
}

/// Load every raw row under `data_path`, in file then line order.
///
/// Malformed lines are skipped; unreadable files are logged and skipped.
/// Fails only when `data_path` itself does not exist.
pub fn load_raw_rows(data_path: &Path) -> Result<Vec<RawEventRow>> {
    if !data_path.exists() {
        return Err(AuditError::DataPathNotFound(data_path.to_path_buf()));
    }

    let files = find_history_files(data_path);
    if files.is_empty() {
        warn!("No history files found in {}", data_path.display());
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    for file_path in &files {
        match read_file(file_path) {
            Ok(file_rows) => rows.extend(file_rows),
            Err(e) => warn!("skipping {}: {}", file_path.display(), e),
        }
    }

    debug!("Loaded {} rows from {} files", rows.len(), files.len());
    Ok(rows)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn is_history_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "jsonl" || ext == "json")
}

/// Read one file; `.json` files hold an array, anything else is JSON Lines.
fn read_file(file_path: &Path) -> Result<Vec<RawEventRow>> {
    let file = std::fs::File::open(file_path).map_err(|source| AuditError::FileRead {
        path: file_path.to_path_buf(),
        source,
    })?;

    if file_path.extension().is_some_and(|e| e == "json") {
        let rows: Vec<RawEventRow> = serde_json::from_reader(std::io::BufReader::new(file))?;
        return Ok(rows);
    }

    let mut rows = Vec::new();
    let mut skipped = 0u64;
    let lines = std::io::BufReader::new(file).lines().map_while(|l| l.ok());
    for (line_no, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEventRow>(line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                debug!("{}:{}: skipping row: {}", file_path.display(), line_no + 1, e);
            }
        }
    }

    debug!(
        "{}: {} rows, {} skipped",
        file_path.display(),
        rows.len(),
        skipped
    );
    Ok(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
