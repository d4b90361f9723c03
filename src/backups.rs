//! Backup discovery and restore.
//!
//! A backup is a byte-for-byte copy of a session file named
//! `{session}.jsonl.bak.{YYYYMMDD_HHMMSS}`, taken before a fix mutates the
//! original. Restore is a full overwrite of the original path; there is no
//! merging.

use crate::error::{Result, UnthinkError};
use crate::sessions::{format_mtime, SESSION_EXT};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Marker inserted between the original filename and the timestamp.
pub const BACKUP_MARKER: &str = ".bak.";

/// Timestamp suffix format, second precision.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A discovered backup file and the original path it restores to.
#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub original_path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Local mtime, pre-formatted for listings.
    pub modified_str: String,
}

/// Backup path for a session file at the given moment:
/// `session.jsonl` -> `session.jsonl.bak.20260806_143000`.
pub fn backup_path_for(path: &Path, now: DateTime<Local>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}{}{}",
        name,
        BACKUP_MARKER,
        now.format(BACKUP_TIMESTAMP_FORMAT)
    ))
}

/// Derive the original session path from a backup path by truncating the
/// filename at the backup marker and making sure the session extension is
/// present.
pub fn original_path_for(backup: &Path) -> PathBuf {
    let name = backup
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match name.split_once(BACKUP_MARKER) {
        Some((stem, _)) => stem.to_string(),
        None => name,
    };
    let original = if stem.ends_with(&format!(".{}", SESSION_EXT)) {
        stem
    } else {
        format!("{}.{}", stem, SESSION_EXT)
    };
    backup.with_file_name(original)
}

/// Enumerate backup files under `projects_dir`, newest first. Scoping rules
/// mirror session discovery.
pub fn find_backup_files(projects_dir: &Path, project: Option<&Path>) -> Vec<BackupFile> {
    let search_dir = match project {
        Some(path) => projects_dir.join(crate::sessions::path_to_project_dir(path)),
        None => projects_dir.to_path_buf(),
    };
    if !search_dir.exists() {
        return Vec::new();
    }

    let mut paths = Vec::new();
    collect_backup_files(&search_dir, &mut paths);

    let mut files: Vec<BackupFile> = paths
        .into_iter()
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            let modified = meta.modified().ok()?;
            Some(BackupFile {
                original_path: original_path_for(&path),
                modified_str: format_mtime(modified),
                size: meta.len(),
                modified,
                path,
            })
        })
        .collect();

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    files
}

fn collect_backup_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Skipping unreadable directory {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_backup_files(&path, out);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.contains(".jsonl.bak."))
        {
            out.push(path);
        }
    }
}

/// Copy a backup back onto its original session path, optionally deleting
/// the backup afterward. Returns the restored path.
pub fn restore_backup(backup: &Path, delete_backup: bool) -> Result<PathBuf> {
    if !backup.exists() {
        return Err(UnthinkError::FileNotFound(backup.to_path_buf()));
    }

    let original = original_path_for(backup);
    fs::copy(backup, &original)?;
    debug!("Restored {} from {}", original.display(), backup.display());

    if delete_backup {
        fs::remove_file(backup)?;
        debug!("Backup deleted: {}", backup.display());
    }

    Ok(original)
}
