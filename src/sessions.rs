//! Session file discovery under ~/.claude/projects/.
//!
//! Claude Code stores one JSONL file per session inside a per-project
//! directory whose name is the project path flattened with `-` separators.
//! Subagent transcripts live one level deeper under `subagents/` and are
//! excluded by default.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Session transcript extension.
pub const SESSION_EXT: &str = "jsonl";

/// Directory name holding subagent transcripts inside a session directory.
pub const SUBAGENTS_DIR: &str = "subagents";

/// Files below this size are freshly-reset sessions (e.g. right after
/// /clear) with nothing worth fixing.
pub const MIN_SESSION_SIZE: u64 = 20 * 1024;

/// Root directory containing per-project session directories.
pub fn claude_projects_dir(home: &Path) -> PathBuf {
    home.join(".claude").join("projects")
}

/// Convert a filesystem path to Claude Code's project directory name.
///
/// Claude Code flattens paths by replacing both `/` and `_` with `-`, so
/// `/home/user/my_project` becomes `-home-user-my-project`. The encoding is
/// lossy (`a_b` and `a/b` collide) but must be kept as-is to match the
/// directories Claude Code actually creates.
pub fn path_to_project_dir(path: &Path) -> String {
    let encoded = path.to_string_lossy().replace(['/', '_'], "-");
    format!("-{}", encoded.trim_start_matches('-'))
}

/// A discovered session transcript.
#[derive(Debug, Clone, Serialize)]
pub struct SessionFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    /// Local mtime, pre-formatted for listings.
    pub modified_str: String,
}

/// Enumerate session files under `projects_dir`, newest first.
///
/// `project` scopes the search to a single project directory (encoded from
/// the given path). Files smaller than `min_size` are skipped (pass 0 to
/// list everything), as are subagent transcripts unless `include_subagents`.
/// Files whose metadata cannot be read are silently skipped.
pub fn find_session_files(
    projects_dir: &Path,
    project: Option<&Path>,
    min_size: u64,
    include_subagents: bool,
) -> Vec<SessionFile> {
    let search_dir = match project {
        Some(path) => projects_dir.join(path_to_project_dir(path)),
        None => projects_dir.to_path_buf(),
    };
    if !search_dir.exists() {
        debug!("Search directory does not exist: {}", search_dir.display());
        return Vec::new();
    }

    let mut paths = Vec::new();
    collect_session_files(&search_dir, include_subagents, &mut paths);

    let mut files: Vec<SessionFile> = paths
        .into_iter()
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            if min_size > 0 && meta.len() < min_size {
                return None;
            }
            let modified = meta.modified().ok()?;
            Some(SessionFile {
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

fn collect_session_files(dir: &Path, include_subagents: bool, out: &mut Vec<PathBuf>) {
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
            if !include_subagents && path.file_name().map_or(false, |n| n == SUBAGENTS_DIR) {
                continue;
            }
            collect_session_files(&path, include_subagents, out);
        } else if path.extension().map_or(false, |e| e == SESSION_EXT) {
            out.push(path);
        }
    }
}

/// Format a file mtime as local `YYYY-MM-DD HH:MM:SS`.
pub fn format_mtime(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Human-readable file size for listings.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Shorten a session path for display by folding the projects root back
/// into `~/.claude/projects`.
pub fn display_path(path: &Path, projects_dir: &Path) -> String {
    match path.strip_prefix(projects_dir) {
        Ok(rel) => format!("~/.claude/projects/{}", rel.display()),
        Err(_) => path.display().to_string(),
    }
}
