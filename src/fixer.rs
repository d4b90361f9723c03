//! Line-by-line rewrite of a session file with atomic replacement.
//!
//! The rewrite streams the JSONL file through the thinking-block filter into
//! a temp file in the same directory, fsyncs it, then renames it over the
//! original. Rename within one directory is atomic, so a crash mid-rewrite
//! leaves the original untouched and a concurrent reader never sees a
//! half-written file. Two concurrent fixes of the same file are not locked
//! against each other; the last rename wins.

use crate::backups::backup_path_for;
use crate::error::{Result, UnthinkError};
use crate::filter::{strip_thinking, Filtered};
use crate::sessions::SessionFile;
use chrono::Local;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Non-fatal degradation recorded while fixing one file.
#[derive(Debug, Clone, Serialize)]
pub enum FixWarning {
    /// The pre-fix backup copy failed; the fix proceeded without one.
    BackupFailed(String),
    /// A line was not valid JSON and was passed through verbatim.
    UnparsableLine { line: usize, message: String },
}

/// Outcome of fixing one session file.
#[derive(Debug, Default, Serialize)]
pub struct FixReport {
    /// Non-blank lines read from the source.
    pub lines_processed: usize,
    /// Thinking blocks removed across all lines.
    pub blocks_removed: usize,
    /// Backup taken before the rewrite, if any.
    pub backup_path: Option<PathBuf>,
    pub warnings: Vec<FixWarning>,
}

/// Rewrite `path` with all thinking blocks removed.
///
/// When `create_backup` is set, a timestamped copy is taken first; a failed
/// backup is downgraded to a warning and the fix proceeds. The original file
/// is only ever replaced in one atomic rename after the full rewrite
/// succeeded.
pub fn fix_session_file(path: &Path, create_backup: bool) -> Result<FixReport> {
    if !path.exists() {
        return Err(UnthinkError::FileNotFound(path.to_path_buf()));
    }

    let mut report = FixReport::default();

    if create_backup {
        let backup = backup_path_for(path, Local::now());
        match fs::copy(path, &backup) {
            Ok(_) => {
                debug!("Backup created: {}", backup.display());
                report.backup_path = Some(backup);
            }
            Err(e) => {
                warn!("Backup failed: {}", e);
                report.warnings.push(FixWarning::BackupFailed(e.to_string()));
            }
        }
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = rewrite(path, &temp_path, &mut report) {
        // rewrite renames as its very last step, so on failure the temp file
        // may still be on disk
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    debug!(
        "Fixed {}: {} line(s), {} thinking block(s) removed",
        path.display(),
        report.lines_processed,
        report.blocks_removed
    );
    Ok(report)
}

/// Temp file next to the original so the final rename stays on one
/// filesystem.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("session.jsonl");
    path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()))
}

fn rewrite(path: &Path, temp_path: &Path, report: &mut FixReport) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    let temp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;
    let mut writer = BufWriter::new(temp_file);

    for line in reader.lines() {
        let line = line?;
        let stripped = line.trim_end();
        if stripped.is_empty() {
            continue;
        }

        report.lines_processed += 1;
        match serde_json::from_str::<serde_json::Value>(stripped) {
            Ok(record) => {
                let (result, removed) = strip_thinking(record);
                report.blocks_removed += removed;
                if let Filtered::Kept(cleaned) = result {
                    // serde_json writes non-ASCII characters literally
                    serde_json::to_writer(&mut writer, &cleaned)?;
                    writer.write_all(b"\n")?;
                }
            }
            Err(e) => {
                warn!("JSON parse warning (line {}): {}", report.lines_processed, e);
                report.warnings.push(FixWarning::UnparsableLine {
                    line: report.lines_processed,
                    message: e.to_string(),
                });
                // never silently drop unparsable content
                writer.write_all(stripped.as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
    }

    writer.flush()?;
    let temp_file = writer.into_inner().map_err(|e| e.into_error())?;
    temp_file.sync_all()?;
    fs::rename(temp_path, path)?;
    Ok(())
}

/// Fix every file in order, continuing past per-file failures.
///
/// The `confirm` callback decides whether the batch runs at all (injectable
/// so callers other than the interactive CLI can drive it). Returns `None`
/// when the batch was declined, otherwise the per-file outcomes in input
/// order.
pub fn fix_all(
    files: &[SessionFile],
    create_backup: bool,
    confirm: &mut dyn FnMut(usize) -> bool,
) -> Option<Vec<(PathBuf, Result<FixReport>)>> {
    if !confirm(files.len()) {
        return None;
    }

    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let outcome = fix_session_file(&file.path, create_backup);
        outcomes.push((file.path.clone(), outcome));
    }
    Some(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::find_session_files;
    use serde_json::json;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_removes_top_level_thinking_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(
            &path,
            "{\"type\":\"thinking\",\"text\":\"secret\"}\n{\"type\":\"user\",\"text\":\"hi\"}\n",
        )
        .unwrap();

        let report = fix_session_file(&path, false).unwrap();
        assert_eq!(report.lines_processed, 2);
        assert_eq!(report.blocks_removed, 1);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert!(!fs::read_to_string(&path).unwrap().contains("secret"));
    }

    #[test]
    fn test_cleans_nested_content_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(
            &path,
            r#"{"role":"assistant","content":[{"type":"thinking","text":"x"},{"type":"text","text":"hello"}]}"#,
        )
        .unwrap();

        let report = fix_session_file(&path, false).unwrap();
        assert_eq!(report.blocks_removed, 1);

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        let record: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(
            record,
            json!({"role":"assistant","content":[{"type":"text","text":"hello"}]})
        );
    }

    #[test]
    fn test_malformed_line_passes_through_with_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(&path, "{not valid json\n{\"ok\":true}\n").unwrap();

        let report = fix_session_file(&path, false).unwrap();
        assert_eq!(report.lines_processed, 2);
        assert_eq!(report.blocks_removed, 0);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0],
            FixWarning::UnparsableLine { line: 1, .. }
        ));

        let lines = read_lines(&path);
        assert_eq!(lines[0], "{not valid json");
    }

    #[test]
    fn test_blank_lines_dropped_and_not_counted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(&path, "\n  \n{\"a\":1}\n\n").unwrap();

        let report = fix_session_file(&path, false).unwrap();
        assert_eq!(report.lines_processed, 1);
        assert_eq!(read_lines(&path), vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_clean_file_loses_no_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let records = [
            json!({"type":"user","message":{"content":"héllo ✓"}}),
            json!({"type":"assistant","message":{"content":[{"type":"text","text":"ok"}]}}),
        ];
        let mut content = String::new();
        for r in &records {
            content.push_str(&serde_json::to_string(r).unwrap());
            content.push('\n');
        }
        fs::write(&path, &content).unwrap();

        let report = fix_session_file(&path, false).unwrap();
        assert_eq!(report.blocks_removed, 0);
        assert_eq!(report.lines_processed, 2);

        let lines = read_lines(&path);
        for (line, record) in lines.iter().zip(&records) {
            assert_eq!(&serde_json::from_str::<serde_json::Value>(line).unwrap(), record);
        }
        // non-ASCII stays literal
        assert!(fs::read_to_string(&path).unwrap().contains("héllo ✓"));
    }

    #[test]
    fn test_backup_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let original = "{\"type\":\"thinking\"}\n{\"keep\":1}\n";
        fs::write(&path, original).unwrap();

        let report = fix_session_file(&path, true).unwrap();
        let backup = report.backup_path.expect("backup should be created");
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
        assert_ne!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_no_backup_when_suppressed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(&path, "{\"a\":1}\n").unwrap();

        let report = fix_session_file(&path, false).unwrap();
        assert!(report.backup_path.is_none());
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(&path, "{\"a\":1}\n").unwrap();

        fix_session_file(&path, false).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "leftover temp files: {:?}", leftovers);
    }

    #[test]
    fn test_missing_file() {
        let err = fix_session_file(Path::new("/no/such/session.jsonl"), false).unwrap_err();
        assert!(matches!(err, UnthinkError::FileNotFound(_)));
    }

    fn session_entry(path: &Path) -> SessionFile {
        SessionFile {
            path: path.to_path_buf(),
            size: 0,
            modified: SystemTime::now(),
            modified_str: String::new(),
        }
    }

    #[test]
    fn test_fix_all_declined() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let before = "{\"type\":\"thinking\"}\n";
        fs::write(&path, before).unwrap();

        let outcome = fix_all(&[session_entry(&path)], false, &mut |_| false);
        assert!(outcome.is_none());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_fix_all_continues_past_failures() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.jsonl");
        let missing = dir.path().join("missing.jsonl");
        let also_good = dir.path().join("also_good.jsonl");
        fs::write(&good, "{\"type\":\"thinking\"}\n").unwrap();
        fs::write(&also_good, "{\"keep\":1}\n").unwrap();

        let files = [
            session_entry(&good),
            session_entry(&missing),
            session_entry(&also_good),
        ];
        let mut asked_with = 0;
        let outcomes = fix_all(&files, false, &mut |count| {
            asked_with = count;
            true
        })
        .unwrap();

        assert_eq!(asked_with, 3);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].1.is_ok());
        assert!(outcomes[1].1.is_err());
        assert!(outcomes[2].1.is_ok());
    }

    #[test]
    fn test_fix_report_discoverable_after_batch() {
        // a fixed file immediately reappears in discovery with its new size
        let dir = tempdir().unwrap();
        let project = dir.path().join("-p");
        fs::create_dir_all(&project).unwrap();
        let path = project.join("s.jsonl");
        fs::write(&path, "{\"type\":\"thinking\",\"text\":\"pad pad pad\"}\n{\"keep\":1}\n").unwrap();

        fix_session_file(&path, false).unwrap();
        let files = find_session_files(dir.path(), None, 0, false);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, fs::metadata(&path).unwrap().len());
    }
}
