//! # unthink-rs
//!
//! Repairs Claude Code sessions wedged by "API Error 400 - Invalid signature
//! in thinking block" by removing the corrupted thinking blocks from the
//! session transcript, so the session can be resumed.
//!
//! ```text
//! unthink-rs              # fix the latest session file
//! unthink-rs --cwd .      # fix the latest session for the current project
//! unthink-rs --list       # list all session files
//! unthink-rs --file /path/to/session.jsonl
//! unthink-rs --all        # fix every session file (asks first)
//! unthink-rs --no-backup  # fix without creating a backup
//!
//! unthink-rs --list-backups
//! unthink-rs --restore              # restore the latest backup
//! unthink-rs --restore --index 2    # restore a backup by listing index
//! unthink-rs --restore --delete     # restore, then delete the backup
//! ```
//!
//! Reference: https://github.com/anthropics/claude-code/issues/10199

mod backups;
mod error;
mod filter;
mod fixer;
mod sessions;

use clap::Parser;
use error::{Result, UnthinkError};
use fixer::FixReport;
use sessions::{SessionFile, MIN_SESSION_SIZE};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "unthink-rs",
    version,
    about = "Removes corrupted thinking blocks from Claude Code session files"
)]
struct Args {
    /// List all session files
    #[arg(short, long)]
    list: bool,

    /// Fix a specific session file
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Fix all session files
    #[arg(short, long)]
    all: bool,

    /// Don't create backup files
    #[arg(long)]
    no_backup: bool,

    /// Fix or restore the entry at this 1-based listing index
    #[arg(short, long, value_name = "N")]
    index: Option<usize>,

    /// Only consider sessions for one project directory ('.' for the
    /// current directory)
    #[arg(short, long, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Include subagent session files
    #[arg(long)]
    include_subagents: bool,

    /// List all backup files
    #[arg(long)]
    list_backups: bool,

    /// Restore a session file from backup
    #[arg(short, long)]
    restore: bool,

    /// Delete the backup after restoring (use with --restore)
    #[arg(short, long)]
    delete: bool,

    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long)]
    yes: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("unthink_rs=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let home = dirs::home_dir().ok_or(UnthinkError::HomeDirUnavailable)?;
    let projects_dir = sessions::claude_projects_dir(&home);

    let project = match &args.cwd {
        Some(path) if path.as_os_str() == "." => Some(std::env::current_dir()?),
        Some(path) => Some(fs::canonicalize(path).unwrap_or_else(|_| path.clone())),
        None => None,
    };
    if let Some(project) = &project {
        println!("Project filter: {}", project.display());
    }
    println!("Claude projects directory: {}\n", projects_dir.display());

    if !projects_dir.exists() {
        return Err(UnthinkError::RootDirectoryMissing(projects_dir));
    }

    if args.list_backups {
        print_backups(
            &backups::find_backup_files(&projects_dir, project.as_deref()),
            &projects_dir,
        );
        return Ok(());
    }

    if args.restore {
        return restore(&args, &projects_dir, project.as_deref());
    }

    if args.list {
        let all = sessions::find_session_files(
            &projects_dir,
            project.as_deref(),
            0,
            args.include_subagents,
        );
        print_sessions(&all, &projects_dir);
        return Ok(());
    }

    if let Some(path) = &args.file {
        let report = fixer::fix_session_file(path, !args.no_backup)?;
        print_report(path, &report);
        return Ok(());
    }

    let session_files = sessions::find_session_files(
        &projects_dir,
        project.as_deref(),
        MIN_SESSION_SIZE,
        args.include_subagents,
    );

    if let Some(index) = args.index {
        let chosen = &session_files[checked_index(index, session_files.len())?];
        let report = fixer::fix_session_file(&chosen.path, !args.no_backup)?;
        print_report(&chosen.path, &report);
        return Ok(());
    }

    if args.all {
        return fix_all_interactive(&args, &session_files);
    }

    fix_latest(&args, &projects_dir, project.as_deref(), &session_files)
}

/// Default mode: fix the single most recent session file.
fn fix_latest(
    args: &Args,
    projects_dir: &Path,
    project: Option<&Path>,
    session_files: &[SessionFile],
) -> Result<()> {
    let Some(latest) = session_files.first() else {
        let all =
            sessions::find_session_files(projects_dir, project, 0, args.include_subagents);
        if !all.is_empty() {
            println!(
                "Skipped {} session file(s) smaller than {} KB",
                all.len(),
                MIN_SESSION_SIZE / 1024
            );
            println!("Use --list to see all files, or --file to fix a specific file");
        }
        return Err(UnthinkError::NoSessionsFound);
    };

    println!("Fixing latest session file:");
    println!("   Path: {}", latest.path.display());
    println!("   Size: {}", sessions::format_size(latest.size));
    println!("   Modified: {}\n", latest.modified_str);

    let report = fixer::fix_session_file(&latest.path, !args.no_backup)?;
    print_report(&latest.path, &report);

    println!("\nTip: restart Claude Code and run /resume to continue the conversation");
    Ok(())
}

/// `--all`: fix every discovered session after an interactive confirmation,
/// continuing past per-file failures.
fn fix_all_interactive(args: &Args, session_files: &[SessionFile]) -> Result<()> {
    if session_files.is_empty() {
        println!("No session files found");
        return Ok(());
    }

    let mut confirm = |count: usize| {
        if args.yes {
            return true;
        }
        println!("About to fix {} session file(s).", count);
        if args.no_backup {
            println!("This will modify all session files without backups.");
        } else {
            println!("This will modify all session files and create backups.");
        }
        prompt_yes_no("\nProceed? [y/N]: ")
    };

    match fixer::fix_all(session_files, !args.no_backup, &mut confirm) {
        None => {
            // user abort is a clean exit
            println!("Aborted.");
            Ok(())
        }
        Some(outcomes) => {
            let mut fixed = 0;
            for (path, outcome) in &outcomes {
                match outcome {
                    Ok(report) => {
                        fixed += 1;
                        print_report(path, report);
                    }
                    Err(e) => println!("Fix failed for {}: {}", path.display(), e),
                }
                println!();
            }
            println!("Done: {}/{} file(s) fixed successfully", fixed, outcomes.len());
            Ok(())
        }
    }
}

/// `--restore`: copy the chosen (or latest) backup back over its original.
fn restore(args: &Args, projects_dir: &Path, project: Option<&Path>) -> Result<()> {
    let backup_files = backups::find_backup_files(projects_dir, project);
    if backup_files.is_empty() {
        return Err(UnthinkError::NoBackupsFound);
    }

    let chosen = match args.index {
        Some(index) => &backup_files[checked_index(index, backup_files.len())?],
        None => {
            println!("Restoring latest backup:");
            println!("   Backup: {}", backup_files[0].path.display());
            println!("   Created: {}\n", backup_files[0].modified_str);
            &backup_files[0]
        }
    };

    let restored = backups::restore_backup(&chosen.path, args.delete)?;
    println!("Restored: {}", restored.display());
    println!("   From backup: {}", chosen.path.display());
    if args.delete {
        println!("   Backup deleted");
    }
    Ok(())
}

fn checked_index(index: usize, len: usize) -> Result<usize> {
    if index < 1 || index > len {
        return Err(UnthinkError::InvalidIndex { index, max: len });
    }
    Ok(index - 1)
}

fn prompt_yes_no(prompt: &str) -> bool {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut answer = String::new();
    match io::stdin().read_line(&mut answer) {
        // EOF or a read error counts as "no"
        Ok(0) | Err(_) => {
            println!();
            false
        }
        Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
    }
}

fn print_report(path: &Path, report: &FixReport) {
    if let Some(backup) = &report.backup_path {
        println!("Backup created: {}", backup.display());
    }
    println!("Fixed: {}", path.display());
    println!("   Lines processed: {}", report.lines_processed);
    println!("   Thinking blocks removed: {}", report.blocks_removed);
}

fn print_sessions(files: &[SessionFile], projects_dir: &Path) {
    if files.is_empty() {
        println!("No session files found");
        return;
    }

    println!("\nFound {} session file(s):\n", files.len());
    println!("{:<4} {:>10} {:<20} Path", "#", "Size", "Modified");
    println!("{}", "-".repeat(80));

    for (i, f) in files.iter().enumerate() {
        // mark small files the default fix mode would skip
        let skip_mark = if f.size < MIN_SESSION_SIZE { " (skipped)" } else { "" };
        println!(
            "{:<4} {:>10} {:<20} {}{}",
            i + 1,
            sessions::format_size(f.size),
            f.modified_str,
            sessions::display_path(&f.path, projects_dir),
            skip_mark
        );
    }
}

fn print_backups(files: &[backups::BackupFile], projects_dir: &Path) {
    if files.is_empty() {
        println!("No backup files found");
        return;
    }

    println!("\nFound {} backup file(s):\n", files.len());
    println!("{:<4} {:>10} {:<20} Path", "#", "Size", "Created");
    println!("{}", "-".repeat(100));

    for (i, f) in files.iter().enumerate() {
        println!(
            "{:<4} {:>10} {:<20} {}",
            i + 1,
            sessions::format_size(f.size),
            f.modified_str,
            sessions::display_path(&f.path, projects_dir)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_index() {
        assert_eq!(checked_index(1, 3).unwrap(), 0);
        assert_eq!(checked_index(3, 3).unwrap(), 2);
        assert!(matches!(
            checked_index(0, 3),
            Err(UnthinkError::InvalidIndex { index: 0, max: 3 })
        ));
        assert!(matches!(
            checked_index(4, 3),
            Err(UnthinkError::InvalidIndex { index: 4, max: 3 })
        ));
        assert!(checked_index(1, 0).is_err());
    }
}
