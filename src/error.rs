//! Error types shared across the tool.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnthinkError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Claude projects directory not found: {0}")]
    RootDirectoryMissing(PathBuf),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Invalid index: {index} (valid range: 1-{max})")]
    InvalidIndex { index: usize, max: usize },
    #[error("No session files found")]
    NoSessionsFound,
    #[error("No backup files found")]
    NoBackupsFound,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UnthinkError>;
