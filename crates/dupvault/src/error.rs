use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DupvaultError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Volume not found: {0}")]
    VolumeNotFound(String),

    #[error("No mounted volume contains root {0}")]
    NoVolumeForRoot(PathBuf),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Native identity lookup failed for {path}: {message}")]
    NativeIdentity { path: PathBuf, message: String },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("{path} differs only in letter case from the stored file {existing}")]
    CaseConflict { path: PathBuf, existing: String },

    #[error("Relocation target already occupied: {0}")]
    TargetOccupied(PathBuf),

    #[error("Relocation failed for {path}: {message}")]
    RelocationFailed { path: PathBuf, message: String },

    #[error("Another scan holds the lock {0}")]
    ScanInProgress(PathBuf),

    #[error("Scan cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DupvaultError>;
