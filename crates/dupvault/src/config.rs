use crate::error::{DupvaultError, Result};
use crate::index::hasher::DEFAULT_TIMESTAMP_EPSILON_MS;
use crate::relocate::RelocationMode;
use crate::scan::{ScanOptions, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use xdg::BaseDirectories;

const APP_NAME: &str = "dupvault";
pub const DB_ENV_VAR: &str = "DUPVAULT_DB";

pub struct Config {
    pub db_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub settings: Settings,
}

/// Contents of `dupvault.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub quarantine_root: Option<PathBuf>,
    pub ignore: Vec<String>,
    pub hash_threads: Option<usize>,
    pub batch_size: usize,
    pub timestamp_epsilon_ms: i64,
    pub relocate: bool,
    pub tolerant: bool,
    pub mode: RelocationMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quarantine_root: None,
            ignore: Vec::new(),
            hash_threads: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_epsilon_ms: DEFAULT_TIMESTAMP_EPSILON_MS,
            relocate: true,
            tolerant: true,
            mode: RelocationMode::Move,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| DupvaultError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| DupvaultError::Config(format!("Invalid settings: {}", e)))?;

        if settings.timestamp_epsilon_ms <= 0 {
            return Err(DupvaultError::Config(
                "timestamp_epsilon_ms must be positive".to_string(),
            ));
        }
        if settings.batch_size == 0 {
            return Err(DupvaultError::Config("batch_size must be positive".to_string()));
        }

        Ok(settings)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            quarantine_root: self.quarantine_root.clone(),
            relocate: self.relocate,
            mode: self.mode,
            tolerant: self.tolerant,
            threads: self.hash_threads,
            batch_size: self.batch_size,
            timestamp_epsilon: chrono::Duration::milliseconds(self.timestamp_epsilon_ms),
            ignore: self.ignore.clone(),
        }
    }
}

impl Config {
    /// Resolves the database path (`--db`, then `DUPVAULT_DB`, then the XDG data
    /// dir) and loads settings from `--config` or the XDG config dir.
    pub fn new(db_override: Option<PathBuf>, config_override: Option<PathBuf>) -> Result<Self> {
        let db_path = if let Some(path) = db_override {
            path
        } else if let Ok(env_path) = std::env::var(DB_ENV_VAR) {
            PathBuf::from(env_path)
        } else {
            let xdg = BaseDirectories::with_prefix(APP_NAME).map_err(|e| {
                DupvaultError::Config(format!("Failed to initialize XDG directories: {}", e))
            })?;
            xdg.place_data_file("dupvault.db").map_err(|e| {
                DupvaultError::Config(format!("Failed to create data directory: {}", e))
            })?
        };

        let config_path = match config_override {
            Some(path) => {
                if !path.exists() {
                    return Err(DupvaultError::FileNotFound(path));
                }
                Some(path)
            }
            None => BaseDirectories::with_prefix(APP_NAME)
                .ok()
                .and_then(|xdg| xdg.find_config_file("dupvault.toml")),
        };

        let settings = match &config_path {
            Some(path) => {
                log::debug!("Loading settings from {}", path.display());
                Settings::load(path)?
            }
            None => Settings::default(),
        };

        Ok(Self {
            db_path,
            config_path,
            settings,
        })
    }

    pub fn ensure_db_directory(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
