pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod index;
pub mod reconcile;
pub mod relocate;
pub mod scan;
pub mod util;
pub mod volume;

pub use config::{Config, Settings};
pub use db::{Database, FileRecord, FileState, HistoryRecord, SqliteDatabase, VolumeRecord};
pub use error::{DupvaultError, Result};
pub use identity::{FileIdentityResolver, IdentityProvider, NativeFileId};
#[cfg(unix)]
pub use identity::UnixIdentityProvider;
pub use index::{hash_file, verify_hash, DuplicateIndex, HashCache, Observation};
pub use reconcile::{reconcile, ReconcileStats};
pub use relocate::{relocate, Relocation, RelocationEngine, RelocationMode};
pub use scan::{
    FileOutcome, FileReport, HashSource, Relocated, ScanLock, ScanOptions, ScanOrchestrator,
    ScanSummary,
};
pub use volume::{MountInfoSource, MountedVolume, RefreshReport, VolumeCatalog, VolumeSource};
