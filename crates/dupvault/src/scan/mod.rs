pub mod lock;

pub use lock::ScanLock;

use crate::db::{Database, FileRecord, FileState};
use crate::error::{DupvaultError, Result};
use crate::identity::{FileIdentityResolver, IdentityProvider};
use crate::index::{
    build_ignore_set, enumerate_files, verify_hash, DuplicateIndex, EnumerateOptions, HashCache,
    Observation,
};
use crate::reconcile::{reconcile, ReconcileStats};
use crate::relocate::{RelocationEngine, RelocationMode};
use crate::volume::VolumeCatalog;
use chrono::{Duration, Local};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_BATCH_SIZE: usize = 256;

const RELOCATED_PREFIX: &str = "relocated to ";
const COPIED_PREFIX: &str = "copied to ";

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Where duplicates go. `None` puts duplicates of root `R` in `"R <timestamp>"`.
    pub quarantine_root: Option<PathBuf>,
    pub relocate: bool,
    pub mode: RelocationMode,
    /// Keep going past per-file faults. When false the pass stops at the first
    /// fault and reconciliation is skipped.
    pub tolerant: bool,
    /// Hashing threads; `None` uses one per CPU.
    pub threads: Option<usize>,
    pub batch_size: usize,
    pub timestamp_epsilon: Duration,
    pub ignore: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            quarantine_root: None,
            relocate: true,
            mode: RelocationMode::Move,
            tolerant: true,
            threads: None,
            batch_size: DEFAULT_BATCH_SIZE,
            timestamp_epsilon: Duration::milliseconds(
                crate::index::hasher::DEFAULT_TIMESTAMP_EPSILON_MS,
            ),
            ignore: Vec::new(),
        }
    }
}

/// How a file's content hash was obtained in this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashSource {
    Computed,
    Cached,
    /// Taken over from the record of the same file under its previous name.
    Renamed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Relocated {
    NotRequested,
    Moved(PathBuf),
    Copied(PathBuf),
    /// A copy made by an earlier pass is still in place.
    AlreadyCopied(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Kept {
        source: HashSource,
    },
    Duplicate {
        source: HashSource,
        canonical: String,
        relocation: Relocated,
    },
    Faulted {
        cause: String,
    },
}

#[derive(Debug, Clone)]
pub struct FileReport {
    /// 1-based position in the pass.
    pub position: usize,
    pub total: usize,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub outcome: FileOutcome,
}

#[derive(Debug, Default, Clone)]
pub struct ScanSummary {
    pub files_seen: usize,
    pub hashed: usize,
    pub bytes_hashed: u64,
    pub cached: usize,
    pub renamed: usize,
    pub duplicates: usize,
    /// Distinct contents seen by a scan pass; zero for clean passes.
    pub unique_hashes: usize,
    pub relocated: usize,
    pub relocation_failed: usize,
    pub faulted: usize,
    pub walk_errors: usize,
    pub archived: usize,
    pub volumes: Vec<String>,
    pub quarantine_roots: Vec<PathBuf>,
    pub reconcile: Option<ReconcileStats>,
    pub cancelled: bool,
    pub stopped_early: bool,
}

impl ScanSummary {
    fn record(&mut self, report: &FileReport) {
        self.files_seen += 1;

        let source = match &report.outcome {
            FileOutcome::Kept { source } => *source,
            FileOutcome::Duplicate {
                source, relocation, ..
            } => {
                self.duplicates += 1;
                match relocation {
                    Relocated::Moved(_) | Relocated::Copied(_) => self.relocated += 1,
                    Relocated::Failed(_) => self.relocation_failed += 1,
                    Relocated::NotRequested | Relocated::AlreadyCopied(_) => {}
                }
                *source
            }
            FileOutcome::Faulted { .. } => {
                self.faulted += 1;
                return;
            }
        };

        match source {
            HashSource::Computed => {
                self.hashed += 1;
                self.bytes_hashed += report.size_bytes;
            }
            HashSource::Cached => self.cached += 1,
            HashSource::Renamed => self.renamed += 1,
        }
    }
}

/// A resolved file waiting for its hash.
struct Pending {
    path: PathBuf,
    record: FileRecord,
    source: HashSource,
    previous_copy: Option<PathBuf>,
}

enum Decision {
    Scan(DuplicateIndex),
    /// Keep files unless a present copy exists outside `base_prefix` on `volume_id`.
    Clean { volume_id: String, base_prefix: String },
}

/// Drives one pass: enumerate, resolve, hash, deduplicate, relocate, reconcile.
///
/// Hashing runs on a bounded thread pool; every store write and every
/// duplicate decision happens on the calling thread in path order.
pub struct ScanOrchestrator<'a, D: Database> {
    db: &'a mut D,
    catalog: &'a VolumeCatalog,
    provider: &'a dyn IdentityProvider,
    options: ScanOptions,
    cache: HashCache,
    cancel: Arc<AtomicBool>,
    reporter: Option<Box<dyn FnMut(&FileReport) + 'a>>,
}

impl<'a, D: Database> ScanOrchestrator<'a, D> {
    pub fn new(
        db: &'a mut D,
        catalog: &'a VolumeCatalog,
        provider: &'a dyn IdentityProvider,
        options: ScanOptions,
    ) -> Self {
        let cache = HashCache::new(options.timestamp_epsilon);
        Self {
            db,
            catalog,
            provider,
            options,
            cache,
            cancel: Arc::new(AtomicBool::new(false)),
            reporter: None,
        }
    }

    /// Called once per processed file, in pass order.
    pub fn with_reporter<F>(mut self, reporter: F) -> Self
    where
        F: FnMut(&FileReport) + 'a,
    {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Setting the flag stops the pass before the next file.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Scans `roots`, relocating duplicates relative to the first file seen
    /// with each hash.
    ///
    /// Fails before touching any file record when a root does not exist or no
    /// mounted volume contains it.
    pub fn run(&mut self, roots: &[PathBuf]) -> Result<ScanSummary> {
        let roots = self.resolve_roots(roots)?;
        self.execute(&roots, Decision::Scan(DuplicateIndex::new()))
    }

    /// Relocates files under `root` whose content is already present elsewhere.
    pub fn clean(&mut self, root: &Path) -> Result<ScanSummary> {
        let roots = self.resolve_roots(&[root.to_path_buf()])?;
        let root = roots
            .first()
            .ok_or_else(|| DupvaultError::FileNotFound(root.to_path_buf()))?;

        let matched = self
            .catalog
            .root_for(root)
            .ok_or_else(|| DupvaultError::NoVolumeForRoot(root.clone()))?;
        let base_prefix = if matched.base_path.is_empty() {
            String::new()
        } else {
            format!("{}{}", matched.base_path, std::path::MAIN_SEPARATOR)
        };
        let decision = Decision::Clean {
            volume_id: matched.volume.serial.clone(),
            base_prefix,
        };

        self.execute(&roots, decision)
    }

    fn resolve_roots(&self, roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut resolved = Vec::with_capacity(roots.len());

        for root in roots {
            let canonical = root.canonicalize().map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DupvaultError::FileNotFound(root.clone()),
                _ => DupvaultError::Io(e),
            })?;
            if self.catalog.root_for(&canonical).is_none() {
                return Err(DupvaultError::NoVolumeForRoot(canonical));
            }
            resolved.push(canonical);
        }

        resolved.sort();
        resolved.dedup();
        Ok(resolved)
    }

    fn volume_ids(&self, roots: &[PathBuf]) -> Vec<String> {
        let mut ids: Vec<String> = roots
            .iter()
            .filter_map(|r| self.catalog.root_for(r))
            .map(|m| m.volume.serial.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn relocation_targets(&self, roots: &[PathBuf]) -> Result<Vec<(PathBuf, RelocationEngine)>> {
        let stamp = Local::now().format("%Y-%m-%d %H-%M-%S").to_string();

        roots
            .iter()
            .map(|root| {
                let target = match &self.options.quarantine_root {
                    Some(q) => canonical_target(q)?,
                    None => canonical_target(&default_quarantine(root, &stamp))?,
                };
                Ok((root.clone(), RelocationEngine::new(target, self.options.mode)))
            })
            .collect()
    }

    fn execute(&mut self, roots: &[PathBuf], mut decision: Decision) -> Result<ScanSummary> {
        let volume_ids = self.volume_ids(roots);
        let targets = self.relocation_targets(roots)?;

        let mut summary = ScanSummary {
            volumes: volume_ids.clone(),
            ..Default::default()
        };
        for (_, engine) in &targets {
            let root = engine.target_root().to_path_buf();
            if !summary.quarantine_roots.contains(&root) {
                summary.quarantine_roots.push(root);
            }
        }

        let enumerate_options = EnumerateOptions {
            ignore: build_ignore_set(&self.options.ignore)?,
            exclude_dirs: summary.quarantine_roots.clone(),
        };
        let enumeration = enumerate_files(roots, &enumerate_options)?;
        summary.walk_errors = enumeration.errors.len();

        let total = enumeration.files.len();
        log::info!("Found {} files under {} root(s)", total, roots.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .thread_name(|i| format!("dupvault-hash-{}", i))
            .build()
            .map_err(|e| DupvaultError::Config(format!("Failed to build hashing pool: {}", e)))?;

        let mut position = 0;

        'batches: for batch in enumeration.files.chunks(self.options.batch_size.max(1)) {
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let prepared: Vec<Result<Pending>> = batch.iter().map(|p| self.prepare(p)).collect();

            let cache = self.cache;
            let cancel = Arc::clone(&self.cancel);
            let hashes: Vec<Option<Result<String>>> = pool.install(|| {
                prepared
                    .par_iter()
                    .map(|p| match p {
                        Ok(pending) if pending.record.content_hash.is_none() => {
                            if cancel.load(Ordering::Relaxed) {
                                Some(Err(DupvaultError::Cancelled))
                            } else {
                                Some(cache.hash(&pending.path))
                            }
                        }
                        _ => None,
                    })
                    .collect()
            });

            for ((path, prepared), hash) in batch.iter().zip(prepared).zip(hashes) {
                if self.is_cancelled() {
                    summary.cancelled = true;
                    break 'batches;
                }
                position += 1;

                let size_bytes = prepared
                    .as_ref()
                    .map(|p| p.record.size_bytes.max(0) as u64)
                    .unwrap_or(0);

                let outcome = match prepared
                    .and_then(|pending| self.apply(pending, hash, &targets, &mut decision))
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        FileOutcome::Faulted {
                            cause: e.to_string(),
                        }
                    }
                };

                let report = FileReport {
                    position,
                    total,
                    path: path.clone(),
                    size_bytes,
                    outcome,
                };
                summary.record(&report);
                let faulted = matches!(report.outcome, FileOutcome::Faulted { .. });
                if let Some(reporter) = self.reporter.as_mut() {
                    reporter(&report);
                }

                if faulted && !self.options.tolerant {
                    log::warn!("Stopping at first fault");
                    summary.stopped_early = true;
                    break 'batches;
                }
            }
        }

        if let Decision::Scan(index) = &decision {
            summary.unique_hashes = index.unique_hashes();
        }

        if summary.cancelled || summary.stopped_early {
            log::info!("Pass interrupted, skipping reconciliation");
        } else {
            let stats = reconcile(&mut *self.db, self.catalog, &volume_ids)?;
            summary.archived = stats.archived;
            summary.reconcile = Some(stats);
        }

        Ok(summary)
    }

    /// Resolves `path` and matches it against the store. Reads only.
    fn prepare(&self, path: &Path) -> Result<Pending> {
        let resolver = FileIdentityResolver::new(self.catalog, self.provider);
        let mut record = resolver.resolve(path)?;
        let mut previous_copy = None;

        let source = match self.db.find_file(&record.volume_id, &record.base_path)? {
            Some(existing) => {
                self.check_case_variant(path, &existing, &record)?;
                record.id = existing.id;
                if record.native_file_id.is_none() {
                    record.native_file_id = existing.native_file_id.clone();
                } else if existing.native_file_id.is_none() {
                    log::debug!("Filling in native id for {}", path.display());
                }

                match self.cache.cached_hash(&existing, &record) {
                    Some(hash) => {
                        record.content_hash = Some(hash);
                        record.state = FileState::Cached;
                        previous_copy = existing
                            .status
                            .as_deref()
                            .and_then(|s| s.strip_prefix(COPIED_PREFIX))
                            .map(PathBuf::from);
                        HashSource::Cached
                    }
                    None => {
                        record.state = FileState::Stale;
                        HashSource::Computed
                    }
                }
            }
            None => match self.find_renamed(&record)? {
                Some(previous) => {
                    log::info!(
                        "Recognised rename {} -> {}",
                        previous.base_path,
                        record.base_path
                    );
                    record.id = previous.id;
                    record.content_hash = previous.content_hash;
                    record.state = FileState::Cached;
                    HashSource::Renamed
                }
                None => HashSource::Computed,
            },
        };

        Ok(Pending {
            path: path.to_path_buf(),
            record,
            source,
            previous_copy,
        })
    }

    /// Keys compare without letter case. A stored record whose name differs from
    /// `record`'s only in case belongs to another file while that name is still
    /// present as a different file, and must not be taken over.
    fn check_case_variant(
        &self,
        path: &Path,
        existing: &FileRecord,
        record: &FileRecord,
    ) -> Result<()> {
        if existing.base_path == record.base_path {
            return Ok(());
        }
        let Some(stored) = self
            .catalog
            .reconstruct_path(&existing.volume_id, &existing.base_path)
        else {
            return Ok(());
        };
        if !stored.is_file() {
            return Ok(());
        }

        let same_file = match (self.provider.identity_of(&stored), record.native_file_id.as_ref()) {
            (Ok(stored_id), Some(observed)) => &stored_id == observed,
            _ => false,
        };
        if same_file {
            return Ok(());
        }

        Err(DupvaultError::CaseConflict {
            path: path.to_path_buf(),
            existing: existing.base_path.clone(),
        })
    }

    /// A stored record with the same native id whose metadata still matches
    /// and whose old location is gone.
    fn find_renamed(&self, observed: &FileRecord) -> Result<Option<FileRecord>> {
        let Some(native_id) = observed.native_file_id.as_ref() else {
            return Ok(None);
        };

        for candidate in self
            .db
            .find_files_by_native_id(&observed.volume_id, native_id)?
        {
            if candidate.content_hash.is_none() || !self.cache.should_reuse(&candidate, observed) {
                continue;
            }
            let old_location_present = self
                .catalog
                .reconstruct_path(&candidate.volume_id, &candidate.base_path)
                .map(|p| p.exists())
                .unwrap_or(true);
            if old_location_present {
                continue;
            }
            return Ok(Some(candidate));
        }

        Ok(None)
    }

    /// Writes the record, decides keep/duplicate and relocates duplicates.
    fn apply(
        &mut self,
        pending: Pending,
        hash: Option<Result<String>>,
        targets: &[(PathBuf, RelocationEngine)],
        decision: &mut Decision,
    ) -> Result<FileOutcome> {
        let Pending {
            path,
            mut record,
            source,
            previous_copy,
        } = pending;

        if let Some(hash) = hash {
            record.content_hash = Some(hash?);
        }

        if record.id == 0 {
            // An earlier file of this batch may have taken the key since prepare.
            if let Some(existing) = self.db.find_file(&record.volume_id, &record.base_path)? {
                self.check_case_variant(&path, &existing, &record)?;
                record.id = existing.id;
            }
        }

        if record.id == 0 {
            record.id = self.db.add_file(&record)?;
        } else {
            self.db.update_file(&record)?;
        }

        let canonical = match decision {
            Decision::Scan(index) => match index.observe(&record) {
                Observation::Canonical => None,
                Observation::Duplicate { canonical } => Some(describe(&canonical)),
            },
            Decision::Clean {
                volume_id,
                base_prefix,
            } => self.copy_elsewhere(&record, volume_id, base_prefix)?,
        };

        let Some(canonical) = canonical else {
            return Ok(FileOutcome::Kept { source });
        };

        let relocation = if !self.options.relocate {
            Relocated::NotRequested
        } else if let Some(copy) = previous_copy
            .filter(|p| self.options.mode == RelocationMode::Copy && p.is_file())
        {
            record.status = Some(format!("{}{}", COPIED_PREFIX, copy.display()));
            self.persist(&record);
            Relocated::AlreadyCopied(copy)
        } else {
            self.relocate(&path, &mut record, targets)
        };

        Ok(FileOutcome::Duplicate {
            source,
            canonical,
            relocation,
        })
    }

    fn relocate(
        &mut self,
        path: &Path,
        record: &mut FileRecord,
        targets: &[(PathBuf, RelocationEngine)],
    ) -> Relocated {
        let Some(engine) = target_for(path, targets) else {
            return Relocated::Failed("no relocation target for path".to_string());
        };

        match engine.relocate(path) {
            Ok(relocation) => {
                let relocated = match relocation.mode {
                    RelocationMode::Move => {
                        record.exists = false;
                        record.status =
                            Some(format!("{}{}", RELOCATED_PREFIX, relocation.target.display()));
                        Relocated::Moved(relocation.target)
                    }
                    RelocationMode::Copy => {
                        if let Some(hash) = record.content_hash.as_deref() {
                            if let Err(e) = verify_hash(&relocation.target, hash) {
                                log::warn!(
                                    "Copy of {} did not verify: {}",
                                    path.display(),
                                    e
                                );
                                if let Err(e) = std::fs::remove_file(&relocation.target) {
                                    log::error!(
                                        "Could not remove unverified copy {}: {}",
                                        relocation.target.display(),
                                        e
                                    );
                                }
                                return Relocated::Failed(e.to_string());
                            }
                        }
                        record.status =
                            Some(format!("{}{}", COPIED_PREFIX, relocation.target.display()));
                        Relocated::Copied(relocation.target)
                    }
                };
                self.persist(record);
                relocated
            }
            Err(e) => {
                log::warn!("Relocation of {} failed: {}", path.display(), e);
                Relocated::Failed(e.to_string())
            }
        }
    }

    /// Records a completed relocation. The file operation already happened, so a
    /// store failure is logged rather than turned into a fault.
    fn persist(&mut self, record: &FileRecord) {
        if let Err(e) = self.db.update_file(record) {
            log::error!(
                "Could not record relocation of {}:{}: {}",
                record.volume_id,
                record.base_path,
                e
            );
        }
    }

    fn copy_elsewhere(
        &self,
        record: &FileRecord,
        volume_id: &str,
        base_prefix: &str,
    ) -> Result<Option<String>> {
        let Some(hash) = record.content_hash.as_deref() else {
            return Ok(None);
        };

        for other in self.db.find_files_by_hash(hash)? {
            if other.id == record.id || !other.exists {
                continue;
            }
            let inside_root = other.volume_id == volume_id
                && other
                    .base_path
                    .to_lowercase()
                    .starts_with(&base_prefix.to_lowercase());
            if inside_root {
                continue;
            }
            let Some(path) = self
                .catalog
                .reconstruct_path(&other.volume_id, &other.base_path)
            else {
                continue;
            };
            if path.is_file() {
                return Ok(Some(path.display().to_string()));
            }
        }

        Ok(None)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// `"<root> <stamp>"`, a sibling of the scanned root. A filesystem root gets
/// `"/<stamp>"` inside it instead.
pub fn default_quarantine(root: &Path, stamp: &str) -> PathBuf {
    let root = root.to_string_lossy();
    let trimmed = root.trim_end_matches(std::path::MAIN_SEPARATOR);
    if trimmed.is_empty() {
        return Path::new(std::path::MAIN_SEPARATOR_STR).join(stamp);
    }
    PathBuf::from(format!("{} {}", trimmed, stamp))
}

/// Absolute, symlink-free form of a directory that may not exist yet.
///
/// The deepest existing ancestor is canonicalized and the missing components
/// are appended again, so the result compares with `starts_with` against
/// canonical scan paths.
pub fn canonical_target(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing.iter().rev().fold(canonical, |acc, name| acc.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => {
                return Err(DupvaultError::Config(format!(
                    "Cannot resolve quarantine directory {}",
                    path.display()
                )))
            }
        }
    }
}

fn target_for<'t>(path: &Path, targets: &'t [(PathBuf, RelocationEngine)]) -> Option<&'t RelocationEngine> {
    targets
        .iter()
        .filter(|(root, _)| path.starts_with(root))
        .max_by_key(|(root, _)| root.as_os_str().len())
        .map(|(_, engine)| engine)
}

fn describe(record: &FileRecord) -> String {
    record
        .abs_path
        .clone()
        .unwrap_or_else(|| format!("{}:{}", record.volume_id, record.base_path))
}
