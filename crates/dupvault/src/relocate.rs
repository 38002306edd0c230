use crate::error::{DupvaultError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocationMode {
    Move,
    Copy,
}

impl RelocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelocationMode::Move => "move",
            RelocationMode::Copy => "copy",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "move" => Ok(RelocationMode::Move),
            "copy" => Ok(RelocationMode::Copy),
            _ => Err(DupvaultError::Config(format!(
                "Invalid relocation mode '{}'. Use 'move' or 'copy'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    pub source: PathBuf,
    pub target: PathBuf,
    pub mode: RelocationMode,
    pub bytes: u64,
    /// True when the simple target was taken and a `" (N)"` name was used.
    pub renamed: bool,
}

/// Moves or copies duplicates under one target root.
#[derive(Debug, Clone)]
pub struct RelocationEngine {
    target_root: PathBuf,
    mode: RelocationMode,
}

impl RelocationEngine {
    pub fn new(target_root: impl Into<PathBuf>, mode: RelocationMode) -> Self {
        Self {
            target_root: target_root.into(),
            mode,
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn mode(&self) -> RelocationMode {
        self.mode
    }

    pub fn relocate(&self, path: &Path) -> Result<Relocation> {
        relocate(path, &self.target_root, self.mode)
    }
}

/// Relocates `path` to `target_root/<parent dir name>/<file name>`.
///
/// An occupied target is never overwritten: the first free `"name (N).ext"`
/// is used instead. If the chosen name is taken between the check and the
/// operation, the relocation fails with [`DupvaultError::TargetOccupied`] and
/// the source stays where it was.
pub fn relocate(path: &Path, target_root: &Path, mode: RelocationMode) -> Result<Relocation> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DupvaultError::FileNotFound(path.to_path_buf()),
        _ => DupvaultError::Io(e),
    })?;

    let simple = simple_target(path, target_root)?;
    let target = free_target(&simple);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| DupvaultError::RelocationFailed {
            path: path.to_path_buf(),
            message: format!("cannot create {}: {}", parent.display(), e),
        })?;
    }

    match mode {
        RelocationMode::Move => move_no_clobber(path, &target)?,
        RelocationMode::Copy => copy_no_clobber(path, &target)?,
    }

    log::info!(
        "{} {} -> {}",
        if mode == RelocationMode::Move { "Moved" } else { "Copied" },
        path.display(),
        target.display()
    );

    Ok(Relocation {
        source: path.to_path_buf(),
        renamed: target != simple,
        target,
        mode,
        bytes: metadata.len(),
    })
}

/// Target path before collision handling.
pub fn simple_target(path: &Path, target_root: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| DupvaultError::RelocationFailed {
            path: path.to_path_buf(),
            message: "path has no file name".to_string(),
        })?;

    let bucket = path.parent().and_then(|p| p.file_name());

    Ok(match bucket {
        Some(bucket) => target_root.join(bucket).join(file_name),
        None => target_root.join(file_name),
    })
}

/// First of `simple`, `stem (1).ext`, `stem (2).ext`, … that does not exist.
pub fn free_target(simple: &Path) -> PathBuf {
    if !exists_no_follow(simple) {
        return simple.to_path_buf();
    }

    let stem = simple
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = simple.extension().map(|e| e.to_string_lossy().to_string());

    let mut n: u64 = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = simple.with_file_name(name);
        if !exists_no_follow(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Links the source at `target` then unlinks the original, falling back to
/// copy-and-delete when a hard link is impossible (other device, no link support).
fn move_no_clobber(source: &Path, target: &Path) -> Result<()> {
    match fs::hard_link(source, target) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(DupvaultError::TargetOccupied(target.to_path_buf()));
        }
        Err(e) => {
            log::debug!(
                "Hard link {} -> {} failed ({}), copying instead",
                source.display(),
                target.display(),
                e
            );
            copy_no_clobber(source, target)?;
        }
    }

    if let Err(e) = fs::remove_file(source) {
        if let Err(undo) = fs::remove_file(target) {
            log::error!(
                "Could not remove {} after failed move: {}",
                target.display(),
                undo
            );
        }
        return Err(DupvaultError::RelocationFailed {
            path: source.to_path_buf(),
            message: format!("cannot remove source: {}", e),
        });
    }

    Ok(())
}

/// Copies into a freshly created file; a partial copy is removed on failure.
fn copy_no_clobber(source: &Path, target: &Path) -> Result<()> {
    let mut input = File::open(source)?;

    let mut output = match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(DupvaultError::TargetOccupied(target.to_path_buf()));
        }
        Err(e) => {
            return Err(DupvaultError::RelocationFailed {
                path: source.to_path_buf(),
                message: format!("cannot create {}: {}", target.display(), e),
            });
        }
    };

    let copied = io::copy(&mut input, &mut output).and_then(|_| {
        if let Ok(modified) = input.metadata().and_then(|m| m.modified()) {
            let _ = output.set_modified(modified);
        }
        output.sync_all()
    });

    if let Err(e) = copied {
        drop(output);
        let _ = fs::remove_file(target);
        return Err(DupvaultError::RelocationFailed {
            path: source.to_path_buf(),
            message: format!("copy to {} failed: {}", target.display(), e),
        });
    }

    Ok(())
}
