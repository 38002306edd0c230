use crate::error::{DupvaultError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for enumerating scan roots
#[derive(Debug, Clone)]
pub struct EnumerateOptions {
    /// Paths matching any of these globs are skipped; matched directories are not entered.
    pub ignore: GlobSet,
    /// Directory trees left out entirely, e.g. the quarantine root.
    pub exclude_dirs: Vec<PathBuf>,
}

impl Default for EnumerateOptions {
    fn default() -> Self {
        Self {
            ignore: GlobSet::empty(),
            exclude_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Enumeration {
    /// Regular files, sorted, without duplicates from overlapping roots.
    pub files: Vec<PathBuf>,
    pub dirs_scanned: usize,
    pub errors: Vec<String>,
}

pub fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| DupvaultError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| DupvaultError::Config(format!("Failed to build ignore set: {}", e)))
}

/// Lists every regular file under `roots` in lexicographic path order.
///
/// Symlinks are not followed. Walk errors below a root are collected rather
/// than returned; a root that does not exist is an error.
pub fn enumerate_files(roots: &[PathBuf], options: &EnumerateOptions) -> Result<Enumeration> {
    let mut result = Enumeration::default();

    for root in roots {
        if !root.is_dir() {
            return Err(DupvaultError::FileNotFound(root.clone()));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped(e, options));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => result.dirs_scanned += 1,
                Ok(entry) if entry.file_type().is_file() => result.files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Walk error: {}", e);
                    result.errors.push(e.to_string());
                }
            }
        }
    }

    result.files.sort();
    result.files.dedup();

    Ok(result)
}

fn is_skipped(entry: &DirEntry, options: &EnumerateOptions) -> bool {
    let path = entry.path();
    if entry.depth() > 0 && options.ignore.is_match(path) {
        return true;
    }
    is_excluded_dir(path, &options.exclude_dirs)
}

fn is_excluded_dir(path: &Path, exclude_dirs: &[PathBuf]) -> bool {
    exclude_dirs.iter().any(|dir| path.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("b/nested/z.txt"), b"z").unwrap();
        fs::write(dir.path().join("b/y.txt"), b"y").unwrap();
        fs::write(dir.path().join("a/x.txt"), b"x").unwrap();
        fs::write(dir.path().join("a/skip.tmp"), b"tmp").unwrap();
        fs::write(dir.path().join("cache/blob"), b"blob").unwrap();
        dir
    }

    fn relative(dir: &TempDir, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_enumeration_is_sorted() {
        let dir = create_tree();
        let result = enumerate_files(&[dir.path().to_path_buf()], &EnumerateOptions::default()).unwrap();

        assert_eq!(
            relative(&dir, &result.files),
            vec!["a/skip.tmp", "a/x.txt", "b/nested/z.txt", "b/y.txt", "cache/blob"]
        );
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_ignore_globs_and_excluded_dirs() {
        let dir = create_tree();
        let options = EnumerateOptions {
            ignore: build_ignore_set(&["*.tmp".to_string()]).unwrap(),
            exclude_dirs: vec![dir.path().join("cache")],
        };

        let result = enumerate_files(&[dir.path().to_path_buf()], &options).unwrap();
        assert_eq!(
            relative(&dir, &result.files),
            vec!["a/x.txt", "b/nested/z.txt", "b/y.txt"]
        );
    }

    #[test]
    fn test_overlapping_roots_do_not_repeat_files() {
        let dir = create_tree();
        let roots = vec![dir.path().join("b"), dir.path().to_path_buf()];
        let result = enumerate_files(&roots, &EnumerateOptions::default()).unwrap();
        assert_eq!(result.files.len(), 5);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = enumerate_files(&[dir.path().join("absent")], &EnumerateOptions::default());
        assert!(matches!(result, Err(DupvaultError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_glob() {
        assert!(matches!(
            build_ignore_set(&["[".to_string()]),
            Err(DupvaultError::Config(_))
        ));
    }
}
