//! SCAN phase: deterministic recursive walk of the repository tree

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files found by a walk, relative to the walk root, in observation order
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub files: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Recursive directory walker with an ignore-list of directory names
///
/// Entries are visited in file-name order so "first observed" is stable
/// across runs. Symlinks are never followed or reported.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    ignore_dirs: HashSet<String>,
    exclude_paths: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, ignore_dirs: &[String]) -> Self {
        Self {
            root: root.into(),
            ignore_dirs: ignore_dirs.iter().cloned().collect(),
            exclude_paths: Vec::new(),
        }
    }

    /// Skip a specific absolute path (e.g. a backup root outside `.qmops`)
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        self.walk(&self.root, &mut outcome);
        debug!(
            "Scanned {}: {} files, {} errors",
            self.root.display(),
            outcome.files.len(),
            outcome.errors.len()
        );
        outcome
    }

    fn walk(&self, dir: &Path, outcome: &mut ScanOutcome) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read directory {}: {}", dir.display(), e);
                outcome
                    .errors
                    .push(format!("read_dir {}: {}", dir.display(), e));
                return;
            }
        };

        let mut entries = keep_readable(dir, entries, &mut outcome.errors);
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    outcome
                        .errors
                        .push(format!("file_type {}: {}", path.display(), e));
                    continue;
                }
            };

            if file_type.is_symlink() || self.exclude_paths.iter().any(|p| p == &path) {
                continue;
            }

            if file_type.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if self.ignore_dirs.contains(&name) {
                    debug!("Skipping ignored directory {}", path.display());
                    continue;
                }
                self.walk(&path, outcome);
            } else if file_type.is_file() {
                match path.strip_prefix(&self.root) {
                    Ok(rel) => outcome.files.push(rel.to_path_buf()),
                    Err(_) => outcome.files.push(path),
                }
            }
        }
    }
}

/// Entries that could be read; failures are logged and recorded
fn keep_readable<T>(
    dir: &Path,
    entries: impl IntoIterator<Item = std::io::Result<T>>,
    errors: &mut Vec<String>,
) -> Vec<T> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Cannot read entry in {}: {}", dir.display(), e);
                errors.push(format!("read_dir entry {}: {}", dir.display(), e));
                None
            }
        })
        .collect()
}
