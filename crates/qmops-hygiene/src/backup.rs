//! BACKUP phase and restore
//!
//! Each cleanup run gets its own `backup-YYYYMMDD-HHMMSS` directory under the
//! backup root. Candidates are copied there at their repository-relative path
//! and the copy is re-hashed before the original may be deleted.

use chrono::{DateTime, Utc};
use qmops_core::{QmopsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::hash::{hash_file, FileRecord};

const RUN_PREFIX: &str = "backup-";

/// Summary of one backup run directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub restored: Vec<PathBuf>,
    /// Already present in the tree and not forced
    pub skipped: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// A backup directory for the current run
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub name: String,
    pub dir: PathBuf,
}

impl BackupRun {
    /// Copy `repo_root/record.path` into this run and verify the copy
    pub fn backup_file(&self, repo_root: &Path, record: &FileRecord) -> Result<PathBuf> {
        let source = repo_root.join(&record.path);
        let dest = self.dir.join(&record.path);

        let fail = |reason: String| QmopsError::Backup {
            path: record.path.display().to_string(),
            reason,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        std::fs::copy(&source, &dest).map_err(|e| fail(e.to_string()))?;

        let copied = hash_file(&dest).map_err(|e| fail(e.to_string()))?;
        if copied != record.hash {
            let _ = std::fs::remove_file(&dest);
            return Err(fail(format!(
                "copy hash mismatch (expected {}, got {})",
                record.hash, copied
            )));
        }

        debug!("Backed up {} -> {}", source.display(), dest.display());
        Ok(dest)
    }
}

/// Owner of the backup root directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_root: PathBuf,
}

impl BackupManager {
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Create a fresh run directory stamped with `now`
    ///
    /// Two runs in the same second get a numeric suffix.
    pub fn start_run(&self, now: DateTime<Utc>) -> Result<BackupRun> {
        std::fs::create_dir_all(&self.backup_root)?;

        let base = format!("{}{}", RUN_PREFIX, now.format("%Y%m%d-%H%M%S"));
        let mut name = base.clone();
        let mut n = 1;
        while self.backup_root.join(&name).exists() {
            name = format!("{}-{}", base, n);
            n += 1;
        }

        let dir = self.backup_root.join(&name);
        std::fs::create_dir(&dir)?;
        info!("Backup run directory: {}", dir.display());
        Ok(BackupRun { name, dir })
    }

    /// All backup runs, oldest first
    pub fn list(&self) -> Result<Vec<BackupInfo>> {
        let entries = match std::fs::read_dir(&self.backup_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(RUN_PREFIX) || !entry.path().is_dir() {
                continue;
            }
            let files = collect_files(&entry.path())?;
            let bytes = files
                .iter()
                .filter_map(|f| std::fs::metadata(entry.path().join(f)).ok())
                .map(|m| m.len())
                .sum();
            backups.push(BackupInfo {
                name,
                path: entry.path(),
                files: files.len(),
                bytes,
            });
        }

        backups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(backups)
    }

    /// Copy a run's files back to their relative paths under `repo_root`
    ///
    /// Files that already exist are skipped unless `force` is set. A missing
    /// run is a hard error; per-file failures are collected.
    pub fn restore(&self, name: &str, repo_root: &Path, force: bool) -> Result<RestoreSummary> {
        if !is_plain_name(name) {
            return Err(QmopsError::BackupNotFound(name.to_string()));
        }
        let run_dir = self.backup_root.join(name);
        if !run_dir.is_dir() {
            return Err(QmopsError::BackupNotFound(name.to_string()));
        }

        let mut summary = RestoreSummary::default();
        for rel in collect_files(&run_dir)? {
            let dest = repo_root.join(&rel);
            if dest.exists() && !force {
                debug!("Skipping existing {}", dest.display());
                summary.skipped.push(rel);
                continue;
            }

            let result = dest
                .parent()
                .map(std::fs::create_dir_all)
                .transpose()
                .and_then(|_| std::fs::copy(run_dir.join(&rel), &dest));
            match result {
                Ok(_) => summary.restored.push(rel),
                Err(e) => {
                    warn!("Failed to restore {}: {}", rel.display(), e);
                    summary.errors.push(format!("{}: {}", rel.display(), e));
                }
            }
        }

        info!(
            "Restored {} files from {} ({} skipped, {} errors)",
            summary.restored.len(),
            name,
            summary.skipped.len(),
            summary.errors.len()
        );
        Ok(summary)
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Relative paths of every regular file under `dir`, sorted
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                if let Ok(rel) = entry.path().strip_prefix(dir) {
                    out.push(rel.to_path_buf());
                }
            }
        }
    }

    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::FileRecord;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> FileRecord {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        FileRecord::read(root, Path::new(rel)).unwrap()
    }

    #[test]
    fn run_names_are_timestamped_and_unique() {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::new(dir.path().join("backups"));
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let first = manager.start_run(now).unwrap();
        let second = manager.start_run(now).unwrap();

        assert_eq!(first.name, "backup-20240309-140507");
        assert_eq!(second.name, "backup-20240309-140507-1");
    }

    #[test]
    fn backup_preserves_relative_path_and_content() {
        let repo = TempDir::new().unwrap();
        let record = write(repo.path(), "src/old/notes.tmp", "scratch");
        let manager = BackupManager::new(repo.path().join(".qmops/backups"));
        let run = manager.start_run(Utc::now()).unwrap();

        let dest = run.backup_file(repo.path(), &record).unwrap();

        assert_eq!(dest, run.dir.join("src/old/notes.tmp"));
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "scratch");
    }

    #[test]
    fn backup_of_missing_source_fails() {
        let repo = TempDir::new().unwrap();
        let record = write(repo.path(), "gone.tmp", "x");
        std::fs::remove_file(repo.path().join("gone.tmp")).unwrap();
        let run = BackupManager::new(repo.path().join("bk"))
            .start_run(Utc::now())
            .unwrap();

        let err = run.backup_file(repo.path(), &record).unwrap_err();
        assert!(matches!(err, QmopsError::Backup { .. }));
    }

    #[test]
    fn list_and_restore_round_trip() {
        let repo = TempDir::new().unwrap();
        let record = write(repo.path(), "docs/a.bak", "backup me");
        let manager = BackupManager::new(repo.path().join("bk"));
        let run = manager.start_run(Utc::now()).unwrap();
        run.backup_file(repo.path(), &record).unwrap();
        std::fs::remove_file(repo.path().join("docs/a.bak")).unwrap();

        let listed = manager.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].files, 1);
        assert_eq!(listed[0].bytes, 9);

        let summary = manager.restore(&run.name, repo.path(), false).unwrap();
        assert_eq!(summary.restored, vec![PathBuf::from("docs/a.bak")]);
        assert_eq!(
            std::fs::read_to_string(repo.path().join("docs/a.bak")).unwrap(),
            "backup me"
        );
    }

    #[test]
    fn restore_skips_existing_unless_forced() {
        let repo = TempDir::new().unwrap();
        let record = write(repo.path(), "a.orig", "old");
        let manager = BackupManager::new(repo.path().join("bk"));
        let run = manager.start_run(Utc::now()).unwrap();
        run.backup_file(repo.path(), &record).unwrap();
        std::fs::write(repo.path().join("a.orig"), "new").unwrap();

        let summary = manager.restore(&run.name, repo.path(), false).unwrap();
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(std::fs::read_to_string(repo.path().join("a.orig")).unwrap(), "new");

        let summary = manager.restore(&run.name, repo.path(), true).unwrap();
        assert_eq!(summary.restored.len(), 1);
        assert_eq!(std::fs::read_to_string(repo.path().join("a.orig")).unwrap(), "old");
    }

    #[test]
    fn restore_missing_or_escaping_name_fails() {
        let repo = TempDir::new().unwrap();
        let manager = BackupManager::new(repo.path().join("bk"));

        assert!(matches!(
            manager.restore("backup-19700101-000000", repo.path(), false),
            Err(QmopsError::BackupNotFound(_))
        ));
        assert!(matches!(
            manager.restore("../etc", repo.path(), false),
            Err(QmopsError::BackupNotFound(_))
        ));
    }

    #[test]
    fn list_without_backup_root_is_empty() {
        let repo = TempDir::new().unwrap();
        let manager = BackupManager::new(repo.path().join("never-created"));
        assert!(manager.list().unwrap().is_empty());
    }
}
