//! REPORT phase: JSON report (overwritten) and append-only text log

use chrono::{DateTime, Utc};
use qmops_core::fsutil::write_atomic;
use qmops_core::Result;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::maintenance::CacheWarning;
use crate::obsolete::ObsoleteReason;

/// Why a file was selected for removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemovalReason {
    Duplicate { original: PathBuf },
    Obsolete { reason: ObsoleteReason },
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Duplicate { original } => {
                write!(f, "duplicate of {}", original.display())
            }
            RemovalReason::Obsolete { reason } => write!(f, "{}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedFile {
    pub path: PathBuf,
    pub reason: RemovalReason,
    pub size: u64,
}

/// Outcome of one hygiene run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub files_scanned: usize,
    pub duplicates_found: usize,
    pub obsolete_found: usize,
    pub files_removed: usize,
    pub space_freed_bytes: u64,
    /// Every candidate, removed or not
    pub candidates: Vec<RemovedFile>,
    /// Files actually deleted; each has a verified backup copy
    pub removed: Vec<RemovedFile>,
    pub backup_dir: Option<PathBuf>,
    pub pruned_logs: Vec<PathBuf>,
    pub cache_warnings: Vec<CacheWarning>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CleanupReport {
    /// Lines appended to the cleanup log for this run
    pub fn log_lines(&self) -> Vec<String> {
        let ts = self.started_at.to_rfc3339();
        let mut lines = vec![format!(
            "[{}] {}scanned={} duplicates={} obsolete={} removed={} freed={}B pruned={} errors={} duration={}ms",
            ts,
            if self.dry_run { "DRY-RUN " } else { "" },
            self.files_scanned,
            self.duplicates_found,
            self.obsolete_found,
            self.files_removed,
            self.space_freed_bytes,
            self.pruned_logs.len(),
            self.errors.len(),
            self.duration_ms
        )];

        if let Some(dir) = &self.backup_dir {
            lines.push(format!("[{}]   backup {}", ts, dir.display()));
        }
        for removed in &self.removed {
            lines.push(format!(
                "[{}]   removed {} ({}, {}B)",
                ts,
                removed.path.display(),
                removed.reason,
                removed.size
            ));
        }
        for pruned in &self.pruned_logs {
            lines.push(format!("[{}]   pruned {}", ts, pruned.display()));
        }
        for warning in &self.cache_warnings {
            lines.push(format!(
                "[{}]   cache {} is {}B",
                ts,
                warning.path.display(),
                warning.size_bytes
            ));
        }
        for error in &self.errors {
            lines.push(format!("[{}]   error {}", ts, error));
        }
        lines
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn append_log(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for line in self.log_lines() {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> CleanupReport {
        CleanupReport {
            started_at: Utc::now(),
            files_scanned: 3,
            duplicates_found: 1,
            files_removed: 1,
            space_freed_bytes: 12,
            removed: vec![RemovedFile {
                path: PathBuf::from("b.txt"),
                reason: RemovalReason::Duplicate {
                    original: PathBuf::from("a.txt"),
                },
                size: 12,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn log_appends_and_report_overwrites() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join(".qmops/cleanup-report.json");
        let log_path = dir.path().join(".qmops/cleanup.log");

        let report = sample();
        report.write(&report_path).unwrap();
        report.append_log(&log_path).unwrap();

        let second = CleanupReport {
            files_removed: 0,
            removed: Vec::new(),
            ..sample()
        };
        second.write(&report_path).unwrap();
        second.append_log(&log_path).unwrap();

        let loaded = CleanupReport::load(&report_path).unwrap();
        assert_eq!(loaded.files_removed, 0);

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.matches("scanned=3").count(), 2);
        assert!(log.contains("removed b.txt (duplicate of a.txt, 12B)"));
    }

    #[test]
    fn report_json_uses_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["filesRemoved"], 1);
        assert_eq!(json["spaceFreedBytes"], 12);
        assert_eq!(json["duplicatesFound"], 1);
        assert_eq!(json["removed"][0]["reason"]["kind"], "duplicate");
    }
}
