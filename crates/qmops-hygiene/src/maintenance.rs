//! Log rotation pruning and dependency-cache size checks

use chrono::{DateTime, Duration, Utc};
use glob::Pattern;
use qmops_core::{QmopsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::scan::Scanner;

/// A dependency cache above its warning threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheWarning {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub threshold_bytes: u64,
}

/// Rotated logs selected (or removed) by [`prune_rotated_logs`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub pruned: Vec<PathBuf>,
    pub errors: Vec<String>,
}

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| QmopsError::Config(format!("invalid pattern {}: {}", p, e)))
        })
        .collect()
}

/// Remove rotated logs under `log_dir` older than `max_age`
///
/// Paths in the outcome are relative to `log_dir`. With `dry_run` nothing is
/// deleted and the outcome lists what would be.
pub fn prune_rotated_logs(
    log_dir: &Path,
    patterns: &[Pattern],
    max_age: Duration,
    now: DateTime<Utc>,
    dry_run: bool,
) -> PruneOutcome {
    let mut outcome = PruneOutcome::default();
    if !log_dir.is_dir() {
        return outcome;
    }

    let scan = Scanner::new(log_dir, &[]).scan();
    outcome.errors.extend(scan.errors);

    for rel in scan.files {
        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !patterns.iter().any(|p| p.matches(&name)) {
            continue;
        }

        let path = log_dir.join(&rel);
        let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => DateTime::<Utc>::from(t),
            Err(e) => {
                outcome.errors.push(format!("stat {}: {}", path.display(), e));
                continue;
            }
        };
        if now.signed_duration_since(mtime) <= max_age {
            continue;
        }

        if dry_run {
            outcome.pruned.push(rel);
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Pruned rotated log {}", path.display());
                outcome.pruned.push(rel);
            }
            Err(e) => {
                warn!("Failed to prune {}: {}", path.display(), e);
                outcome.errors.push(format!("prune {}: {}", path.display(), e));
            }
        }
    }

    outcome
}

/// Total size of regular files under `dir` (symlinks not followed)
pub fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => stack.push(entry.path()),
                Ok(ft) if ft.is_file() => {
                    total += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
                _ => {}
            }
        }
    }

    total
}

/// Check cache directories at the root and one level below it
///
/// Never deletes; oversize caches are logged and returned.
pub fn check_dependency_caches(root: &Path, caches: &[String], threshold: u64) -> Vec<CacheWarning> {
    let mut candidates: Vec<PathBuf> = caches.iter().map(|c| root.join(c)).collect();

    if let Ok(entries) = std::fs::read_dir(root) {
        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        subdirs.sort();
        for sub in subdirs {
            candidates.extend(caches.iter().map(|c| sub.join(c)));
        }
    }

    let mut warnings = Vec::new();
    for path in candidates {
        if !path.is_dir() {
            continue;
        }
        let size = dir_size(&path);
        if size > threshold {
            warn!(
                "Dependency cache {} is {} bytes (threshold {})",
                path.display(),
                size,
                threshold
            );
            warnings.push(CacheWarning {
                path: path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path.clone()),
                size_bytes: size,
                threshold_bytes: threshold,
            });
        }
    }

    warnings
}
