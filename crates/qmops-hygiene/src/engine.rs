//! Hygiene run driver
//!
//! Phases run strictly in order:
//! SCAN -> HASH -> GROUP -> BACKUP -> DELETE -> REPORT
//!
//! Nothing is deleted unless its verified backup exists. Per-file failures
//! are recorded in the report and the batch continues.

use chrono::{DateTime, Duration, Utc};
use glob::Pattern;
use qmops_core::config::HygieneConfig;
use qmops_core::fail_open::fail_open_sync;
use qmops_core::{Result, RunContext, MAX_AGE_DAYS};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::backup::{BackupInfo, BackupManager, RestoreSummary};
use crate::dedup::find_duplicates;
use crate::hash::FileRecord;
use crate::maintenance::{check_dependency_caches, compile_patterns, prune_rotated_logs};
use crate::obsolete::ObsolescenceRules;
use crate::report::{CleanupReport, RemovalReason, RemovedFile};
use crate::scan::Scanner;

/// Engine phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HygienePhase {
    Scan,
    Hash,
    Group,
    Backup,
    Delete,
    Report,
}

impl HygienePhase {
    pub fn next(self) -> Option<Self> {
        match self {
            HygienePhase::Scan => Some(HygienePhase::Hash),
            HygienePhase::Hash => Some(HygienePhase::Group),
            HygienePhase::Group => Some(HygienePhase::Backup),
            HygienePhase::Backup => Some(HygienePhase::Delete),
            HygienePhase::Delete => Some(HygienePhase::Report),
            HygienePhase::Report => None,
        }
    }
}

impl std::fmt::Display for HygienePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HygienePhase::Scan => "SCAN",
            HygienePhase::Hash => "HASH",
            HygienePhase::Group => "GROUP",
            HygienePhase::Backup => "BACKUP",
            HygienePhase::Delete => "DELETE",
            HygienePhase::Report => "REPORT",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Report candidates, touch nothing
    pub dry_run: bool,
}

/// Repository hygiene engine bound to one repository root
#[derive(Debug, Clone)]
pub struct HygieneEngine {
    root: PathBuf,
    config: HygieneConfig,
    rules: ObsolescenceRules,
    rotated_patterns: Vec<Pattern>,
    backups: BackupManager,
    report_path: PathBuf,
    log_path: PathBuf,
}

impl HygieneEngine {
    /// Build the engine from the run context; invalid patterns are rejected
    pub fn new(ctx: &RunContext) -> Result<Self> {
        let config = ctx.config().hygiene.clone();
        Ok(Self {
            root: ctx.root().to_path_buf(),
            rules: ObsolescenceRules::from_config(&config)?,
            rotated_patterns: compile_patterns(&config.rotated_log_patterns)?,
            backups: BackupManager::new(ctx.resolve(&config.backup_dir)),
            report_path: ctx.resolve(&config.report_path),
            log_path: ctx.resolve(&config.log_path),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn run(&self, options: CleanupOptions) -> CleanupReport {
        self.run_at(options, Utc::now())
    }

    /// Run every phase with `now` as the reference time for age rules
    pub fn run_at(&self, options: CleanupOptions, now: DateTime<Utc>) -> CleanupReport {
        let started = Instant::now();
        let mut report = CleanupReport {
            started_at: now,
            dry_run: options.dry_run,
            ..Default::default()
        };

        enter(HygienePhase::Scan, options);
        let scan = Scanner::new(&self.root, &self.config.ignore_dirs)
            .exclude(self.backups.backup_root())
            .scan();
        report.files_scanned = scan.files.len();
        report.errors.extend(scan.errors);

        enter(HygienePhase::Hash, options);
        let mut records = Vec::with_capacity(scan.files.len());
        for rel in &scan.files {
            match FileRecord::read(&self.root, rel) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Failed to hash {}: {}", rel.display(), e);
                    report.errors.push(format!("hash {}: {}", rel.display(), e));
                }
            }
        }

        enter(HygienePhase::Group, options);
        let obsolete: Vec<_> = records.iter().map(|r| self.rules.classify(r, now)).collect();
        // Keepers come only from files that survive the run
        let duplicates = find_duplicates(
            records
                .iter()
                .zip(&obsolete)
                .filter(|(_, reason)| reason.is_none())
                .map(|(record, _)| record),
        );
        report.duplicates_found = duplicates.len();

        let originals: HashMap<&Path, &PathBuf> = duplicates
            .iter()
            .map(|d| (d.duplicate_path.as_path(), &d.original_path))
            .collect();
        let mut candidates: Vec<(&FileRecord, RemovalReason)> = Vec::new();
        for (record, reason) in records.iter().zip(obsolete) {
            if let Some(reason) = reason {
                report.obsolete_found += 1;
                candidates.push((record, RemovalReason::Obsolete { reason }));
            } else if let Some(original) = originals.get(record.path.as_path()) {
                candidates.push((
                    record,
                    RemovalReason::Duplicate {
                        original: (*original).clone(),
                    },
                ));
            }
        }
        report.candidates = candidates
            .iter()
            .map(|(record, reason)| RemovedFile {
                path: record.path.clone(),
                reason: reason.clone(),
                size: record.size,
            })
            .collect();
        debug!(
            "{} duplicates, {} obsolete, {} candidates",
            report.duplicates_found,
            report.obsolete_found,
            candidates.len()
        );

        enter(HygienePhase::Backup, options);
        let mut backed_up = Vec::new();
        if !options.dry_run && !candidates.is_empty() {
            match self.backups.start_run(now) {
                Ok(run) => {
                    report.backup_dir = Some(run.dir.clone());
                    for (record, reason) in &candidates {
                        match run.backup_file(&self.root, record) {
                            Ok(_) => backed_up.push((*record, reason.clone())),
                            Err(e) => {
                                warn!("{}", e);
                                report.errors.push(e.to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Cannot create backup run, nothing will be deleted: {}", e);
                    report.errors.push(format!("backup run: {}", e));
                }
            }
        }

        enter(HygienePhase::Delete, options);
        for (record, reason) in backed_up {
            let path = self.root.join(&record.path);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {} ({})", record.path.display(), reason);
                    report.files_removed += 1;
                    report.space_freed_bytes += record.size;
                    report.removed.push(RemovedFile {
                        path: record.path.clone(),
                        reason,
                        size: record.size,
                    });
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    report.errors.push(format!("remove {}: {}", record.path.display(), e));
                }
            }
        }

        let pruned = prune_rotated_logs(
            &self.root.join(&self.config.log_dir),
            &self.rotated_patterns,
            Duration::days(self.config.rotated_log_max_age_days.min(MAX_AGE_DAYS) as i64),
            now,
            options.dry_run,
        );
        report.pruned_logs = pruned.pruned;
        report.errors.extend(pruned.errors);
        report.cache_warnings = check_dependency_caches(
            &self.root,
            &self.config.dependency_caches,
            self.config.dependency_cache_warn_bytes,
        );

        enter(HygienePhase::Report, options);
        report.duration_ms = started.elapsed().as_millis() as u64;
        if !options.dry_run {
            fail_open_sync("cleanup_report", || report.write(&self.report_path));
            fail_open_sync("cleanup_log", || report.append_log(&self.log_path));
        }

        info!(
            "Hygiene {}: {} scanned, {} duplicates, {} obsolete, {} removed, {} bytes freed, {} errors",
            if options.dry_run { "dry run" } else { "run" },
            report.files_scanned,
            report.duplicates_found,
            report.obsolete_found,
            report.files_removed,
            report.space_freed_bytes,
            report.errors.len()
        );
        report
    }

    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        self.backups.list()
    }

    pub fn restore_backup(&self, name: &str, force: bool) -> Result<RestoreSummary> {
        self.backups.restore(name, &self.root, force)
    }
}

fn enter(phase: HygienePhase, options: CleanupOptions) {
    debug!(
        "Hygiene phase {}{}",
        phase,
        if options.dry_run { " (dry run)" } else { "" }
    );
}
