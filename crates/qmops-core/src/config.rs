//! Configuration management for qmops
//!
//! Every threshold, percentage and interval used by the automation layer lives
//! here. The file is loaded from `.qmops/config.toml` in the repository root;
//! any missing field falls back to its documented default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{QmopsError, Result};

/// Directory (relative to the repository root) holding qmops state files
pub const STATE_DIR: &str = ".qmops";

/// Upper bound for the hygiene age thresholds
pub const MAX_AGE_DAYS: u64 = 36_500;

/// Repository-level qmops configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QmopsConfig {
    /// Health monitor and coordination reconciler
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Work order decomposition rules
    #[serde(default)]
    pub decomposition: DecompositionConfig,

    /// Role state sync
    #[serde(default)]
    pub sync: SyncConfig,

    /// Hierarchical agent registry
    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    /// Repository hygiene engine
    #[serde(default)]
    pub hygiene: HygieneConfig,

    /// Continuous-mode runner
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Which health surface drives a role's progress heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Backend,
    Frontend,
    /// Every critical API path must be healthy
    Api,
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Application server base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// UI server base URL
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// API paths checked against the backend base URL
    #[serde(default = "default_critical_paths")]
    pub critical_paths: Vec<String>,

    /// Per-endpoint timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between cycles in continuous mode
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,

    /// Percentage points added to a role's progress when its surface is healthy
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,

    /// Role -> surface association for the progress heuristic
    #[serde(default = "default_role_surfaces")]
    pub role_surfaces: BTreeMap<String, Surface>,

    /// Coordination document path (relative to the repository root)
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Latest structured snapshot
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

/// Work order decomposition rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Share of the budget allocated to backend/API work
    #[serde(default = "default_backend_share")]
    pub backend_share: f64,

    /// Share of the budget allocated to UI work
    #[serde(default = "default_ui_share")]
    pub ui_share: f64,

    /// Share of the budget allocated to the always-present testing task
    #[serde(default = "default_testing_share")]
    pub testing_share: f64,

    /// Working hours per estimated day
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: f64,

    /// General role receiving backend tasks
    #[serde(default = "default_backend_role")]
    pub backend_role: String,

    /// General role receiving UI and testing tasks
    #[serde(default = "default_ui_role")]
    pub ui_role: String,
}

/// Precedence between the planner config and the document-derived state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePrecedence {
    /// Document merged last, wins on overlapping fields
    #[default]
    Document,
    /// Planner merged last
    Planner,
    /// Whichever source carries the newer timestamp wins
    Newest,
}

/// Role state sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Machine-written planner configuration
    #[serde(default = "default_planner_path")]
    pub planner_path: String,

    /// Sync report output
    #[serde(default = "default_sync_report_path")]
    pub report_path: String,

    /// Merge precedence between sources
    #[serde(default)]
    pub precedence: MergePrecedence,

    /// Interval between syncs in continuous mode
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
}

/// Hierarchical registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Persisted tree
    #[serde(default = "default_hierarchy_path")]
    pub path: String,

    /// Progress increment per simulated step
    #[serde(default = "default_step_percent")]
    pub step_percent: u8,

    /// Delay between simulated steps
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Default coordinator id for `create-hierarchy`
    #[serde(default = "default_coordinator_id")]
    pub coordinator_id: String,
}

/// Repository hygiene configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HygieneConfig {
    /// Directory names never descended into
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// Extensions (or suffixes) that are always obsolete
    #[serde(default = "default_obsolete_extensions")]
    pub obsolete_extensions: Vec<String>,

    /// Report-style filename globs, obsolete once older than `report_max_age_days`
    #[serde(default = "default_report_patterns")]
    pub report_patterns: Vec<String>,

    #[serde(default = "default_report_max_age_days")]
    pub report_max_age_days: u64,

    /// Directory holding rotated logs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Rotated-log filename globs
    #[serde(default = "default_rotated_log_patterns")]
    pub rotated_log_patterns: Vec<String>,

    #[serde(default = "default_rotated_log_max_age_days")]
    pub rotated_log_max_age_days: u64,

    /// Dependency caches whose size is checked (warn only)
    #[serde(default = "default_dependency_caches")]
    pub dependency_caches: Vec<String>,

    #[serde(default = "default_dependency_cache_warn_bytes")]
    pub dependency_cache_warn_bytes: u64,

    /// Root of the timestamped backup directories
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// Cleanup report (overwritten each run)
    #[serde(default = "default_cleanup_report_path")]
    pub report_path: String,

    /// Cleanup log (append-only)
    #[serde(default = "default_cleanup_log_path")]
    pub log_path: String,

    /// Interval between runs in continuous mode
    #[serde(default = "default_hygiene_interval_secs")]
    pub interval_secs: u64,
}

/// Continuous-mode runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Exit cleanly after this many cycles so the supervisor restarts the process
    #[serde(default)]
    pub restart_after_cycles: Option<u64>,
}

// Default value providers
fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_critical_paths() -> Vec<String> {
    vec![
        "/api/health".to_string(),
        "/api/clients".to_string(),
        "/api/documents".to_string(),
        "/api/audits".to_string(),
    ]
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_monitor_interval_secs() -> u64 {
    15 * 60
}

fn default_progress_step() -> u8 {
    5
}

fn default_role_surfaces() -> BTreeMap<String, Surface> {
    BTreeMap::from([
        ("backend".to_string(), Surface::Backend),
        ("frontend".to_string(), Surface::Frontend),
        ("qa".to_string(), Surface::Api),
        ("devops".to_string(), Surface::Backend),
    ])
}

fn default_document_path() -> String {
    "COORDINATION.md".to_string()
}

fn default_snapshot_path() -> String {
    format!("{}/status.json", STATE_DIR)
}

fn default_backend_share() -> f64 {
    0.40
}

fn default_ui_share() -> f64 {
    0.50
}

fn default_testing_share() -> f64 {
    0.10
}

fn default_hours_per_day() -> f64 {
    8.0
}

fn default_backend_role() -> String {
    "backend".to_string()
}

fn default_ui_role() -> String {
    "frontend".to_string()
}

fn default_planner_path() -> String {
    format!("{}/planner.json", STATE_DIR)
}

fn default_sync_report_path() -> String {
    format!("{}/sync-report.json", STATE_DIR)
}

fn default_sync_interval_secs() -> u64 {
    5 * 60
}

fn default_hierarchy_path() -> String {
    format!("{}/hierarchy.json", STATE_DIR)
}

fn default_step_percent() -> u8 {
    10
}

fn default_step_delay_ms() -> u64 {
    200
}

fn default_coordinator_id() -> String {
    "qm-coordinator".to_string()
}

fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        ".jj",
        ".hg",
        "node_modules",
        "target",
        "dist",
        "build",
        ".next",
        "__pycache__",
        ".venv",
        STATE_DIR,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_obsolete_extensions() -> Vec<String> {
    [".log", ".tmp", ".temp", ".bak", ".backup", ".orig", ".swp", "~"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_report_patterns() -> Vec<String> {
    [
        "*_REPORT*.md",
        "*-report-*.json",
        "*_SUMMARY*.md",
        "test-results-*.xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_report_max_age_days() -> u64 {
    30
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_rotated_log_patterns() -> Vec<String> {
    vec!["*.log.*".to_string(), "*.gz".to_string()]
}

fn default_rotated_log_max_age_days() -> u64 {
    7
}

fn default_dependency_caches() -> Vec<String> {
    vec!["node_modules".to_string(), "target".to_string()]
}

fn default_dependency_cache_warn_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_backup_dir() -> String {
    format!("{}/backups", STATE_DIR)
}

fn default_cleanup_report_path() -> String {
    format!("{}/cleanup-report.json", STATE_DIR)
}

fn default_cleanup_log_path() -> String {
    format!("{}/cleanup.log", STATE_DIR)
}

fn default_hygiene_interval_secs() -> u64 {
    24 * 60 * 60
}

impl QmopsConfig {
    /// Load configuration from `.qmops/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(STATE_DIR).join("config.toml");

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            QmopsError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.qmops/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(STATE_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| QmopsError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(config_dir.join("config.toml"), content)?;
        Ok(())
    }

    /// Reject values the components cannot work with
    pub fn validate(&self) -> Result<()> {
        let d = &self.decomposition;
        for (name, share) in [
            ("backend_share", d.backend_share),
            ("ui_share", d.ui_share),
            ("testing_share", d.testing_share),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(QmopsError::Config(format!(
                    "decomposition.{} must be within [0, 1], got {}",
                    name, share
                )));
            }
        }
        if d.hours_per_day <= 0.0 {
            return Err(QmopsError::Config(
                "decomposition.hours_per_day must be positive".to_string(),
            ));
        }
        if self.hierarchy.step_percent == 0 || self.hierarchy.step_percent > 100 {
            return Err(QmopsError::Config(
                "hierarchy.step_percent must be within 1..=100".to_string(),
            ));
        }
        if self.monitor.timeout_ms == 0 {
            return Err(QmopsError::Config(
                "monitor.timeout_ms must be positive".to_string(),
            ));
        }
        let h = &self.hygiene;
        for (name, days) in [
            ("report_max_age_days", h.report_max_age_days),
            ("rotated_log_max_age_days", h.rotated_log_max_age_days),
        ] {
            if days > MAX_AGE_DAYS {
                return Err(QmopsError::Config(format!(
                    "hygiene.{} must be at most {}, got {}",
                    name, MAX_AGE_DAYS, days
                )));
            }
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            frontend_url: default_frontend_url(),
            critical_paths: default_critical_paths(),
            timeout_ms: default_timeout_ms(),
            interval_secs: default_monitor_interval_secs(),
            progress_step: default_progress_step(),
            role_surfaces: default_role_surfaces(),
            document_path: default_document_path(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            backend_share: default_backend_share(),
            ui_share: default_ui_share(),
            testing_share: default_testing_share(),
            hours_per_day: default_hours_per_day(),
            backend_role: default_backend_role(),
            ui_role: default_ui_role(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            planner_path: default_planner_path(),
            report_path: default_sync_report_path(),
            precedence: MergePrecedence::default(),
            interval_secs: default_sync_interval_secs(),
        }
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            path: default_hierarchy_path(),
            step_percent: default_step_percent(),
            step_delay_ms: default_step_delay_ms(),
            coordinator_id: default_coordinator_id(),
        }
    }
}

impl Default for HygieneConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: default_ignore_dirs(),
            obsolete_extensions: default_obsolete_extensions(),
            report_patterns: default_report_patterns(),
            report_max_age_days: default_report_max_age_days(),
            log_dir: default_log_dir(),
            rotated_log_patterns: default_rotated_log_patterns(),
            rotated_log_max_age_days: default_rotated_log_max_age_days(),
            dependency_caches: default_dependency_caches(),
            dependency_cache_warn_bytes: default_dependency_cache_warn_bytes(),
            backup_dir: default_backup_dir(),
            report_path: default_cleanup_report_path(),
            log_path: default_cleanup_log_path(),
            interval_secs: default_hygiene_interval_secs(),
        }
    }
}
