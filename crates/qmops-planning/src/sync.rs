//! Role state sync
//!
//! Two independent sources describe how far each role has come:
//!
//! - the planner config (`.qmops/planner.json`), written by planning tools and
//!   keyed by specialized agent key
//! - the document-derived state: the structured status snapshot when present,
//!   otherwise the `current-status` section of the coordination document
//!
//! Both are folded into one [`AgentRole`] per general role. The source merged
//! last wins on overlapping fields; which one that is comes from
//! [`MergePrecedence`]. Task counts from the planner, when present, override
//! progress with their ratio.

use chrono::{DateTime, Utc};
use qmops_core::document::{parse_status_section, STATUS_SECTION};
use qmops_core::fail_open::fail_open;
use qmops_core::fsutil::{read_json_lenient, write_json};
use qmops_core::{clamp_percent, MergePrecedence, Result, RoleStatus, RunContext, SystemStatusSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::roles::{AgentRole, RoleRegistry};

/// One agent entry of the planner config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerAgentEntry {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<i64>,
    #[serde(default, alias = "completed_tasks")]
    pub completed_tasks: Option<u32>,
    #[serde(default, alias = "total_tasks")]
    pub total_tasks: Option<u32>,
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Machine-written planner configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerConfig {
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Specialized (or general) agent key -> entry
    #[serde(default)]
    pub agents: BTreeMap<String, PlannerAgentEntry>,
}

impl PlannerConfig {
    /// Skeleton with every general role pending
    pub fn skeleton(registry: &RoleRegistry) -> Self {
        Self {
            updated_at: Some(Utc::now()),
            agents: registry
                .general_roles()
                .iter()
                .map(|role| {
                    (
                        role.to_string(),
                        PlannerAgentEntry {
                            status: Some(RoleStatus::Pending.to_string()),
                            progress: Some(0),
                            ..Default::default()
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Where the document-derived state came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// `.qmops/status.json`
    Snapshot,
    /// Scraped from the coordination document
    Document,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRoleState {
    pub progress: u8,
    pub status: RoleStatus,
}

/// Document-derived state keyed by general role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentState {
    pub source: DocumentSource,
    pub timestamp: Option<DateTime<Utc>>,
    pub roles: BTreeMap<String, DocumentRoleState>,
}

impl DocumentState {
    pub fn from_snapshot(snapshot: &SystemStatusSnapshot, registry: &RoleRegistry) -> Self {
        let mut roles = BTreeMap::new();
        for (key, progress) in &snapshot.agent_progress {
            let Some(role) = resolve_or_warn(registry, key, "status snapshot") else {
                continue;
            };
            roles.insert(
                role.to_string(),
                DocumentRoleState {
                    progress: (*progress).min(100),
                    status: RoleStatus::from_progress(*progress),
                },
            );
        }
        Self {
            source: DocumentSource::Snapshot,
            timestamp: Some(snapshot.timestamp),
            roles,
        }
    }

    pub fn from_section(body: &str, registry: &RoleRegistry) -> Self {
        let parsed = parse_status_section(body);
        let mut roles = BTreeMap::new();
        for entry in parsed.roles {
            let Some(role) = resolve_or_warn(registry, &entry.role, "coordination document") else {
                continue;
            };
            roles.insert(
                role.to_string(),
                DocumentRoleState {
                    progress: entry.progress,
                    status: entry.status,
                },
            );
        }
        Self {
            source: DocumentSource::Document,
            timestamp: parsed.timestamp,
            roles,
        }
    }
}

/// Planner entries folded per general role
#[derive(Debug, Clone, Default)]
struct PlannerView {
    progress: Vec<u8>,
    statuses: Vec<RoleStatus>,
    completed_tasks: Option<u32>,
    total_tasks: Option<u32>,
    updated_at: Option<DateTime<Utc>>,
}

impl PlannerView {
    fn progress(&self) -> Option<u8> {
        if self.progress.is_empty() {
            return None;
        }
        let sum: u32 = self.progress.iter().map(|p| *p as u32).sum();
        Some((sum as f64 / self.progress.len() as f64).round() as u8)
    }

    /// Combined status of several specialized agents
    fn status(&self) -> Option<RoleStatus> {
        if self.statuses.is_empty() {
            None
        } else if self.statuses.contains(&RoleStatus::Blocked) {
            Some(RoleStatus::Blocked)
        } else if self.statuses.iter().all(|s| *s == RoleStatus::Completed) {
            Some(RoleStatus::Completed)
        } else if self.statuses.iter().all(|s| *s == RoleStatus::Pending) {
            Some(RoleStatus::Pending)
        } else {
            Some(RoleStatus::InProgress)
        }
    }
}

fn resolve_or_warn(registry: &RoleRegistry, key: &str, source: &str) -> Option<&'static str> {
    match registry.resolve(key) {
        Ok(role) => Some(role),
        Err(e) => {
            warn!("Ignoring entry from {}: {}", source, e);
            None
        }
    }
}

fn fold_planner(planner: &PlannerConfig, registry: &RoleRegistry) -> BTreeMap<&'static str, PlannerView> {
    let mut views: BTreeMap<&'static str, PlannerView> = BTreeMap::new();

    for (key, entry) in &planner.agents {
        let Some(role) = resolve_or_warn(registry, key, "planner config") else {
            continue;
        };
        let view = views.entry(role).or_default();

        if let Some(progress) = entry.progress {
            view.progress.push(clamp_percent(progress));
        }
        if let Some(status) = &entry.status {
            match status.parse::<RoleStatus>() {
                Ok(s) => view.statuses.push(s),
                Err(e) => warn!("Planner entry {}: {}", key, e),
            }
        }
        if let Some(completed) = entry.completed_tasks {
            view.completed_tasks = Some(view.completed_tasks.unwrap_or(0).saturating_add(completed));
        }
        if let Some(total) = entry.total_tasks {
            view.total_tasks = Some(view.total_tasks.unwrap_or(0).saturating_add(total));
        }
        let ts = entry.updated_at.or(planner.updated_at);
        view.updated_at = view.updated_at.max(ts);
    }

    views
}

/// Merge both sources into one record per general role
///
/// Pure; roles appear in the registry's general-role order.
pub fn merge_states(
    registry: &RoleRegistry,
    planner: &PlannerConfig,
    document: &DocumentState,
    precedence: MergePrecedence,
) -> Vec<AgentRole> {
    let planner_views = fold_planner(planner, registry);

    registry
        .general_roles()
        .iter()
        .map(|general| {
            let mut role = registry.blank_role(general);
            let planner_view = planner_views.get(general);
            let doc = document.roles.get(*general);

            let planner_fields = planner_view.map(|v| (v.progress(), v.status()));
            let doc_fields = doc.map(|d| (Some(d.progress), Some(d.status)));

            let planner_last = match precedence {
                MergePrecedence::Document => false,
                MergePrecedence::Planner => true,
                MergePrecedence::Newest => {
                    match (planner_view.and_then(|v| v.updated_at), document.timestamp) {
                        (Some(p), Some(d)) => p > d,
                        (Some(_), None) => true,
                        _ => false,
                    }
                }
            };
            let order = if planner_last {
                [doc_fields, planner_fields]
            } else {
                [planner_fields, doc_fields]
            };

            let mut status_reported = false;
            for (progress, status) in order.into_iter().flatten() {
                if let Some(progress) = progress {
                    role.progress = progress;
                }
                if let Some(status) = status {
                    role.status = status;
                    status_reported = true;
                }
            }

            if let Some(view) = planner_view {
                role.completed_tasks = view.completed_tasks;
                role.total_tasks = view.total_tasks;
                if let (Some(done), Some(total)) = (view.completed_tasks, view.total_tasks) {
                    if total > 0 {
                        role.progress =
                            clamp_percent((done as f64 / total as f64 * 100.0).round() as i64);
                    }
                }
            }

            if !status_reported {
                role.status = RoleStatus::from_progress(role.progress);
            }
            role
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAggregate {
    pub total_roles: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub completed: usize,
    pub average_progress: f64,
}

impl SyncAggregate {
    pub fn from_roles(roles: &[AgentRole]) -> Self {
        let count = |status: RoleStatus| roles.iter().filter(|r| r.status == status).count();
        let average_progress = if roles.is_empty() {
            0.0
        } else {
            let sum: u32 = roles.iter().map(|r| r.progress as u32).sum();
            (sum as f64 / roles.len() as f64 * 10.0).round() / 10.0
        };

        Self {
            total_roles: roles.len(),
            pending: count(RoleStatus::Pending),
            in_progress: count(RoleStatus::InProgress),
            blocked: count(RoleStatus::Blocked),
            completed: count(RoleStatus::Completed),
            average_progress,
        }
    }
}

/// Result of loading and merging both sources
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub roles: Vec<AgentRole>,
    pub planner_loaded: bool,
    pub document_source: DocumentSource,
}

/// Written to `.qmops/sync-report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub generated_at: DateTime<Utc>,
    pub precedence: MergePrecedence,
    pub planner_loaded: bool,
    pub document_source: DocumentSource,
    pub roles: Vec<AgentRole>,
    pub aggregate: SyncAggregate,
}

/// Loads both sources for one repository and merges them
#[derive(Debug, Clone)]
pub struct StateSync {
    registry: RoleRegistry,
    precedence: MergePrecedence,
    planner_path: PathBuf,
    snapshot_path: PathBuf,
    document_path: PathBuf,
    report_path: PathBuf,
}

impl StateSync {
    pub fn new(ctx: &RunContext) -> Self {
        let config = ctx.config();
        Self {
            registry: RoleRegistry::new(),
            precedence: config.sync.precedence,
            planner_path: ctx.resolve(&config.sync.planner_path),
            snapshot_path: ctx.resolve(&config.monitor.snapshot_path),
            document_path: ctx.resolve(&config.monitor.document_path),
            report_path: ctx.resolve(&config.sync.report_path),
        }
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    pub fn planner_path(&self) -> &Path {
        &self.planner_path
    }

    /// Planner config; missing or malformed is treated as empty
    pub async fn load_planner(&self) -> Option<PlannerConfig> {
        read_json_lenient("planner config", &self.planner_path).await
    }

    /// Snapshot first, scraped document second, empty otherwise
    pub async fn load_document_state(&self) -> DocumentState {
        if let Some(snapshot) =
            read_json_lenient::<SystemStatusSnapshot>("status snapshot", &self.snapshot_path).await
        {
            return DocumentState::from_snapshot(&snapshot, &self.registry);
        }

        let content = match tokio::fs::read_to_string(&self.document_path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        "Ignoring coordination document {}: {} (treated as empty)",
                        self.document_path.display(),
                        e
                    );
                }
                return DocumentState::default();
            }
        };

        let document =
            qmops_core::document::CoordinationDocument::from_content(&self.document_path, content);
        match document.section(STATUS_SECTION) {
            Some(body) => DocumentState::from_section(body, &self.registry),
            None => {
                warn!(
                    "No {} section in {} (treated as empty)",
                    STATUS_SECTION,
                    self.document_path.display()
                );
                DocumentState::default()
            }
        }
    }

    pub async fn sync_states(&self) -> SyncOutcome {
        let planner = self.load_planner().await;
        let document = self.load_document_state().await;
        debug!(
            "Sync sources: planner={}, document={:?}",
            planner.is_some(),
            document.source
        );

        SyncOutcome {
            roles: merge_states(
                &self.registry,
                &planner.clone().unwrap_or_default(),
                &document,
                self.precedence,
            ),
            planner_loaded: planner.is_some(),
            document_source: document.source,
        }
    }

    pub fn generate_sync_report(&self, outcome: &SyncOutcome) -> SyncReport {
        SyncReport {
            generated_at: Utc::now(),
            precedence: self.precedence,
            planner_loaded: outcome.planner_loaded,
            document_source: outcome.document_source,
            roles: outcome.roles.clone(),
            aggregate: SyncAggregate::from_roles(&outcome.roles),
        }
    }

    /// Sync, build the report and write it (fail-open)
    pub async fn run(&self) -> SyncReport {
        let outcome = self.sync_states().await;
        let report = self.generate_sync_report(&outcome);
        fail_open("sync_report", || write_json(&self.report_path, &report)).await;

        info!(
            "Role sync: {} in progress, {} completed, average {:.1}%",
            report.aggregate.in_progress, report.aggregate.completed, report.aggregate.average_progress
        );
        report
    }

    /// Write a pending skeleton planner config unless one exists
    ///
    /// Returns whether a file was written.
    pub async fn init_planner(&self) -> Result<bool> {
        if tokio::fs::try_exists(&self.planner_path).await? {
            return Ok(false);
        }
        write_json(&self.planner_path, &PlannerConfig::skeleton(&self.registry)).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn planner(entries: &[(&str, PlannerAgentEntry)]) -> PlannerConfig {
        PlannerConfig {
            updated_at: None,
            agents: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn doc(entries: &[(&str, u8, RoleStatus)], timestamp: Option<DateTime<Utc>>) -> DocumentState {
        DocumentState {
            source: DocumentSource::Document,
            timestamp,
            roles: entries
                .iter()
                .map(|(k, p, s)| {
                    (
                        k.to_string(),
                        DocumentRoleState {
                            progress: *p,
                            status: *s,
                        },
                    )
                })
                .collect(),
        }
    }

    fn role<'a>(roles: &'a [AgentRole], name: &str) -> &'a AgentRole {
        roles.iter().find(|r| r.key == name).unwrap()
    }

    #[test]
    fn test_document_wins_by_default() {
        let planner = planner(&[(
            "api-developer",
            PlannerAgentEntry {
                status: Some("blocked".to_string()),
                progress: Some(20),
                ..Default::default()
            },
        )]);
        let document = doc(&[("backend", 60, RoleStatus::InProgress)], None);

        let roles = merge_states(&RoleRegistry::new(), &planner, &document, MergePrecedence::Document);
        let backend = role(&roles, "backend");

        assert_eq!(backend.progress, 60);
        assert_eq!(backend.status, RoleStatus::InProgress);
        assert_eq!(roles.len(), 4);
        assert_eq!(role(&roles, "devops").status, RoleStatus::Pending);
    }

    #[test]
    fn test_planner_precedence_flips_the_order() {
        let planner = planner(&[(
            "backend",
            PlannerAgentEntry {
                status: Some("blocked".to_string()),
                progress: Some(20),
                ..Default::default()
            },
        )]);
        let document = doc(&[("backend", 60, RoleStatus::InProgress)], None);

        let roles = merge_states(&RoleRegistry::new(), &planner, &document, MergePrecedence::Planner);
        assert_eq!(role(&roles, "backend").progress, 20);
        assert_eq!(role(&roles, "backend").status, RoleStatus::Blocked);
    }

    #[test]
    fn test_newest_compares_timestamps() {
        let now = Utc::now();
        let entry = PlannerAgentEntry {
            progress: Some(90),
            updated_at: Some(now),
            ..Default::default()
        };
        let planner = planner(&[("qa", entry)]);

        let older_doc = doc(&[("qa", 10, RoleStatus::InProgress)], Some(now - Duration::hours(1)));
        let roles = merge_states(&RoleRegistry::new(), &planner, &older_doc, MergePrecedence::Newest);
        assert_eq!(role(&roles, "qa").progress, 90);

        let newer_doc = doc(&[("qa", 10, RoleStatus::InProgress)], Some(now + Duration::hours(1)));
        let roles = merge_states(&RoleRegistry::new(), &planner, &newer_doc, MergePrecedence::Newest);
        assert_eq!(role(&roles, "qa").progress, 10);
    }

    #[test]
    fn test_task_counts_are_summed_and_override_progress() {
        let planner = planner(&[
            (
                "test-engineer",
                PlannerAgentEntry {
                    completed_tasks: Some(1),
                    total_tasks: Some(4),
                    ..Default::default()
                },
            ),
            (
                "security-auditor",
                PlannerAgentEntry {
                    completed_tasks: Some(2),
                    total_tasks: Some(4),
                    ..Default::default()
                },
            ),
        ]);
        let document = doc(&[("qa", 90, RoleStatus::InProgress)], None);

        let roles = merge_states(&RoleRegistry::new(), &planner, &document, MergePrecedence::Document);
        let qa = role(&roles, "qa");

        assert_eq!(qa.completed_tasks, Some(3));
        assert_eq!(qa.total_tasks, Some(8));
        assert_eq!(qa.progress, 38);
        assert_eq!(qa.status, RoleStatus::InProgress);
    }

    #[test]
    fn test_huge_task_counts_saturate() {
        let entry = PlannerAgentEntry {
            completed_tasks: Some(u32::MAX),
            total_tasks: Some(u32::MAX),
            ..Default::default()
        };
        let planner = planner(&[("test-engineer", entry.clone()), ("security-auditor", entry)]);

        let roles = merge_states(
            &RoleRegistry::new(),
            &planner,
            &DocumentState::default(),
            MergePrecedence::Document,
        );
        let qa = role(&roles, "qa");

        assert_eq!(qa.completed_tasks, Some(u32::MAX));
        assert_eq!(qa.total_tasks, Some(u32::MAX));
        assert_eq!(qa.progress, 100);
    }

    #[test]
    fn test_unknown_keys_and_bad_status_are_skipped() {
        let planner = planner(&[
            (
                "astrologer",
                PlannerAgentEntry {
                    progress: Some(50),
                    ..Default::default()
                },
            ),
            (
                "ui-developer",
                PlannerAgentEntry {
                    status: Some("exploded".to_string()),
                    progress: Some(250),
                    ..Default::default()
                },
            ),
        ]);

        let roles = merge_states(
            &RoleRegistry::new(),
            &planner,
            &DocumentState::default(),
            MergePrecedence::Document,
        );
        let frontend = role(&roles, "frontend");
        assert_eq!(frontend.progress, 100);
        assert_eq!(frontend.status, RoleStatus::Completed);
    }

    #[test]
    fn test_aggregate_counts() {
        let registry = RoleRegistry::new();
        let mut roles: Vec<AgentRole> = registry
            .general_roles()
            .iter()
            .map(|r| registry.blank_role(r))
            .collect();
        roles[0].progress = 100;
        roles[0].status = RoleStatus::Completed;
        roles[1].progress = 50;
        roles[1].status = RoleStatus::InProgress;

        let aggregate = SyncAggregate::from_roles(&roles);
        assert_eq!(aggregate.total_roles, 4);
        assert_eq!(aggregate.completed, 1);
        assert_eq!(aggregate.in_progress, 1);
        assert_eq!(aggregate.pending, 2);
        assert_eq!(aggregate.average_progress, 37.5);
    }

    #[test]
    fn test_planner_accepts_snake_case_fields() {
        let json = r#"{"updated_at":"2024-05-01T00:00:00Z","agents":{"api-developer":{"completed_tasks":1,"total_tasks":2}}}"#;
        let planner: PlannerConfig = serde_json::from_str(json).unwrap();
        assert!(planner.updated_at.is_some());
        assert_eq!(planner.agents["api-developer"].total_tasks, Some(2));
    }
}
