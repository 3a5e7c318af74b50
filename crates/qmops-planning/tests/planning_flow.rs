//! Decomposition and state sync against on-disk sources

use qmops_core::document::{render_status_section, CoordinationDocument, STATUS_SECTION};
use qmops_core::{MergePrecedence, QmopsConfig, RoleStatus, RunContext, SystemStatusSnapshot};
use qmops_planning::sync::DocumentSource;
use qmops_planning::{example_work_order, full_stack_work_order, Decomposer, StateSync};
use tempfile::TempDir;

#[test]
fn worked_example_leaves_budget_unallocated() {
    let decomposer = Decomposer::new(QmopsConfig::default().decomposition);
    let assignment = decomposer.decompose(&example_work_order());

    assert_eq!(assignment.tasks.len(), 2);
    assert!(assignment.tasks.iter().all(|t| t.assigned_role == "frontend"));

    let ui = &assignment.tasks[0];
    assert_eq!(ui.id, "WO-EXAMPLE-ui");
    assert_eq!(ui.estimated_hours, 40.0);

    let testing = &assignment.tasks[1];
    assert_eq!(testing.name, "Testing");
    assert_eq!(testing.estimated_hours, 8.0);

    assert!(!assignment.tasks.iter().any(|t| t.id.ends_with("-backend")));
    assert_eq!(assignment.duration.total_hours, 48.0);
    assert_eq!(assignment.duration.unallocated_hours, 32.0);
    assert_eq!(assignment.duration.estimated_days, 6);
    assert!(!assignment.duration.parallel_execution);
}

#[test]
fn decomposition_is_deterministic() {
    let decomposer = Decomposer::new(QmopsConfig::default().decomposition);
    let order = full_stack_work_order();

    let first = decomposer.decompose(&order);
    let second = decomposer.decompose(&order);

    assert_eq!(first.analysis, second.analysis);
    assert_eq!(first.tasks, second.tasks);
    assert_eq!(first.duration, second.duration);
    assert!(first.duration.parallel_execution);
}

#[tokio::test]
async fn sync_prefers_snapshot_over_document_text() {
    let repo = TempDir::new().unwrap();
    let ctx = RunContext::new(repo.path(), QmopsConfig::default());

    let mut doc_snapshot = SystemStatusSnapshot::empty();
    doc_snapshot.agent_progress.insert("backend".to_string(), 10);
    let mut document = CoordinationDocument::from_content(
        repo.path().join("COORDINATION.md"),
        CoordinationDocument::template(),
    );
    document.replace_section(STATUS_SECTION, &render_status_section(&doc_snapshot));
    document.write().await.unwrap();

    let sync = StateSync::new(&ctx);
    let outcome = sync.sync_states().await;
    assert_eq!(outcome.document_source, DocumentSource::Document);
    assert!(!outcome.planner_loaded);
    assert_eq!(outcome.roles[0].progress, 10);

    let mut snapshot = SystemStatusSnapshot::empty();
    snapshot.agent_progress.insert("backend".to_string(), 70);
    std::fs::create_dir_all(repo.path().join(".qmops")).unwrap();
    std::fs::write(
        repo.path().join(".qmops/status.json"),
        serde_json::to_string(&snapshot).unwrap(),
    )
    .unwrap();

    let outcome = sync.sync_states().await;
    assert_eq!(outcome.document_source, DocumentSource::Snapshot);
    assert_eq!(outcome.roles[0].progress, 70);
}

#[tokio::test]
async fn malformed_planner_is_treated_as_empty() {
    let repo = TempDir::new().unwrap();
    std::fs::create_dir_all(repo.path().join(".qmops")).unwrap();
    std::fs::write(repo.path().join(".qmops/planner.json"), "{ definitely not json").unwrap();

    let sync = StateSync::new(&RunContext::new(repo.path(), QmopsConfig::default()));
    let report = sync.run().await;

    assert!(!report.planner_loaded);
    assert_eq!(report.document_source, DocumentSource::None);
    assert_eq!(report.aggregate.pending, 4);
    assert!(sync.report_path().exists());
}

#[tokio::test]
async fn planner_counts_drive_report() {
    let repo = TempDir::new().unwrap();
    let mut config = QmopsConfig::default();
    config.sync.precedence = MergePrecedence::Planner;
    let sync = StateSync::new(&RunContext::new(repo.path(), config));

    assert!(sync.init_planner().await.unwrap());
    assert!(!sync.init_planner().await.unwrap());

    std::fs::write(
        sync.planner_path(),
        r#"{
            "agents": {
                "api-developer": {"status": "in_progress", "completedTasks": 1, "totalTasks": 2},
                "database-engineer": {"status": "completed", "completedTasks": 3, "totalTasks": 3},
                "deployment-engineer": {"status": "done", "progress": 100}
            }
        }"#,
    )
    .unwrap();

    let report = sync.run().await;
    let backend = report.roles.iter().find(|r| r.key == "backend").unwrap();
    assert_eq!(backend.completed_tasks, Some(4));
    assert_eq!(backend.total_tasks, Some(5));
    assert_eq!(backend.progress, 80);
    assert_eq!(backend.status, RoleStatus::InProgress);

    assert_eq!(report.aggregate.completed, 1);
    assert_eq!(report.aggregate.in_progress, 1);

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(sync.report_path()).unwrap()).unwrap();
    assert_eq!(written["precedence"], "planner");
    assert_eq!(written["roles"][0]["completedTasks"], 4);
}
