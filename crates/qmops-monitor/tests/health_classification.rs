//! Health classification and reconciliation against a local axum server

use axum::{http::StatusCode, routing::get, Router};
use qmops_core::document::{
    parse_status_section, CoordinationDocument, DATABASE_SECTION, STATUS_SECTION,
};
use qmops_core::{HealthStatus, QmopsConfig, RunContext};
use qmops_monitor::{HealthChecker, Reconciler};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;

async fn spawn_fixture() -> SocketAddr {
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/ok", get(|| async { "ok" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn unused_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn ok_response_is_healthy() {
    let addr = spawn_fixture().await;
    let checker = HealthChecker::new().unwrap();

    let check = checker
        .check_endpoint("backend", &format!("http://{}/ok", addr), Duration::from_secs(2))
        .await;

    assert_eq!(check.status, HealthStatus::Healthy);
    assert_eq!(check.http_status, Some(200));
    assert!(check.error_line().is_none());
}

#[tokio::test]
async fn server_error_is_degraded() {
    let addr = spawn_fixture().await;
    let checker = HealthChecker::new().unwrap();

    let check = checker
        .check_endpoint("backend", &format!("http://{}/broken", addr), Duration::from_secs(2))
        .await;

    assert_eq!(check.status, HealthStatus::Degraded);
    assert_eq!(check.http_status, Some(500));
}

#[tokio::test]
async fn no_response_within_timeout_is_critical() {
    let addr = spawn_fixture().await;
    let checker = HealthChecker::new().unwrap();

    let check = checker
        .check_endpoint("backend", &format!("http://{}/slow", addr), Duration::from_millis(200))
        .await;

    assert_eq!(check.status, HealthStatus::Critical);
    assert_eq!(check.http_status, None);
    assert!(check.latency_ms < 5_000);
    assert!(check.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn refused_connection_is_critical() {
    let addr = unused_port().await;
    let checker = HealthChecker::new().unwrap();

    let check = checker
        .check_endpoint("frontend", &format!("http://{}/", addr), Duration::from_secs(1))
        .await;

    assert_eq!(check.status, HealthStatus::Critical);
}

#[tokio::test]
async fn cycle_updates_status_section_and_preserves_others() {
    let addr = spawn_fixture().await;
    let dead = unused_port().await;
    let repo = TempDir::new().unwrap();

    let mut config = QmopsConfig::default();
    config.monitor.backend_url = format!("http://{}", addr);
    config.monitor.frontend_url = format!("http://{}", dead);
    config.monitor.critical_paths = vec!["/ok".to_string(), "/broken".to_string()];
    config.monitor.timeout_ms = 1_000;
    let ctx = RunContext::new(repo.path(), config);

    let database_body = "## Database Tracking\n\nMigration 0042 applied by hand.\n";
    let mut seeded = CoordinationDocument::from_content(
        repo.path().join("COORDINATION.md"),
        CoordinationDocument::template(),
    );
    seeded.replace_section(DATABASE_SECTION, database_body);
    seeded.write().await.unwrap();

    let reconciler = Reconciler::new(&ctx).unwrap();
    let snapshot = reconciler.run_cycle().await;

    assert_eq!(snapshot.backend_health, HealthStatus::Healthy);
    assert_eq!(snapshot.frontend_health, HealthStatus::Critical);
    assert_eq!(snapshot.critical_errors.len(), 2);
    assert_eq!(snapshot.agent_progress["backend"], 5);
    assert_eq!(snapshot.agent_progress["frontend"], 0);
    assert_eq!(snapshot.agent_progress["qa"], 0);

    let document = CoordinationDocument::load_or_seed(reconciler.document_path())
        .await
        .unwrap();
    assert_eq!(document.section(DATABASE_SECTION), Some(database_body));

    let parsed = parse_status_section(document.section(STATUS_SECTION).unwrap());
    assert_eq!(parsed.backend_health, Some(HealthStatus::Healthy));
    assert_eq!(parsed.frontend_health, Some(HealthStatus::Critical));

    assert_eq!(reconciler.store().load().await, Some(snapshot));
}

#[tokio::test]
async fn update_only_renders_last_snapshot_without_checks() {
    let repo = TempDir::new().unwrap();
    let mut config = QmopsConfig::default();
    // Nothing listens here; update-only must not care
    config.monitor.backend_url = "http://127.0.0.1:9".to_string();
    let ctx = RunContext::new(repo.path(), config);
    let reconciler = Reconciler::new(&ctx).unwrap();

    let snapshot = reconciler.update_only().await;
    assert_eq!(snapshot.backend_health, HealthStatus::Unknown);

    let document = CoordinationDocument::load_or_seed(reconciler.document_path())
        .await
        .unwrap();
    let parsed = parse_status_section(document.section(STATUS_SECTION).unwrap());
    assert_eq!(parsed.backend_health, Some(HealthStatus::Unknown));
    assert!(document.section(DATABASE_SECTION).is_some());
}
