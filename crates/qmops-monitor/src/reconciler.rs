//! Monitoring cycle and coordination document reconciliation
//!
//! Each cycle builds a fresh [`SystemStatusSnapshot`], persists it as the
//! structured source of truth, then regenerates the `current-status` section
//! of the coordination document from it. Every other section is left as is.

use chrono::Utc;
use qmops_core::document::{render_status_section, CoordinationDocument, STATUS_SECTION};
use qmops_core::fail_open::fail_open;
use qmops_core::{Result, RunContext, SystemStatusSnapshot};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::health::HealthMonitor;
use crate::progress::detect_agent_progress;
use crate::snapshot::SnapshotStore;

pub struct Reconciler {
    monitor: HealthMonitor,
    store: SnapshotStore,
    document_path: PathBuf,
}

impl Reconciler {
    pub fn new(ctx: &RunContext) -> Result<Self> {
        let config = ctx.config().monitor.clone();
        Ok(Self {
            store: SnapshotStore::new(ctx.resolve(&config.snapshot_path)),
            document_path: ctx.resolve(&config.document_path),
            monitor: HealthMonitor::new(config)?,
        })
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Full cycle: checks, progress heuristic, snapshot, document
    ///
    /// Never fails; unhealthy endpoints end up in `critical_errors` and write
    /// failures are logged.
    pub async fn run_cycle(&self) -> SystemStatusSnapshot {
        let previous = self.store.load().await.unwrap_or_else(SystemStatusSnapshot::empty);
        let checks = self.monitor.run_checks().await;
        let config = self.monitor.config();

        let snapshot = SystemStatusSnapshot {
            timestamp: Utc::now(),
            backend_health: checks.backend.status,
            frontend_health: checks.frontend.status,
            critical_errors: checks.critical_errors(),
            agent_progress: detect_agent_progress(
                &previous.agent_progress,
                &checks,
                &config.role_surfaces,
                config.progress_step,
            ),
        };

        info!(
            "Monitoring cycle: overall {}, {} critical errors",
            snapshot.overall(),
            snapshot.critical_errors.len()
        );

        fail_open("status_snapshot", || self.store.save(&snapshot)).await;
        fail_open("coordination_document", || {
            self.update_coordination_document(&snapshot)
        })
        .await;

        snapshot
    }

    /// Re-render the document from the last snapshot without checking anything
    pub async fn update_only(&self) -> SystemStatusSnapshot {
        let snapshot = match self.store.load().await {
            Some(snapshot) => snapshot,
            None => {
                info!(
                    "No snapshot at {}, rendering an empty status",
                    self.store.path().display()
                );
                SystemStatusSnapshot::empty()
            }
        };

        fail_open("coordination_document", || {
            self.update_coordination_document(&snapshot)
        })
        .await;
        snapshot
    }

    /// Replace only the `current-status` section and write the file back
    pub async fn update_coordination_document(&self, snapshot: &SystemStatusSnapshot) -> Result<()> {
        let mut document = CoordinationDocument::load_or_seed(&self.document_path).await?;
        document.replace_section(STATUS_SECTION, &render_status_section(snapshot));
        document.write().await?;
        info!("Updated {}", self.document_path.display());
        Ok(())
    }
}
