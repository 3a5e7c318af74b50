//! Hierarchical agent registry
//!
//! Owns the coordinator tree. Every mutation is persisted through the
//! single-writer task and broadcast to subscribers. Children of a coordinator
//! run strictly one after another.

use chrono::Utc;
use qmops_core::config::HierarchyConfig;
use qmops_core::fsutil::read_json;
use qmops_core::{NodeStatus, QmopsError, Result, RunContext};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::executor::{ChildExecutor, HierarchyUpdate, ProgressEvent, SimulatedExecutor};
use crate::model::{ChildAgent, CoordinatorNode, HierarchyState};
use crate::persist::PersistenceHandle;

const EVENT_BUFFER: usize = 64;
const OBSERVER_BUFFER: usize = 256;

/// How a launch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Completed,
    /// A child failed; the coordinator is failed too
    Failed { child_id: String, reason: String },
    /// Terminal before the launch started; nothing ran
    AlreadyFinished(NodeStatus),
    NotFound,
}

pub struct HierarchyManager {
    state: HierarchyState,
    path: PathBuf,
    persistence: PersistenceHandle,
    observers: broadcast::Sender<HierarchyUpdate>,
    config: HierarchyConfig,
}

impl HierarchyManager {
    /// Load the persisted tree (if any) and start the writer task
    ///
    /// A malformed file is logged and treated as an empty registry.
    pub async fn open(ctx: &RunContext) -> Result<Self> {
        let config = ctx.config().hierarchy.clone();
        let path = ctx.resolve(&config.path);

        let state = match read_json::<HierarchyState>(&path).await {
            Ok(Some(state)) => {
                debug!("Loaded hierarchy from {}", path.display());
                state
            }
            Ok(None) => HierarchyState::default(),
            Err(QmopsError::Serialization(e)) => {
                warn!(
                    "Ignoring malformed hierarchy {}: {} (starting empty)",
                    path.display(),
                    e
                );
                HierarchyState::default()
            }
            Err(e) => return Err(e),
        };

        let (persistence, _task) = PersistenceHandle::spawn(path.clone());
        let (observers, _) = broadcast::channel(OBSERVER_BUFFER);

        Ok(Self {
            state,
            path,
            persistence,
            observers,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &HierarchyState {
        &self.state
    }

    pub fn root(&self) -> Option<&CoordinatorNode> {
        self.state.root.as_ref()
    }

    /// Receive every applied change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<HierarchyUpdate> {
        self.observers.subscribe()
    }

    /// Executor built from the configured step and delay
    pub fn default_executor(&self) -> SimulatedExecutor {
        SimulatedExecutor::new(
            self.config.step_percent,
            Duration::from_millis(self.config.step_delay_ms),
        )
    }

    /// Replace the root with a fresh idle coordinator and persist it
    pub async fn create_hierarchy(
        &mut self,
        id: &str,
        name: &str,
        children: Vec<ChildAgent>,
    ) -> Result<&CoordinatorNode> {
        if let Some(existing) = &self.state.root {
            if existing.status == NodeStatus::Running {
                warn!(
                    "Replacing coordinator {} that is still marked running",
                    existing.id
                );
            }
        }

        let node = CoordinatorNode::new(id, name, children);
        info!(
            "Created coordinator {} with {} children",
            node.id,
            node.children.len()
        );
        self.state.root = Some(node);
        self.persist().await?;
        self.persistence.flush().await?;
        self.publish(id, None);

        self.state
            .root
            .as_ref()
            .ok_or_else(|| QmopsError::Hierarchy("root vanished after creation".to_string()))
    }

    /// Run every unfinished child of `id` in order
    ///
    /// Unknown ids are logged and reported as [`LaunchOutcome::NotFound`].
    pub async fn launch_coordinator(&mut self, id: &str, executor: &dyn ChildExecutor) -> LaunchOutcome {
        let Some(coordinator) = self.state.coordinator_mut(id) else {
            error!("Coordinator {} not found", id);
            return LaunchOutcome::NotFound;
        };

        if coordinator.status.is_terminal() {
            info!("Coordinator {} already {}", id, coordinator.status);
            return LaunchOutcome::AlreadyFinished(coordinator.status);
        }
        if let Err(e) = coordinator.set_status(NodeStatus::Running) {
            error!("Cannot start coordinator {}: {}", id, e);
            return LaunchOutcome::AlreadyFinished(coordinator.status);
        }
        let pending: Vec<ChildAgent> = coordinator
            .children
            .iter()
            .filter(|c| c.status != NodeStatus::Completed)
            .cloned()
            .collect();
        info!(
            "Launching coordinator {} ({} children to run)",
            id,
            pending.len()
        );
        self.persist_or_warn().await;
        self.publish(id, None);

        for child in pending {
            if let Err(reason) = self.run_child(id, &child, executor).await {
                error!("Child {} of {} failed: {}", child.id, id, reason);
                self.mark_failed(id, &child.id).await;
                self.flush_or_warn().await;
                return LaunchOutcome::Failed {
                    child_id: child.id,
                    reason,
                };
            }
        }

        let finished = match self.state.coordinator_mut(id) {
            Some(coordinator) => coordinator.set_status(NodeStatus::Completed),
            None => Err(QmopsError::CoordinatorNotFound(id.to_string())),
        };
        if let Err(e) = finished {
            error!("Coordinator {} could not complete: {}", id, e);
            self.flush_or_warn().await;
            return LaunchOutcome::Failed {
                child_id: String::new(),
                reason: e.to_string(),
            };
        }

        info!("Coordinator {} completed", id);
        self.persist_or_warn().await;
        self.flush_or_warn().await;
        self.publish(id, None);
        LaunchOutcome::Completed
    }

    /// Resume a root left `running` by an interrupted process
    pub async fn recover(&mut self, executor: &dyn ChildExecutor) -> Option<LaunchOutcome> {
        let id = match &self.state.root {
            Some(root) if root.status == NodeStatus::Running => root.id.clone(),
            Some(root) => {
                info!("Coordinator {} is {}, nothing to recover", root.id, root.status);
                return None;
            }
            None => {
                info!("No hierarchy to recover");
                return None;
            }
        };

        info!("Recovering coordinator {}", id);
        Some(self.launch_coordinator(&id, executor).await)
    }

    /// Text tree with progress bars
    pub fn show_progress(&self) -> String {
        let Some(root) = &self.state.root else {
            return "No hierarchy defined\n".to_string();
        };

        let mut out = format!(
            "{} ({}) [{}] {} {:>3}%\n",
            root.name,
            root.id,
            root.status,
            progress_bar(root.progress(), 20),
            root.progress()
        );
        let last = root.children.len().saturating_sub(1);
        for (i, child) in root.children.iter().enumerate() {
            let branch = if i == last { "└─" } else { "├─" };
            out.push_str(&format!(
                "  {} {:<28} {:<9} {} {:>3}% [{}]\n",
                branch,
                truncate(&child.name, 28),
                child.agent_type,
                progress_bar(child.progress, 20),
                child.progress,
                child.status
            ));
        }
        out
    }

    /// Wait for queued writes
    pub async fn flush(&self) -> Result<()> {
        self.persistence.flush().await
    }

    async fn run_child(
        &mut self,
        coordinator_id: &str,
        child: &ChildAgent,
        executor: &dyn ChildExecutor,
    ) -> std::result::Result<(), String> {
        debug!("Starting child {}", child.id);
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

        let execution = executor.execute(child, tx);
        let apply = async {
            let mut failure = None;
            while let Some(event) = rx.recv().await {
                if let Some(reason) = self.apply_event(coordinator_id, event).await {
                    failure.get_or_insert(reason);
                }
            }
            failure
        };
        let (result, failure) = tokio::join!(execution, apply);

        if let Err(e) = result {
            return Err(e.to_string());
        }
        if let Some(reason) = failure {
            return Err(reason);
        }

        match self
            .state
            .coordinator(coordinator_id)
            .and_then(|c| c.children.iter().find(|ch| ch.id == child.id))
        {
            Some(done) if done.status == NodeStatus::Completed => Ok(()),
            Some(unfinished) => Err(format!(
                "executor returned with child at {}% ({})",
                unfinished.progress, unfinished.status
            )),
            None => Err("child disappeared from the hierarchy".to_string()),
        }
    }

    /// Apply one event; returns a failure reason for `Failed` events
    async fn apply_event(&mut self, coordinator_id: &str, event: ProgressEvent) -> Option<String> {
        let Some(coordinator) = self.state.coordinator_mut(coordinator_id) else {
            warn!("Event for unknown coordinator {}", coordinator_id);
            return None;
        };
        let child_id = event.child_id().to_string();
        let Some(child) = coordinator.child_mut(&child_id) else {
            warn!("Event for unknown child {} of {}", child_id, coordinator_id);
            return None;
        };

        let (changed, failure) = match event {
            ProgressEvent::Progress { progress, .. } => match child.advance(progress) {
                Ok(changed) => (changed, None),
                Err(e) => {
                    warn!("Ignoring progress for {}: {}", child_id, e);
                    (false, None)
                }
            },
            ProgressEvent::Completed { .. } => match child.complete() {
                Ok(()) => (true, None),
                Err(e) => {
                    warn!("Ignoring completion for {}: {}", child_id, e);
                    (false, None)
                }
            },
            ProgressEvent::Failed { reason, .. } => (false, Some(reason)),
        };

        if changed {
            debug!("{} -> {}% ({})", child_id, child.progress, child.status);
            coordinator.touch();
            self.persist_or_warn().await;
            self.publish(coordinator_id, Some(&child_id));
        }
        failure
    }

    async fn mark_failed(&mut self, coordinator_id: &str, child_id: &str) {
        if let Some(coordinator) = self.state.coordinator_mut(coordinator_id) {
            if let Some(child) = coordinator.child_mut(child_id) {
                if let Err(e) = child.fail() {
                    warn!("Cannot fail child {}: {}", child_id, e);
                }
            }
            if let Err(e) = coordinator.set_status(NodeStatus::Failed) {
                warn!("Cannot fail coordinator {}: {}", coordinator_id, e);
            }
        }
        self.persist_or_warn().await;
        self.publish(coordinator_id, Some(child_id));
        self.publish(coordinator_id, None);
    }

    async fn persist(&self) -> Result<()> {
        self.persistence.save(&self.state).await
    }

    async fn persist_or_warn(&self) {
        if let Err(e) = self.persist().await {
            warn!("Hierarchy not persisted: {}", e);
        }
    }

    async fn flush_or_warn(&self) {
        if let Err(e) = self.persistence.flush().await {
            warn!("{}", e);
        }
    }

    fn publish(&self, coordinator_id: &str, child_id: Option<&str>) {
        let Some(coordinator) = self.state.coordinator(coordinator_id) else {
            return;
        };
        let (status, progress) = match child_id.and_then(|id| coordinator.children.iter().find(|c| c.id == id)) {
            Some(child) => (child.status, child.progress),
            None => (coordinator.status, coordinator.progress()),
        };

        // No receivers is fine
        let _ = self.observers.send(HierarchyUpdate {
            coordinator_id: coordinator_id.to_string(),
            child_id: child_id.map(str::to_string),
            status,
            progress,
            at: Utc::now(),
        });
    }
}

fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (progress.min(100) as usize * width) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 10), "[----------]");
        assert_eq!(progress_bar(50, 10), "[#####-----]");
        assert_eq!(progress_bar(100, 10), "[##########]");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long child name", 6), "a ver…");
    }
}
