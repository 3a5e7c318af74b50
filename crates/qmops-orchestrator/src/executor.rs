//! Child execution and progress events
//!
//! An executor does the work for one child and reports through a channel.
//! The registry owns the tree: it applies events monotonically, persists
//! them and republishes them to observers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qmops_core::{NodeStatus, QmopsError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::ChildAgent;

/// Reported by an executor while it works on a child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress { child_id: String, progress: u8 },
    Completed { child_id: String },
    Failed { child_id: String, reason: String },
}

impl ProgressEvent {
    pub fn child_id(&self) -> &str {
        match self {
            ProgressEvent::Progress { child_id, .. }
            | ProgressEvent::Completed { child_id }
            | ProgressEvent::Failed { child_id, .. } => child_id,
        }
    }
}

/// Published to observers after the registry applied a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyUpdate {
    pub coordinator_id: String,
    /// `None` for coordinator-level changes
    pub child_id: Option<String>,
    pub status: NodeStatus,
    pub progress: u8,
    pub at: DateTime<Utc>,
}

/// Runs the work for one child
#[async_trait]
pub trait ChildExecutor: Send + Sync {
    /// Drive `child` to completion, reporting through `events`
    ///
    /// Returning an error fails the child and its coordinator. Implementations
    /// should resume from `child.progress` when it is non-zero.
    async fn execute(&self, child: &ChildAgent, events: mpsc::Sender<ProgressEvent>) -> Result<()>;
}

/// Fixed-increment simulation: one step every `step_delay`
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    step_percent: u8,
    step_delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(step_percent: u8, step_delay: Duration) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            step_delay,
        }
    }
}

async fn send(events: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| QmopsError::Hierarchy("progress channel closed".to_string()))
}

#[async_trait]
impl ChildExecutor for SimulatedExecutor {
    async fn execute(&self, child: &ChildAgent, events: mpsc::Sender<ProgressEvent>) -> Result<()> {
        let mut progress = child.progress.min(100);
        debug!("Simulating {} from {}%", child.id, progress);

        send(
            &events,
            ProgressEvent::Progress {
                child_id: child.id.clone(),
                progress,
            },
        )
        .await?;

        while progress < 100 {
            tokio::time::sleep(self.step_delay).await;
            progress = progress.saturating_add(self.step_percent).min(100);
            send(
                &events,
                ProgressEvent::Progress {
                    child_id: child.id.clone(),
                    progress,
                },
            )
            .await?;
        }

        send(
            &events,
            ProgressEvent::Completed {
                child_id: child.id.clone(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_steps_are_fixed_and_end_completed() {
        let executor = SimulatedExecutor::new(30, Duration::from_millis(1));
        let child = ChildAgent::new("c1", "child", "backend");
        let (tx, mut rx) = mpsc::channel(64);

        executor.execute(&child, tx).await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        let progress: Vec<u8> = seen
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, [0, 30, 60, 90, 100]);
        assert_eq!(
            seen.last(),
            Some(&ProgressEvent::Completed {
                child_id: "c1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn simulated_resumes_from_persisted_progress() {
        let executor = SimulatedExecutor::new(25, Duration::from_millis(1));
        let mut child = ChildAgent::new("c1", "child", "backend");
        child.progress = 60;
        let (tx, mut rx) = mpsc::channel(64);

        executor.execute(&child, tx).await.unwrap();

        let mut first = None;
        while let Some(event) = rx.recv().await {
            if let (None, ProgressEvent::Progress { progress, .. }) = (&first, &event) {
                first = Some(*progress);
            }
        }
        assert_eq!(first, Some(60));
    }

    #[tokio::test]
    async fn closed_channel_is_an_error() {
        let executor = SimulatedExecutor::new(50, Duration::from_millis(1));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let child = ChildAgent::new("c1", "child", "qa");
        assert!(executor.execute(&child, tx).await.is_err());
    }
}
