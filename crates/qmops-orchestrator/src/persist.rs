//! Single-writer persistence task for the hierarchy file
//!
//! All writes within a process go through one task, in order, and every write
//! is an atomic whole-file replace. Other processes writing the same file
//! still race; the last rename wins.

use qmops_core::fsutil::write_json;
use qmops_core::{QmopsError, Result};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::HierarchyState;

enum PersistCommand {
    Save(Box<HierarchyState>),
    /// Reply with the first write error since the previous flush
    Flush(oneshot::Sender<Option<String>>),
}

/// Handle to the writer task; cheap to clone
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<PersistCommand>,
}

impl std::fmt::Debug for PersistCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistCommand::Save(_) => write!(f, "Save"),
            PersistCommand::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl PersistenceHandle {
    /// Start the writer task for `path`
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<PersistCommand>(64);

        let task = tokio::spawn(async move {
            let mut pending_error: Option<String> = None;

            while let Some(command) = rx.recv().await {
                match command {
                    PersistCommand::Save(state) => {
                        // Only the newest queued state matters
                        let mut latest = state;
                        let mut flushes = Vec::new();
                        while let Ok(next) = rx.try_recv() {
                            match next {
                                PersistCommand::Save(s) => latest = s,
                                PersistCommand::Flush(reply) => {
                                    flushes.push(reply);
                                    break;
                                }
                            }
                        }

                        match write_json(&path, &*latest).await {
                            Ok(()) => debug!("Persisted hierarchy to {}", path.display()),
                            Err(e) => {
                                warn!("Failed to persist hierarchy to {}: {}", path.display(), e);
                                pending_error.get_or_insert_with(|| e.to_string());
                            }
                        }

                        for reply in flushes {
                            let _ = reply.send(pending_error.take());
                        }
                    }
                    PersistCommand::Flush(reply) => {
                        let _ = reply.send(pending_error.take());
                    }
                }
            }
        });

        (Self { tx }, task)
    }

    /// Queue a snapshot of the tree for writing
    pub async fn save(&self, state: &HierarchyState) -> Result<()> {
        self.tx
            .send(PersistCommand::Save(Box::new(state.clone())))
            .await
            .map_err(|_| QmopsError::Hierarchy("persistence task stopped".to_string()))
    }

    /// Wait until every queued write is on disk
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PersistCommand::Flush(reply_tx))
            .await
            .map_err(|_| QmopsError::Hierarchy("persistence task stopped".to_string()))?;

        match reply_rx.await {
            Ok(None) => Ok(()),
            Ok(Some(error)) => Err(QmopsError::Hierarchy(format!("hierarchy write failed: {}", error))),
            Err(_) => Err(QmopsError::Hierarchy("persistence task stopped".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildAgent, CoordinatorNode};
    use qmops_core::fsutil::read_json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn last_saved_state_is_on_disk_after_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".qmops/hierarchy.json");
        let (handle, _task) = PersistenceHandle::spawn(path.clone());

        let mut state = HierarchyState {
            root: Some(CoordinatorNode::new(
                "root",
                "Root",
                vec![ChildAgent::new("a", "a", "backend")],
            )),
        };
        for progress in [10, 20, 30] {
            if let Some(root) = state.root.as_mut() {
                root.children[0].progress = progress;
            }
            handle.save(&state).await.unwrap();
        }
        handle.flush().await.unwrap();

        let loaded: HierarchyState = read_json(&path).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn write_errors_surface_on_flush() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail
        let path = dir.path().join("hierarchy.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let (handle, _task) = PersistenceHandle::spawn(path);

        handle.save(&HierarchyState::default()).await.unwrap();
        assert!(handle.flush().await.is_err());
        // Error is reported once
        assert!(handle.flush().await.is_ok());
    }
}
