//! Latest-snapshot persistence (`.qmops/status.json`)

use qmops_core::fsutil::{read_json_lenient, write_json};
use qmops_core::{Result, SystemStatusSnapshot};
use std::path::{Path, PathBuf};

/// Structured source of truth for the current status
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last persisted snapshot; missing or malformed files yield `None`
    pub async fn load(&self) -> Option<SystemStatusSnapshot> {
        read_json_lenient("status snapshot", &self.path).await
    }

    pub async fn save(&self, snapshot: &SystemStatusSnapshot) -> Result<()> {
        write_json(&self.path, snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmops_core::HealthStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join(".qmops/status.json"));
        assert!(store.load().await.is_none());

        let mut snapshot = SystemStatusSnapshot::empty();
        snapshot.backend_health = HealthStatus::Healthy;
        snapshot.agent_progress.insert("backend".to_string(), 35);
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.load().await, Some(snapshot));
    }

    #[tokio::test]
    async fn malformed_snapshot_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(SnapshotStore::new(path).load().await.is_none());
    }
}
