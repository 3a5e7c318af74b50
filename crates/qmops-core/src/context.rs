//! Per-process run context
//!
//! Constructed once by the entry point and handed to every component, so no
//! component reaches for process-wide state.

use std::path::{Path, PathBuf};

use crate::config::{QmopsConfig, STATE_DIR};
use crate::Result;

/// Configuration plus the repository root all relative paths resolve against
#[derive(Debug, Clone)]
pub struct RunContext {
    root: PathBuf,
    config: QmopsConfig,
}

impl RunContext {
    pub fn new(root: impl Into<PathBuf>, config: QmopsConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load `.qmops/config.toml` under `root`, falling back to defaults
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = QmopsConfig::load_or_default(&root)?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &QmopsConfig {
        &self.config
    }

    /// Resolve a configured path against the repository root
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// `.qmops` under the repository root
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let ctx = RunContext::new("/srv/qm", QmopsConfig::default());

        assert_eq!(
            ctx.resolve(".qmops/status.json"),
            PathBuf::from("/srv/qm/.qmops/status.json")
        );
        assert_eq!(ctx.resolve("/tmp/x.json"), PathBuf::from("/tmp/x.json"));
        assert_eq!(ctx.state_dir(), PathBuf::from("/srv/qm/.qmops"));
    }
}
