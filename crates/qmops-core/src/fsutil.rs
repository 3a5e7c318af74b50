//! Whole-file state persistence helpers
//!
//! State files are always replaced atomically: the new content is written to a
//! sibling temp file and renamed over the target. Readers never observe a
//! half-written file, although two processes writing the same file still race
//! and the last rename wins.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::Result;

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
}

/// Atomically replace `path` with `contents`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, contents)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Async variant of [`write_atomic`]
pub async fn write_atomic_async(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic_async(path, json.as_bytes()).await
}

/// Read a JSON file, returning `None` when it does not exist
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read a JSON source that is allowed to be broken
///
/// Missing files, unreadable files and malformed JSON all yield `None`; the
/// latter two are logged as warnings.
pub async fn read_json_lenient<T: DeserializeOwned>(source: &str, path: &Path) -> Option<T> {
    match read_json(path).await {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "Ignoring {} at {}: {} (treated as empty)",
                source,
                path.display(),
                e
            );
            None
        }
    }
}
