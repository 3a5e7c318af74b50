//! Fail-open utilities for infrastructure writes
//!
//! Report files, logs and the coordination document are outputs of a cycle,
//! not inputs to its decisions. Failing to write one must not abort the cycle.
//!
//! DO NOT use fail-open for:
//! - Backups in the hygiene engine (deletion depends on them)
//! - Hierarchy persistence the launcher reads back

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// ```no_run
/// use qmops_core::fail_open::fail_open;
/// use qmops_core::Result;
///
/// async fn write_report() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let written = fail_open("cleanup_report", || write_report()).await;
///     // written is None if the write failed
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Synchronous counterpart of [`fail_open`] for blocking code paths
pub fn fail_open_sync<F, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match f() {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
