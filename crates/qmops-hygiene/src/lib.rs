//! # qmops-hygiene
//!
//! Content-hash based repository hygiene.
//!
//! - Deterministic scan with an ignore-list of directory names
//! - SHA-256 duplicate detection that always keeps the first-observed path
//! - Obsolescence rules (throwaway suffixes, aged report files)
//! - Verified backup before any deletion, with list and restore
//! - Rotated-log pruning and dependency-cache size warnings
//!
//! Everything here is blocking `std::fs` code; async callers should run it
//! on a blocking thread.

pub mod backup;
pub mod dedup;
pub mod engine;
pub mod hash;
pub mod maintenance;
pub mod obsolete;
pub mod report;
pub mod scan;

pub use backup::{BackupInfo, BackupManager, RestoreSummary};
pub use dedup::{find_duplicates, DuplicateGroup};
pub use engine::{CleanupOptions, HygieneEngine, HygienePhase};
pub use hash::{hash_file, FileRecord};
pub use report::{CleanupReport, RemovalReason, RemovedFile};
