//! GROUP phase: one-pass duplicate detection

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::hash::FileRecord;

/// A later path whose content matches an earlier one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// First-observed path with this hash; never removed
    pub original_path: PathBuf,
    pub duplicate_path: PathBuf,
    pub hash: String,
    pub size: u64,
}

/// Pair every repeated hash with the first path that carried it
///
/// `records` must be in scan order. The first record for each hash is the
/// original and is never reported as a duplicate. Empty files are skipped:
/// they all share one hash but usually act as placeholders.
pub fn find_duplicates<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Vec<DuplicateGroup> {
    let mut first_seen: HashMap<&str, &FileRecord> = HashMap::new();
    let mut duplicates = Vec::new();

    for record in records.into_iter().filter(|r| r.size > 0) {
        match first_seen.get(record.hash.as_str()) {
            Some(original) => duplicates.push(DuplicateGroup {
                original_path: original.path.clone(),
                duplicate_path: record.path.clone(),
                hash: record.hash.clone(),
                size: record.size,
            }),
            None => {
                first_seen.insert(&record.hash, record);
            }
        }
    }

    duplicates
}
