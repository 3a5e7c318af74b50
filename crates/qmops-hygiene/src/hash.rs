//! HASH phase: SHA-256 content digests and per-file records

use chrono::{DateTime, Utc};
use qmops_core::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// A scanned file with its content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the scan root
    pub path: PathBuf,
    /// Hex-encoded SHA-256 of the full content
    pub hash: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
}

impl FileRecord {
    /// Stat and hash `root/rel`
    pub fn read(root: &Path, rel: &Path) -> Result<Self> {
        let abs = root.join(rel);
        let metadata = std::fs::metadata(&abs)?;
        let mtime = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            path: rel.to_path_buf(),
            hash: hash_file(&abs)?,
            size: metadata.len(),
            mtime,
        })
    }

    /// File name component as a string
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Compute a SHA-256 hex digest of the given bytes
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Stream a file through SHA-256
pub fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
