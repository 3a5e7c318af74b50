//! Unified error types for qmops

use thiserror::Error;

/// Unified error type for all qmops operations
#[derive(Error, Debug)]
pub enum QmopsError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Health / network errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Parse errors for semi-structured sources
    #[error("Parse error: {0}")]
    Parse(String),

    // Hierarchy errors
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    #[error("Coordinator not found: {0}")]
    CoordinatorNotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // Planning errors
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    // Hygiene errors
    #[error("Backup failed for {path}: {reason}")]
    Backup { path: String, reason: String },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Hygiene error: {0}")]
    Hygiene(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using QmopsError
pub type Result<T> = std::result::Result<T, QmopsError>;
