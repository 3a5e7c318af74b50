//! # qmops-core
//!
//! Core types for the qmops automation layer of the quality-management
//! application.
//!
//! - Unified error type and `Result` alias
//! - `QmopsConfig`, loaded from `.qmops/config.toml`
//! - `RunContext`, the per-process context handed to every component
//! - The coordination document format shared by writers and readers
//! - Atomic whole-file persistence helpers and the continuous-mode runner

pub mod config;
pub mod context;
pub mod document;
mod error;
pub mod fail_open;
pub mod fsutil;
pub mod runner;
mod types;

pub use config::{MergePrecedence, QmopsConfig, Surface, MAX_AGE_DAYS, STATE_DIR};
pub use context::RunContext;
pub use error::{QmopsError, Result};
pub use types::*;
