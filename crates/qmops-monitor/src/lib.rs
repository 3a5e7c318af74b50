//! # qmops-monitor
//!
//! Periodic health checks of the application's backend, frontend and
//! critical API paths, folded into a status snapshot that drives the
//! coordination document.

pub mod health;
pub mod progress;
pub mod reconciler;
pub mod snapshot;

pub use health::{CycleChecks, EndpointCheck, HealthChecker, HealthMonitor};
pub use progress::detect_agent_progress;
pub use reconciler::Reconciler;
pub use snapshot::SnapshotStore;
