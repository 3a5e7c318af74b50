//! # qmops-orchestrator
//!
//! Hierarchical agent registry for the quality-management automation.
//!
//! A single root coordinator owns an ordered list of child agents. Launching
//! runs each child through a [`ChildExecutor`]; every applied progress event
//! is persisted by one writer task and broadcast as a [`HierarchyUpdate`].

pub mod audit;
pub mod executor;
pub mod manager;
pub mod model;
pub mod persist;

pub use audit::{AuditFinding, AuditReport, FindingKind, SecurityAudit, Severity};
pub use executor::{ChildExecutor, HierarchyUpdate, ProgressEvent, SimulatedExecutor};
pub use manager::{HierarchyManager, LaunchOutcome};
pub use model::{children_from_roles, children_from_tasks, ChildAgent, CoordinatorNode, HierarchyState};
pub use persist::PersistenceHandle;
