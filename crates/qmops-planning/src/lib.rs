//! # qmops-planning
//!
//! Turns work orders into role-assigned tasks and keeps per-role progress in
//! sync between the planner config and the coordination status.

pub mod decomposer;
pub mod roles;
pub mod sync;
pub mod templates;
pub mod work_order;

pub use decomposer::{Assignment, Decomposer, DurationEstimate, ModuleKind, RequirementAnalysis};
pub use roles::{AgentRole, RoleRegistry, GENERAL_ROLES};
pub use sync::{merge_states, PlannerConfig, StateSync, SyncReport};
pub use templates::{example_work_order, full_stack_work_order, minimal_work_order};
pub use work_order::{Task, WorkOrder};
