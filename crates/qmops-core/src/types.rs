//! Core type definitions shared across qmops components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Task priority levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" | "0" => Ok(Self::Critical),
            "high" | "1" => Ok(Self::High),
            "medium" | "2" => Ok(Self::Medium),
            "low" | "3" => Ok(Self::Low),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Availability classification of a health-checked surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 2xx within the timeout
    Healthy,
    /// A non-2xx response was received
    Degraded,
    /// Timeout or connection error
    Critical,
    /// Not checked yet
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "critical" => Ok(Self::Critical),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid health status: {}", s)),
        }
    }
}

/// Execution status of a coordinator or child agent
///
/// Transitions are monotonic: idle -> running -> completed | failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    /// Whether moving from `self` to `next` respects the monotonic ordering
    ///
    /// Re-asserting the current status is allowed and is a no-op.
    pub fn can_transition_to(&self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (Idle, Idle)
                | (Idle, Running)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Completed, Completed)
                | (Failed, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Work status of a general role, as reported by planners and documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleStatus {
    #[default]
    Pending,
    InProgress,
    Blocked,
    Completed,
}

impl RoleStatus {
    /// Status implied by a bare percentage
    pub fn from_progress(progress: u8) -> Self {
        match progress {
            0 => Self::Pending,
            100..=u8::MAX => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

impl std::fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Blocked => write!(f, "blocked"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for RoleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "pending" | "not_started" | "todo" | "idle" => Ok(Self::Pending),
            "in_progress" | "inprogress" | "active" | "running" => Ok(Self::InProgress),
            "blocked" | "failed" => Ok(Self::Blocked),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            _ => Err(format!("Invalid role status: {}", s)),
        }
    }
}

/// Result of one monitoring cycle
///
/// Fully recreated every cycle and never diffed against history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub backend_health: HealthStatus,
    pub frontend_health: HealthStatus,
    pub critical_errors: Vec<String>,
    /// General role -> progress percentage
    pub agent_progress: BTreeMap<String, u8>,
}

impl SystemStatusSnapshot {
    /// Snapshot with nothing checked yet
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            backend_health: HealthStatus::Unknown,
            frontend_health: HealthStatus::Unknown,
            critical_errors: Vec::new(),
            agent_progress: BTreeMap::new(),
        }
    }

    /// Overall classification: the worst of the two surfaces
    pub fn overall(&self) -> HealthStatus {
        use HealthStatus::*;
        match (self.backend_health, self.frontend_health) {
            (Critical, _) | (_, Critical) => Critical,
            (Degraded, _) | (_, Degraded) => Degraded,
            (Healthy, Healthy) => Healthy,
            _ => Unknown,
        }
    }
}

/// Clamp an arbitrary integer percentage into `0..=100`
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}
