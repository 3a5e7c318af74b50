//! Coordinator tree types

use chrono::{DateTime, Utc};
use qmops_core::{NodeStatus, QmopsError, Result};
use qmops_planning::{RoleRegistry, Task};
use serde::{Deserialize, Serialize};

/// A worker under a coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildAgent {
    pub id: String,
    pub name: String,
    /// General role doing the work
    #[serde(rename = "type")]
    pub agent_type: String,
    pub status: NodeStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

impl ChildAgent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            status: NodeStatus::Idle,
            progress: 0,
            task_id: None,
            estimated_hours: None,
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: Some(task.id.clone()),
            estimated_hours: Some(task.estimated_hours),
            ..Self::new(&task.id, &task.name, &task.assigned_role)
        }
    }

    pub fn set_status(&mut self, next: NodeStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(QmopsError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Move progress forward; lower values are ignored
    ///
    /// Returns whether anything changed. An idle child starts running.
    pub fn advance(&mut self, progress: u8) -> Result<bool> {
        let progress = progress.min(100);
        if self.status.is_terminal() || progress < self.progress {
            return Ok(false);
        }
        let changed = progress != self.progress || self.status == NodeStatus::Idle;
        self.set_status(NodeStatus::Running)?;
        self.progress = progress;
        Ok(changed)
    }

    pub fn complete(&mut self) -> Result<()> {
        if self.status == NodeStatus::Idle {
            self.set_status(NodeStatus::Running)?;
        }
        self.set_status(NodeStatus::Completed)?;
        self.progress = 100;
        Ok(())
    }

    pub fn fail(&mut self) -> Result<()> {
        if self.status == NodeStatus::Idle {
            self.set_status(NodeStatus::Running)?;
        }
        self.set_status(NodeStatus::Failed)
    }
}

/// Root of the hierarchy and its ordered children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorNode {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub status: NodeStatus,
    pub children: Vec<ChildAgent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CoordinatorNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, children: Vec<ChildAgent>) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            endpoint: format!("local://{}", id),
            id,
            name: name.into(),
            status: NodeStatus::Idle,
            children,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, next: NodeStatus) -> Result<()> {
        if next == NodeStatus::Completed && !self.all_children_completed() {
            return Err(QmopsError::Hierarchy(format!(
                "coordinator {} cannot complete with unfinished children",
                self.id
            )));
        }
        if !self.status.can_transition_to(next) {
            return Err(QmopsError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn all_children_completed(&self) -> bool {
        self.children.iter().all(|c| c.status == NodeStatus::Completed)
    }

    /// Mean child progress; 100 for a coordinator without children
    pub fn progress(&self) -> u8 {
        if self.children.is_empty() {
            return if self.status == NodeStatus::Completed { 100 } else { 0 };
        }
        let sum: u32 = self.children.iter().map(|c| c.progress as u32).sum();
        (sum / self.children.len() as u32) as u8
    }

    pub fn child_mut(&mut self, child_id: &str) -> Option<&mut ChildAgent> {
        self.children.iter_mut().find(|c| c.id == child_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Persisted form of the whole registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyState {
    /// The single root coordinator
    #[serde(default)]
    pub root: Option<CoordinatorNode>,
}

impl HierarchyState {
    pub fn coordinator(&self, id: &str) -> Option<&CoordinatorNode> {
        self.root.as_ref().filter(|c| c.id == id)
    }

    pub fn coordinator_mut(&mut self, id: &str) -> Option<&mut CoordinatorNode> {
        self.root.as_mut().filter(|c| c.id == id)
    }
}

/// One child per decomposed task, in task order
pub fn children_from_tasks(tasks: &[Task]) -> Vec<ChildAgent> {
    tasks.iter().map(ChildAgent::from_task).collect()
}

/// One child per general role
pub fn children_from_roles(registry: &RoleRegistry) -> Vec<ChildAgent> {
    registry
        .general_roles()
        .iter()
        .map(|role| ChildAgent::new(format!("{}-agent", role), format!("{} agent", role), *role))
        .collect()
}
