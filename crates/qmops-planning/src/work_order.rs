//! Work order input structures

use qmops_core::{Priority, QmopsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A unit of client work to be decomposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub id: String,
    pub title: String,
    pub requirements: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(alias = "budget_hours")]
    pub budget_hours: f64,
}

impl WorkOrder {
    /// Read a work order from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let order: Self = serde_json::from_str(&content)
            .map_err(|e| QmopsError::Parse(format!("{}: {}", path.display(), e)))?;
        order.validate()?;
        Ok(order)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(QmopsError::Parse("work order id is empty".to_string()));
        }
        if !self.budget_hours.is_finite() || self.budget_hours < 0.0 {
            return Err(QmopsError::Parse(format!(
                "work order {} has invalid budget {}",
                self.id, self.budget_hours
            )));
        }
        Ok(())
    }
}

/// A planned piece of work for one general role
///
/// Created once per decomposition and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub assigned_role: String,
    pub estimated_hours: f64,
    pub priority: Priority,
}
