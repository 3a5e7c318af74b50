//! Work order decomposition into role-assigned tasks
//!
//! Three pure steps: keyword analysis of the requirements, a fixed rule
//! table turning detected modules into tasks, and a duration estimate.
//! The configured budget shares need not add up to 1.0; whatever is left
//! over is reported as unallocated and never redistributed.

use chrono::{DateTime, Utc};
use qmops_core::config::DecompositionConfig;
use qmops_core::Priority;
use serde::{Deserialize, Serialize};

use crate::work_order::{Task, WorkOrder};

/// Which side of the application a module lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Backend,
    Ui,
}

/// Keyword -> (module, kind); matched as case-insensitive substrings
pub const KEYWORD_TABLE: &[(&str, &str, ModuleKind)] = &[
    ("client", "client-management", ModuleKind::Ui),
    ("dashboard", "dashboard", ModuleKind::Ui),
    ("api", "backend-api", ModuleKind::Backend),
    ("report", "reporting", ModuleKind::Ui),
    ("form", "forms", ModuleKind::Ui),
    ("audit", "audit-trail", ModuleKind::Backend),
    ("database", "data-layer", ModuleKind::Backend),
];

/// A module triggered by one or more requirements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedModule {
    pub name: String,
    pub kind: ModuleKind,
    /// Requirements that mentioned the keyword
    pub matched_requirements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementAnalysis {
    pub work_order_id: String,
    pub budget_hours: f64,
    /// In keyword-table order
    pub modules: Vec<DetectedModule>,
}

impl RequirementAnalysis {
    pub fn has_kind(&self, kind: ModuleKind) -> bool {
        self.modules.iter().any(|m| m.kind == kind)
    }

    fn module_names(&self, kind: ModuleKind) -> Vec<&str> {
        self.modules
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationEstimate {
    pub budget_hours: f64,
    pub total_hours: f64,
    pub estimated_days: u32,
    pub parallel_execution: bool,
    /// Budget minus planned hours; may be negative if shares exceed 1.0
    pub unallocated_hours: f64,
}

/// Full decomposition result, as written to `assignments.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub work_order: WorkOrder,
    pub analysis: RequirementAnalysis,
    pub tasks: Vec<Task>,
    pub duration: DurationEstimate,
    pub generated_at: DateTime<Utc>,
}

/// Decomposes work orders using the configured budget shares and roles
#[derive(Debug, Clone)]
pub struct Decomposer {
    config: DecompositionConfig,
}

impl Decomposer {
    pub fn new(config: DecompositionConfig) -> Self {
        Self { config }
    }

    /// Match every requirement against the keyword table
    ///
    /// Matches are non-exclusive: one requirement can trigger several modules.
    pub fn analyze_requirements(&self, order: &WorkOrder) -> RequirementAnalysis {
        let lowered: Vec<String> = order.requirements.iter().map(|r| r.to_lowercase()).collect();

        let modules = KEYWORD_TABLE
            .iter()
            .filter_map(|(keyword, module, kind)| {
                let matched: Vec<String> = order
                    .requirements
                    .iter()
                    .zip(&lowered)
                    .filter(|(_, lower)| lower.contains(keyword))
                    .map(|(original, _)| original.clone())
                    .collect();
                (!matched.is_empty()).then(|| DetectedModule {
                    name: module.to_string(),
                    kind: *kind,
                    matched_requirements: matched,
                })
            })
            .collect();

        RequirementAnalysis {
            work_order_id: order.id.clone(),
            budget_hours: order.budget_hours,
            modules,
        }
    }

    /// Apply the rule table: backend task, UI task, then the testing task
    pub fn divide_into_tasks(&self, analysis: &RequirementAnalysis) -> Vec<Task> {
        let budget = analysis.budget_hours;
        let mut tasks = Vec::new();

        if analysis.has_kind(ModuleKind::Backend) {
            tasks.push(Task {
                id: format!("{}-backend", analysis.work_order_id),
                name: format!(
                    "Backend implementation: {}",
                    analysis.module_names(ModuleKind::Backend).join(", ")
                ),
                assigned_role: self.config.backend_role.clone(),
                estimated_hours: round_hours(budget * self.config.backend_share),
                priority: Priority::High,
            });
        }

        if analysis.has_kind(ModuleKind::Ui) {
            tasks.push(Task {
                id: format!("{}-ui", analysis.work_order_id),
                name: format!(
                    "UI implementation: {}",
                    analysis.module_names(ModuleKind::Ui).join(", ")
                ),
                assigned_role: self.config.ui_role.clone(),
                estimated_hours: round_hours(budget * self.config.ui_share),
                priority: Priority::High,
            });
        }

        tasks.push(Task {
            id: format!("{}-testing", analysis.work_order_id),
            name: "Testing".to_string(),
            assigned_role: self.config.ui_role.clone(),
            estimated_hours: round_hours(budget * self.config.testing_share),
            priority: Priority::Medium,
        });

        tasks
    }

    /// Total hours, whole working days and whether both roles have work
    pub fn calculate_duration(&self, budget_hours: f64, tasks: &[Task]) -> DurationEstimate {
        let total_hours = round_hours(tasks.iter().map(|t| t.estimated_hours).sum());
        let estimated_days = (total_hours / self.config.hours_per_day).ceil().max(0.0) as u32;
        let has_role = |role: &str| tasks.iter().any(|t| t.assigned_role == role);

        DurationEstimate {
            budget_hours,
            total_hours,
            estimated_days,
            parallel_execution: has_role(&self.config.backend_role) && has_role(&self.config.ui_role),
            unallocated_hours: round_hours(budget_hours - total_hours),
        }
    }

    /// All three steps for one work order
    pub fn decompose(&self, order: &WorkOrder) -> Assignment {
        let analysis = self.analyze_requirements(order);
        let tasks = self.divide_into_tasks(&analysis);
        let duration = self.calculate_duration(order.budget_hours, &tasks);

        Assignment {
            work_order: order.clone(),
            analysis,
            tasks,
            duration,
            generated_at: Utc::now(),
        }
    }
}

/// Round to hundredths so shares like 0.1 don't leak float noise into reports
fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decomposer() -> Decomposer {
        Decomposer::new(DecompositionConfig::default())
    }

    fn order(requirements: &[&str], budget: f64) -> WorkOrder {
        WorkOrder {
            id: "WO-7".to_string(),
            title: "test".to_string(),
            requirements: requirements.iter().map(|s| s.to_string()).collect(),
            technologies: Vec::new(),
            budget_hours: budget,
        }
    }

    #[test]
    fn test_matches_are_case_insensitive_and_non_exclusive() {
        let analysis = decomposer().analyze_requirements(&order(
            &["Client API for AUDIT exports", "Dashboard"],
            10.0,
        ));
        let names: Vec<&str> = analysis.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            ["client-management", "dashboard", "backend-api", "audit-trail"]
        );
        assert_eq!(
            analysis.modules[2].matched_requirements,
            vec!["Client API for AUDIT exports"]
        );
    }

    #[test]
    fn test_backend_and_ui_run_in_parallel() {
        let d = decomposer();
        let analysis = d.analyze_requirements(&order(&["REST api", "client forms"], 100.0));
        let tasks = d.divide_into_tasks(&analysis);

        let hours: Vec<f64> = tasks.iter().map(|t| t.estimated_hours).collect();
        assert_eq!(hours, [40.0, 50.0, 10.0]);
        assert_eq!(tasks[0].assigned_role, "backend");
        assert_eq!(tasks[1].assigned_role, "frontend");
        assert_eq!(tasks[2].assigned_role, "frontend");

        let duration = d.calculate_duration(100.0, &tasks);
        assert_eq!(duration.total_hours, 100.0);
        assert_eq!(duration.estimated_days, 13);
        assert!(duration.parallel_execution);
        assert_eq!(duration.unallocated_hours, 0.0);
    }

    #[test]
    fn test_no_modules_still_gets_testing_task() {
        let d = decomposer();
        let tasks = d.divide_into_tasks(&d.analyze_requirements(&order(&["misc"], 20.0)));

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Testing");
        assert_eq!(tasks[0].estimated_hours, 2.0);
        assert!(!d.calculate_duration(20.0, &tasks).parallel_execution);
    }

    #[test]
    fn test_shares_come_from_config() {
        let d = Decomposer::new(DecompositionConfig {
            backend_share: 0.5,
            ui_share: 0.3,
            testing_share: 0.2,
            hours_per_day: 6.0,
            backend_role: "devops".to_string(),
            ui_role: "qa".to_string(),
        });
        let assignment = d.decompose(&order(&["database", "report"], 30.0));

        assert_eq!(assignment.tasks[0].assigned_role, "devops");
        assert_eq!(assignment.tasks[0].estimated_hours, 15.0);
        assert_eq!(assignment.duration.total_hours, 30.0);
        assert_eq!(assignment.duration.estimated_days, 5);
    }
}
