//! Example work orders for `qmops plan --example` and tests

use crate::work_order::WorkOrder;

/// Client-facing UI work with no API keyword; leaves part of the budget unallocated
pub fn example_work_order() -> WorkOrder {
    WorkOrder {
        id: "WO-EXAMPLE".to_string(),
        title: "Client portal refresh".to_string(),
        requirements: vec![
            "client management".to_string(),
            "metrics dashboard".to_string(),
        ],
        technologies: vec!["react".to_string(), "typescript".to_string()],
        budget_hours: 80.0,
    }
}

/// Work touching both the backend and the UI
pub fn full_stack_work_order() -> WorkOrder {
    WorkOrder {
        id: "WO-FULLSTACK".to_string(),
        title: "Audit readiness module".to_string(),
        requirements: vec![
            "REST API for corrective actions".to_string(),
            "Audit trail stored in the database".to_string(),
            "Inspection forms with attachments".to_string(),
            "Monthly compliance report export".to_string(),
        ],
        technologies: vec![
            "python".to_string(),
            "postgresql".to_string(),
            "react".to_string(),
        ],
        budget_hours: 160.0,
    }
}

/// Smallest valid work order
pub fn minimal_work_order() -> WorkOrder {
    WorkOrder {
        id: "WO-MINIMAL".to_string(),
        title: "Housekeeping".to_string(),
        requirements: vec!["copy edits".to_string()],
        technologies: Vec::new(),
        budget_hours: 8.0,
    }
}
