//! Agent progress heuristic
//!
//! Not authoritative. Progress is inferred from surface health only: a role
//! whose surface answered healthy this cycle moves up by a fixed step, every
//! other role keeps its previous value. Real progress comes from the planner
//! through state sync.

use qmops_core::{clamp_percent, Surface};
use std::collections::BTreeMap;

use crate::health::CycleChecks;

/// Next progress map given the previous one and this cycle's checks
///
/// Roles present only in `previous` (no surface association) are carried
/// over unchanged. Roles new to `role_surfaces` start from zero.
pub fn detect_agent_progress(
    previous: &BTreeMap<String, u8>,
    checks: &CycleChecks,
    role_surfaces: &BTreeMap<String, Surface>,
    step: u8,
) -> BTreeMap<String, u8> {
    let mut next = previous.clone();

    for (role, surface) in role_surfaces {
        let current = previous.get(role).copied().unwrap_or(0);
        let value = if checks.surface_healthy(*surface) {
            clamp_percent(current as i64 + step as i64)
        } else {
            current
        };
        next.insert(role.clone(), value);
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::EndpointCheck;
    use chrono::Utc;
    use qmops_core::HealthStatus;

    fn check(status: HealthStatus) -> EndpointCheck {
        EndpointCheck {
            label: "x".to_string(),
            url: "http://localhost".to_string(),
            status,
            http_status: None,
            latency_ms: 0,
            error: None,
            checked_at: Utc::now(),
        }
    }

    fn surfaces() -> BTreeMap<String, Surface> {
        BTreeMap::from([
            ("backend".to_string(), Surface::Backend),
            ("frontend".to_string(), Surface::Frontend),
            ("qa".to_string(), Surface::Api),
        ])
    }

    #[test]
    fn healthy_surfaces_step_up_and_others_hold() {
        let checks = CycleChecks {
            backend: check(HealthStatus::Healthy),
            frontend: check(HealthStatus::Critical),
            critical: vec![check(HealthStatus::Degraded)],
        };
        let previous = BTreeMap::from([
            ("backend".to_string(), 40),
            ("frontend".to_string(), 40),
            ("qa".to_string(), 10),
            ("legacy".to_string(), 77),
        ]);

        let next = detect_agent_progress(&previous, &checks, &surfaces(), 5);

        assert_eq!(next["backend"], 45);
        assert_eq!(next["frontend"], 40);
        assert_eq!(next["qa"], 10);
        assert_eq!(next["legacy"], 77);
    }

    #[test]
    fn progress_is_clamped_at_100() {
        let checks = CycleChecks {
            backend: check(HealthStatus::Healthy),
            frontend: check(HealthStatus::Healthy),
            critical: Vec::new(),
        };
        let previous = BTreeMap::from([("backend".to_string(), 98)]);

        let next = detect_agent_progress(&previous, &checks, &surfaces(), 5);

        assert_eq!(next["backend"], 100);
        assert_eq!(next["frontend"], 5);
        assert_eq!(next["qa"], 5);
    }
}
