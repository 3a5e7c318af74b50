//! Specialized agent keys and the general roles they map to

use qmops_core::{QmopsError, Result};
use serde::{Deserialize, Serialize};

pub const GENERAL_ROLES: &[&str] = &["backend", "frontend", "qa", "devops"];

/// Static mapping entry for one specialized agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleMapping {
    pub key: &'static str,
    pub general_role: &'static str,
    pub responsibilities: &'static [&'static str],
}

const MAPPINGS: &[RoleMapping] = &[
    RoleMapping {
        key: "api-developer",
        general_role: "backend",
        responsibilities: &["REST endpoints", "request validation"],
    },
    RoleMapping {
        key: "database-engineer",
        general_role: "backend",
        responsibilities: &["schema migrations", "query performance"],
    },
    RoleMapping {
        key: "integration-specialist",
        general_role: "backend",
        responsibilities: &["third-party integrations", "background jobs"],
    },
    RoleMapping {
        key: "ui-developer",
        general_role: "frontend",
        responsibilities: &["page components", "client-side state"],
    },
    RoleMapping {
        key: "dashboard-designer",
        general_role: "frontend",
        responsibilities: &["metrics dashboards", "charts"],
    },
    RoleMapping {
        key: "forms-specialist",
        general_role: "frontend",
        responsibilities: &["inspection forms", "input validation"],
    },
    RoleMapping {
        key: "test-engineer",
        general_role: "qa",
        responsibilities: &["integration tests", "regression suites"],
    },
    RoleMapping {
        key: "security-auditor",
        general_role: "qa",
        responsibilities: &["security review", "dependency audit"],
    },
    RoleMapping {
        key: "compliance-reviewer",
        general_role: "qa",
        responsibilities: &["audit trail checks", "document control"],
    },
    RoleMapping {
        key: "deployment-engineer",
        general_role: "devops",
        responsibilities: &["release pipeline", "environment config"],
    },
    RoleMapping {
        key: "monitoring-specialist",
        general_role: "devops",
        responsibilities: &["health checks", "alerting"],
    },
];

/// Canonical per-role record after sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRole {
    pub key: String,
    pub general_role: String,
    pub responsibilities: Vec<String>,
    pub progress: u8,
    pub status: qmops_core::RoleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_tasks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tasks: Option<u32>,
}

/// Lookup over the static mapping table
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleRegistry;

impl RoleRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn mappings(&self) -> &'static [RoleMapping] {
        MAPPINGS
    }

    pub fn general_roles(&self) -> &'static [&'static str] {
        GENERAL_ROLES
    }

    pub fn is_general_role(&self, role: &str) -> bool {
        GENERAL_ROLES.iter().any(|r| *r == role)
    }

    /// General role for a specialized key; general role names map to themselves
    pub fn resolve(&self, key: &str) -> Result<&'static str> {
        let key = key.trim().to_lowercase();
        if let Some(role) = GENERAL_ROLES.iter().find(|r| **r == key) {
            return Ok(*role);
        }
        MAPPINGS
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.general_role)
            .ok_or(QmopsError::UnknownRole(key))
    }

    /// Union of responsibilities of every key mapped to `general_role`
    pub fn responsibilities(&self, general_role: &str) -> Vec<String> {
        MAPPINGS
            .iter()
            .filter(|m| m.general_role == general_role)
            .flat_map(|m| m.responsibilities.iter().map(|r| r.to_string()))
            .collect()
    }

    /// Fresh pending record for a general role
    pub fn blank_role(&self, general_role: &str) -> AgentRole {
        AgentRole {
            key: general_role.to_string(),
            general_role: general_role.to_string(),
            responsibilities: self.responsibilities(general_role),
            progress: 0,
            status: qmops_core::RoleStatus::Pending,
            completed_tasks: None,
            total_tasks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_specialized_key_resolves_to_a_general_role() {
        let registry = RoleRegistry::new();
        for mapping in registry.mappings() {
            let role = registry.resolve(mapping.key).unwrap();
            assert!(
                registry.is_general_role(role),
                "{} maps to unregistered role {}",
                mapping.key,
                role
            );
        }
    }

    #[test]
    fn every_general_role_has_responsibilities() {
        let registry = RoleRegistry::new();
        for role in registry.general_roles() {
            assert!(!registry.responsibilities(role).is_empty(), "{}", role);
        }
    }

    #[test]
    fn resolve_is_case_insensitive_and_rejects_unknown() {
        let registry = RoleRegistry::new();
        assert_eq!(registry.resolve("API-Developer").unwrap(), "backend");
        assert_eq!(registry.resolve("qa").unwrap(), "qa");
        assert!(matches!(
            registry.resolve("astrologer"),
            Err(QmopsError::UnknownRole(_))
        ));
    }
}
