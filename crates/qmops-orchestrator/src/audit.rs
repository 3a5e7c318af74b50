//! Read-only security audit of a qmops deployment
//!
//! Reports three kinds of finding and changes nothing:
//! plaintext HTTP to non-loopback hosts, world-writable state files, and
//! credential-like files present in the repository tree.

use glob::Pattern;
use qmops_core::{QmopsError, Result, RunContext};
use qmops_hygiene::scan::Scanner;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::model::HierarchyState;

const SENSITIVE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*.pfx",
    "id_rsa",
    "id_ecdsa",
    "id_ed25519",
    "*.keystore",
    "credentials.json",
];

/// Allowed despite matching a sensitive pattern
const SENSITIVE_EXCEPTIONS: &[&str] = &[".env.example", ".env.sample", ".env.template"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    PlaintextEndpoint,
    WorldWritableState,
    SensitiveFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub findings: Vec<AuditFinding>,
    pub files_scanned: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// Host part of an `http://` URL, `None` for anything else
fn plaintext_host(url: &str) -> Option<String> {
    let rest = url.trim().strip_prefix("http://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or("")
    } else {
        authority.split(':').next().unwrap_or("")
    };
    Some(host.to_lowercase())
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

/// Runs the audit against one repository
pub struct SecurityAudit<'a> {
    ctx: &'a RunContext,
}

impl<'a> SecurityAudit<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    pub fn run(&self, hierarchy: &HierarchyState) -> Result<AuditReport> {
        let mut report = AuditReport::default();

        self.check_endpoints(hierarchy, &mut report);
        self.check_state_permissions(&mut report);
        self.check_sensitive_files(&mut report)?;

        report.findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        info!(
            "Security audit: {} findings in {} files",
            report.findings.len(),
            report.files_scanned
        );
        Ok(report)
    }

    fn check_endpoints(&self, hierarchy: &HierarchyState, report: &mut AuditReport) {
        let monitor = &self.ctx.config().monitor;
        let mut endpoints = vec![
            ("monitor.backend_url".to_string(), monitor.backend_url.clone()),
            ("monitor.frontend_url".to_string(), monitor.frontend_url.clone()),
        ];
        if let Some(root) = &hierarchy.root {
            endpoints.push((format!("coordinator {}", root.id), root.endpoint.clone()));
        }

        for (subject, url) in endpoints {
            if let Some(host) = plaintext_host(&url) {
                if !is_loopback(&host) {
                    warn!("Plaintext endpoint {} -> {}", subject, url);
                    report.findings.push(AuditFinding {
                        kind: FindingKind::PlaintextEndpoint,
                        severity: Severity::High,
                        subject,
                        detail: format!("{} uses plaintext HTTP to non-loopback host {}", url, host),
                    });
                }
            }
        }
    }

    #[cfg(unix)]
    fn check_state_permissions(&self, report: &mut AuditReport) {
        use std::os::unix::fs::PermissionsExt;

        let state_dir = self.ctx.state_dir();
        if !state_dir.is_dir() {
            return;
        }

        let mut paths = vec![PathBuf::new()];
        paths.extend(Scanner::new(&state_dir, &[]).scan().files);
        for rel in paths {
            let path = state_dir.join(&rel);
            let Ok(metadata) = std::fs::symlink_metadata(&path) else {
                continue;
            };
            if metadata.permissions().mode() & 0o002 != 0 {
                report.findings.push(AuditFinding {
                    kind: FindingKind::WorldWritableState,
                    severity: Severity::Medium,
                    subject: path.display().to_string(),
                    detail: format!("mode {:o} is world-writable", metadata.permissions().mode() & 0o777),
                });
            }
        }
    }

    #[cfg(not(unix))]
    fn check_state_permissions(&self, _report: &mut AuditReport) {}

    fn check_sensitive_files(&self, report: &mut AuditReport) -> Result<()> {
        let patterns = SENSITIVE_PATTERNS
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| QmopsError::Other(format!("bad pattern {}: {}", p, e))))
            .collect::<Result<Vec<_>>>()?;

        let scan = Scanner::new(self.ctx.root(), &self.ctx.config().hygiene.ignore_dirs).scan();
        report.files_scanned = scan.files.len();

        for rel in scan.files {
            let name = rel
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if SENSITIVE_EXCEPTIONS.contains(&name.as_str()) {
                continue;
            }
            if let Some(pattern) = patterns.iter().find(|p| p.matches(&name)) {
                report.findings.push(AuditFinding {
                    kind: FindingKind::SensitiveFile,
                    severity: Severity::High,
                    subject: rel.display().to_string(),
                    detail: format!("matches {}", pattern.as_str()),
                });
            }
        }
        Ok(())
    }
}
