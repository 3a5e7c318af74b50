//! Coordination document format
//!
//! The coordination document is a markdown file shared by humans and
//! processes. Machine-owned parts live in named sections:
//!
//! ```text
//! <!-- section:current-status -->
//! ...regenerated body...
//! <!-- /section:current-status -->
//! ```
//!
//! Writers locate a section by pattern match and replace its body wholesale,
//! leaving everything outside the markers untouched. The document is a view:
//! the structured snapshot is authoritative, and [`parse_status_section`] only
//! exists for readers that have nothing better.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::fsutil::write_atomic_async;
use crate::types::{HealthStatus, RoleStatus, SystemStatusSnapshot};
use crate::Result;

/// Section regenerated by the reconciler every cycle
pub const STATUS_SECTION: &str = "current-status";

/// Section reserved for the human-maintained database tracking notes
pub const DATABASE_SECTION: &str = "database-tracking";

const TEMPLATE: &str = "# QM Coordination\n\
\n\
Shared status for the quality-management automation agents. Content between\n\
section markers is regenerated by qmops; edit outside the markers.\n\
\n\
<!-- section:current-status -->\n\
## Current Status\n\
\n\
_No monitoring cycle has run yet._\n\
<!-- /section:current-status -->\n\
\n\
<!-- section:database-tracking -->\n\
## Database Tracking\n\
\n\
_Maintained by hand._\n\
<!-- /section:database-tracking -->\n";

fn section_regex(name: &str) -> Regex {
    let name = regex::escape(name);
    // Names are escaped, the pattern is always valid
    Regex::new(&format!(
        r"(?s)<!-- section:{name} -->\n?(.*?)<!-- /section:{name} -->"
    ))
    .expect("section pattern is valid")
}

/// In-memory copy of the coordination document
#[derive(Debug, Clone)]
pub struct CoordinationDocument {
    path: PathBuf,
    content: String,
}

impl CoordinationDocument {
    /// The content a new document is seeded with
    pub fn template() -> &'static str {
        TEMPLATE
    }

    pub fn from_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Load the document, seeding it from the template when absent
    ///
    /// Seeding happens in memory only; nothing is written until [`write`](Self::write).
    pub async fn load_or_seed(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Self::from_content(path, content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Seeding coordination document at {}", path.display());
                Ok(Self::from_content(path, TEMPLATE))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Body of a named section, without the markers
    pub fn section(&self, name: &str) -> Option<&str> {
        section_regex(name)
            .captures(&self.content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Replace the body of a named section
    ///
    /// A missing section is appended at the end of the document.
    pub fn replace_section(&mut self, name: &str, body: &str) {
        let mut body = body.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }

        let range = section_regex(name)
            .captures(&self.content)
            .and_then(|c| c.get(1))
            .map(|m| m.range());

        match range {
            Some(range) => self.content.replace_range(range, &body),
            None => {
                warn!(
                    "Section '{}' missing from {}, appending it",
                    name,
                    self.path.display()
                );
                if !self.content.is_empty() && !self.content.ends_with('\n') {
                    self.content.push('\n');
                }
                self.content.push_str(&format!(
                    "\n<!-- section:{name} -->\n{body}<!-- /section:{name} -->\n"
                ));
            }
        }
    }

    /// Write the whole document back
    pub async fn write(&self) -> Result<()> {
        write_atomic_async(&self.path, self.content.as_bytes()).await
    }
}

/// Render the current-status section body for a snapshot
pub fn render_status_section(snapshot: &SystemStatusSnapshot) -> String {
    let mut out = String::new();
    out.push_str("## Current Status\n\n");
    out.push_str(&format!(
        "_Last updated: {}_\n\n",
        snapshot.timestamp.to_rfc3339()
    ));
    out.push_str(&format!("**Overall**: {}\n\n", snapshot.overall()));

    out.push_str("| Surface | Health |\n|---|---|\n");
    out.push_str(&format!("| Backend | {} |\n", snapshot.backend_health));
    out.push_str(&format!("| Frontend | {} |\n\n", snapshot.frontend_health));

    out.push_str("### Critical Errors\n\n");
    if snapshot.critical_errors.is_empty() {
        out.push_str("- none\n");
    } else {
        for error in &snapshot.critical_errors {
            out.push_str(&format!("- {}\n", error.replace('\n', " ")));
        }
    }

    out.push_str("\n### Agent Progress\n\n");
    out.push_str("_Heuristic, derived from surface health; not reported by agents._\n\n");
    if snapshot.agent_progress.is_empty() {
        out.push_str("- none\n");
    } else {
        for (role, progress) in &snapshot.agent_progress {
            out.push_str(&format!(
                "- **{}**: {}% ({})\n",
                role,
                progress,
                RoleStatus::from_progress(*progress)
            ));
        }
    }

    out
}

/// One role line scraped from the status section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRoleEntry {
    pub role: String,
    pub progress: u8,
    pub status: RoleStatus,
}

/// Fields recovered from a rendered status section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStatus {
    pub timestamp: Option<DateTime<Utc>>,
    pub backend_health: Option<HealthStatus>,
    pub frontend_health: Option<HealthStatus>,
    pub roles: Vec<DocumentRoleEntry>,
}

fn role_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^- \*\*(?P<role>[A-Za-z0-9_.-]+)\*\*: (?P<pct>\d{1,3})%(?: \((?P<status>[A-Za-z_ -]+)\))?[ \t]*$")
            .expect("role line pattern is valid")
    })
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"_Last updated: (?P<ts>[^_\n]+)_").expect("timestamp pattern is valid")
    })
}

fn health_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\| (?P<surface>Backend|Frontend) \| (?P<health>[a-z]+) \|")
            .expect("health pattern is valid")
    })
}

/// Scrape status fields from a current-status section body
///
/// Lines that do not match are skipped. Percentages above 100 are clamped and
/// an unparseable status falls back to the one implied by the percentage.
pub fn parse_status_section(body: &str) -> ParsedStatus {
    let mut parsed = ParsedStatus::default();

    if let Some(caps) = timestamp_regex().captures(body) {
        match DateTime::parse_from_rfc3339(caps["ts"].trim()) {
            Ok(ts) => parsed.timestamp = Some(ts.with_timezone(&Utc)),
            Err(e) => debug!("Unparseable status timestamp '{}': {}", &caps["ts"], e),
        }
    }

    for caps in health_regex().captures_iter(body) {
        let health = caps["health"].parse::<HealthStatus>().ok();
        match &caps["surface"] {
            "Backend" => parsed.backend_health = health,
            _ => parsed.frontend_health = health,
        }
    }

    for caps in role_line_regex().captures_iter(body) {
        let progress = caps["pct"].parse::<u16>().unwrap_or(0).min(100) as u8;
        let status = caps
            .name("status")
            .and_then(|s| s.as_str().parse::<RoleStatus>().ok())
            .unwrap_or_else(|| RoleStatus::from_progress(progress));

        parsed.roles.push(DocumentRoleEntry {
            role: caps["role"].to_string(),
            progress,
            status,
        });
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_snapshot() -> SystemStatusSnapshot {
        SystemStatusSnapshot {
            timestamp: DateTime::parse_from_rfc3339("2026-10-17T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            backend_health: HealthStatus::Healthy,
            frontend_health: HealthStatus::Degraded,
            critical_errors: vec!["Frontend http://localhost:3000: HTTP 502".to_string()],
            agent_progress: BTreeMap::from([
                ("backend".to_string(), 45),
                ("frontend".to_string(), 0),
                ("qa".to_string(), 100),
            ]),
        }
    }

    #[test]
    fn test_template_has_both_sections() {
        let doc = CoordinationDocument::from_content("c.md", CoordinationDocument::template());
        assert!(doc.section(STATUS_SECTION).is_some());
        assert!(doc.section(DATABASE_SECTION).is_some());
    }

    #[test]
    fn test_replace_section_preserves_other_sections() {
        let original = "# Doc\n\nintro\n\n<!-- section:current-status -->\nold\n<!-- /section:current-status -->\n\n<!-- section:database-tracking -->\nhand notes $1 \\\n<!-- /section:database-tracking -->\n";
        let mut doc = CoordinationDocument::from_content("c.md", original);

        doc.replace_section(STATUS_SECTION, "new body");

        assert_eq!(doc.section(STATUS_SECTION), Some("new body\n"));
        assert_eq!(doc.section(DATABASE_SECTION), Some("hand notes $1 \\\n"));
        assert!(doc.content().starts_with("# Doc\n\nintro\n"));
        assert!(!doc.content().contains("old"));
    }

    #[test]
    fn test_replace_missing_section_appends() {
        let mut doc = CoordinationDocument::from_content("c.md", "# Hand written\n");
        doc.replace_section(STATUS_SECTION, "status");

        assert!(doc.content().starts_with("# Hand written\n"));
        assert_eq!(doc.section(STATUS_SECTION), Some("status\n"));
    }

    #[test]
    fn test_render_then_parse_recovers_fields() {
        let snapshot = sample_snapshot();
        let body = render_status_section(&snapshot);
        let parsed = parse_status_section(&body);

        assert_eq!(parsed.timestamp, Some(snapshot.timestamp));
        assert_eq!(parsed.backend_health, Some(HealthStatus::Healthy));
        assert_eq!(parsed.frontend_health, Some(HealthStatus::Degraded));
        assert_eq!(parsed.roles.len(), 3);
        assert_eq!(
            parsed.roles[0],
            DocumentRoleEntry {
                role: "backend".to_string(),
                progress: 45,
                status: RoleStatus::InProgress,
            }
        );
        assert_eq!(parsed.roles[2].status, RoleStatus::Completed);
    }

    #[test]
    fn test_parse_tolerates_hand_edits() {
        let body = "- **backend**: 250% (weird)\n- **frontend**: 30%\nrandom prose\n- not a role line";
        let parsed = parse_status_section(body);

        assert_eq!(parsed.roles.len(), 2);
        assert_eq!(parsed.roles[0].progress, 100);
        assert_eq!(parsed.roles[0].status, RoleStatus::Completed);
        assert_eq!(parsed.roles[1].status, RoleStatus::InProgress);
        assert!(parsed.timestamp.is_none());
    }

    #[tokio::test]
    async fn test_load_or_seed_then_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("COORDINATION.md");

        let mut doc = CoordinationDocument::load_or_seed(&path).await.unwrap();
        assert!(!path.exists());

        doc.replace_section(STATUS_SECTION, &render_status_section(&sample_snapshot()));
        doc.write().await.unwrap();

        let reloaded = CoordinationDocument::load_or_seed(&path).await.unwrap();
        assert!(reloaded.content().contains("**backend**: 45%"));
        assert!(reloaded.content().contains("_Maintained by hand._"));
    }
}
