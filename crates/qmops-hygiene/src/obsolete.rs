//! Obsolescence rules: suffix allow-list plus aged report patterns

use chrono::{DateTime, Duration, Utc};
use glob::Pattern;
use qmops_core::config::HygieneConfig;
use qmops_core::{QmopsError, Result, MAX_AGE_DAYS};
use serde::{Deserialize, Serialize};

use crate::hash::FileRecord;

/// Why a file was judged obsolete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ObsoleteReason {
    /// Name ends with a throwaway suffix such as `.tmp` or `~`
    Extension { suffix: String },
    /// Report-style name older than the age threshold
    StaleReport { pattern: String, age_days: i64 },
}

impl std::fmt::Display for ObsoleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObsoleteReason::Extension { suffix } => write!(f, "obsolete suffix {}", suffix),
            ObsoleteReason::StaleReport { pattern, age_days } => {
                write!(f, "stale report ({}, {} days old)", pattern, age_days)
            }
        }
    }
}

/// Compiled obsolescence rules
#[derive(Debug, Clone)]
pub struct ObsolescenceRules {
    suffixes: Vec<String>,
    report_patterns: Vec<Pattern>,
    report_max_age: Duration,
}

impl ObsolescenceRules {
    pub fn new(
        suffixes: &[String],
        report_patterns: &[String],
        report_max_age_days: u64,
    ) -> Result<Self> {
        let report_patterns = report_patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| QmopsError::Config(format!("invalid report pattern {}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            suffixes: suffixes.iter().map(|s| s.to_lowercase()).collect(),
            report_patterns,
            report_max_age: Duration::days(report_max_age_days.min(MAX_AGE_DAYS) as i64),
        })
    }

    pub fn from_config(config: &HygieneConfig) -> Result<Self> {
        Self::new(
            &config.obsolete_extensions,
            &config.report_patterns,
            config.report_max_age_days,
        )
    }

    /// Classify a record against `now`; `None` means keep
    pub fn classify(&self, record: &FileRecord, now: DateTime<Utc>) -> Option<ObsoleteReason> {
        let name = record.file_name();
        let lower = name.to_lowercase();

        if let Some(suffix) = self.suffixes.iter().find(|s| lower.ends_with(s.as_str())) {
            return Some(ObsoleteReason::Extension {
                suffix: suffix.clone(),
            });
        }

        let age = now.signed_duration_since(record.mtime);
        if age <= self.report_max_age {
            return None;
        }

        self.report_patterns
            .iter()
            .find(|p| p.matches(&name))
            .map(|p| ObsoleteReason::StaleReport {
                pattern: p.as_str().to_string(),
                age_days: age.num_days(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(name: &str, age_days: i64, now: DateTime<Utc>) -> FileRecord {
        FileRecord {
            path: PathBuf::from("docs").join(name),
            hash: "h".to_string(),
            size: 1,
            mtime: now - Duration::days(age_days),
        }
    }

    fn rules() -> ObsolescenceRules {
        ObsolescenceRules::from_config(&HygieneConfig::default()).unwrap()
    }

    #[test]
    fn suffixes_match_regardless_of_age() {
        let now = Utc::now();
        let rules = rules();

        for name in ["server.log", "draft.TMP", "main.rs.orig", ".x.swp", "notes.md~"] {
            assert!(
                matches!(
                    rules.classify(&record(name, 0, now), now),
                    Some(ObsoleteReason::Extension { .. })
                ),
                "{} should be obsolete",
                name
            );
        }
        assert_eq!(rules.classify(&record("main.rs", 400, now), now), None);
    }

    #[test]
    fn report_pattern_needs_age() {
        let now = Utc::now();
        let rules = rules();

        assert_eq!(rules.classify(&record("AUDIT_REPORT_q1.md", 5, now), now), None);
        match rules.classify(&record("AUDIT_REPORT_q1.md", 45, now), now) {
            Some(ObsoleteReason::StaleReport { pattern, age_days }) => {
                assert_eq!(pattern, "*_REPORT*.md");
                assert_eq!(age_days, 45);
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let err = ObsolescenceRules::new(&[], &["[".to_string()], 30).unwrap_err();
        assert!(matches!(err, QmopsError::Config(_)));
    }
}
