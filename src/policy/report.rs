//! Audit report aggregation and rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::checks::{CheckOutcome, Verdict};

/// Exit code when every check passed.
pub const EXIT_PASS: u8 = 0;
/// Exit code when any check failed or could not be evaluated.
pub const EXIT_FAIL: u8 = 1;
/// Exit code for configuration errors that prevented the audit from running.
pub const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub repository: Option<String>,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<CheckOutcome>,
}

impl AuditReport {
    pub fn summary(&self) -> Summary {
        self.outcomes
            .iter()
            .fold(Summary::default(), |mut summary, outcome| {
                match outcome.verdict {
                    Verdict::Pass => summary.passed += 1,
                    Verdict::Fail => summary.failed += 1,
                    Verdict::Error => summary.errored += 1,
                }
                summary
            })
    }

    /// Zero only if every check passed.
    pub fn exit_code(&self) -> u8 {
        if self.outcomes.iter().all(CheckOutcome::passed) {
            EXIT_PASS
        } else {
            EXIT_FAIL
        }
    }

    /// One line per check, then a summary line.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Repository audit of {} at {}",
            self.repository.as_deref().unwrap_or("<unconfigured repository>"),
            self.started_at.to_rfc3339()
        );
        for outcome in &self.outcomes {
            match &outcome.reason {
                None => {
                    let _ = writeln!(out, "{:<5} {}", outcome.verdict, outcome.name);
                }
                Some(reason) => {
                    let _ = writeln!(
                        out,
                        "{:<5} {}: {}\n      expected: {}\n      observed: {}",
                        outcome.verdict, outcome.name, reason, outcome.expectation, outcome.observed
                    );
                }
            }
        }
        let summary = self.summary();
        let _ = writeln!(
            out,
            "{} passed, {} failed, {} errored",
            summary.passed, summary.failed, summary.errored
        );
        out
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct JsonReport<'a> {
            #[serde(flatten)]
            report: &'a AuditReport,
            summary: Summary,
        }

        serde_json::to_string_pretty(&JsonReport {
            report: self,
            summary: self.summary(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(name: &str, verdict: Verdict, reason: Option<&str>) -> CheckOutcome {
        CheckOutcome {
            name: name.to_string(),
            verdict,
            expectation: format!("{} holds", name),
            observed: json!({ "value": 1 }),
            reason: reason.map(str::to_string),
        }
    }

    fn report(outcomes: Vec<CheckOutcome>) -> AuditReport {
        AuditReport {
            repository: Some("octo/widgets".to_string()),
            started_at: DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
            outcomes,
        }
    }

    #[test]
    fn all_passing_exits_zero() {
        let report = report(vec![
            outcome("main_present", Verdict::Pass, None),
            outcome("develop_present", Verdict::Pass, None),
        ]);
        assert_eq!(report.exit_code(), EXIT_PASS);
        assert_eq!(
            report.summary(),
            Summary {
                passed: 2,
                failed: 0,
                errored: 0
            }
        );
    }

    #[test]
    fn any_failure_or_error_exits_one() {
        let failed = report(vec![
            outcome("main_present", Verdict::Pass, None),
            outcome("default_branch", Verdict::Fail, Some("wrong")),
        ]);
        assert_eq!(failed.exit_code(), EXIT_FAIL);

        let errored = report(vec![outcome("deploy_key_present", Verdict::Error, Some("denied"))]);
        assert_eq!(errored.exit_code(), EXIT_FAIL);
    }

    #[test]
    fn text_lists_reason_and_observed() {
        let text = report(vec![
            outcome("main_present", Verdict::Pass, None),
            outcome(
                "default_branch",
                Verdict::Fail,
                Some("expected default branch `develop`, got `main`"),
            ),
        ])
        .render_text();
        assert!(text.starts_with("Repository audit of octo/widgets at 2026-01-02T03:04:05"));
        assert!(text.contains("PASS  main_present\n"));
        assert!(text.contains("FAIL  default_branch: expected default branch `develop`, got `main`"));
        assert!(text.contains("observed: {\"value\":1}"));
        assert!(text.ends_with("1 passed, 1 failed, 0 errored\n"));
    }

    #[test]
    fn json_has_outcomes_and_summary() {
        let json = report(vec![outcome("deploy_key_present", Verdict::Error, Some("denied"))])
            .render_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["repository"], "octo/widgets");
        assert_eq!(value["outcomes"][0]["verdict"], "error");
        assert_eq!(value["summary"]["errored"], 1);
    }
}
