//! Policy checks.
//!
//! Each check is a pure function from query results to a `CheckOutcome`, so
//! verdicts can be tested without a repository. `audit::run_audit` gathers the
//! lookups and calls these.
//!
//! A check fails when the live configuration contradicts the policy and
//! errors when a query could not answer; the two are reported separately so a
//! bad token is not mistaken for a policy violation.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::github::QueryError;
use crate::types::{BranchInfo, DeployKeyEntry, FileAtRef, Lookup, ProtectionRule, RepoId};

/// The result of evaluating one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    /// The query could not be answered; the policy was not evaluated.
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.pad("PASS"),
            Verdict::Fail => f.pad("FAIL"),
            Verdict::Error => f.pad("ERROR"),
        }
    }
}

/// A verdict plus the diagnostic payload: what was expected and what was seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub verdict: Verdict,
    pub expectation: String,
    pub observed: Value,
    /// Why the check did not pass, if it did not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CheckOutcome {
    fn new(name: impl Into<String>, expectation: impl Into<String>) -> Builder {
        Builder {
            name: name.into(),
            expectation: expectation.into(),
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

struct Builder {
    name: String,
    expectation: String,
}

impl Builder {
    fn pass(self, observed: Value) -> CheckOutcome {
        self.finish(Verdict::Pass, observed, None)
    }

    fn fail(self, observed: Value, reason: impl Into<String>) -> CheckOutcome {
        self.finish(Verdict::Fail, observed, Some(reason.into()))
    }

    fn error(self, err: &QueryError) -> CheckOutcome {
        let mut reason = err.to_string();
        if err.kind.is_access_problem() {
            reason.push_str("; check that TOKEN is set and has admin read access to the repository");
        }
        self.finish(Verdict::Error, json!({ "error": err }), Some(reason))
    }

    fn verdict(self, ok: bool, observed: Value, reason: impl Into<String>) -> CheckOutcome {
        if ok {
            self.pass(observed)
        } else {
            self.fail(observed, reason)
        }
    }

    fn finish(self, verdict: Verdict, observed: Value, reason: Option<String>) -> CheckOutcome {
        CheckOutcome {
            name: self.name,
            verdict,
            expectation: self.expectation,
            observed,
            reason,
        }
    }
}

// ─── Environment ──────────────────────────────────────────────────────────────

/// The client was configured with a usable repository and a token.
pub fn check_health(repo: Option<&RepoId>, credential_present: bool) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        "health_check",
        "repository URI and access token are configured",
    );
    let observed = json!({
        "repository": repo.map(|r| r.to_string()),
        "credential_present": credential_present,
    });
    match (repo, credential_present) {
        (Some(_), true) => outcome.pass(observed),
        (None, _) => outcome.fail(observed, "repository URI (URL) is missing or unusable"),
        (Some(_), false) => outcome.fail(observed, "access token (TOKEN) is empty"),
    }
}

/// The secrets token has the shape of a personal access token.
pub fn check_secrets_token(pattern: &Regex, secrets_token: Option<&str>) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        "token_present",
        format!("SECRETS_TOKEN matches {}", pattern.as_str()),
    );
    let token = secrets_token.unwrap_or("");
    // Never echo the token itself.
    let observed = json!({
        "present": secrets_token.is_some(),
        "length": token.chars().count(),
        "prefix": token.chars().take(4).collect::<String>(),
    });
    outcome.verdict(
        pattern.is_match(token),
        observed,
        "secret with a valid personal access token doesn't exist",
    )
}

// ─── Deploy keys ──────────────────────────────────────────────────────────────

pub fn check_deploy_key(title: &str, keys: &Lookup<Vec<DeployKeyEntry>>) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        "deploy_key_present",
        format!("a deploy key titled {:?} exists", title),
    );
    match keys {
        Lookup::Found(keys) => {
            let titles: Vec<&str> = keys.iter().map(|k| k.title.as_str()).collect();
            outcome.verdict(
                titles.contains(&title),
                json!({ "titles": titles }),
                format!("the deploy key with name {:?} doesn't exist", title),
            )
        }
        Lookup::Absent => outcome.fail(
            Value::Null,
            "deploy key listing is unavailable (access denied)",
        ),
        Lookup::Failed(err) => outcome.error(err),
    }
}

// ─── Branches ─────────────────────────────────────────────────────────────────

pub fn check_branch_present(branch: &str, lookup: &Lookup<BranchInfo>) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        format!("{}_present", branch),
        format!("branch {} exists", branch),
    );
    match lookup {
        Lookup::Found(info) => outcome.pass(json!({ "exists": true, "branch": info })),
        Lookup::Absent => outcome.fail(
            json!({ "exists": false }),
            format!("branch {} is not present", branch),
        ),
        Lookup::Failed(err) => outcome.error(err),
    }
}

pub fn check_branch_protected(branch: &str, lookup: &Lookup<BranchInfo>) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        format!("{}_protected", branch),
        format!("branch {} is protected", branch),
    );
    match lookup {
        Lookup::Found(info) => outcome.verdict(
            info.protected,
            json!({ "protected": info.protected }),
            format!("branch {} is not protected", branch),
        ),
        Lookup::Absent => outcome.fail(
            json!({ "exists": false, "protected": false }),
            format!("branch {} is not present, so it is not protected", branch),
        ),
        Lookup::Failed(err) => outcome.error(err),
    }
}

pub fn check_default_branch(expected: &str, lookup: &Lookup<String>) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        "default_branch",
        format!("default branch is {}", expected),
    );
    match lookup {
        Lookup::Found(actual) => outcome.verdict(
            actual == expected,
            json!({ "default_branch": actual }),
            format!("expected default branch `{}`, got `{}`", expected, actual),
        ),
        Lookup::Absent => outcome.fail(Value::Null, "repository reports no default branch"),
        Lookup::Failed(err) => outcome.error(err),
    }
}

// ─── Review rules ─────────────────────────────────────────────────────────────

/// The branch requires a pull request before merging.
pub fn check_deny_merge(branch: &str, lookup: &Lookup<ProtectionRule>) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        format!("deny_merge_{}", branch),
        format!("merging to {} requires a pull request", branch),
    );
    match lookup {
        Lookup::Found(rule) => outcome.pass(json!({ "rule": rule })),
        Lookup::Absent => outcome.fail(
            json!({ "rule": null }),
            format!("merging to {} is allowed without a pull request", branch),
        ),
        Lookup::Failed(err) => outcome.error(err),
    }
}

/// The branch requires exactly `expected` approvals.
///
/// With `absent_as_zero`, a confirmed-absent rule counts as zero approvals.
pub fn check_required_approvals(
    branch: &str,
    expected: u32,
    absent_as_zero: bool,
    lookup: &Lookup<ProtectionRule>,
) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        format!("approvals_{}", branch),
        format!("merging to {} requires {} approval(s)", branch, expected),
    );
    let actual = match lookup {
        Lookup::Found(rule) => rule.required_approving_review_count,
        Lookup::Absent if absent_as_zero => 0,
        Lookup::Absent => {
            return outcome.fail(
                json!({ "required_approvals": null }),
                format!("{} has no pull-request review rule", branch),
            );
        }
        Lookup::Failed(err) => return outcome.error(err),
    };
    outcome.verdict(
        actual == expected,
        json!({ "required_approvals": actual, "rule_present": lookup.is_found() }),
        format!(
            "expected {} required approval(s) on {}, got {}",
            expected, branch, actual
        ),
    )
}

/// The branch requires a review from code owners.
///
/// With `accept_absent`, a confirmed-absent rule is accepted. A rule that
/// exists with code owner review disabled always fails.
pub fn check_code_owner_review(
    branch: &str,
    reviewer: &str,
    accept_absent: bool,
    lookup: &Lookup<ProtectionRule>,
) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        format!("code_owner_review_{}", branch),
        format!(
            "merging to {} requires approval from code owners ({})",
            branch, reviewer
        ),
    );
    let reason = format!(
        "merging to {} is allowed without approval from {}",
        branch, reviewer
    );
    match lookup {
        Lookup::Found(rule) => outcome.verdict(
            rule.require_code_owner_reviews,
            json!({ "code_owner_reviews_required": rule.require_code_owner_reviews }),
            reason,
        ),
        Lookup::Absent => outcome.verdict(
            accept_absent,
            json!({ "code_owner_reviews_required": null }),
            reason,
        ),
        Lookup::Failed(err) => outcome.error(err),
    }
}

// ─── Governance files ─────────────────────────────────────────────────────────

/// The first existing CODEOWNERS candidate on `branch` mentions `user`.
///
/// `candidates` are the lookups for each candidate path, in search order;
/// evaluation stops at the first one that was found.
pub fn check_codeowners_contains(
    branch: &str,
    user: &str,
    candidates: &[(String, Lookup<FileAtRef>)],
) -> CheckOutcome {
    let outcome = CheckOutcome::new(
        "codeowners_contains_user",
        format!("CODEOWNERS on {} names {}", branch, user),
    );

    let mut first_failure = None;
    for (_, lookup) in candidates {
        match lookup {
            Lookup::Found(file) => {
                let contains = file.content.contains(user);
                return outcome.verdict(
                    contains,
                    json!({ "path": file.path, "contains_user": contains }),
                    format!("user {} isn't present in {}", user, file.path),
                );
            }
            Lookup::Absent => {}
            Lookup::Failed(err) => {
                first_failure.get_or_insert(err);
            }
        }
    }

    match first_failure {
        Some(err) => outcome.error(err),
        None => {
            let searched: Vec<&str> = candidates.iter().map(|(p, _)| p.as_str()).collect();
            outcome.fail(
                json!({ "searched": searched }),
                format!("file CODEOWNERS doesn't exist on {} branch", branch),
            )
        }
    }
}

/// None of the given paths exist on `branch`.
pub fn check_files_absent(
    name: impl Into<String>,
    branch: &str,
    lookups: &[(String, Lookup<FileAtRef>)],
) -> CheckOutcome {
    let paths: Vec<&str> = lookups.iter().map(|(p, _)| p.as_str()).collect();
    let outcome = CheckOutcome::new(
        name,
        format!("{} absent on {}", paths.join(", "), branch),
    );

    if let Some((path, _)) = lookups.iter().find(|(_, l)| l.is_found()) {
        return outcome.fail(
            json!({ "present": path }),
            format!("file {} exists on {} branch", path, branch),
        );
    }
    if let Some(err) = lookups.iter().find_map(|(_, l)| l.failure()) {
        return outcome.error(err);
    }
    outcome.pass(json!({ "present": null }))
}

/// A file exists on a branch.
pub fn check_file_present(
    name: impl Into<String>,
    path: &str,
    branch: &str,
    lookup: &Lookup<FileAtRef>,
) -> CheckOutcome {
    let outcome = CheckOutcome::new(name, format!("{} exists on {}", path, branch));
    match lookup {
        Lookup::Found(file) => outcome.pass(json!({ "path": file.path, "sha": file.sha })),
        Lookup::Absent => outcome.fail(
            json!({ "path": path, "exists": false }),
            format!("{} is absent on {}", path, branch),
        ),
        Lookup::Failed(err) => outcome.error(err),
    }
}
