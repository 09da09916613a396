//! Runs the policy checks against a repository.
//!
//! The set of checks is derived from the policy table (one presence check per
//! protected branch, and so on), then each check issues its queries and is
//! evaluated in turn. Checks are independent: a failed query only affects the
//! check that made it.

use chrono::Utc;
use tracing::Instrument;

use crate::config::ConfigError;
use crate::github::RepositoryQueries;

use super::checks::{
    self, CheckOutcome, check_branch_present, check_branch_protected, check_code_owner_review,
    check_codeowners_contains, check_default_branch, check_deny_merge, check_deploy_key,
    check_file_present, check_files_absent, check_health, check_required_approvals,
    check_secrets_token,
};
use super::report::AuditReport;
use super::table::Policy;

/// One planned check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Health,
    SecretsToken,
    DeployKey,
    BranchPresent(String),
    BranchProtected(String),
    DefaultBranch,
    CodeownersContainsUser,
    CodeownersAbsent(String),
    DenyMerge(String),
    RequiredApprovals { branch: String, expected: u32 },
    CodeOwnerReview(String),
    PullRequestTemplate,
}

impl Check {
    /// The name used in reports and by `--only`.
    pub fn name(&self) -> String {
        match self {
            Check::Health => "health_check".to_string(),
            Check::SecretsToken => "token_present".to_string(),
            Check::DeployKey => "deploy_key_present".to_string(),
            Check::BranchPresent(b) => format!("{}_present", b),
            Check::BranchProtected(b) => format!("{}_protected", b),
            Check::DefaultBranch => "default_branch".to_string(),
            Check::CodeownersContainsUser => "codeowners_contains_user".to_string(),
            Check::CodeownersAbsent(b) => format!("codeowners_absent_{}", b),
            Check::DenyMerge(b) => format!("deny_merge_{}", b),
            Check::RequiredApprovals { branch, .. } => format!("approvals_{}", branch),
            Check::CodeOwnerReview(b) => format!("code_owner_review_{}", b),
            Check::PullRequestTemplate => "pull_request_template_present".to_string(),
        }
    }
}

/// Lists the checks the policy calls for, in report order.
pub fn plan(policy: &Policy) -> Vec<Check> {
    let mut checks = vec![Check::Health, Check::SecretsToken, Check::DeployKey];
    for branch in &policy.protected_branches {
        checks.push(Check::BranchPresent(branch.clone()));
        checks.push(Check::BranchProtected(branch.clone()));
    }
    checks.push(Check::DefaultBranch);
    checks.push(Check::CodeownersContainsUser);
    checks.extend(
        policy
            .codeowners
            .forbidden_on
            .iter()
            .cloned()
            .map(Check::CodeownersAbsent),
    );
    checks.extend(
        policy
            .protected_branches
            .iter()
            .cloned()
            .map(Check::DenyMerge),
    );
    checks.extend(
        policy
            .required_approvals
            .iter()
            .map(|(branch, &expected)| Check::RequiredApprovals {
                branch: branch.clone(),
                expected,
            }),
    );
    checks.extend(
        policy
            .code_owner_review_branches
            .iter()
            .cloned()
            .map(Check::CodeOwnerReview),
    );
    checks.push(Check::PullRequestTemplate);
    checks
}

/// Restricts a plan to the named checks.
///
/// An empty `only` keeps every check. Names that match no planned check are
/// a configuration error.
pub fn select(plan: Vec<Check>, only: &[String]) -> Result<Vec<Check>, ConfigError> {
    if only.is_empty() {
        return Ok(plan);
    }
    let unknown: Vec<String> = only
        .iter()
        .filter(|name| !plan.iter().any(|c| &c.name() == *name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownChecks(unknown));
    }
    Ok(plan
        .into_iter()
        .filter(|c| only.contains(&c.name()))
        .collect())
}

/// Inputs that do not come from the repository.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub secrets_token: Option<String>,
}

/// Evaluates one check, issuing the queries it needs.
pub async fn evaluate<Q: RepositoryQueries>(
    check: &Check,
    queries: &Q,
    policy: &Policy,
    context: &AuditContext,
) -> Result<CheckOutcome, ConfigError> {
    let outcome = match check {
        Check::Health => check_health(queries.repository(), queries.has_credential()),
        Check::SecretsToken => check_secrets_token(
            &policy.secrets_token_regex()?,
            context.secrets_token.as_deref(),
        ),
        Check::DeployKey => check_deploy_key(&policy.deploy_key_title, &queries.deploy_keys().await),
        Check::BranchPresent(branch) => check_branch_present(branch, &queries.branch(branch).await),
        Check::BranchProtected(branch) => {
            check_branch_protected(branch, &queries.branch(branch).await)
        }
        Check::DefaultBranch => {
            check_default_branch(&policy.default_branch, &queries.default_branch().await)
        }
        Check::CodeownersContainsUser => {
            let codeowners = &policy.codeowners;
            let mut candidates = Vec::with_capacity(codeowners.paths.len());
            for path in &codeowners.paths {
                let lookup = queries.file_branch(path, &codeowners.required_on).await;
                let found = lookup.is_found();
                candidates.push((path.clone(), lookup));
                if found {
                    break;
                }
            }
            check_codeowners_contains(
                &codeowners.required_on,
                &codeowners.required_user,
                &candidates,
            )
        }
        Check::CodeownersAbsent(branch) => {
            let mut lookups = Vec::with_capacity(policy.codeowners.absent_paths.len());
            for path in &policy.codeowners.absent_paths {
                lookups.push((path.clone(), queries.file_branch(path, branch).await));
            }
            check_files_absent(check.name(), branch, &lookups)
        }
        Check::DenyMerge(branch) => check_deny_merge(
            branch,
            &queries.rules_required_pull_request_reviews(branch).await,
        ),
        Check::RequiredApprovals { branch, expected } => check_required_approvals(
            branch,
            *expected,
            policy.absent_rule_counts_as_zero_approvals,
            &queries.rules_required_pull_request_reviews(branch).await,
        ),
        Check::CodeOwnerReview(branch) => check_code_owner_review(
            branch,
            &policy.code_owner_reviewer,
            policy.absent_rule_satisfies_code_owner_review,
            &queries.rules_required_pull_request_reviews(branch).await,
        ),
        Check::PullRequestTemplate => {
            let template = &policy.pull_request_template;
            check_file_present(
                check.name(),
                &template.path,
                &template.branch,
                &queries.file_branch(&template.path, &template.branch).await,
            )
        }
    };

    match outcome.verdict {
        checks::Verdict::Pass => tracing::info!(check = %outcome.name, "Check passed"),
        verdict => tracing::info!(
            check = %outcome.name,
            %verdict,
            reason = outcome.reason.as_deref().unwrap_or(""),
            "Check did not pass"
        ),
    }

    Ok(outcome)
}

/// Runs every check in `checks` sequentially and collects the report.
pub async fn run_audit<Q: RepositoryQueries>(
    queries: &Q,
    policy: &Policy,
    checks: &[Check],
    context: &AuditContext,
) -> Result<AuditReport, ConfigError> {
    let started_at = Utc::now();
    let repository = queries.repository().map(|r| r.to_string());
    let span = tracing::info_span!(
        "audit",
        repository = repository.as_deref().unwrap_or("<unconfigured>")
    );

    let outcomes = async {
        let mut outcomes = Vec::with_capacity(checks.len());
        for check in checks {
            outcomes.push(evaluate(check, queries, policy, context).await?);
        }
        Ok::<_, ConfigError>(outcomes)
    }
    .instrument(span)
    .await?;

    Ok(AuditReport {
        repository,
        started_at,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::checks::Verdict;
    use crate::test_utils::FakeRepository;

    fn names(checks: &[Check]) -> Vec<String> {
        checks.iter().map(Check::name).collect()
    }

    #[test]
    fn default_plan_covers_every_governance_check() {
        let names = names(&plan(&Policy::default()));
        assert_eq!(
            names,
            [
                "health_check",
                "token_present",
                "deploy_key_present",
                "main_present",
                "main_protected",
                "develop_present",
                "develop_protected",
                "default_branch",
                "codeowners_contains_user",
                "codeowners_absent_develop",
                "deny_merge_main",
                "deny_merge_develop",
                "approvals_develop",
                "approvals_main",
                "code_owner_review_develop",
                "pull_request_template_present",
            ]
        );
    }

    #[test]
    fn select_filters_and_rejects_unknown() {
        let all = plan(&Policy::default());
        let only = select(all.clone(), &["default_branch".to_string()]).unwrap();
        assert_eq!(only, [Check::DefaultBranch]);

        let err = select(all.clone(), &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownChecks(names) if names == ["nope"]));

        assert_eq!(select(all.clone(), &[]).unwrap(), all);
    }

    #[tokio::test]
    async fn compliant_repository_passes_everything() {
        let repo = FakeRepository::compliant();
        let policy = Policy::default();
        let context = AuditContext {
            secrets_token: Some(format!("ghp_{}", "A".repeat(36))),
        };
        let report = run_audit(&repo, &policy, &plan(&policy), &context)
            .await
            .unwrap();
        let failing: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| !o.passed())
            .map(|o| (o.name.clone(), o.reason.clone()))
            .collect();
        assert!(failing.is_empty(), "unexpected failures: {:?}", failing);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn wrong_default_branch_fails_with_observed_value() {
        let mut repo = FakeRepository::compliant();
        repo.default_branch = crate::types::Lookup::Found("main".to_string());
        let policy = Policy::default();
        let report = run_audit(&repo, &policy, &[Check::DefaultBranch], &AuditContext::default())
            .await
            .unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.observed["default_branch"], "main");
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn codeowners_search_stops_at_first_hit() {
        let mut repo = FakeRepository::compliant();
        repo.add_file("main", "CODEOWNERS", "* @softservedata\n");
        let policy = Policy::default();
        let outcome = evaluate(
            &Check::CodeownersContainsUser,
            &repo,
            &policy,
            &AuditContext::default(),
        )
        .await
        .unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.observed["path"], "CODEOWNERS");
        assert_eq!(repo.file_queries(), ["main:CODEOWNERS"]);
    }

    #[tokio::test]
    async fn denied_deploy_keys_do_not_stop_other_checks() {
        let mut repo = FakeRepository::compliant();
        repo.deny_deploy_keys();
        let policy = Policy::default();
        let checks = [Check::DeployKey, Check::BranchPresent("main".to_string())];
        let report = run_audit(&repo, &policy, &checks, &AuditContext::default())
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].verdict, Verdict::Error);
        assert!(report.outcomes[1].passed());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn codeowners_on_develop_fails_absence_check() {
        let mut repo = FakeRepository::compliant();
        repo.add_file("develop", "CODEOWNERS", "* @softservedata\n");
        let policy = Policy::default();
        let outcome = evaluate(
            &Check::CodeownersAbsent("develop".to_string()),
            &repo,
            &policy,
            &AuditContext::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn unprotected_main_fails_zero_approvals_by_default() {
        let mut repo = FakeRepository::compliant();
        repo.remove_rule("main");
        let approvals = Check::RequiredApprovals {
            branch: "main".to_string(),
            expected: 0,
        };

        let policy = Policy::default();
        let outcome = evaluate(&approvals, &repo, &policy, &AuditContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Fail);

        let deny = evaluate(
            &Check::DenyMerge("main".to_string()),
            &repo,
            &policy,
            &AuditContext::default(),
        )
        .await
        .unwrap();
        assert_eq!(deny.verdict, Verdict::Fail);

        let policy = Policy {
            absent_rule_counts_as_zero_approvals: true,
            ..Policy::default()
        };
        let outcome = evaluate(&approvals, &repo, &policy, &AuditContext::default())
            .await
            .unwrap();
        assert!(outcome.passed());
    }

    #[tokio::test]
    async fn absent_develop_rule_still_passes_code_owner_review() {
        let mut repo = FakeRepository::compliant();
        repo.remove_rule("develop");
        let policy = Policy::default();
        let review = evaluate(
            &Check::CodeOwnerReview("develop".to_string()),
            &repo,
            &policy,
            &AuditContext::default(),
        )
        .await
        .unwrap();
        assert!(review.passed());

        let approvals = evaluate(
            &Check::RequiredApprovals {
                branch: "develop".to_string(),
                expected: 2,
            },
            &repo,
            &policy,
            &AuditContext::default(),
        )
        .await
        .unwrap();
        assert_eq!(approvals.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let repo = FakeRepository::compliant();
        let policy = Policy::default();
        let checks = plan(&policy);
        let first = run_audit(&repo, &policy, &checks, &AuditContext::default())
            .await
            .unwrap();
        let second = run_audit(&repo, &policy, &checks, &AuditContext::default())
            .await
            .unwrap();
        assert_eq!(first.outcomes, second.outcomes);
    }
}
