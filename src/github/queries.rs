//! Typed repository queries.
//!
//! `RepositoryQueries` is the seam between the policy checks and GitHub: the
//! audit runs against `OctocrabClient` in production and against an in-memory
//! fake in tests. Every method returns a three-state `Lookup`; the provided
//! `branch_exists`/`branch_protected` methods are boolean projections for
//! checks that only care about presence.

use std::future::Future;

use crate::types::{BranchInfo, DeployKeyEntry, FileAtRef, Lookup, ProtectionRule, RepoId};

use super::client::OctocrabClient;
use super::error::{QueryError, QueryErrorKind};
use super::wire::{
    BranchProtectionResponse, BranchResponse, BranchRuleResponse, ContentsResponse,
    DeployKeyResponse, RepositoryResponse, decode_contents, merge_review_rules,
    review_rule_from_protection, review_rule_from_rules,
};

/// Read-only questions about one repository's live configuration.
pub trait RepositoryQueries: Sync {
    /// The repository being queried, if the client is usable.
    fn repository(&self) -> Option<&RepoId>;

    /// Returns true if a non-empty credential is configured.
    fn has_credential(&self) -> bool;

    /// Looks up a branch by name.
    fn branch(&self, name: &str) -> impl Future<Output = Lookup<BranchInfo>> + Send;

    /// Returns the pull-request review rule that applies to a branch.
    ///
    /// `Absent` means neither branch protection nor any active ruleset
    /// requires pull-request reviews.
    fn rules_required_pull_request_reviews(
        &self,
        branch: &str,
    ) -> impl Future<Output = Lookup<ProtectionRule>> + Send;

    /// Returns the repository's default branch name.
    fn default_branch(&self) -> impl Future<Output = Lookup<String>> + Send;

    /// Lists the repository's deploy keys in API order.
    fn deploy_keys(&self) -> impl Future<Output = Lookup<Vec<DeployKeyEntry>>> + Send;

    /// Reads and decodes a file at a branch ref.
    fn file_branch(
        &self,
        path: &str,
        git_ref: &str,
    ) -> impl Future<Output = Lookup<FileAtRef>> + Send;

    /// True iff the branch lookup succeeded.
    fn branch_exists(&self, name: &str) -> impl Future<Output = bool> + Send {
        async move { self.branch(name).await.is_found() }
    }

    /// True iff the branch exists and is flagged as protected.
    fn branch_protected(&self, name: &str) -> impl Future<Output = bool> + Send {
        async move {
            self.branch(name)
                .await
                .found()
                .is_some_and(|branch| branch.protected)
        }
    }
}

/// Percent-encodes each segment of a repository path, keeping `/` separators.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl RepositoryQueries for OctocrabClient {
    fn repository(&self) -> Option<&RepoId> {
        self.repo()
    }

    fn has_credential(&self) -> bool {
        OctocrabClient::has_credential(self)
    }

    async fn branch(&self, name: &str) -> Lookup<BranchInfo> {
        let route = self.repo_route(&format!("/branches/{}", urlencoding::encode(name)));
        self.get_json::<BranchResponse>(&route)
            .await
            .map(BranchInfo::from)
    }

    async fn rules_required_pull_request_reviews(&self, branch: &str) -> Lookup<ProtectionRule> {
        let encoded = urlencoding::encode(branch);

        // Classic protection first; it needs a token with admin read.
        let protection_route = self.repo_route(&format!("/branches/{}/protection", encoded));
        let protection = self
            .get_json_authenticated::<BranchProtectionResponse>(&protection_route)
            .await;

        // A denial here is kept and reported only if rulesets have nothing.
        let (classic, protection_failure) = match protection {
            Lookup::Found(protection) => (review_rule_from_protection(protection), None),
            Lookup::Absent => (None, None),
            Lookup::Failed(err)
                if err.kind.is_access_problem() || err.kind == QueryErrorKind::RateLimited =>
            {
                (None, Some(err))
            }
            Lookup::Failed(err) => return Lookup::Failed(err),
        };

        // Rulesets are enforced alongside classic protection, so always ask.
        let rules_route = self.repo_route(&format!("/rules/branches/{}", encoded));
        let rules = self
            .get_json::<Vec<BranchRuleResponse>>(&rules_route)
            .await
            .and_then(|rules| match review_rule_from_rules(rules) {
                Some(rule) => Lookup::Found(rule),
                None => Lookup::Absent,
            });

        match (classic, rules, protection_failure) {
            (Some(classic), Lookup::Found(ruleset), _) => {
                Lookup::Found(merge_review_rules(classic, ruleset))
            }
            (Some(classic), Lookup::Absent, _) => Lookup::Found(classic),
            (Some(_), Lookup::Failed(err), _) => Lookup::Failed(err),
            (None, Lookup::Found(ruleset), _) => Lookup::Found(ruleset),
            (None, _, Some(err)) => Lookup::Failed(err),
            (None, other, None) => other,
        }
    }

    async fn default_branch(&self) -> Lookup<String> {
        let route = self.repo_route("");
        match self.get_json::<RepositoryResponse>(&route).await {
            // A missing repository is not a missing default branch.
            Lookup::Absent => Lookup::Failed(QueryError::new(
                QueryErrorKind::UnexpectedStatus,
                route,
                Some(404),
                "repository not found or not visible to this token",
            )),
            other => other.map(|repo| repo.default_branch),
        }
    }

    async fn deploy_keys(&self) -> Lookup<Vec<DeployKeyEntry>> {
        let route = self.repo_route("/keys?per_page=100");
        match self
            .get_all_pages_authenticated::<DeployKeyResponse>(&route)
            .await
        {
            // The listing endpoint 404s when the token cannot see the repository.
            Lookup::Absent => Lookup::Failed(QueryError::new(
                QueryErrorKind::AccessDenied,
                route,
                Some(404),
                "deploy keys are not visible to this token",
            )),
            other => other.map(|keys| keys.into_iter().map(DeployKeyEntry::from).collect()),
        }
    }

    async fn file_branch(&self, path: &str, git_ref: &str) -> Lookup<FileAtRef> {
        let route = self.repo_route(&format!(
            "/contents/{}?ref={}",
            encode_path(path),
            urlencoding::encode(git_ref)
        ));
        self.get_json::<ContentsResponse>(&route)
            .await
            .and_then(|contents| match decode_contents(contents, git_ref) {
                Ok(file) => Lookup::Found(file),
                Err(message) => {
                    tracing::warn!(path, git_ref, %message, "Contents could not be decoded");
                    Lookup::Failed(QueryError::malformed(route.as_str(), message))
                }
            })
    }
}
