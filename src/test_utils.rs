//! Shared test utilities: an in-memory repository and proptest generators.

use std::collections::HashMap;
use std::sync::Mutex;

use proptest::prelude::*;

use crate::github::{QueryError, QueryErrorKind, RepositoryQueries};
use crate::types::{
    BranchInfo, DeployKeyEntry, FileAtRef, Lookup, ProtectionRule, RepoId, RuleSource,
};

/// A repository whose configuration is set directly by the test.
///
/// Branches and files not added are `Absent`. File lookups are recorded so
/// tests can assert on which paths were queried.
#[derive(Debug)]
pub struct FakeRepository {
    pub repo: Option<RepoId>,
    pub credential_present: bool,
    pub branches: HashMap<String, BranchInfo>,
    pub rules: HashMap<String, Lookup<ProtectionRule>>,
    pub default_branch: Lookup<String>,
    pub deploy_keys: Lookup<Vec<DeployKeyEntry>>,
    pub files: HashMap<(String, String), String>,
    file_queries: Mutex<Vec<String>>,
}

impl FakeRepository {
    pub fn empty() -> Self {
        Self {
            repo: Some(RepoId::new("octo", "widgets")),
            credential_present: true,
            branches: HashMap::new(),
            rules: HashMap::new(),
            default_branch: Lookup::Absent,
            deploy_keys: Lookup::Found(vec![]),
            files: HashMap::new(),
            file_queries: Mutex::new(Vec::new()),
        }
    }

    /// A repository that satisfies the default policy.
    pub fn compliant() -> Self {
        let mut repo = Self::empty();
        repo.add_branch("main", true);
        repo.add_branch("develop", true);
        repo.set_rule("main", 0, false);
        repo.set_rule("develop", 2, true);
        repo.default_branch = Lookup::Found("develop".to_string());
        repo.deploy_keys = Lookup::Found(vec![DeployKeyEntry {
            id: 1,
            title: "DEPLOY_KEY".to_string(),
            read_only: true,
        }]);
        repo.add_file("main", ".github/CODEOWNERS", "* @softservedata\n");
        repo.add_file("main", ".github/pull_request_template.md", "## Summary\n");
        repo
    }

    pub fn add_branch(&mut self, name: &str, protected: bool) {
        self.branches.insert(
            name.to_string(),
            BranchInfo {
                name: name.to_string(),
                protected,
            },
        );
    }

    pub fn set_rule(&mut self, branch: &str, approvals: u32, code_owners: bool) {
        self.rules.insert(
            branch.to_string(),
            Lookup::Found(ProtectionRule {
                required_approving_review_count: approvals,
                require_code_owner_reviews: code_owners,
                dismiss_stale_reviews: false,
                source: RuleSource::BranchProtection,
            }),
        );
    }

    pub fn remove_rule(&mut self, branch: &str) {
        self.rules.remove(branch);
    }

    pub fn add_file(&mut self, git_ref: &str, path: &str, content: &str) {
        self.files
            .insert((git_ref.to_string(), path.to_string()), content.to_string());
    }

    pub fn deny_deploy_keys(&mut self) {
        self.deploy_keys = Lookup::Failed(QueryError::new(
            QueryErrorKind::AccessDenied,
            "/repos/octo/widgets/keys",
            Some(403),
            "Resource not accessible by personal access token",
        ));
    }

    /// The `ref:path` pairs queried so far, in order.
    pub fn file_queries(&self) -> Vec<String> {
        self.file_queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

impl RepositoryQueries for FakeRepository {
    fn repository(&self) -> Option<&RepoId> {
        self.repo.as_ref()
    }

    fn has_credential(&self) -> bool {
        self.credential_present
    }

    async fn branch(&self, name: &str) -> Lookup<BranchInfo> {
        self.branches
            .get(name)
            .cloned()
            .map_or(Lookup::Absent, Lookup::Found)
    }

    async fn rules_required_pull_request_reviews(&self, branch: &str) -> Lookup<ProtectionRule> {
        self.rules.get(branch).cloned().unwrap_or(Lookup::Absent)
    }

    async fn default_branch(&self) -> Lookup<String> {
        self.default_branch.clone()
    }

    async fn deploy_keys(&self) -> Lookup<Vec<DeployKeyEntry>> {
        self.deploy_keys.clone()
    }

    async fn file_branch(&self, path: &str, git_ref: &str) -> Lookup<FileAtRef> {
        if let Ok(mut queries) = self.file_queries.lock() {
            queries.push(format!("{}:{}", git_ref, path));
        }
        match self.files.get(&(git_ref.to_string(), path.to_string())) {
            Some(content) => Lookup::Found(FileAtRef {
                path: path.to_string(),
                git_ref: git_ref.to_string(),
                sha: format!("{:040x}", content.len()),
                content: content.clone(),
            }),
            None => Lookup::Absent,
        }
    }
}

pub fn arb_branch_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9/-]{0,50}".prop_map(String::from)
}

pub fn arb_protection_rule() -> impl Strategy<Value = ProtectionRule> {
    (0u32..7, any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(count, code_owners, dismiss, from_ruleset)| ProtectionRule {
            required_approving_review_count: count,
            require_code_owner_reviews: code_owners,
            dismiss_stale_reviews: dismiss,
            source: if from_ruleset {
                RuleSource::Ruleset
            } else {
                RuleSource::BranchProtection
            },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn unknown_branches_are_absent_and_unprotected(branch in arb_branch_name()) {
            prop_assume!(branch != "main" && branch != "develop");
            let repo = FakeRepository::compliant();
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                assert!(!repo.branch_exists(&branch).await);
                assert!(!repo.branch_protected(&branch).await);
            });
        }
    }
}
