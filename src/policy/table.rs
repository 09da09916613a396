//! The governance policy as data.
//!
//! `Policy::default()` is the built-in table. A TOML file can override any
//! subset of fields; omitted fields keep their defaults. Checks read their
//! thresholds from here and nowhere else.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Where CODEOWNERS must and must not appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodeownersPolicy {
    /// Candidate locations, in the order GitHub itself searches them.
    pub paths: Vec<String>,
    /// Branch on which one of the candidates must exist.
    pub required_on: String,
    /// A substring the CODEOWNERS file must contain.
    pub required_user: String,
    /// Branches on which none of `absent_paths` may exist.
    pub forbidden_on: Vec<String>,
    pub absent_paths: Vec<String>,
}

impl Default for CodeownersPolicy {
    fn default() -> Self {
        Self {
            paths: vec![
                "CODEOWNERS".to_string(),
                ".github/CODEOWNERS".to_string(),
                "docs/CODEOWNERS".to_string(),
            ],
            required_on: "main".to_string(),
            required_user: "softservedata".to_string(),
            forbidden_on: vec!["develop".to_string()],
            absent_paths: vec!["CODEOWNERS".to_string()],
        }
    }
}

/// A file that must exist on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequiredFile {
    pub path: String,
    pub branch: String,
}

impl Default for RequiredFile {
    fn default() -> Self {
        Self {
            path: ".github/pull_request_template.md".to_string(),
            branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Branches that must exist, be protected and require pull requests.
    pub protected_branches: Vec<String>,
    /// Exact approval count required per branch.
    pub required_approvals: BTreeMap<String, u32>,
    /// Branches whose review rule must require code owner review.
    pub code_owner_review_branches: Vec<String>,
    /// Named in diagnostics as the owner whose review is required.
    pub code_owner_reviewer: String,
    pub default_branch: String,
    pub codeowners: CodeownersPolicy,
    pub pull_request_template: RequiredFile,
    pub deploy_key_title: String,
    /// Shape of a classic personal access token.
    pub secrets_token_pattern: String,
    /// Evaluate a confirmed-absent review rule as requiring zero approvals.
    pub absent_rule_counts_as_zero_approvals: bool,
    /// Accept a confirmed-absent review rule for code owner review checks.
    pub absent_rule_satisfies_code_owner_review: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            protected_branches: vec!["main".to_string(), "develop".to_string()],
            required_approvals: BTreeMap::from([
                ("main".to_string(), 0),
                ("develop".to_string(), 2),
            ]),
            code_owner_review_branches: vec!["develop".to_string()],
            code_owner_reviewer: "online-marathon".to_string(),
            default_branch: "develop".to_string(),
            codeowners: CodeownersPolicy::default(),
            pull_request_template: RequiredFile::default(),
            deploy_key_title: "DEPLOY_KEY".to_string(),
            secrets_token_pattern: r"^ghp_\w{36}$".to_string(),
            absent_rule_counts_as_zero_approvals: false,
            absent_rule_satisfies_code_owner_review: true,
        }
    }
}

impl Policy {
    /// Parses a TOML policy, filling omitted fields from the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let policy: Policy = toml::from_str(source)?;
        policy.secrets_token_regex()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadPolicy {
            path: path.to_path_buf(),
            source,
        })?;
        let policy = Self::from_toml_str(&source)?;
        tracing::info!(path = %path.display(), "Loaded policy file");
        Ok(policy)
    }

    pub fn secrets_token_regex(&self) -> Result<Regex, ConfigError> {
        Regex::new(&self.secrets_token_pattern).map_err(|source| ConfigError::TokenPattern {
            pattern: self.secrets_token_pattern.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_table_matches_governance_policy() {
        let policy = Policy::default();
        assert_eq!(policy.protected_branches, ["main", "develop"]);
        assert_eq!(policy.required_approvals.get("main"), Some(&0));
        assert_eq!(policy.required_approvals.get("develop"), Some(&2));
        assert_eq!(policy.default_branch, "develop");
        assert_eq!(policy.codeowners.required_user, "softservedata");
        assert_eq!(
            policy.codeowners.paths,
            ["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"]
        );
        assert_eq!(policy.deploy_key_title, "DEPLOY_KEY");
        assert!(!policy.absent_rule_counts_as_zero_approvals);
        assert!(policy.absent_rule_satisfies_code_owner_review);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let policy = Policy::from_toml_str(
            r#"
            default_branch = "main"

            [required_approvals]
            main = 1

            [codeowners]
            required_user = "platform-team"
            "#,
        )
        .unwrap();
        assert_eq!(policy.default_branch, "main");
        assert_eq!(policy.required_approvals.len(), 1);
        assert_eq!(policy.codeowners.required_user, "platform-team");
        assert_eq!(policy.codeowners.required_on, "main");
        assert_eq!(policy.protected_branches, ["main", "develop"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Policy::from_toml_str("required_approval = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParsePolicy(_)));
    }

    #[test]
    fn invalid_token_pattern_is_rejected() {
        let err = Policy::from_toml_str(r#"secrets_token_pattern = "ghp_(""#).unwrap_err();
        assert!(matches!(err, ConfigError::TokenPattern { .. }));
    }

    #[test]
    fn default_token_pattern_accepts_classic_pat_shape() {
        let regex = Policy::default().secrets_token_regex().unwrap();
        assert!(regex.is_match(&format!("ghp_{}", "a1B2".repeat(9))));
        assert!(!regex.is_match(&format!("ghp_{}", "a".repeat(35))));
        assert!(!regex.is_match(&format!("gho_{}", "a".repeat(36))));
        assert!(!regex.is_match(&format!("github_pat_{}", "a".repeat(36))));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "deploy_key_title = \"RELEASE_KEY\"").unwrap();
        let policy = Policy::load(file.path()).unwrap();
        assert_eq!(policy.deploy_key_title, "RELEASE_KEY");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Policy::load(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadPolicy { .. }));
    }
}
