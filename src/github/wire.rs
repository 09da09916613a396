//! GitHub REST payloads and their normalization.
//!
//! Each endpoint has a private-ish wire struct that mirrors the parts of the
//! JSON we read, and a pure function that turns it into one of the records in
//! `crate::types`. Keeping these free of I/O makes the shape handling testable
//! without a server.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::types::{BranchInfo, DeployKeyEntry, FileAtRef, ProtectionRule, RuleSource};

// ─── Branches ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BranchResponse {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
}

impl From<BranchResponse> for BranchInfo {
    fn from(branch: BranchResponse) -> Self {
        BranchInfo {
            name: branch.name,
            protected: branch.protected,
        }
    }
}

// ─── Classic branch protection ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BranchProtectionResponse {
    #[serde(default)]
    pub required_pull_request_reviews: Option<RequiredPullRequestReviews>,
}

#[derive(Debug, Deserialize)]
pub struct RequiredPullRequestReviews {
    #[serde(default)]
    pub required_approving_review_count: Option<u32>,
    #[serde(default)]
    pub require_code_owner_reviews: bool,
    #[serde(default)]
    pub dismiss_stale_reviews: bool,
}

/// Extracts the review rule from a classic protection payload.
///
/// Returns `None` when the branch is protected but pull-request reviews are
/// not required.
pub fn review_rule_from_protection(protection: BranchProtectionResponse) -> Option<ProtectionRule> {
    protection
        .required_pull_request_reviews
        .map(|reviews| ProtectionRule {
            required_approving_review_count: reviews.required_approving_review_count.unwrap_or(0),
            require_code_owner_reviews: reviews.require_code_owner_reviews,
            dismiss_stale_reviews: reviews.dismiss_stale_reviews,
            source: RuleSource::BranchProtection,
        })
}

// ─── Rulesets (active rules for a branch) ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BranchRuleResponse {
    pub r#type: String,
    #[serde(default)]
    pub parameters: Option<PullRequestRuleParameters>,
}

/// Parameters of a `pull_request` rule.
///
/// Note the rules API spells the code owner flag in the singular.
#[derive(Debug, Default, Deserialize)]
pub struct PullRequestRuleParameters {
    #[serde(default)]
    pub required_approving_review_count: u32,
    #[serde(default)]
    pub require_code_owner_review: bool,
    #[serde(default)]
    pub dismiss_stale_reviews_on_push: bool,
}

/// Merges every `pull_request` rule that applies to a branch.
///
/// Rulesets stack, and GitHub enforces the most restrictive value of each
/// setting, so counts take the maximum and flags are OR-ed. Returns `None` if
/// no pull-request rule is active.
pub fn review_rule_from_rules(rules: Vec<BranchRuleResponse>) -> Option<ProtectionRule> {
    rules
        .into_iter()
        .filter(|rule| rule.r#type == "pull_request")
        .map(|rule| rule.parameters.unwrap_or_default())
        .fold(None, |merged: Option<ProtectionRule>, params| {
            let mut rule = merged.unwrap_or(ProtectionRule {
                required_approving_review_count: 0,
                require_code_owner_reviews: false,
                dismiss_stale_reviews: false,
                source: RuleSource::Ruleset,
            });
            rule.required_approving_review_count = rule
                .required_approving_review_count
                .max(params.required_approving_review_count);
            rule.require_code_owner_reviews |= params.require_code_owner_review;
            rule.dismiss_stale_reviews |= params.dismiss_stale_reviews_on_push;
            Some(rule)
        })
}

/// Combines a classic protection rule with the ruleset rule for the same
/// branch.
///
/// Both are enforced, so the stricter value of each setting wins. The source
/// is the one that sets the approval count, with ties kept on classic
/// protection.
pub fn merge_review_rules(classic: ProtectionRule, ruleset: ProtectionRule) -> ProtectionRule {
    let source = if ruleset.required_approving_review_count > classic.required_approving_review_count
    {
        ruleset.source
    } else {
        classic.source
    };
    ProtectionRule {
        required_approving_review_count: classic
            .required_approving_review_count
            .max(ruleset.required_approving_review_count),
        require_code_owner_reviews: classic.require_code_owner_reviews
            || ruleset.require_code_owner_reviews,
        dismiss_stale_reviews: classic.dismiss_stale_reviews || ruleset.dismiss_stale_reviews,
        source,
    }
}

// ─── Repository metadata ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RepositoryResponse {
    pub default_branch: String,
}

// ─── Deploy keys ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeployKeyResponse {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub read_only: bool,
}

impl From<DeployKeyResponse> for DeployKeyEntry {
    fn from(key: DeployKeyResponse) -> Self {
        DeployKeyEntry {
            id: key.id,
            title: key.title,
            read_only: key.read_only,
        }
    }
}

// ─── Contents ─────────────────────────────────────────────────────────────────

/// The contents API returns an object for a file and an array for a directory.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContentsResponse {
    Entry(ContentsEntry),
    Listing(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
pub struct ContentsEntry {
    pub r#type: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Decodes a contents payload into the file's text.
///
/// Returns a description of the problem when the payload is not a decodable
/// text file.
pub fn decode_contents(contents: ContentsResponse, git_ref: &str) -> Result<FileAtRef, String> {
    let entry = match contents {
        ContentsResponse::Entry(entry) => entry,
        ContentsResponse::Listing(_) => {
            return Err("path is a directory, not a file".to_string());
        }
    };

    if entry.r#type != "file" {
        return Err(format!("path is a {}, not a file", entry.r#type));
    }

    match entry.encoding.as_deref() {
        Some("base64") => {}
        Some(other) => {
            return Err(format!(
                "content is served with encoding {:?}; files over 1 MB are not inlined",
                other
            ));
        }
        None => return Err("content has no encoding".to_string()),
    }

    let content = decode_base64_text(entry.content.as_deref().unwrap_or(""))?;

    Ok(FileAtRef {
        path: entry.path,
        git_ref: git_ref.to_string(),
        sha: entry.sha,
        content,
    })
}

/// Decodes base64 that GitHub wraps at 60 columns.
pub fn decode_base64_text(encoded: &str) -> Result<String, String> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64 content: {}", e))?;
    String::from_utf8(bytes).map_err(|_| "file content is not valid UTF-8".to_string())
}
