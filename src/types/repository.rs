//! Normalized repository configuration records.
//!
//! These are the shapes the policy layer sees. Raw API payloads are decoded
//! into them once, in `github::wire`, and never leak past the client.

use serde::{Deserialize, Serialize};

/// A branch as returned by the branch lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    /// Whether GitHub reports the branch as protected, either by classic
    /// branch protection or by an active ruleset.
    pub protected: bool,
}

/// Where a review rule was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// The classic branch protection settings.
    BranchProtection,
    /// One or more repository or organization rulesets.
    Ruleset,
}

/// The required pull-request review settings that apply to a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRule {
    pub required_approving_review_count: u32,
    pub require_code_owner_reviews: bool,
    pub dismiss_stale_reviews: bool,
    pub source: RuleSource,
}

/// One entry of the deploy-key listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployKeyEntry {
    pub id: u64,
    pub title: String,
    pub read_only: bool,
}

/// The decoded content of a file at a branch ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAtRef {
    pub path: String,
    pub git_ref: String,
    pub sha: String,
    pub content: String,
}
