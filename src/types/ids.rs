//! Newtype wrappers for repository identity and credentials.
//!
//! These types keep the owner/repo pair and the bearer token from being passed
//! around as bare strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses `owner/repo`, rejecting empty components and extra segments.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, repo) = s.trim_matches('/').split_once('/')?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(RepoId::new(owner, repo))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A bearer token used to authenticate API requests.
///
/// An empty token is a valid value: queries that need authentication report
/// a missing credential instead of being sent anonymously.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Credential(token.into().trim().to_string())
    }

    /// Returns true if no usable token was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the token, or `None` when it is empty.
    pub fn expose(&self) -> Option<&str> {
        if self.0.is_empty() {
            None
        } else {
            Some(&self.0)
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}
