//! Repo Audit - checks a GitHub repository's governance settings against policy.
//!
//! This library provides the repository client (`github`), the policy table and
//! checks (`policy`), and the configuration surface of the `repo-audit` binary.

pub mod config;
pub mod github;
pub mod policy;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
