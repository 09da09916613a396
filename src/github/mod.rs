//! GitHub API client for repository configuration queries.
//!
//! This module is the only place that knows GitHub's endpoint shapes and
//! payloads. It exposes the `RepositoryQueries` trait, implemented by
//! `OctocrabClient`.
//!
//! Key features:
//! - One raw GET per question (two for review rules), no retries, no cache
//! - 404 is an answer (`Lookup::Absent`), not an error
//! - Denials, rate limits, transport and decode failures are kept apart
//! - Review rules are normalized across branch protection and rulesets
//! - File contents are base64-decoded before they leave the client

mod client;
mod error;
mod queries;
pub mod wire;

pub use client::{DEFAULT_TIMEOUT, GITHUB_API, OctocrabClient, RepositoryHandle};
pub use error::{QueryError, QueryErrorKind, StatusClass, classify_status};
pub use queries::RepositoryQueries;
