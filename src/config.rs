//! Command-line and environment configuration.
//!
//! CI injects `URL`, `TOKEN` and `SECRETS_TOKEN`; every value can also be given
//! as a flag. Missing values are not an error here: an empty repository URI or
//! token is reported by the health check so the run still produces a report.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::policy::Policy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    ReadPolicy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    ParsePolicy(#[from] toml::de::Error),

    #[error("invalid secrets token pattern {pattern:?}: {source}")]
    TokenPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown check name(s): {}", .0.join(", "))]
    UnknownChecks(Vec<String>),
}

/// Report rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Audits a GitHub repository's governance settings against policy.
#[derive(Debug, Clone, Parser)]
#[command(name = "repo-audit", version)]
pub struct AuditArgs {
    /// Repository URI, e.g. https://api.github.com/repos/owner/repo or owner/repo.
    #[arg(long = "repo", env = "URL", default_value = "")]
    pub repo_uri: String,

    /// Access token used for API requests.
    #[arg(long, env = "TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Token whose shape is validated by the `token_present` check.
    #[arg(long, env = "SECRETS_TOKEN", hide_env_values = true)]
    pub secrets_token: Option<String>,

    /// TOML file overriding the built-in policy table.
    #[arg(long, env = "AUDIT_POLICY")]
    pub policy: Option<PathBuf>,

    /// Per-request connect and read timeout.
    #[arg(long, env = "AUDIT_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Run only the named checks (repeatable).
    #[arg(long = "only", value_name = "CHECK")]
    pub only: Vec<String>,

    /// Print the check names for the active policy and exit.
    #[arg(long)]
    pub list_checks: bool,
}

impl AuditArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Loads the policy file if one was given, else the built-in table.
    pub fn load_policy(&self) -> Result<Policy, ConfigError> {
        match &self.policy {
            Some(path) => Policy::load(path),
            None => Ok(Policy::default()),
        }
    }
}
