//! GitHub query error types.
//!
//! A query either finds its resource, confirms it is absent, or fails. This
//! module describes the failures. They are categorized so a report can tell a
//! misconfigured token apart from a genuine policy violation:
//!
//! - **AccessDenied** / **MissingCredential**: the token cannot see the resource
//! - **RateLimited**: the API refused to answer right now (no retry is attempted)
//! - **Transport**: the API could not be reached, or the request timed out
//! - **UnexpectedStatus** / **Malformed**: the API answered with something we
//!   cannot interpret
//! - **Misconfigured**: the repository URI could not be turned into an endpoint
//!
//! Not-found is deliberately absent from this list: it is a normal answer and is
//! represented by `Lookup::Absent`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The kind of query failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// HTTP 401, or 403 without rate-limit markers.
    AccessDenied,

    /// The query needs authentication and no token was configured.
    MissingCredential,

    /// HTTP 429, or 403 with rate-limit markers.
    RateLimited,

    /// DNS, connect, TLS or timeout failure; no response was received.
    Transport,

    /// A status code that is neither success, not-found nor a denial.
    UnexpectedStatus,

    /// A success response whose body does not have the expected shape.
    Malformed,

    /// The client was constructed from an unusable repository URI.
    Misconfigured,
}

impl QueryErrorKind {
    /// Returns true if the failure is about credentials rather than the
    /// repository or the network.
    pub fn is_access_problem(&self) -> bool {
        matches!(
            self,
            QueryErrorKind::AccessDenied | QueryErrorKind::MissingCredential
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryErrorKind::AccessDenied => "access denied",
            QueryErrorKind::MissingCredential => "missing credential",
            QueryErrorKind::RateLimited => "rate limited",
            QueryErrorKind::Transport => "transport failure",
            QueryErrorKind::UnexpectedStatus => "unexpected status",
            QueryErrorKind::Malformed => "malformed response",
            QueryErrorKind::Misconfigured => "misconfigured client",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed repository query.
///
/// The underlying octocrab or serde error is flattened into `message` so the
/// error can be cloned into reports and compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub struct QueryError {
    /// The kind of failure.
    pub kind: QueryErrorKind,

    /// The API route that was queried (without host).
    pub resource: String,

    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    /// A human-readable description of the failure.
    pub message: String,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(
                f,
                "{} on {} (HTTP {}): {}",
                self.kind, self.resource, code, self.message
            ),
            None => write!(f, "{} on {}: {}", self.kind, self.resource, self.message),
        }
    }
}

impl QueryError {
    pub fn new(
        kind: QueryErrorKind,
        resource: impl Into<String>,
        status_code: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            resource: resource.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Creates an error for a query skipped because no token is configured.
    pub fn missing_credential(resource: impl Into<String>) -> Self {
        Self::new(
            QueryErrorKind::MissingCredential,
            resource,
            None,
            "no access token configured; this endpoint requires authentication",
        )
    }

    /// Creates an error for a response body that could not be interpreted.
    pub fn malformed(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Malformed, resource, None, message)
    }

    /// Categorizes an error raised before a response was received.
    ///
    /// The message is the first line of each error in the source chain.
    /// octocrab renders a backtrace after the first line, which never reaches
    /// the report.
    pub fn from_transport(
        resource: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
    ) -> Self {
        let mut message = first_line(&err.to_string()).to_string();
        let mut timed_out = false;
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                timed_out |= io.kind() == std::io::ErrorKind::TimedOut;
            }
            let text = cause.to_string();
            let line = first_line(&text);
            timed_out |= is_timeout_error(line);
            if !line.is_empty() && !message.contains(line) {
                message.push_str(": ");
                message.push_str(line);
            }
            source = cause.source();
        }
        if timed_out {
            message = format!("request timed out: {}", message);
        }
        Self::new(QueryErrorKind::Transport, resource, None, message)
    }

    /// Categorizes a non-success, non-404 HTTP response.
    pub fn from_status(resource: impl Into<String>, status: u16, body: &str) -> Self {
        let message = api_message(body).unwrap_or_else(|| body.trim().to_string());
        let kind = match status {
            429 => QueryErrorKind::RateLimited,
            403 if is_rate_limit_error(&message) => QueryErrorKind::RateLimited,
            401 | 403 => QueryErrorKind::AccessDenied,
            _ => QueryErrorKind::UnexpectedStatus,
        };
        Self::new(kind, resource, Some(status), message)
    }
}

/// How a received HTTP status should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: decode the body.
    Success,
    /// 404: the resource is confirmed absent.
    NotFound,
    /// Anything else: a failure to categorize with `QueryError::from_status`.
    Failure,
}

/// Classifies an HTTP status code.
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        404 => StatusClass::NotFound,
        _ => StatusClass::Failure,
    }
}

/// Extracts the `message` field GitHub puts in error bodies.
fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

/// Checks if an error message indicates the request timed out.
fn is_timeout_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout") || message_lower.contains("timed out")
}
