//! Three-state query results.

use serde::Serialize;

use crate::github::QueryError;

/// The answer to a repository query.
///
/// `Absent` is a definite answer (the API confirmed the resource does not
/// exist or is not configured). `Failed` means the question could not be
/// answered at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    Found(T),
    Absent,
    Failed(QueryError),
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    /// Returns the failure, if the query could not be answered.
    pub fn failure(&self) -> Option<&QueryError> {
        match self {
            Lookup::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Projects to an `Option`, collapsing `Absent` and `Failed`.
    pub fn found(&self) -> Option<&T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::Absent => Lookup::Absent,
            Lookup::Failed(err) => Lookup::Failed(err),
        }
    }

    /// Chains a lookup that can itself produce any of the three states.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Lookup<U>) -> Lookup<U> {
        match self {
            Lookup::Found(value) => f(value),
            Lookup::Absent => Lookup::Absent,
            Lookup::Failed(err) => Lookup::Failed(err),
        }
    }

    /// Converts to a `Result`, with `Absent` as `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>, QueryError> {
        match self {
            Lookup::Found(value) => Ok(Some(value)),
            Lookup::Absent => Ok(None),
            Lookup::Failed(err) => Err(err),
        }
    }
}

impl<T> From<Result<Option<T>, QueryError>> for Lookup<T> {
    fn from(result: Result<Option<T>, QueryError>) -> Self {
        match result {
            Ok(Some(value)) => Lookup::Found(value),
            Ok(None) => Lookup::Absent,
            Err(err) => Lookup::Failed(err),
        }
    }
}
