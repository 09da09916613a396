//! Octocrab client wrapper scoped to a specific repository.
//!
//! `OctocrabClient` owns the `RepositoryHandle` (endpoint, repository identity
//! and credential) and performs raw GET requests, classifying every response
//! into a `Lookup`. Construction never fails: an unusable repository URI or a
//! client build error is kept and reported by every query instead.

use std::time::Duration;

use octocrab::Octocrab;
use octocrab::service::middleware::retry::RetryConfig;
use serde::de::DeserializeOwned;

use crate::types::{Credential, Lookup, RepoId};

use super::error::{QueryError, QueryErrorKind, StatusClass, classify_status};

/// The public GitHub API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// Default bound on connect and read time for each request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Listings longer than this many pages are reported as malformed.
const MAX_PAGES: usize = 50;

/// The repository an audit targets, parsed from a repository URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    /// API base URL without a trailing slash.
    pub api_base: String,
    pub repo: RepoId,
    pub credential: Credential,
}

impl RepositoryHandle {
    /// Parses a repository URI.
    ///
    /// Accepted forms:
    /// - `https://api.github.com/repos/{owner}/{repo}`
    /// - `https://{host}/api/v3/repos/{owner}/{repo}` (GitHub Enterprise)
    /// - `https://github.com/{owner}/{repo}[.git]`
    /// - `{owner}/{repo}`
    pub fn parse(repo_uri: &str, credential: Credential) -> Result<Self, String> {
        let uri = repo_uri.trim().trim_end_matches('/');
        if uri.is_empty() {
            return Err("repository URI is empty".to_string());
        }

        let (api_base, path) = match uri.split_once("://") {
            None => (GITHUB_API.to_string(), uri),
            Some((scheme, rest)) => {
                let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
                if host.is_empty() {
                    return Err(format!("repository URI {:?} has no host", repo_uri));
                }
                match path.split_once("repos/") {
                    Some((prefix, repo_path)) if prefix.is_empty() || prefix.ends_with('/') => {
                        let prefix = prefix.trim_end_matches('/');
                        let base = if prefix.is_empty() {
                            format!("{}://{}", scheme, host)
                        } else {
                            format!("{}://{}/{}", scheme, host, prefix)
                        };
                        (base, repo_path)
                    }
                    _ if host == "github.com" || host == "www.github.com" => {
                        (GITHUB_API.to_string(), path)
                    }
                    // A web URL on an Enterprise host: the API lives under /api/v3.
                    _ => (format!("{}://{}/api/v3", scheme, host), path),
                }
            }
        };

        let repo = RepoId::parse(path).ok_or_else(|| {
            format!(
                "repository URI {:?} does not name an owner/repo pair",
                repo_uri
            )
        })?;

        Ok(Self {
            api_base,
            repo,
            credential,
        })
    }
}

#[derive(Clone)]
struct Connected {
    client: Octocrab,
    handle: RepositoryHandle,
}

/// A GitHub API client scoped to a specific repository.
#[derive(Clone)]
pub struct OctocrabClient {
    state: Result<Connected, QueryError>,
    credential_present: bool,
}

impl OctocrabClient {
    /// Creates a client from a repository URI and token, with the default timeout.
    ///
    /// Both arguments may be empty.
    pub fn new(repo_uri: &str, token: &str) -> Self {
        Self::with_timeout(repo_uri, token, DEFAULT_TIMEOUT)
    }

    /// Creates a client whose requests give up after `timeout`.
    pub fn with_timeout(repo_uri: &str, token: &str, timeout: Duration) -> Self {
        let credential = Credential::new(token);
        let credential_present = !credential.is_empty();
        let state = RepositoryHandle::parse(repo_uri, credential)
            .map_err(|message| {
                QueryError::new(QueryErrorKind::Misconfigured, repo_uri, None, message)
            })
            .and_then(|handle| Self::connect(handle, timeout));

        if let Err(err) = &state {
            tracing::warn!(error = %err, "Repository client is unusable; every query will fail");
        }

        Self {
            state,
            credential_present,
        }
    }

    fn connect(handle: RepositoryHandle, timeout: Duration) -> Result<Connected, QueryError> {
        let misconfigured = |e: octocrab::Error| {
            QueryError::new(
                QueryErrorKind::Misconfigured,
                handle.api_base.clone(),
                None,
                e.to_string(),
            )
        };

        let mut builder = Octocrab::builder()
            .base_uri(handle.api_base.as_str())
            .map_err(misconfigured)?
            .add_retry_config(RetryConfig::None)
            .set_connect_timeout(Some(timeout))
            .set_read_timeout(Some(timeout));
        if let Some(token) = handle.credential.expose() {
            builder = builder.personal_token(token.to_string());
        }
        let client = builder.build().map_err(misconfigured)?;

        Ok(Connected { client, handle })
    }

    /// Returns the repository this client is scoped to, if the URI was usable.
    pub fn repo(&self) -> Option<&RepoId> {
        self.state.as_ref().ok().map(|c| &c.handle.repo)
    }

    /// Returns the configuration failure, if the client is unusable.
    pub fn configuration_error(&self) -> Option<&QueryError> {
        self.state.as_ref().err()
    }

    /// Returns true if a non-empty token was supplied.
    pub fn has_credential(&self) -> bool {
        self.credential_present
    }

    /// Builds a repository-scoped route, e.g. `repo_route("/keys")`.
    pub(crate) fn repo_route(&self, suffix: &str) -> String {
        match &self.state {
            Ok(c) => format!(
                "/repos/{}/{}{}",
                urlencoding::encode(&c.handle.repo.owner),
                urlencoding::encode(&c.handle.repo.repo),
                suffix
            ),
            Err(_) => format!("/repos/<unconfigured>{}", suffix),
        }
    }

    /// Like `get_json`, but fails without sending when no token is configured.
    pub(crate) async fn get_json_authenticated<T: DeserializeOwned>(&self, route: &str) -> Lookup<T> {
        if !self.credential_present {
            tracing::warn!(route, "Skipping authenticated query: no token configured");
            return Lookup::Failed(QueryError::missing_credential(route));
        }
        self.get_json(route).await
    }

    /// Like `get_all_pages`, but fails without sending when no token is configured.
    pub(crate) async fn get_all_pages_authenticated<T: DeserializeOwned>(
        &self,
        route: &str,
    ) -> Lookup<Vec<T>> {
        if !self.credential_present {
            tracing::warn!(route, "Skipping authenticated query: no token configured");
            return Lookup::Failed(QueryError::missing_credential(route));
        }
        self.get_all_pages(route).await
    }

    /// Fetches a listing, following `Link: rel="next"` until the last page.
    ///
    /// A 404 on the first page is `Absent`; a 404 on a later page is a failure.
    pub(crate) async fn get_all_pages<T: DeserializeOwned>(&self, first: &str) -> Lookup<Vec<T>> {
        let mut items = Vec::new();
        let mut route = first.to_string();
        for page_number in 1..=MAX_PAGES {
            let page = self.get_page::<Vec<T>>(&route).await;
            match page {
                Lookup::Found(page) => {
                    items.extend(page.value);
                    match page.next {
                        Some(next) => route = next,
                        None => return Lookup::Found(items),
                    }
                }
                Lookup::Absent if page_number == 1 => return Lookup::Absent,
                Lookup::Absent => {
                    return Lookup::Failed(QueryError::new(
                        QueryErrorKind::UnexpectedStatus,
                        route,
                        Some(404),
                        format!("page {} of the listing was not found", page_number),
                    ));
                }
                Lookup::Failed(err) => return Lookup::Failed(err),
            }
        }
        Lookup::Failed(QueryError::malformed(
            first,
            format!("listing did not end within {} pages", MAX_PAGES),
        ))
    }

    /// Performs a GET against `route` and decodes a success body as `T`.
    ///
    /// 404 becomes `Absent`; every other non-success status, transport error
    /// or undecodable body becomes `Failed`.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, route: &str) -> Lookup<T> {
        self.get_page(route).await.map(|page| page.value)
    }

    async fn get_page<T: DeserializeOwned>(&self, route: &str) -> Lookup<Page<T>> {
        let connected = match &self.state {
            Ok(c) => c,
            Err(err) => return Lookup::Failed(err.clone()),
        };

        tracing::debug!(route, "GET");

        let response = match connected.client._get(route).await {
            Ok(response) => response,
            Err(e) => {
                let err = QueryError::from_transport(route, &e);
                tracing::warn!(route, error = %err, "Request failed before a response was received");
                return Lookup::Failed(err);
            }
        };

        let status = response.status().as_u16();
        let next_target = response
            .headers()
            .get("link")
            .and_then(|value| value.to_str().ok())
            .and_then(next_link)
            .map(str::to_string);
        let body = match connected.client.body_to_string(response).await {
            Ok(body) => body,
            Err(e) => {
                let err = QueryError::from_transport(route, &e);
                tracing::warn!(route, status, error = %err, "Failed to read response body");
                return Lookup::Failed(err);
            }
        };

        match classify_status(status) {
            StatusClass::Success => {
                let next = match next_target {
                    None => None,
                    Some(target) => match route_within(&connected.handle.api_base, &target) {
                        Some(next) => Some(next),
                        None => {
                            tracing::warn!(route, link = %target, "Pagination link leaves the API base");
                            return Lookup::Failed(QueryError::malformed(
                                route,
                                format!("next page {} is outside {}", target, connected.handle.api_base),
                            ));
                        }
                    },
                };
                match serde_json::from_str(&body) {
                    Ok(value) => Lookup::Found(Page { value, next }),
                    Err(e) => {
                        tracing::warn!(route, status, error = %e, "Response body has an unexpected shape");
                        Lookup::Failed(QueryError::malformed(route, e.to_string()))
                    }
                }
            }
            StatusClass::NotFound => {
                tracing::debug!(route, "Resource not found");
                Lookup::Absent
            }
            StatusClass::Failure => {
                let err = QueryError::from_status(route, status, &body);
                tracing::warn!(route, status, error = %err, "Query failed");
                Lookup::Failed(err)
            }
        }
    }
}

/// One decoded response and the route of the page after it, if any.
struct Page<T> {
    value: T,
    next: Option<String>,
}

/// Extracts the `rel="next"` target from a `Link` header.
fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
            })
    })
}

/// Turns an absolute URL under `api_base` into a route relative to it.
fn route_within(api_base: &str, url: &str) -> Option<String> {
    url.strip_prefix(api_base)
        .filter(|rest| rest.starts_with('/'))
        .map(str::to_string)
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("OctocrabClient");
        match &self.state {
            Ok(c) => s.field("api_base", &c.handle.api_base).field("repo", &c.handle.repo),
            Err(err) => s.field("error", err),
        };
        s.field("credential_present", &self.credential_present)
            .finish_non_exhaustive()
    }
}
