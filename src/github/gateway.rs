//! Trait-based gateway for the forge REST API, backed by Octocrab.
//!
//! The [`ForgeGateway`] trait is the seam between the extraction pipeline
//! and the network: the orchestrator and tests depend on the trait while
//! [`OctocrabForge`] performs real HTTP requests. Per-PR collection
//! endpoints are drained through the rate-limited [`Paginator`] internally,
//! so callers always receive complete collections.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use http::{StatusCode, Uri};
use octocrab::Octocrab;
use serde::de::DeserializeOwned;

use super::error::ExtractError;
use super::locator::{PersonalAccessToken, RepositoryLocator};
use super::models::{
    ApiCheckRun, ApiCheckRunList, ApiFileChange, ApiIssueComment, ApiPullRequest, ApiReview,
    ApiReviewComment, ApiTimelineEvent,
};
use super::paginator::{PageFetcher, Paginator, collect_all};
use super::rate_limit::{RateLimitInfo, RateLimitTracker};
use super::retry::RetryPolicy;

/// Items fetched per page on collection endpoints.
const COLLECTION_PER_PAGE: u8 = 100;

/// Sort order for the pull request listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSort {
    /// Oldest-created first; PR numbers arrive in ascending order.
    #[default]
    CreatedAscending,
    /// Least-recently-updated first; used with a `since` filter for
    /// incremental runs.
    UpdatedAscending,
}

impl ListSort {
    const fn sort_param(self) -> &'static str {
        match self {
            Self::CreatedAscending => "created",
            Self::UpdatedAscending => "updated",
        }
    }
}

/// Query shape for one pull request listing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Sort order for the listing.
    pub sort: ListSort,
    /// Only include pull requests updated at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Gateway over the forge endpoints the extraction pipeline consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForgeGateway: Send + Sync {
    /// Fetches one page of the pull request listing.
    async fn pull_request_page(
        &self,
        query: &ListQuery,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<ApiPullRequest>, ExtractError>;

    /// Fetches all review submissions for a pull request.
    async fn reviews(&self, number: u64) -> Result<Vec<ApiReview>, ExtractError>;

    /// Fetches all PR-level discussion comments for a pull request.
    async fn issue_comments(&self, number: u64) -> Result<Vec<ApiIssueComment>, ExtractError>;

    /// Fetches all inline review comments for a pull request.
    async fn review_comments(&self, number: u64) -> Result<Vec<ApiReviewComment>, ExtractError>;

    /// Fetches all changed files for a pull request.
    async fn files(&self, number: u64) -> Result<Vec<ApiFileChange>, ExtractError>;

    /// Fetches the check runs for a commit.
    async fn check_runs(&self, head_sha: &str) -> Result<Vec<ApiCheckRun>, ExtractError>;

    /// Fetches all timeline events for a pull request.
    async fn timeline(&self, number: u64) -> Result<Vec<ApiTimelineEvent>, ExtractError>;

    /// Queries the current rate limit state.
    async fn rate_limit(&self) -> Result<RateLimitInfo, ExtractError>;

    /// Number of API requests issued so far.
    fn request_count(&self) -> u64;
}

/// Octocrab-backed forge gateway.
pub struct OctocrabForge {
    client: Octocrab,
    locator: RepositoryLocator,
    rate_limits: RateLimitTracker,
    policy: RetryPolicy,
    requests: AtomicU64,
}

impl OctocrabForge {
    /// Builds a gateway for the given token and repository.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidUrl`] when the API base cannot be
    /// parsed or [`ExtractError::Api`] when the client cannot be built.
    pub fn for_token(
        token: &PersonalAccessToken,
        locator: RepositoryLocator,
        rate_limits: RateLimitTracker,
    ) -> Result<Self, ExtractError> {
        let base_uri: Uri = locator
            .api_base()
            .as_str()
            .parse::<Uri>()
            .map_err(|error| ExtractError::InvalidUrl(error.to_string()))?;

        let client = Octocrab::builder()
            .personal_token(token.as_ref())
            .base_uri(base_uri)
            .map_err(|error| ExtractError::Api {
                message: format!("build client failed: {error}"),
            })?
            .build()
            .map_err(|error| map_octocrab_error("build client", &error))?;

        Ok(Self {
            client,
            locator,
            rate_limits,
            policy: RetryPolicy::default(),
            requests: AtomicU64::new(0),
        })
    }

    /// The shared rate limit tracker the gateway records observations into.
    #[must_use]
    pub fn rate_limit_tracker(&self) -> RateLimitTracker {
        self.rate_limits.clone()
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<R, ExtractError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let query: Vec<(&str, &str)> = params
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        match self.client.get(path, Some(&query)).await {
            Ok(value) => Ok(value),
            Err(error) => Err(self.map_error_with_rate_limit(path, &error).await),
        }
    }

    async fn collect_collection<T>(&self, path: String) -> Result<Vec<T>, ExtractError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let fetcher = CollectionFetcher::<'_, T> {
            forge: self,
            path,
            _marker: PhantomData,
        };
        let paginator = Paginator::new(
            fetcher,
            COLLECTION_PER_PAGE,
            self.policy,
            self.rate_limits.clone(),
        );
        collect_all(paginator).await
    }

    /// Enriches rate-limit errors with the quota endpoint's reset time and
    /// records the observation for the paginator's pre-request checks.
    async fn map_error_with_rate_limit(
        &self,
        operation: &str,
        error: &octocrab::Error,
    ) -> ExtractError {
        match error {
            octocrab::Error::GitHub { source, .. } if is_rate_limit_error(source) => {
                let rate_limit = self.fetch_rate_limit_info().await;
                if let Some(info) = rate_limit {
                    self.rate_limits.record(info);
                }
                ExtractError::RateLimited {
                    rate_limit,
                    message: format!("{operation} failed: {}", source.message),
                }
            }
            _ => map_octocrab_error(operation, error),
        }
    }

    async fn fetch_rate_limit_info(&self) -> Option<RateLimitInfo> {
        let rate = self.client.ratelimit().get().await.ok()?.rate;
        let limit = u32::try_from(rate.limit).ok()?;
        let remaining = u32::try_from(rate.remaining).ok()?;
        Some(RateLimitInfo::new(limit, remaining, rate.reset))
    }
}

/// Page fetcher over one collection endpoint path.
struct CollectionFetcher<'a, T> {
    forge: &'a OctocrabForge,
    path: String,
    _marker: PhantomData<T>,
}

#[async_trait]
impl<T> PageFetcher for CollectionFetcher<'_, T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Item = T;

    async fn fetch_page(&self, page: u32, per_page: u8) -> Result<Vec<T>, ExtractError> {
        let params = [
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.forge.get_json(&self.path, &params).await
    }
}

#[async_trait]
impl ForgeGateway for OctocrabForge {
    async fn pull_request_page(
        &self,
        query: &ListQuery,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<ApiPullRequest>, ExtractError> {
        let mut params = vec![
            ("state", "all".to_owned()),
            ("sort", query.sort.sort_param().to_owned()),
            ("direction", "asc".to_owned()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(since) = query.since {
            params.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        self.get_json(&self.locator.pulls_path(), &params).await
    }

    async fn reviews(&self, number: u64) -> Result<Vec<ApiReview>, ExtractError> {
        self.collect_collection(self.locator.reviews_path(number))
            .await
    }

    async fn issue_comments(&self, number: u64) -> Result<Vec<ApiIssueComment>, ExtractError> {
        self.collect_collection(self.locator.issue_comments_path(number))
            .await
    }

    async fn review_comments(&self, number: u64) -> Result<Vec<ApiReviewComment>, ExtractError> {
        self.collect_collection(self.locator.review_comments_path(number))
            .await
    }

    async fn files(&self, number: u64) -> Result<Vec<ApiFileChange>, ExtractError> {
        self.collect_collection(self.locator.files_path(number))
            .await
    }

    async fn check_runs(&self, head_sha: &str) -> Result<Vec<ApiCheckRun>, ExtractError> {
        let params = [("per_page", COLLECTION_PER_PAGE.to_string())];
        let list: ApiCheckRunList = self
            .get_json(&self.locator.check_runs_path(head_sha), &params)
            .await?;
        Ok(list.check_runs)
    }

    async fn timeline(&self, number: u64) -> Result<Vec<ApiTimelineEvent>, ExtractError> {
        self.collect_collection(self.locator.timeline_path(number))
            .await
    }

    async fn rate_limit(&self) -> Result<RateLimitInfo, ExtractError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let limits = self
            .client
            .ratelimit()
            .get()
            .await
            .map_err(|error| map_octocrab_error("rate limit", &error))?;
        let limit = u32::try_from(limits.rate.limit).unwrap_or(u32::MAX);
        let remaining = u32::try_from(limits.rate.remaining).unwrap_or(u32::MAX);
        let info = RateLimitInfo::new(limit, remaining, limits.rate.reset);
        self.rate_limits.record(info);
        Ok(info)
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Checks if a forge error status indicates an authentication failure.
const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Checks if an octocrab error represents a network/transport issue.
const fn is_network_error(error: &octocrab::Error) -> bool {
    matches!(
        error,
        octocrab::Error::Http { .. }
            | octocrab::Error::Hyper { .. }
            | octocrab::Error::Service { .. }
    )
}

/// Checks whether the forge error represents a primary or secondary rate
/// limit based on the HTTP status and message / documentation URL content.
fn is_rate_limit_error(source: &octocrab::GitHubError) -> bool {
    let is_rate_limit_status = matches!(
        source.status_code,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    );

    let message_indicates_rate_limit = source.message.to_lowercase().contains("rate limit")
        || source
            .documentation_url
            .as_deref()
            .is_some_and(|url| url.contains("rate-limit"));

    is_rate_limit_status && message_indicates_rate_limit
}

/// Maps an octocrab error into the extraction taxonomy.
fn map_octocrab_error(operation: &str, error: &octocrab::Error) -> ExtractError {
    if let octocrab::Error::GitHub { source, .. } = error {
        if source.status_code.is_server_error() {
            return ExtractError::Transient {
                message: format!(
                    "{operation} failed with status {status}: {message}",
                    status = source.status_code,
                    message = source.message
                ),
            };
        }
        return if is_auth_failure(source.status_code) {
            ExtractError::Authentication {
                message: format!(
                    "{operation} failed: GitHub returned {status} {message}",
                    status = source.status_code,
                    message = source.message
                ),
            }
        } else {
            ExtractError::Api {
                message: format!(
                    "{operation} failed with status {status}: {message}",
                    status = source.status_code,
                    message = source.message
                ),
            }
        };
    }

    if is_network_error(error) {
        return ExtractError::Transient {
            message: format!("{operation} failed: {error}"),
        };
    }

    ExtractError::Api {
        message: format!("{operation} failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ForgeGateway, ListQuery, OctocrabForge};
    use crate::github::error::ExtractError;
    use crate::github::locator::{PersonalAccessToken, RepositoryLocator};
    use crate::github::rate_limit::RateLimitTracker;

    const PULLS_PATH: &str = "/api/v3/repos/octo/cat/pulls";

    async fn gateway_for(server: &MockServer) -> OctocrabForge {
        let locator = RepositoryLocator::parse(&format!("{}/octo/cat", server.uri()))
            .expect("should create repository locator");
        let token = PersonalAccessToken::new("valid-token").expect("token should be valid");
        OctocrabForge::for_token(&token, locator, RateLimitTracker::new())
            .expect("should create gateway")
    }

    #[tokio::test]
    async fn pull_request_page_sends_listing_params() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server).await;

        Mock::given(method("GET"))
            .and(path(PULLS_PATH))
            .and(query_param("state", "all"))
            .and(query_param("sort", "created"))
            .and(query_param("direction", "asc"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "number": 1,
                "title": "First",
                "state": "open",
                "user": { "login": "alice" },
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z"
            }])))
            .mount(&server)
            .await;

        let page = gateway
            .pull_request_page(&ListQuery::default(), 1, 50)
            .await
            .expect("request should succeed");

        assert_eq!(page.len(), 1);
        assert_eq!(page.first().map(|pr| pr.number), Some(1));
        assert_eq!(gateway.request_count(), 1);
    }

    #[tokio::test]
    async fn reviews_are_drained_across_pages() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server).await;

        let reviews_path = "/api/v3/repos/octo/cat/pulls/7/reviews";
        let full_page: Vec<serde_json::Value> = (0..100)
            .map(|index| serde_json::json!({ "id": index, "state": "COMMENTED" }))
            .collect();

        Mock::given(method("GET"))
            .and(path(reviews_path))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(reviews_path))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 100, "state": "APPROVED", "user": { "login": "bob" } }
            ])))
            .mount(&server)
            .await;

        let reviews = gateway.reviews(7).await.expect("reviews should succeed");
        assert_eq!(reviews.len(), 101);
    }

    #[tokio::test]
    async fn rate_limited_listing_surfaces_reset_time() {
        const RESET_AT: u64 = 1_700_000_000;

        let server = MockServer::start().await;
        let gateway = gateway_for(&server).await;

        Mock::given(method("GET"))
            .and(path(PULLS_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "message": "API rate limit exceeded for user",
                "documentation_url": "https://docs.github.com/rest/rate-limit"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v3/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "resources": {
                    "core": { "limit": 5000, "used": 5000, "remaining": 0, "reset": RESET_AT },
                    "search": { "limit": 30, "used": 0, "remaining": 30, "reset": RESET_AT }
                },
                "rate": { "limit": 5000, "used": 5000, "remaining": 0, "reset": RESET_AT }
            })))
            .mount(&server)
            .await;

        let error = gateway
            .pull_request_page(&ListQuery::default(), 1, 50)
            .await
            .expect_err("request should be rate limited");

        match error {
            ExtractError::RateLimited { rate_limit, .. } => {
                let info = rate_limit.expect("rate limit info should be populated");
                assert_eq!(info.reset_at(), RESET_AT);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_listing_maps_to_authentication_error() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server).await;

        Mock::given(method("GET"))
            .and(path(PULLS_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "message": "Bad credentials"
            })))
            .mount(&server)
            .await;

        let error = gateway
            .pull_request_page(&ListQuery::default(), 1, 50)
            .await
            .expect_err("request should fail");
        assert!(matches!(error, ExtractError::Authentication { .. }));
    }

    #[tokio::test]
    async fn server_errors_map_to_transient() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server).await;

        Mock::given(method("GET"))
            .and(path(PULLS_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_json(serde_json::json!({
                "message": "Bad gateway"
            })))
            .mount(&server)
            .await;

        let error = gateway
            .pull_request_page(&ListQuery::default(), 1, 50)
            .await
            .expect_err("request should fail");
        assert!(matches!(error, ExtractError::Transient { .. }));
    }

    #[tokio::test]
    async fn check_runs_unwrap_the_envelope() {
        let server = MockServer::start().await;
        let gateway = gateway_for(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v3/repos/octo/cat/commits/abc123/check-runs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 1,
                "check_runs": [{
                    "id": 5,
                    "name": "ci/test",
                    "status": "completed",
                    "conclusion": "success",
                    "started_at": "2025-01-01T00:00:00Z",
                    "completed_at": "2025-01-01T00:10:00Z"
                }]
            })))
            .mount(&server)
            .await;

        let runs = gateway
            .check_runs("abc123")
            .await
            .expect("check runs should succeed");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs.first().map(|run| run.id), Some(5));
    }
}
