//! Repository coordinates, API path construction, and token validation.

use url::Url;

use super::error::ExtractError;
use crate::local::GitHubOrigin;

/// Repository owner wrapper to avoid stringly typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryOwner(String);

impl RepositoryOwner {
    pub(crate) fn new(value: &str) -> Result<Self, ExtractError> {
        if value.is_empty() {
            return Err(ExtractError::MissingRepository);
        }
        Ok(Self(value.to_owned()))
    }

    /// Borrow the owner value.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Repository name wrapper to prevent parameter mix-ups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryName(String);

impl RepositoryName {
    pub(crate) fn new(value: &str) -> Result<Self, ExtractError> {
        if value.is_empty() {
            return Err(ExtractError::MissingRepository);
        }
        Ok(Self(value.to_owned()))
    }

    /// Borrow the repository name.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Personal access token wrapper enforcing presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalAccessToken(String);

impl PersonalAccessToken {
    /// Validates that the token is non-empty and trims whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingToken`] when the supplied string is
    /// blank.
    pub fn new(token: impl AsRef<str>) -> Result<Self, ExtractError> {
        let trimmed = token.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ExtractError::MissingToken);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the token value.
    #[must_use]
    pub const fn value(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for PersonalAccessToken {
    fn as_ref(&self) -> &str {
        self.value()
    }
}

/// Derives the GitHub API base URL from a host string.
fn derive_api_base_from_host(
    scheme: &str,
    host: &str,
    port: Option<u16>,
) -> Result<Url, ExtractError> {
    if host.eq_ignore_ascii_case("github.com") {
        Url::parse("https://api.github.com")
            .map_err(|error| ExtractError::InvalidUrl(error.to_string()))
    } else {
        let authority = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        let mut api_url = Url::parse(&format!("{scheme}://{authority}"))
            .map_err(|error| ExtractError::InvalidUrl(error.to_string()))?;

        api_url
            .set_port(port)
            .map_err(|()| ExtractError::InvalidUrl("invalid port".to_owned()))?;
        api_url.set_path("api/v3");
        Ok(api_url)
    }
}

/// Repository coordinates with the derived API base URL.
///
/// All per-repository and per-PR endpoint paths are built here so the
/// gateway never concatenates URL fragments itself.
///
/// # Example
///
/// ```
/// use magpie::github::locator::RepositoryLocator;
///
/// let locator = RepositoryLocator::from_owner_repo("octo", "cat")
///     .expect("should create repository locator");
/// assert_eq!(locator.pulls_path(), "/repos/octo/cat/pulls");
/// assert_eq!(locator.reviews_path(7), "/repos/octo/cat/pulls/7/reviews");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocator {
    api_base: Url,
    owner: RepositoryOwner,
    repository: RepositoryName,
}

impl RepositoryLocator {
    /// Creates a repository locator from owner and repository name strings.
    ///
    /// Uses `github.com` as the default host.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingRepository`] when owner or repo is
    /// empty.
    pub fn from_owner_repo(owner: &str, repo: &str) -> Result<Self, ExtractError> {
        let validated_owner = RepositoryOwner::new(owner)?;
        let repository = RepositoryName::new(repo)?;
        let api_base = Url::parse("https://api.github.com")
            .map_err(|error| ExtractError::InvalidUrl(error.to_string()))?;

        Ok(Self {
            api_base,
            owner: validated_owner,
            repository,
        })
    }

    /// Parses a repository URL in the form `https://host/<owner>/<repo>`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidUrl`] when parsing fails or
    /// [`ExtractError::MissingRepository`] when the path lacks owner/repo
    /// segments.
    pub fn parse(input: &str) -> Result<Self, ExtractError> {
        let parsed =
            Url::parse(input).map_err(|error| ExtractError::InvalidUrl(error.to_string()))?;

        let mut segments = parsed
            .path_segments()
            .ok_or(ExtractError::MissingRepository)?;

        let owner_segment = segments.next().ok_or(ExtractError::MissingRepository)?;
        let repository_segment = segments.next().ok_or(ExtractError::MissingRepository)?;

        let owner = RepositoryOwner::new(owner_segment)?;
        let repository = RepositoryName::new(repository_segment)?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ExtractError::InvalidUrl("URL must include a host".to_owned()))?;
        let api_base = derive_api_base_from_host(parsed.scheme(), host, parsed.port())?;

        Ok(Self {
            api_base,
            owner,
            repository,
        })
    }

    /// Creates a repository locator from a discovered git origin.
    ///
    /// For standard `github.com` origins, uses the public API base. For
    /// GitHub Enterprise origins, derives the API base from the host.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingRepository`] if owner or repo is
    /// empty, or [`ExtractError::InvalidUrl`] if the URL cannot be parsed.
    pub fn from_github_origin(origin: &GitHubOrigin) -> Result<Self, ExtractError> {
        match origin {
            GitHubOrigin::GitHubCom { owner, repository } => {
                Self::from_owner_repo(owner, repository)
            }
            GitHubOrigin::Enterprise {
                host,
                owner,
                repository,
                ..
            } => {
                let url = format!("https://{host}/{owner}/{repository}");
                Self::parse(&url)
            }
        }
    }

    /// API base URL derived from the repository host.
    #[must_use]
    pub const fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Repository owner.
    #[must_use]
    pub const fn owner(&self) -> &RepositoryOwner {
        &self.owner
    }

    /// Repository name.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// `owner/name` form used for data paths and log lines.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner.as_str(), self.repository.as_str())
    }

    /// Path for listing pull requests.
    #[must_use]
    pub fn pulls_path(&self) -> String {
        format!("/repos/{}/{}/pulls", self.owner.as_str(), self.repository.as_str())
    }

    /// Path for a pull request's review submissions.
    #[must_use]
    pub fn reviews_path(&self, number: u64) -> String {
        format!("{}/{number}/reviews", self.pulls_path())
    }

    /// Path for a pull request's inline review comments.
    #[must_use]
    pub fn review_comments_path(&self, number: u64) -> String {
        format!("{}/{number}/comments", self.pulls_path())
    }

    /// Path for a pull request's changed files.
    #[must_use]
    pub fn files_path(&self, number: u64) -> String {
        format!("{}/{number}/files", self.pulls_path())
    }

    /// Path for a pull request's discussion comments.
    #[must_use]
    pub fn issue_comments_path(&self, number: u64) -> String {
        format!(
            "/repos/{}/{}/issues/{number}/comments",
            self.owner.as_str(),
            self.repository.as_str()
        )
    }

    /// Path for a pull request's timeline events.
    #[must_use]
    pub fn timeline_path(&self, number: u64) -> String {
        format!(
            "/repos/{}/{}/issues/{number}/timeline",
            self.owner.as_str(),
            self.repository.as_str()
        )
    }

    /// Path for the check runs of a commit.
    #[must_use]
    pub fn check_runs_path(&self, head_sha: &str) -> String {
        format!(
            "/repos/{}/{}/commits/{head_sha}/check-runs",
            self.owner.as_str(),
            self.repository.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{PersonalAccessToken, RepositoryLocator};
    use crate::github::error::ExtractError;

    #[test]
    fn from_owner_repo_uses_public_api_base() {
        let locator = RepositoryLocator::from_owner_repo("octo", "cat")
            .expect("locator should be created");
        assert_eq!(locator.api_base().as_str(), "https://api.github.com/");
        assert_eq!(locator.full_name(), "octo/cat");
    }

    #[test]
    fn enterprise_host_derives_v3_api_base() {
        let locator = RepositoryLocator::parse("https://ghe.example.com/octo/cat")
            .expect("locator should be created");
        assert_eq!(locator.api_base().as_str(), "https://ghe.example.com/api/v3");
    }

    #[test]
    fn empty_owner_is_rejected() {
        let error = RepositoryLocator::from_owner_repo("", "cat")
            .expect_err("empty owner should be rejected");
        assert_eq!(error, ExtractError::MissingRepository);
    }

    #[rstest]
    #[case::pulls("/repos/octo/cat/pulls")]
    fn pulls_path_is_rooted_at_repos(#[case] expected: &str) {
        let locator = RepositoryLocator::from_owner_repo("octo", "cat")
            .expect("locator should be created");
        assert_eq!(locator.pulls_path(), expected);
    }

    #[test]
    fn per_pr_paths_embed_the_number() {
        let locator = RepositoryLocator::from_owner_repo("octo", "cat")
            .expect("locator should be created");
        assert_eq!(locator.reviews_path(12), "/repos/octo/cat/pulls/12/reviews");
        assert_eq!(
            locator.review_comments_path(12),
            "/repos/octo/cat/pulls/12/comments"
        );
        assert_eq!(
            locator.issue_comments_path(12),
            "/repos/octo/cat/issues/12/comments"
        );
        assert_eq!(locator.timeline_path(12), "/repos/octo/cat/issues/12/timeline");
        assert_eq!(
            locator.check_runs_path("abc123"),
            "/repos/octo/cat/commits/abc123/check-runs"
        );
    }

    #[test]
    fn blank_token_is_rejected() {
        let error = PersonalAccessToken::new("   ").expect_err("blank token should be rejected");
        assert_eq!(error, ExtractError::MissingToken);
    }

    #[test]
    fn token_is_trimmed() {
        let token = PersonalAccessToken::new(" ghp_abc ").expect("token should be valid");
        assert_eq!(token.value(), "ghp_abc");
    }
}
