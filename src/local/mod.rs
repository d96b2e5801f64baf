//! Local repository discovery from git remotes.
//!
//! When no repository coordinates are configured, the extractor looks at the
//! `origin` remote of the enclosing git repository and parses its URL into a
//! [`GitHubOrigin`]. SSH SCP-style, `ssh://`, and `https://` forms are
//! supported, with or without the `.git` suffix, for both `github.com` and
//! GitHub Enterprise hosts.

use std::path::Path;

use git2::Repository;
use thiserror::Error;

/// Remote consulted during discovery.
const DEFAULT_REMOTE_NAME: &str = "origin";

/// Errors raised while discovering the repository from git metadata.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalDiscoveryError {
    /// The path is not inside a git repository.
    #[error("not a git repository: {path}")]
    NotARepository {
        /// The path discovery started from.
        path: String,
    },

    /// The repository has no `origin` remote.
    #[error("remote `{remote}` not found")]
    RemoteNotFound {
        /// The remote name that was looked up.
        remote: String,
    },

    /// The remote URL could not be parsed as a GitHub origin.
    #[error("could not parse remote URL: {url}")]
    InvalidRemoteUrl {
        /// The URL that failed to parse.
        url: String,
    },
}

/// A parsed GitHub origin with owner and repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubOrigin {
    /// Standard `github.com` repository.
    GitHubCom {
        /// Repository owner (user or organisation).
        owner: String,
        /// Repository name.
        repository: String,
    },
    /// GitHub Enterprise repository on a custom host.
    Enterprise {
        /// The GitHub Enterprise host (e.g. `ghe.example.com`).
        host: String,
        /// Optional port number for non-default HTTPS ports.
        port: Option<u16>,
        /// Repository owner (user or organisation).
        owner: String,
        /// Repository name.
        repository: String,
    },
}

impl GitHubOrigin {
    /// Returns the repository owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        match self {
            Self::GitHubCom { owner, .. } | Self::Enterprise { owner, .. } => owner,
        }
    }

    /// Returns the repository name.
    #[must_use]
    pub fn repository(&self) -> &str {
        match self {
            Self::GitHubCom { repository, .. } | Self::Enterprise { repository, .. } => repository,
        }
    }
}

/// Parses a git remote URL and extracts GitHub origin information.
///
/// Supported formats:
/// - SCP-style SSH: `git@github.com:owner/repo.git`
/// - SSH with protocol: `ssh://git@github.com/owner/repo.git`
/// - HTTPS: `https://github.com/owner/repo[.git]`
///
/// # Errors
///
/// Returns [`LocalDiscoveryError::InvalidRemoteUrl`] if the URL matches no
/// supported format.
pub fn parse_github_remote(url: &str) -> Result<GitHubOrigin, LocalDiscoveryError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(LocalDiscoveryError::InvalidRemoteUrl {
            url: url.to_owned(),
        });
    }

    if let Some(origin) = try_parse_scp_style(trimmed) {
        return Ok(origin);
    }
    if let Some(origin) = try_parse_url_style(trimmed) {
        return Ok(origin);
    }

    Err(LocalDiscoveryError::InvalidRemoteUrl {
        url: url.to_owned(),
    })
}

/// Attempts to parse SCP-style SSH URLs: `git@host:owner/repo.git`.
fn try_parse_scp_style(url: &str) -> Option<GitHubOrigin> {
    let rest = url.strip_prefix("git@")?;
    let (host, path) = rest.split_once(':')?;
    let (owner, repository) = split_owner_repo(path)?;
    Some(build_origin(host, None, owner, repository))
}

/// Attempts to parse URL-style remotes: `https://` or `ssh://git@`.
fn try_parse_url_style(url: &str) -> Option<GitHubOrigin> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "https" | "http" | "ssh") {
        return None;
    }
    let host = parsed.host_str()?;
    let path = parsed.path().trim_start_matches('/');
    let (owner, repository) = split_owner_repo(path)?;
    let port = match parsed.scheme() {
        // An explicit SSH port says nothing about the HTTPS API port.
        "ssh" => None,
        _ => parsed.port(),
    };
    Some(build_origin(host, port, owner, repository))
}

fn split_owner_repo(path: &str) -> Option<(&str, &str)> {
    let (owner, rest) = path.split_once('/')?;
    let repository = rest.strip_suffix(".git").unwrap_or(rest);
    let repository = repository.trim_end_matches('/');
    if owner.is_empty() || repository.is_empty() || repository.contains('/') {
        return None;
    }
    Some((owner, repository))
}

fn build_origin(host: &str, port: Option<u16>, owner: &str, repository: &str) -> GitHubOrigin {
    if host.eq_ignore_ascii_case("github.com") {
        GitHubOrigin::GitHubCom {
            owner: owner.to_owned(),
            repository: repository.to_owned(),
        }
    } else {
        GitHubOrigin::Enterprise {
            host: host.to_owned(),
            port,
            owner: owner.to_owned(),
            repository: repository.to_owned(),
        }
    }
}

/// Discovers the GitHub origin of the repository enclosing `start_path`.
///
/// Searches upward for a git repository and parses its `origin` remote.
///
/// # Errors
///
/// Returns [`LocalDiscoveryError::NotARepository`] when no repository
/// encloses the path, [`LocalDiscoveryError::RemoteNotFound`] when the
/// repository has no `origin` remote, and
/// [`LocalDiscoveryError::InvalidRemoteUrl`] when the remote URL cannot be
/// parsed.
pub fn discover_origin(start_path: &Path) -> Result<GitHubOrigin, LocalDiscoveryError> {
    let repository = Repository::discover(start_path).map_err(|_| {
        LocalDiscoveryError::NotARepository {
            path: start_path.display().to_string(),
        }
    })?;

    let remote = repository.find_remote(DEFAULT_REMOTE_NAME).map_err(|_| {
        LocalDiscoveryError::RemoteNotFound {
            remote: DEFAULT_REMOTE_NAME.to_owned(),
        }
    })?;

    let url = remote
        .url()
        .ok_or_else(|| LocalDiscoveryError::InvalidRemoteUrl {
            url: String::new(),
        })?;

    parse_github_remote(url)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{GitHubOrigin, LocalDiscoveryError, parse_github_remote};

    #[rstest]
    #[case("git@github.com:octo/cat.git")]
    #[case("git@github.com:octo/cat")]
    #[case("https://github.com/octo/cat.git")]
    #[case("https://github.com/octo/cat")]
    #[case("ssh://git@github.com/octo/cat.git")]
    fn github_com_remote_forms_parse(#[case] url: &str) {
        let origin = parse_github_remote(url).expect("remote should parse");
        assert_eq!(origin.owner(), "octo");
        assert_eq!(origin.repository(), "cat");
        assert!(matches!(origin, GitHubOrigin::GitHubCom { .. }));
    }

    #[test]
    fn enterprise_host_is_preserved() {
        let origin = parse_github_remote("https://ghe.example.com/team/tool.git")
            .expect("remote should parse");
        match origin {
            GitHubOrigin::Enterprise {
                host,
                owner,
                repository,
                port,
            } => {
                assert_eq!(host, "ghe.example.com");
                assert_eq!(owner, "team");
                assert_eq!(repository, "tool");
                assert_eq!(port, None);
            }
            GitHubOrigin::GitHubCom { .. } => panic!("expected Enterprise origin"),
        }
    }

    #[rstest]
    #[case("")]
    #[case("not a url")]
    #[case("https://github.com/only-owner")]
    fn invalid_remotes_are_rejected(#[case] url: &str) {
        let error = parse_github_remote(url).expect_err("remote should not parse");
        assert!(matches!(error, LocalDiscoveryError::InvalidRemoteUrl { .. }));
    }
}
