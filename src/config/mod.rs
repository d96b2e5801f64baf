//! Application configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.magpie.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `MAGPIE_TOKEN`, or legacy `GITHUB_TOKEN`
//! 4. **Command-line arguments** – `--owner`/`-o`, `--repo`/`-r`, ...
//!
//! # Configuration Files
//!
//! Place `.magpie.toml` in the current directory, home directory, or XDG
//! config directory with:
//!
//! ```toml
//! owner = "octocat"
//! repo = "hello-world"
//! start_date = "2024-01-01"
//! batch_size = 50
//! concurrency = 4
//! ```
//!
//! Classifier rules live in a separate `magpie-classify.toml` (or the file
//! named by `classify_config`):
//!
//! ```toml
//! [modules]
//! default_depth = 2
//! rules = [{ pattern = "backend/py/{name}/**", output = "backend/py/{name}" }]
//!
//! [bots]
//! logins = ["release-automation"]
//! ```

use std::env;

use camino::Utf8PathBuf;
use chrono::{DateTime, NaiveDate, Utc};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::classify::{BotConfig, ModuleConfig};
use crate::github::error::ExtractError;

/// Default listing page size; one page is one commit batch.
const DEFAULT_BATCH_SIZE: u8 = 50;

/// Default number of concurrent per-PR detail workers.
const DEFAULT_CONCURRENCY: usize = 4;

/// Application configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `MAGPIE_TOKEN`, `GITHUB_TOKEN`, or `--token`: Authentication token
/// - `MAGPIE_OWNER` or `--owner`: Repository owner
/// - `MAGPIE_REPO` or `--repo`: Repository name
/// - `MAGPIE_DATABASE_URL` or `--database-url`: `SQLite` database path
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "MAGPIE",
    discovery(
        dotfile_name = ".magpie.toml",
        config_file_name = "magpie.toml",
        app_name = "magpie"
    )
)]
pub struct MagpieConfig {
    /// Personal access token for forge API authentication.
    ///
    /// Can be provided via:
    /// - CLI: `--token <TOKEN>` or `-t <TOKEN>`
    /// - Environment: `MAGPIE_TOKEN` or `GITHUB_TOKEN` (legacy)
    /// - Config file: `token = "..."`
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// Repository owner (e.g., "octocat").
    ///
    /// When absent, the owner is discovered from the `origin` remote of the
    /// enclosing git repository.
    #[ortho_config(cli_short = 'o')]
    pub owner: Option<String>,

    /// Repository name (e.g., "hello-world").
    ///
    /// When absent, the name is discovered from the `origin` remote of the
    /// enclosing git repository.
    #[ortho_config(cli_short = 'r')]
    pub repo: Option<String>,

    /// `SQLite` database path used for the extraction tables.
    ///
    /// Defaults to `<cache>/magpie/<owner>/<repo>/extraction.sqlite` where
    /// `<cache>` is `$XDG_CACHE_HOME` or `~/.cache`.
    #[ortho_config()]
    pub database_url: Option<String>,

    /// Ignores the stored checkpoint and re-fetches from the start date.
    ///
    /// Can be provided via:
    /// - CLI: `--full`
    /// - Config file: `full = true`
    #[ortho_config()]
    pub full: bool,

    /// Lower bound on pull request creation time (`YYYY-MM-DD` or RFC 3339).
    ///
    /// Applies to full runs; incremental runs resume from the checkpoint.
    #[ortho_config()]
    pub start_date: Option<String>,

    /// Only fetch pull requests created on or after this date, overriding
    /// `start_date` for one run (`YYYY-MM-DD` or RFC 3339).
    #[ortho_config()]
    pub since: Option<String>,

    /// Stops after this many pull requests have been queued.
    #[ortho_config(cli_short = 'n')]
    pub limit: Option<u64>,

    /// Re-fetches pull requests updated within the last N days even when
    /// already checkpointed, reconciling late-arriving reviews.
    #[ortho_config()]
    pub refresh_days: Option<u32>,

    /// Listing page size; one page is one atomic commit batch (max 100).
    #[ortho_config()]
    pub batch_size: Option<u8>,

    /// Number of concurrent per-PR detail workers.
    #[ortho_config()]
    pub concurrency: Option<usize>,

    /// Runs database migrations and exits without extracting.
    ///
    /// Can be provided via:
    /// - CLI: `--migrate-db`
    /// - Config file: `migrate_db = true`
    #[ortho_config()]
    pub migrate_db: bool,

    /// Path to the classifier configuration file.
    ///
    /// Defaults to `magpie-classify.toml` in the current directory when the
    /// file exists; built-in defaults apply otherwise.
    #[ortho_config()]
    pub classify_config: Option<String>,
}

impl Default for MagpieConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            database_url: None,
            full: false,
            start_date: None,
            since: None,
            limit: None,
            refresh_days: None,
            batch_size: None,
            concurrency: None,
            migrate_db: false,
            classify_config: None,
        }
    }
}

/// Classifier configuration: pure data consumed by the module and bot
/// classifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Module classification configuration.
    pub modules: ModuleConfig,
    /// Bot classification configuration.
    pub bots: BotConfig,
}

/// Default classifier configuration filename looked up in the working
/// directory.
const DEFAULT_CLASSIFY_FILE: &str = "magpie-classify.toml";

impl MagpieConfig {
    /// Resolves the token from configuration or the legacy `GITHUB_TOKEN`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingToken`] when no token source provides
    /// a value.
    pub fn resolve_token(&self) -> Result<String, ExtractError> {
        self.token
            .clone()
            .or_else(|| env::var("GITHUB_TOKEN").ok())
            .ok_or(ExtractError::MissingToken)
    }

    /// Returns owner and repo when both are configured.
    #[must_use]
    pub fn repository_override(&self) -> Option<(&str, &str)> {
        match (self.owner.as_deref(), self.repo.as_deref()) {
            (Some(owner), Some(repo)) => Some((owner, repo)),
            _ => None,
        }
    }

    /// The effective lower bound on pull request creation time.
    ///
    /// `--since` overrides the configured `start_date` for one run.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] when the date cannot be
    /// parsed.
    pub fn resolve_start_date(&self) -> Result<Option<DateTime<Utc>>, ExtractError> {
        self.since
            .as_deref()
            .or(self.start_date.as_deref())
            .map(parse_date)
            .transpose()
    }

    /// Listing page size, clamped to the forge's 100-item maximum.
    #[must_use]
    pub fn effective_batch_size(&self) -> u8 {
        self.batch_size
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .clamp(1, 100)
    }

    /// Worker count for per-PR detail fetches.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
    }

    /// Loads the classifier configuration.
    ///
    /// Reads the configured `classify_config` path, or
    /// `magpie-classify.toml` in the working directory when present;
    /// otherwise the built-in defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] when a configured file cannot
    /// be read or parsed. A missing *default* file is not an error.
    pub fn load_classify_config(&self) -> Result<ClassifyConfig, ExtractError> {
        let path = match self.classify_config.as_deref() {
            Some(path) => path.to_owned(),
            None => {
                if !std::path::Path::new(DEFAULT_CLASSIFY_FILE).exists() {
                    return Ok(ClassifyConfig::default());
                }
                DEFAULT_CLASSIFY_FILE.to_owned()
            }
        };

        let contents =
            std::fs::read_to_string(&path).map_err(|error| ExtractError::Configuration {
                message: format!("could not read classifier config `{path}`: {error}"),
            })?;
        toml::from_str(&contents).map_err(|error| ExtractError::Configuration {
            message: format!("could not parse classifier config `{path}`: {error}"),
        })
    }

    /// The database path for a repository, honouring `database_url`.
    #[must_use]
    pub fn database_path(&self, owner: &str, repo: &str) -> Utf8PathBuf {
        self.database_url.as_deref().map_or_else(
            || {
                cache_root(
                    env::var("XDG_CACHE_HOME").ok().as_deref(),
                    env::var("HOME").ok().as_deref(),
                )
                .join(owner)
                .join(repo)
                .join("extraction.sqlite")
            },
            Utf8PathBuf::from,
        )
    }
}

/// Root of the per-repository data directories.
fn cache_root(xdg_cache_home: Option<&str>, home: Option<&str>) -> Utf8PathBuf {
    let base = xdg_cache_home
        .filter(|value| !value.is_empty())
        .map_or_else(
            || {
                let mut path = Utf8PathBuf::from(home.unwrap_or("."));
                path.push(".cache");
                path
            },
            Utf8PathBuf::from,
        );
    base.join("magpie")
}

/// Parses `YYYY-MM-DD` or a full RFC 3339 timestamp into a UTC instant.
fn parse_date(value: &str) -> Result<DateTime<Utc>, ExtractError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ExtractError::Configuration {
            message: format!("invalid date `{value}`; expected YYYY-MM-DD or RFC 3339"),
        })
}
