//! Magpie extracts pull request and review activity from a GitHub
//! repository into a local relational store for offline analysis.
//!
//! The pipeline is a resumable, rate-limit-aware crawler: pull requests are
//! listed page by page, each PR's reviews, comments, files, checks, and
//! timeline are fetched with bounded concurrency, normalized into eight
//! deduplicated tables, and committed in atomic batches. A checkpoint
//! records the high-water mark so interrupted or incremental runs resume
//! without duplicating or losing rows. Changed files are assigned logical
//! modules and accounts are classified as human or bot through an ordered,
//! user-configurable pattern language.

pub mod classify;
pub mod config;
pub mod extract;
pub mod github;
pub mod local;
pub mod persistence;
pub mod telemetry;

pub use config::{ClassifyConfig, MagpieConfig};
pub use extract::{CancelFlag, Extractor, RunOptions, RunSummary};
pub use github::{ExtractError, OctocrabForge, PersonalAccessToken, RepositoryLocator};
