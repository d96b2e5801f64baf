//! Forge API access: locators, typed payload models, the error taxonomy,
//! retry policy, rate-limit tracking, and the rate-limited paginator.
//!
//! The gateway is trait-based so the orchestrator and tests can substitute
//! fakes while [`gateway::OctocrabForge`] performs real HTTP requests. All
//! failures are mapped into [`ExtractError`] so callers never see transport
//! internals.

pub mod error;
pub mod gateway;
pub mod locator;
pub mod models;
pub mod paginator;
pub mod rate_limit;
pub mod retry;

pub use error::ExtractError;
pub use gateway::{ForgeGateway, ListQuery, ListSort, OctocrabForge};
pub use locator::{PersonalAccessToken, RepositoryLocator, RepositoryName, RepositoryOwner};
pub use paginator::{PageFetcher, Paginator};
pub use rate_limit::{RateLimitInfo, RateLimitTracker};
pub use retry::{RetryDecision, RetryPolicy};

#[cfg(test)]
pub use gateway::MockForgeGateway;
