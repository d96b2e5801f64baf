//! The extraction pipeline: rows, normalization, and orchestration.
//!
//! [`rows`] defines the shapes of the eight output tables,
//! [`normalize::Normalizer`] maps fetched pull request subtrees onto them,
//! and [`orchestrator::Extractor`] drives the resumable end-to-end run.

pub mod normalize;
pub mod orchestrator;
pub mod rows;

pub use normalize::{Normalizer, PrBundle};
pub use orchestrator::{CancelFlag, Extractor, RunMode, RunOptions, RunOutcome, RunSummary};
pub use rows::{RowCounts, TableBatch};
