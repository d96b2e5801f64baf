//! End-to-end extraction orchestration.
//!
//! The run proceeds through a fixed sequence of states: determine the work
//! range from the checkpoint and run mode, list pull requests page by page,
//! fan out per-PR detail fetches with bounded concurrency, normalize, commit
//! the batch in one transaction, advance the checkpoint, and repeat until
//! the listing is exhausted or the limit is reached.
//!
//! One listing page is one batch. A batch either commits completely or not
//! at all; the checkpoint only advances after the commit returns, so a
//! crash at any point leaves the next run to re-fetch the in-flight batch
//! and reconcile it by merge-upsert. Cancellation is honoured at the per-PR
//! boundary: in-flight detail fetches drain, but an incomplete batch is
//! discarded rather than committed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::normalize::{Normalizer, PrBundle};
use super::rows::{RowCounts, TableBatch};
use crate::github::error::ExtractError;
use crate::github::gateway::{ForgeGateway, ListQuery, ListSort};
use crate::github::models::ApiPullRequest;
use crate::github::paginator::{PageFetcher, Paginator};
use crate::github::rate_limit::RateLimitTracker;
use crate::github::retry::RetryPolicy;
use crate::persistence::{CheckpointStore, TableStore};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// How the work range is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Resume from the stored checkpoint, fetching only what changed since.
    #[default]
    Incremental,
    /// Ignore the checkpoint and fetch everything from the start date.
    Full,
}

impl RunMode {
    /// Stable string form for telemetry and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

/// Options governing one extraction run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Full or incremental operation.
    pub mode: RunMode,
    /// Lower bound on pull request creation time for full runs.
    pub start_date: Option<DateTime<Utc>>,
    /// Stop after this many pull requests have been queued.
    pub limit: Option<u64>,
    /// Re-fetch pull requests updated within the last N days.
    pub refresh_days: Option<u32>,
    /// Listing page size; one page is one commit batch.
    pub batch_size: u8,
    /// Bounded worker count for per-PR detail fetches.
    pub concurrency: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Incremental,
            start_date: None,
            limit: None,
            refresh_days: None,
            batch_size: 50,
            concurrency: 4,
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The listing was exhausted or the limit reached.
    Completed,
    /// A cancellation request stopped the run at a per-PR boundary.
    Cancelled,
    /// A per-batch anomaly aborted the run; prior batches remain committed
    /// and the next invocation resumes from the last durable checkpoint.
    Failed(String),
}

/// What one run accomplished, reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// `owner/name` of the extracted repository.
    pub repository: String,
    /// Pull requests fully committed this run.
    pub prs_processed: u64,
    /// Pull requests listed but skipped as already up to date.
    pub prs_skipped: u64,
    /// Pull requests whose detail fetch failed terminally.
    pub prs_failed: u64,
    /// Rows written per table.
    pub rows_written: RowCounts,
    /// API requests issued.
    pub api_requests: u64,
    /// Total time spent suspended on rate limits.
    pub rate_limit_wait: Duration,
    /// How the run ended.
    pub outcome: RunOutcome,
}

/// Cooperative cancellation flag checked at per-PR boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Page fetcher over the pull request listing endpoint.
struct ListingFetcher {
    gateway: Arc<dyn ForgeGateway>,
    query: ListQuery,
}

#[async_trait]
impl PageFetcher for ListingFetcher {
    type Item = ApiPullRequest;

    async fn fetch_page(
        &self,
        page: u32,
        per_page: u8,
    ) -> Result<Vec<ApiPullRequest>, ExtractError> {
        self.gateway.pull_request_page(&self.query, page, per_page).await
    }
}

/// Drives the extraction state machine for one repository.
pub struct Extractor {
    gateway: Arc<dyn ForgeGateway>,
    store: TableStore,
    checkpoints: CheckpointStore,
    normalizer: Normalizer,
    rate_limits: RateLimitTracker,
    options: RunOptions,
    cancel: CancelFlag,
    repository: String,
}

impl Extractor {
    /// Assembles an extractor from its collaborators.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ForgeGateway>,
        store: TableStore,
        checkpoints: CheckpointStore,
        normalizer: Normalizer,
        rate_limits: RateLimitTracker,
        options: RunOptions,
        cancel: CancelFlag,
        repository: String,
    ) -> Self {
        Self {
            gateway,
            store,
            checkpoints,
            normalizer,
            rate_limits,
            options,
            cancel,
            repository,
        }
    }

    /// Runs the extraction to completion, cancellation, or abort.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] only for failures before any work can start
    /// (configuration, checkpoint load). Anomalies mid-run are reported via
    /// [`RunSummary::outcome`] so progress is always surfaced.
    pub async fn run(&self, telemetry: &dyn TelemetrySink) -> Result<RunSummary, ExtractError> {
        telemetry.record(TelemetryEvent::RunStarted {
            repository: self.repository.clone(),
            mode: self.options.mode.as_str().to_owned(),
        });
        tracing::info!(
            repository = %self.repository,
            mode = self.options.mode.as_str(),
            "starting extraction"
        );

        // Seed the quota tracker so the first page already respects an
        // exhausted limit.
        if let Err(error) = self.gateway.rate_limit().await {
            if matches!(error, ExtractError::Authentication { .. }) {
                return Err(error);
            }
            tracing::warn!("could not seed rate limit state: {error}");
        }

        let checkpoint = match self.options.mode {
            RunMode::Full => None,
            RunMode::Incremental => self.checkpoints.load()?,
        };

        let refresh_cutoff = self
            .options
            .refresh_days
            .map(|days| Utc::now() - chrono::Duration::days(i64::from(days)));
        let refresh_set: HashSet<i64> = match refresh_cutoff {
            Some(cutoff) => self
                .store
                .pr_numbers_updated_since(cutoff)?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };
        if !refresh_set.is_empty() {
            tracing::info!(count = refresh_set.len(), "refreshing recently updated pull requests");
        }

        let query = build_list_query(checkpoint.as_ref(), refresh_cutoff);
        let mut paginator = Paginator::new(
            ListingFetcher {
                gateway: Arc::clone(&self.gateway),
                query,
            },
            self.options.batch_size,
            RetryPolicy::default(),
            self.rate_limits.clone(),
        );

        let mut summary = RunSummary {
            repository: self.repository.clone(),
            prs_processed: 0,
            prs_skipped: 0,
            prs_failed: 0,
            rows_written: RowCounts::default(),
            api_requests: 0,
            rate_limit_wait: Duration::ZERO,
            outcome: RunOutcome::Completed,
        };
        let mut queued: u64 = 0;

        'pages: loop {
            if self.cancel.is_cancelled() {
                summary.outcome = RunOutcome::Cancelled;
                break;
            }

            let page = match paginator.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(error) => {
                    summary.outcome = RunOutcome::Failed(error.to_string());
                    break;
                }
            };

            let (work, skipped, reached_end) = self.select_work(
                page,
                checkpoint.as_ref(),
                &refresh_set,
                &mut queued,
            );
            summary.prs_skipped += skipped;

            if !work.is_empty() {
                match self.process_batch(&work, telemetry, &mut summary).await {
                    BatchResult::Committed => {}
                    BatchResult::Stopped => break 'pages,
                }
            }

            if reached_end {
                break;
            }
        }

        summary.api_requests = self.gateway.request_count();
        summary.rate_limit_wait = self.rate_limits.total_waited();
        let waited_secs = summary.rate_limit_wait.as_secs();
        if waited_secs > 0 {
            telemetry.record(TelemetryEvent::RateLimitWaited {
                seconds: waited_secs,
            });
        }
        telemetry.record(TelemetryEvent::RunFinished {
            outcome: match &summary.outcome {
                RunOutcome::Completed => "completed".to_owned(),
                RunOutcome::Cancelled => "cancelled".to_owned(),
                RunOutcome::Failed(_) => "failed".to_owned(),
            },
            pull_requests: summary.prs_processed,
        });
        tracing::info!(
            processed = summary.prs_processed,
            skipped = summary.prs_skipped,
            failed = summary.prs_failed,
            requests = summary.api_requests,
            "extraction finished"
        );

        Ok(summary)
    }

    /// Splits one listing page into the PRs to fetch and the skipped count,
    /// honouring the start date, checkpoint, refresh set, and limit.
    fn select_work(
        &self,
        page: Vec<ApiPullRequest>,
        checkpoint: Option<&crate::persistence::Checkpoint>,
        refresh_set: &HashSet<i64>,
        queued: &mut u64,
    ) -> (Vec<ApiPullRequest>, u64, bool) {
        let now = Utc::now();
        let mut work = Vec::new();
        let mut skipped: u64 = 0;
        let mut reached_end = false;

        for pr in page {
            if let Some(limit) = self.options.limit {
                if *queued >= limit {
                    reached_end = true;
                    break;
                }
            }

            let created_at = parse_instant(pr.created_at.as_deref());
            if let Some(start) = self.options.start_date {
                if created_at.is_some_and(|created| created < start) {
                    skipped += 1;
                    continue;
                }
            }
            if created_at.is_some_and(|created| created > now) {
                reached_end = true;
                break;
            }

            let number = i64::try_from(pr.number).unwrap_or(i64::MAX);
            let updated_at = parse_instant(pr.updated_at.as_deref());
            let already_seen = checkpoint.is_some_and(|mark| {
                number <= mark.last_pr_number
                    && updated_at.is_some_and(|updated| updated <= mark.last_pr_updated_at)
            });
            if already_seen && !refresh_set.contains(&number) {
                skipped += 1;
                continue;
            }

            work.push(pr);
            *queued += 1;
        }

        (work, skipped, reached_end)
    }

    /// Fetches, normalizes, and commits one batch.
    async fn process_batch(
        &self,
        work: &[ApiPullRequest],
        telemetry: &dyn TelemetrySink,
        summary: &mut RunSummary,
    ) -> BatchResult {
        let bundles = match self.fetch_batch_details(work).await {
            Ok(Some(bundles)) => bundles,
            Ok(None) => {
                // Cancelled mid-batch: in-flight fetches drained, nothing
                // is committed, the next run re-fetches the whole batch.
                summary.outcome = RunOutcome::Cancelled;
                return BatchResult::Stopped;
            }
            Err(error) => {
                summary.prs_failed += 1;
                summary.outcome = RunOutcome::Failed(error.to_string());
                tracing::error!("batch aborted: {error}");
                return BatchResult::Stopped;
            }
        };

        let mut batch = TableBatch::default();
        for bundle in &bundles {
            batch.merge(self.normalizer.normalize(bundle));
        }
        batch.sort_by_pr_number();

        let highest_number = batch
            .pull_requests
            .iter()
            .map(|row| row.pr_number)
            .max()
            .unwrap_or_default();
        let highest_updated = batch
            .pull_requests
            .iter()
            .map(|row| row.updated_at)
            .max()
            .unwrap_or(DateTime::UNIX_EPOCH);

        let written = match self.store.commit_batch(&batch) {
            Ok(written) => written,
            Err(error) => {
                summary.outcome = RunOutcome::Failed(
                    ExtractError::Storage(error).to_string(),
                );
                return BatchResult::Stopped;
            }
        };

        if let Err(error) = self.checkpoints.advance(highest_number, highest_updated) {
            summary.outcome = RunOutcome::Failed(ExtractError::Storage(error).to_string());
            return BatchResult::Stopped;
        }

        summary.prs_processed += u64::try_from(bundles.len()).unwrap_or(u64::MAX);
        summary.rows_written.accumulate(written);
        telemetry.record(TelemetryEvent::BatchCommitted {
            pull_requests: u64::try_from(bundles.len()).unwrap_or(u64::MAX),
            highest_pr_number: highest_number,
            rows: written.total(),
        });
        tracing::debug!(
            pull_requests = bundles.len(),
            highest = highest_number,
            "batch committed"
        );

        BatchResult::Committed
    }

    /// Fetches all sub-resources for the batch with bounded concurrency.
    ///
    /// Returns `Ok(None)` when cancellation interrupted the batch. Any PR
    /// whose detail fetch fails terminally fails the whole batch.
    async fn fetch_batch_details(
        &self,
        work: &[ApiPullRequest],
    ) -> Result<Option<Vec<PrBundle>>, ExtractError> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks: JoinSet<Result<Option<PrBundle>, ExtractError>> = JoinSet::new();

        for pr in work.iter().cloned() {
            let gateway = Arc::clone(&self.gateway);
            let permit_source = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permit_source.acquire().await else {
                    return Ok(None);
                };
                // The per-PR boundary: a PR whose fetch has not started yet
                // is abandoned on cancellation, in-flight ones drain.
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                fetch_bundle(gateway.as_ref(), pr).await.map(Some)
            });
        }

        let mut bundles = Vec::with_capacity(work.len());
        let mut first_error: Option<ExtractError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(bundle))) => bundles.push(bundle),
                Ok(Ok(None)) => {}
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        first_error = Some(ExtractError::Io {
                            message: format!("detail fetch task failed: {join_error}"),
                        });
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if self.cancel.is_cancelled() && bundles.len() < work.len() {
            return Ok(None);
        }
        Ok(Some(bundles))
    }
}

/// Whether a batch committed or ended the run.
enum BatchResult {
    Committed,
    Stopped,
}

/// Fetches one PR's six sub-resources concurrently and assembles the bundle.
async fn fetch_bundle(
    gateway: &dyn ForgeGateway,
    pull_request: ApiPullRequest,
) -> Result<PrBundle, ExtractError> {
    let number = pull_request.number;
    let head_sha = pull_request
        .head
        .as_ref()
        .and_then(|head| head.sha.clone());

    let checks = async {
        match &head_sha {
            Some(sha) => gateway.check_runs(sha).await,
            None => Ok(Vec::new()),
        }
    };

    let (reviews, issue_comments, review_comments, files, check_runs, timeline) = tokio::join!(
        gateway.reviews(number),
        gateway.issue_comments(number),
        gateway.review_comments(number),
        gateway.files(number),
        checks,
        gateway.timeline(number),
    );

    Ok(PrBundle {
        pull_request,
        reviews: reviews?,
        issue_comments: issue_comments?,
        review_comments: review_comments?,
        files: files?,
        check_runs: check_runs?,
        timeline: timeline?,
    })
}

/// Builds the listing query for the determined range.
///
/// Full runs list oldest-created first so PR numbers arrive in ascending
/// order. Incremental runs ask the forge to filter by update time; when a
/// refresh window reaches further back than the checkpoint, the window's
/// cutoff wins so refreshed PRs appear in the listing.
fn build_list_query(
    checkpoint: Option<&crate::persistence::Checkpoint>,
    refresh_cutoff: Option<DateTime<Utc>>,
) -> ListQuery {
    checkpoint.map_or_else(ListQuery::default, |mark| {
        let mut since = mark.last_pr_updated_at;
        if let Some(cutoff) = refresh_cutoff {
            since = since.min(cutoff);
        }
        ListQuery {
            sort: ListSort::UpdatedAscending,
            since: Some(since),
        }
    })
}

fn parse_instant(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use chrono::{TimeZone, Utc};

    use super::{CancelFlag, Extractor, RunMode, RunOptions, RunOutcome};
    use crate::classify::{BotClassifier, BotConfig, ModuleClassifier, ModuleConfig};
    use crate::extract::normalize::Normalizer;
    use crate::github::error::ExtractError;
    use crate::github::gateway::MockForgeGateway;
    use crate::github::models::ApiPullRequest;
    use crate::github::models::test_support::pull_request_json;
    use crate::github::rate_limit::{RateLimitInfo, RateLimitTracker};
    use crate::persistence::{CheckpointStore, TableStore, migrate_database};
    use crate::telemetry::NoopTelemetrySink;

    struct Fixture {
        store: TableStore,
        checkpoints: CheckpointStore,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir
            .path()
            .join("extraction.sqlite")
            .to_string_lossy()
            .into_owned();
        migrate_database(&path, &NoopTelemetrySink).expect("migrations should run");
        Fixture {
            store: TableStore::new(path.clone()).expect("table store should be created"),
            checkpoints: CheckpointStore::new(path).expect("checkpoint store should be created"),
            _dir: dir,
        }
    }

    fn listed_pr(number: u64, updated_at: &str) -> ApiPullRequest {
        serde_json::from_value(pull_request_json(number, updated_at))
            .expect("fixture pull request should deserialize")
    }

    fn healthy_rate_limit() -> RateLimitInfo {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be available")
            .as_secs();
        RateLimitInfo::new(5000, 4999, now + 3600)
    }

    fn expect_empty_details(mock: &mut MockForgeGateway) {
        mock.expect_reviews().returning(|_| Ok(Vec::new()));
        mock.expect_issue_comments().returning(|_| Ok(Vec::new()));
        mock.expect_review_comments().returning(|_| Ok(Vec::new()));
        mock.expect_files().returning(|_| Ok(Vec::new()));
        mock.expect_check_runs().returning(|_| Ok(Vec::new()));
        mock.expect_timeline().returning(|_| Ok(Vec::new()));
    }

    fn extractor(mock: MockForgeGateway, fix: &Fixture, options: RunOptions) -> Extractor {
        Extractor::new(
            Arc::new(mock),
            fix.store.clone(),
            fix.checkpoints.clone(),
            Normalizer::new(
                ModuleClassifier::new(&ModuleConfig::default()),
                BotClassifier::new(&BotConfig::default()),
            ),
            RateLimitTracker::new(),
            options,
            CancelFlag::new(),
            "octo/cat".to_owned(),
        )
    }

    #[tokio::test]
    async fn full_run_commits_batches_and_advances_checkpoint() {
        let fix = fixture();
        let mut mock = MockForgeGateway::new();
        mock.expect_rate_limit().returning(|| Ok(healthy_rate_limit()));
        mock.expect_request_count().return_const(9_u64);
        mock.expect_pull_request_page().returning(|_, page, _| {
            if page == 1 {
                Ok(vec![
                    listed_pr(1, "2025-01-05T00:00:00Z"),
                    listed_pr(2, "2025-01-06T00:00:00Z"),
                ])
            } else {
                Ok(Vec::new())
            }
        });
        expect_empty_details(&mut mock);

        let options = RunOptions {
            mode: RunMode::Full,
            ..RunOptions::default()
        };
        let summary = extractor(mock, &fix, options)
            .run(&NoopTelemetrySink)
            .await
            .expect("run should succeed");

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.prs_processed, 2);
        assert_eq!(summary.rows_written.pull_requests, 2);
        assert_eq!(summary.api_requests, 9);

        let checkpoint = fix
            .checkpoints
            .load()
            .expect("load should succeed")
            .expect("checkpoint should exist");
        assert_eq!(checkpoint.last_pr_number, 2);
        let expected = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).single()
            .expect("timestamp should be valid");
        assert_eq!(checkpoint.last_pr_updated_at, expected);

        let counts = fix.store.table_counts().expect("counts should be readable");
        assert_eq!(counts.pull_requests, 2);
    }

    #[tokio::test]
    async fn incremental_run_with_no_new_data_writes_nothing() {
        let fix = fixture();
        let mark = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).single()
            .expect("timestamp should be valid");
        fix.checkpoints.advance(2, mark).expect("advance should succeed");

        let mut mock = MockForgeGateway::new();
        mock.expect_rate_limit().returning(|| Ok(healthy_rate_limit()));
        mock.expect_request_count().return_const(1_u64);
        mock.expect_pull_request_page().returning(|query, _, _| {
            assert!(query.since.is_some(), "incremental run should filter by update time");
            Ok(Vec::new())
        });

        let summary = extractor(mock, &fix, RunOptions::default())
            .run(&NoopTelemetrySink)
            .await
            .expect("run should succeed");

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.prs_processed, 0);
        assert_eq!(summary.rows_written.total(), 0);

        let checkpoint = fix
            .checkpoints
            .load()
            .expect("load should succeed")
            .expect("checkpoint should exist");
        assert_eq!(checkpoint.last_pr_number, 2);
        assert_eq!(checkpoint.last_pr_updated_at, mark);
    }

    #[tokio::test]
    async fn already_checkpointed_prs_are_skipped() {
        let fix = fixture();
        let mark = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).single()
            .expect("timestamp should be valid");
        fix.checkpoints.advance(2, mark).expect("advance should succeed");

        let mut mock = MockForgeGateway::new();
        mock.expect_rate_limit().returning(|| Ok(healthy_rate_limit()));
        mock.expect_request_count().return_const(2_u64);
        // The forge echoes back an already-committed PR despite the filter.
        mock.expect_pull_request_page().returning(|_, page, _| {
            if page == 1 {
                Ok(vec![listed_pr(1, "2025-01-05T00:00:00Z")])
            } else {
                Ok(Vec::new())
            }
        });

        let summary = extractor(mock, &fix, RunOptions::default())
            .run(&NoopTelemetrySink)
            .await
            .expect("run should succeed");

        assert_eq!(summary.prs_processed, 0);
        assert_eq!(summary.prs_skipped, 1);
        assert_eq!(summary.rows_written.total(), 0);
    }

    #[tokio::test]
    async fn detail_failure_aborts_without_checkpoint_advance() {
        let fix = fixture();
        let mut mock = MockForgeGateway::new();
        mock.expect_rate_limit().returning(|| Ok(healthy_rate_limit()));
        mock.expect_request_count().return_const(3_u64);
        mock.expect_pull_request_page().returning(|_, page, _| {
            if page == 1 {
                Ok(vec![listed_pr(1, "2025-01-05T00:00:00Z")])
            } else {
                Ok(Vec::new())
            }
        });
        mock.expect_reviews().returning(|_| {
            Err(ExtractError::RetriesExhausted {
                attempts: 3,
                message: "connection reset".to_owned(),
            })
        });
        mock.expect_issue_comments().returning(|_| Ok(Vec::new()));
        mock.expect_review_comments().returning(|_| Ok(Vec::new()));
        mock.expect_files().returning(|_| Ok(Vec::new()));
        mock.expect_check_runs().returning(|_| Ok(Vec::new()));
        mock.expect_timeline().returning(|_| Ok(Vec::new()));

        let options = RunOptions {
            mode: RunMode::Full,
            ..RunOptions::default()
        };
        let summary = extractor(mock, &fix, options)
            .run(&NoopTelemetrySink)
            .await
            .expect("run should report rather than error");

        assert!(matches!(summary.outcome, RunOutcome::Failed(_)));
        assert_eq!(summary.prs_failed, 1);
        assert_eq!(summary.prs_processed, 0);
        assert_eq!(
            fix.checkpoints.load().expect("load should succeed"),
            None,
            "checkpoint must not advance past an uncommitted batch"
        );
        let counts = fix.store.table_counts().expect("counts should be readable");
        assert_eq!(counts.pull_requests, 0);
    }

    #[tokio::test]
    async fn limit_stops_the_run_after_enough_prs() {
        let fix = fixture();
        let mut mock = MockForgeGateway::new();
        mock.expect_rate_limit().returning(|| Ok(healthy_rate_limit()));
        mock.expect_request_count().return_const(4_u64);
        mock.expect_pull_request_page().returning(|_, page, _| {
            if page == 1 {
                Ok(vec![
                    listed_pr(1, "2025-01-05T00:00:00Z"),
                    listed_pr(2, "2025-01-06T00:00:00Z"),
                    listed_pr(3, "2025-01-07T00:00:00Z"),
                ])
            } else {
                Ok(Vec::new())
            }
        });
        expect_empty_details(&mut mock);

        let options = RunOptions {
            mode: RunMode::Full,
            limit: Some(2),
            ..RunOptions::default()
        };
        let summary = extractor(mock, &fix, options)
            .run(&NoopTelemetrySink)
            .await
            .expect("run should succeed");

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.prs_processed, 2);
    }

    #[tokio::test]
    async fn cancellation_before_work_commits_nothing() {
        let fix = fixture();
        let mut mock = MockForgeGateway::new();
        mock.expect_rate_limit().returning(|| Ok(healthy_rate_limit()));
        mock.expect_request_count().return_const(1_u64);
        mock.expect_pull_request_page().returning(|_, _, _| Ok(Vec::new()));

        let cancel = CancelFlag::new();
        cancel.cancel();

        let extractor = Extractor::new(
            Arc::new(mock),
            fix.store.clone(),
            fix.checkpoints.clone(),
            Normalizer::new(
                ModuleClassifier::new(&ModuleConfig::default()),
                BotClassifier::new(&BotConfig::default()),
            ),
            RateLimitTracker::new(),
            RunOptions {
                mode: RunMode::Full,
                ..RunOptions::default()
            },
            cancel,
            "octo/cat".to_owned(),
        );

        let summary = extractor
            .run(&NoopTelemetrySink)
            .await
            .expect("run should succeed");
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.prs_processed, 0);
        assert_eq!(fix.checkpoints.load().expect("load should succeed"), None);
    }
}
