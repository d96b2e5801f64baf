//! Normalization of fetched pull request subtrees into table rows.
//!
//! [`Normalizer::normalize`] is a pure mapping from one [`PrBundle`] to a
//! [`TableBatch`], with two classifier side-calls: file paths are assigned
//! modules and generated flags, and account logins are classified as human
//! or bot. Per-record anomalies are absorbed here — a record that cannot be
//! fully normalized is logged and stored with a fallback value or
//! unknown-type marker, never dropped — so row-count invariants survive
//! malformed upstream data.

use chrono::{DateTime, Utc};

use super::rows::{
    CheckRunRow, FileRow, PrCommentRow, PullRequestRow, ReviewCommentRow, ReviewRow, TableBatch,
    TimelineEventKind, TimelineEventRow, UserRow,
};
use crate::classify::{BotClassifier, ModuleClassifier};
use crate::github::models::{
    ApiAccount, ApiCheckRun, ApiFileChange, ApiIssueComment, ApiPullRequest, ApiReview,
    ApiReviewComment, ApiTimelineEvent,
};

/// Login stored when the forge omitted the account entirely.
const UNKNOWN_LOGIN: &str = "unknown";

/// One pull request's listing record plus all fetched sub-resources.
///
/// The unit of normalization and of cancellation: a bundle is only built
/// once every sub-fetch for the PR has completed.
#[derive(Debug, Clone, Default)]
pub struct PrBundle {
    /// The pull request record from the listing endpoint.
    pub pull_request: ApiPullRequest,
    /// Review submissions.
    pub reviews: Vec<ApiReview>,
    /// PR-level discussion comments.
    pub issue_comments: Vec<ApiIssueComment>,
    /// Inline review comments.
    pub review_comments: Vec<ApiReviewComment>,
    /// Changed files.
    pub files: Vec<ApiFileChange>,
    /// Check runs for the head commit.
    pub check_runs: Vec<ApiCheckRun>,
    /// Timeline events.
    pub timeline: Vec<ApiTimelineEvent>,
}

/// Converts bundles into table rows using the configured classifiers.
#[derive(Debug, Clone)]
pub struct Normalizer {
    modules: ModuleClassifier,
    bots: BotClassifier,
}

impl Normalizer {
    /// Creates a normalizer from compiled classifiers.
    #[must_use]
    pub const fn new(modules: ModuleClassifier, bots: BotClassifier) -> Self {
        Self { modules, bots }
    }

    /// Normalizes one bundle into rows for all eight tables.
    #[must_use]
    pub fn normalize(&self, bundle: &PrBundle) -> TableBatch {
        let mut batch = TableBatch::default();
        let pr_number = to_i64(bundle.pull_request.number);
        let pr_updated_at = parse_timestamp(bundle.pull_request.updated_at.as_deref())
            .unwrap_or(DateTime::UNIX_EPOCH);

        self.normalize_pull_request(bundle, &mut batch, pr_updated_at);
        self.normalize_reviews(bundle, &mut batch, pr_number, pr_updated_at);
        self.normalize_review_comments(bundle, &mut batch, pr_number, pr_updated_at);
        self.normalize_issue_comments(bundle, &mut batch, pr_number, pr_updated_at);
        self.normalize_files(bundle, &mut batch, pr_number);
        normalize_check_runs(bundle, &mut batch, pr_number);
        self.normalize_timeline(bundle, &mut batch, pr_number, pr_updated_at);

        batch
    }

    fn normalize_pull_request(
        &self,
        bundle: &PrBundle,
        batch: &mut TableBatch,
        pr_updated_at: DateTime<Utc>,
    ) {
        let pr = &bundle.pull_request;
        let author = self.track_account(pr.user.as_ref(), batch);

        let created_at = parse_timestamp(pr.created_at.as_deref()).unwrap_or_else(|| {
            tracing::warn!(pr = pr.number, "pull request has no creation timestamp");
            pr_updated_at
        });
        let merged_at = parse_timestamp(pr.merged_at.as_deref());

        // The listing endpoint omits diff stats; recompute them from the
        // fetched file list when we have one.
        let (additions, deletions, changed_files) = if bundle.files.is_empty() {
            (
                pr.additions.unwrap_or(0),
                pr.deletions.unwrap_or(0),
                pr.changed_files.unwrap_or(0),
            )
        } else {
            (
                bundle.files.iter().filter_map(|file| file.additions).sum(),
                bundle.files.iter().filter_map(|file| file.deletions).sum(),
                i64::try_from(bundle.files.len()).unwrap_or(i64::MAX),
            )
        };

        batch.pull_requests.push(PullRequestRow {
            pr_number: to_i64(pr.number),
            pr_id: pr.id.map(to_i64).unwrap_or_default(),
            title: pr.title.clone().unwrap_or_default(),
            body: pr.body.clone().unwrap_or_default(),
            author_login: author.login,
            author_id: author.id,
            author_is_bot: author.is_bot,
            state: pr.state.clone().unwrap_or_default(),
            draft: pr.draft.unwrap_or(false),
            merged: pr.merged.unwrap_or(false) || merged_at.is_some(),
            base_ref: pr
                .base
                .as_ref()
                .and_then(|branch| branch.name.clone())
                .unwrap_or_default(),
            head_ref: pr
                .head
                .as_ref()
                .and_then(|branch| branch.name.clone())
                .unwrap_or_default(),
            created_at,
            updated_at: pr_updated_at,
            merged_at,
            closed_at: parse_timestamp(pr.closed_at.as_deref()),
            additions,
            deletions,
            changed_files,
            commits: pr.commits.unwrap_or(0),
            merge_commit_sha: pr.merge_commit_sha.clone().unwrap_or_default(),
        });
    }

    fn normalize_reviews(
        &self,
        bundle: &PrBundle,
        batch: &mut TableBatch,
        pr_number: i64,
        pr_updated_at: DateTime<Utc>,
    ) {
        for review in &bundle.reviews {
            let reviewer = self.track_account(review.user.as_ref(), batch);
            let submitted_at = parse_timestamp(review.submitted_at.as_deref()).unwrap_or_else(|| {
                tracing::warn!(review = review.id, "review has no submission timestamp");
                pr_updated_at
            });

            batch.reviews.push(ReviewRow {
                review_id: to_i64(review.id),
                pr_number,
                reviewer_login: reviewer.login,
                reviewer_id: reviewer.id,
                reviewer_is_bot: reviewer.is_bot,
                state: review.state.clone().unwrap_or_default(),
                body: review.body.clone().unwrap_or_default(),
                submitted_at,
                commit_sha: review.commit_id.clone().unwrap_or_default(),
            });
        }
    }

    fn normalize_review_comments(
        &self,
        bundle: &PrBundle,
        batch: &mut TableBatch,
        pr_number: i64,
        pr_updated_at: DateTime<Utc>,
    ) {
        for comment in &bundle.review_comments {
            let author = self.track_account(comment.user.as_ref(), batch);
            batch.review_comments.push(ReviewCommentRow {
                comment_id: to_i64(comment.id),
                review_id: comment.pull_request_review_id.map(to_i64),
                pr_number,
                author_login: author.login,
                author_is_bot: author.is_bot,
                body: comment.body.clone().unwrap_or_default(),
                path: comment.path.clone().unwrap_or_default(),
                line: comment.line.or(comment.original_line),
                created_at: parse_timestamp(comment.created_at.as_deref())
                    .unwrap_or(pr_updated_at),
                updated_at: parse_timestamp(comment.updated_at.as_deref())
                    .unwrap_or(pr_updated_at),
                outdated: comment.position.is_none(),
            });
        }
    }

    fn normalize_issue_comments(
        &self,
        bundle: &PrBundle,
        batch: &mut TableBatch,
        pr_number: i64,
        pr_updated_at: DateTime<Utc>,
    ) {
        for comment in &bundle.issue_comments {
            let author = self.track_account(comment.user.as_ref(), batch);
            batch.pr_comments.push(PrCommentRow {
                comment_id: to_i64(comment.id),
                pr_number,
                author_login: author.login,
                author_is_bot: author.is_bot,
                body: comment.body.clone().unwrap_or_default(),
                created_at: parse_timestamp(comment.created_at.as_deref())
                    .unwrap_or(pr_updated_at),
                updated_at: parse_timestamp(comment.updated_at.as_deref())
                    .unwrap_or(pr_updated_at),
                reactions_total: comment
                    .reactions
                    .as_ref()
                    .and_then(|reactions| reactions.total_count)
                    .unwrap_or(0),
            });
        }
    }

    fn normalize_files(&self, bundle: &PrBundle, batch: &mut TableBatch, pr_number: i64) {
        for file in &bundle.files {
            let path = file.filename.clone().unwrap_or_default();
            batch.files.push(FileRow {
                pr_number,
                module: self.modules.classify_file(&path),
                generated: self.modules.is_generated(&path),
                path,
                status: file.status.clone().unwrap_or_else(|| "modified".to_owned()),
                additions: file.additions.unwrap_or(0),
                deletions: file.deletions.unwrap_or(0),
                changes: file.changes.unwrap_or(0),
            });
        }
    }

    fn normalize_timeline(
        &self,
        bundle: &PrBundle,
        batch: &mut TableBatch,
        pr_number: i64,
        pr_updated_at: DateTime<Utc>,
    ) {
        for event in &bundle.timeline {
            let kind = event.event.as_deref().map_or(TimelineEventKind::Unknown, |name| {
                let mapped = TimelineEventKind::from_event(name);
                if mapped == TimelineEventKind::Unknown {
                    tracing::debug!(pr = pr_number, event = name, "unrecognized timeline event kind");
                }
                mapped
            });

            let actor = self.track_account(event.acting_account(), batch);
            let occurred_at = parse_timestamp(event.occurred_at()).unwrap_or_else(|| {
                tracing::warn!(pr = pr_number, "timeline event has no timestamp");
                pr_updated_at
            });

            batch.timeline_events.push(TimelineEventRow {
                pr_number,
                kind,
                actor_login: actor.login,
                occurred_at,
                event_id: event.id.map(to_i64),
            });
        }
    }

    /// Classifies and records an account, returning its stored identity.
    fn track_account(&self, account: Option<&ApiAccount>, batch: &mut TableBatch) -> AccountIdentity {
        let Some(account) = account else {
            return AccountIdentity {
                login: UNKNOWN_LOGIN.to_owned(),
                id: 0,
                is_bot: false,
            };
        };

        let login = account
            .login
            .clone()
            .unwrap_or_else(|| UNKNOWN_LOGIN.to_owned());
        let verdict = self
            .bots
            .classify_account(&login, account.kind.as_deref());

        if !batch.users.iter().any(|user| user.login == login) {
            batch.users.push(UserRow {
                login: login.clone(),
                user_id: account.id.map(to_i64).unwrap_or_default(),
                is_bot: verdict.is_bot,
                signal: verdict.signal,
                bot_name: verdict
                    .is_bot
                    .then(|| BotClassifier::bot_name(&login))
                    .flatten(),
            });
        }

        AccountIdentity {
            login,
            id: account.id.map(to_i64).unwrap_or_default(),
            is_bot: verdict.is_bot,
        }
    }
}

fn normalize_check_runs(bundle: &PrBundle, batch: &mut TableBatch, pr_number: i64) {
    for check in &bundle.check_runs {
        let started_at = parse_timestamp(check.started_at.as_deref());
        let completed_at = parse_timestamp(check.completed_at.as_deref());
        let duration_seconds = match (started_at, completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        };

        batch.check_runs.push(CheckRunRow {
            check_id: to_i64(check.id),
            pr_number,
            name: check.name.clone().unwrap_or_else(|| "unknown".to_owned()),
            status: check.status.clone().unwrap_or_else(|| "unknown".to_owned()),
            conclusion: check.conclusion.clone(),
            started_at,
            completed_at,
            duration_seconds,
        });
    }
}

/// Resolved identity of one account reference.
struct AccountIdentity {
    login: String,
    id: i64,
    is_bot: bool,
}

/// Saturating conversion for upstream ids bound as SQLite `BigInt`.
fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Parses an ISO 8601 timestamp, tolerating absence and malformed input.
fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let text = value?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(error) => {
            tracing::warn!(timestamp = text, "malformed timestamp: {error}");
            None
        }
    }
}
