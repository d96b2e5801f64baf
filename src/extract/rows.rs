//! Normalized row types for the eight output tables.
//!
//! These are the domain shapes the normalizer produces and the table store
//! persists. Identifiers are upstream-assigned; the pipeline never invents
//! or recycles them. Optional text is stored as the empty string so the
//! query layer never distinguishes "absent" from "empty" (the empty-approval
//! semantics consumers rely on).

use chrono::{DateTime, Utc};

use crate::classify::BotSignal;

/// One pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRow {
    /// Pull request number, unique within the repository.
    pub pr_number: i64,
    /// Upstream pull request id.
    pub pr_id: i64,
    /// Title.
    pub title: String,
    /// Markdown body, empty when absent.
    pub body: String,
    /// Author login.
    pub author_login: String,
    /// Author account id.
    pub author_id: i64,
    /// Whether the author is a bot.
    pub author_is_bot: bool,
    /// State (`open` or `closed`).
    pub state: String,
    /// Whether the pull request is a draft.
    pub draft: bool,
    /// Whether the pull request was merged.
    pub merged: bool,
    /// Base branch name.
    pub base_ref: String,
    /// Head branch name.
    pub head_ref: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Merge time, if merged.
    pub merged_at: Option<DateTime<Utc>>,
    /// Close time, if closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Lines added across the diff.
    pub additions: i64,
    /// Lines removed across the diff.
    pub deletions: i64,
    /// Number of files changed.
    pub changed_files: i64,
    /// Number of commits on the branch.
    pub commits: i64,
    /// Merge commit SHA, empty when absent.
    pub merge_commit_sha: String,
}

/// One review submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRow {
    /// Upstream review id.
    pub review_id: i64,
    /// Parent pull request number.
    pub pr_number: i64,
    /// Reviewer login.
    pub reviewer_login: String,
    /// Reviewer account id.
    pub reviewer_id: i64,
    /// Whether the reviewer is a bot.
    pub reviewer_is_bot: bool,
    /// Review state (`APPROVED`, `COMMENTED`, `CHANGES_REQUESTED`, ...).
    pub state: String,
    /// Review body; empty approvals store the empty string.
    pub body: String,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Commit SHA the review was submitted against, empty when absent.
    pub commit_sha: String,
}

/// One inline review comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCommentRow {
    /// Upstream comment id.
    pub comment_id: i64,
    /// Parent review submission id, when the forge provided one.
    pub review_id: Option<i64>,
    /// Parent pull request number.
    pub pr_number: i64,
    /// Author login.
    pub author_login: String,
    /// Whether the author is a bot.
    pub author_is_bot: bool,
    /// Comment body.
    pub body: String,
    /// File path the comment is attached to.
    pub path: String,
    /// Line in the diff the comment refers to.
    pub line: Option<i64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// True when the comment no longer maps onto the current diff.
    pub outdated: bool,
}

/// One PR-level discussion comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrCommentRow {
    /// Upstream comment id.
    pub comment_id: i64,
    /// Parent pull request number.
    pub pr_number: i64,
    /// Author login.
    pub author_login: String,
    /// Whether the author is a bot.
    pub author_is_bot: bool,
    /// Comment body.
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Total reactions on the comment.
    pub reactions_total: i64,
}

/// One changed file in a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    /// Parent pull request number. Part of the composite key.
    pub pr_number: i64,
    /// File path. Part of the composite key.
    pub path: String,
    /// Change status (`added`, `modified`, `removed`, ...).
    pub status: String,
    /// Lines added.
    pub additions: i64,
    /// Lines removed.
    pub deletions: i64,
    /// Total changed lines.
    pub changes: i64,
    /// Logical module assigned by the module classifier.
    pub module: String,
    /// True when the file matches the generated-file globs.
    pub generated: bool,
}

/// One CI check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunRow {
    /// Upstream check run id.
    pub check_id: i64,
    /// Parent pull request number.
    pub pr_number: i64,
    /// Check name.
    pub name: String,
    /// Execution status.
    pub status: String,
    /// Conclusion once completed.
    pub conclusion: Option<String>,
    /// Start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds when both timestamps are present.
    pub duration_seconds: Option<i64>,
}

/// Closed set of timeline event kinds the pipeline recognizes.
///
/// Anything else maps to [`TimelineEventKind::Unknown`] and is still stored,
/// preserving the row-count invariants coverage metrics depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEventKind {
    /// Draft PR marked ready for review.
    ReadyForReview,
    /// A review was submitted.
    Reviewed,
    /// The PR was merged.
    Merged,
    /// The PR was closed.
    Closed,
    /// The PR was reopened.
    Reopened,
    /// The PR was converted back to a draft.
    ConvertedToDraft,
    /// A review was requested from someone.
    ReviewRequested,
    /// A review request was withdrawn.
    ReviewRequestRemoved,
    /// The PR was assigned.
    Assigned,
    /// The PR was unassigned.
    Unassigned,
    /// Any event kind outside the recognized set.
    Unknown,
}

impl TimelineEventKind {
    /// Maps an upstream event name onto the closed set.
    #[must_use]
    pub fn from_event(event: &str) -> Self {
        match event {
            "ready_for_review" => Self::ReadyForReview,
            "reviewed" => Self::Reviewed,
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            "reopened" => Self::Reopened,
            "convert_to_draft" | "converted_to_draft" => Self::ConvertedToDraft,
            "review_requested" => Self::ReviewRequested,
            "review_request_removed" => Self::ReviewRequestRemoved,
            "assigned" => Self::Assigned,
            "unassigned" => Self::Unassigned,
            _ => Self::Unknown,
        }
    }

    /// Stable string form stored in the timeline table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadyForReview => "ready_for_review",
            Self::Reviewed => "reviewed",
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::ConvertedToDraft => "converted_to_draft",
            Self::ReviewRequested => "review_requested",
            Self::ReviewRequestRemoved => "review_request_removed",
            Self::Assigned => "assigned",
            Self::Unassigned => "unassigned",
            Self::Unknown => "unknown",
        }
    }
}

/// One timeline event.
///
/// Keyed by (`pr_number`, `event_type`, `occurred_at`, `actor_login`):
/// several upstream event kinds carry no id and the pipeline never invents
/// one, so the natural composite key is the dedup key. The upstream id is
/// kept for audit when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEventRow {
    /// Parent pull request number.
    pub pr_number: i64,
    /// Event kind from the closed set.
    pub kind: TimelineEventKind,
    /// Acting account login, empty when the forge reported none.
    pub actor_login: String,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
    /// Upstream event id when the event kind carries one.
    pub event_id: Option<i64>,
}

/// One account observed anywhere in the extracted data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    /// Account login. Unique key.
    pub login: String,
    /// Upstream account id.
    pub user_id: i64,
    /// Whether the account is a bot.
    pub is_bot: bool,
    /// Which rule decided the classification, for audit.
    pub signal: BotSignal,
    /// Friendly bot name for known bots.
    pub bot_name: Option<String>,
}

/// Rows produced by normalizing one or more pull requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableBatch {
    /// Pull request rows.
    pub pull_requests: Vec<PullRequestRow>,
    /// Review rows.
    pub reviews: Vec<ReviewRow>,
    /// Inline review comment rows.
    pub review_comments: Vec<ReviewCommentRow>,
    /// Discussion comment rows.
    pub pr_comments: Vec<PrCommentRow>,
    /// Changed file rows.
    pub files: Vec<FileRow>,
    /// Check run rows.
    pub check_runs: Vec<CheckRunRow>,
    /// Timeline event rows.
    pub timeline_events: Vec<TimelineEventRow>,
    /// Account rows, deduplicated by login.
    pub users: Vec<UserRow>,
}

impl TableBatch {
    /// Returns true when no table has any rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pull_requests.is_empty()
            && self.reviews.is_empty()
            && self.review_comments.is_empty()
            && self.pr_comments.is_empty()
            && self.files.is_empty()
            && self.check_runs.is_empty()
            && self.timeline_events.is_empty()
            && self.users.is_empty()
    }

    /// Absorbs another batch, deduplicating users by login.
    pub fn merge(&mut self, other: Self) {
        self.pull_requests.extend(other.pull_requests);
        self.reviews.extend(other.reviews);
        self.review_comments.extend(other.review_comments);
        self.pr_comments.extend(other.pr_comments);
        self.files.extend(other.files);
        self.check_runs.extend(other.check_runs);
        self.timeline_events.extend(other.timeline_events);
        for user in other.users {
            if !self.users.iter().any(|existing| existing.login == user.login) {
                self.users.push(user);
            }
        }
    }

    /// Orders pull requests (and nothing else) by ascending number.
    ///
    /// Commit order within a batch follows PR number so the run-level
    /// ordering guarantee holds.
    pub fn sort_by_pr_number(&mut self) {
        self.pull_requests.sort_by_key(|row| row.pr_number);
    }

    /// Per-table row counts for the run summary.
    #[must_use]
    pub fn counts(&self) -> RowCounts {
        let count = |len: usize| u64::try_from(len).unwrap_or(u64::MAX);
        RowCounts {
            pull_requests: count(self.pull_requests.len()),
            reviews: count(self.reviews.len()),
            review_comments: count(self.review_comments.len()),
            pr_comments: count(self.pr_comments.len()),
            files: count(self.files.len()),
            check_runs: count(self.check_runs.len()),
            timeline_events: count(self.timeline_events.len()),
            users: count(self.users.len()),
        }
    }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// Pull request rows written.
    pub pull_requests: u64,
    /// Review rows written.
    pub reviews: u64,
    /// Inline review comment rows written.
    pub review_comments: u64,
    /// Discussion comment rows written.
    pub pr_comments: u64,
    /// File rows written.
    pub files: u64,
    /// Check run rows written.
    pub check_runs: u64,
    /// Timeline event rows written.
    pub timeline_events: u64,
    /// Account rows written.
    pub users: u64,
}

impl RowCounts {
    /// Adds another count set into this one.
    pub fn accumulate(&mut self, other: Self) {
        self.pull_requests += other.pull_requests;
        self.reviews += other.reviews;
        self.review_comments += other.review_comments;
        self.pr_comments += other.pr_comments;
        self.files += other.files;
        self.check_runs += other.check_runs;
        self.timeline_events += other.timeline_events;
        self.users += other.users;
    }

    /// Total rows across all tables.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pull_requests
            + self.reviews
            + self.review_comments
            + self.pr_comments
            + self.files
            + self.check_runs
            + self.timeline_events
            + self.users
    }
}
