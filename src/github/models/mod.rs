//! Deserialization targets for forge API payloads.
//!
//! These types mirror the nested JSON the forge returns for pull requests
//! and their sub-resources. Every field beyond the upstream identifier is
//! optional so that partially-populated payloads deserialize rather than
//! abort a fetch; the normalizer decides how absent values are stored.

use serde::Deserialize;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Account reference embedded in most payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiAccount {
    /// Account login.
    pub login: Option<String>,
    /// Upstream account id.
    pub id: Option<u64>,
    /// Account type reported by the forge (e.g. `User`, `Bot`).
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Branch reference on a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiBranchRef {
    /// Branch name.
    #[serde(rename = "ref")]
    pub name: Option<String>,
    /// Commit SHA the branch points at.
    pub sha: Option<String>,
}

/// Pull request record from the listing or detail endpoint.
///
/// The listing endpoint omits `additions`, `deletions`, and `changed_files`;
/// the normalizer recomputes them from the fetched file list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiPullRequest {
    /// Pull request number, unique within the repository.
    pub number: u64,
    /// Upstream pull request id.
    #[serde(default)]
    pub id: Option<u64>,
    /// Title of the pull request.
    #[serde(default)]
    pub title: Option<String>,
    /// Markdown body.
    #[serde(default)]
    pub body: Option<String>,
    /// State (`open` or `closed`).
    #[serde(default)]
    pub state: Option<String>,
    /// Whether the pull request is a draft.
    #[serde(default)]
    pub draft: Option<bool>,
    /// Whether the pull request was merged (detail endpoint only).
    #[serde(default)]
    pub merged: Option<bool>,
    /// Author account.
    #[serde(default)]
    pub user: Option<ApiAccount>,
    /// Base branch reference.
    #[serde(default)]
    pub base: Option<ApiBranchRef>,
    /// Head branch reference.
    #[serde(default)]
    pub head: Option<ApiBranchRef>,
    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update timestamp (ISO 8601).
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Merge timestamp, if merged.
    #[serde(default)]
    pub merged_at: Option<String>,
    /// Close timestamp, if closed.
    #[serde(default)]
    pub closed_at: Option<String>,
    /// Lines added across the diff.
    #[serde(default)]
    pub additions: Option<i64>,
    /// Lines removed across the diff.
    #[serde(default)]
    pub deletions: Option<i64>,
    /// Number of files changed.
    #[serde(default)]
    pub changed_files: Option<i64>,
    /// Number of commits on the branch.
    #[serde(default)]
    pub commits: Option<i64>,
    /// Merge commit SHA, if merged.
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
}

/// Review submission on a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiReview {
    /// Upstream review id.
    pub id: u64,
    /// Reviewer account.
    #[serde(default)]
    pub user: Option<ApiAccount>,
    /// Review state (`APPROVED`, `COMMENTED`, `CHANGES_REQUESTED`, ...).
    #[serde(default)]
    pub state: Option<String>,
    /// Review body; empty approvals carry no body at all.
    #[serde(default)]
    pub body: Option<String>,
    /// Submission timestamp (ISO 8601).
    #[serde(default)]
    pub submitted_at: Option<String>,
    /// Commit SHA the review was submitted against.
    #[serde(default)]
    pub commit_id: Option<String>,
}

/// Inline code review comment.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiReviewComment {
    /// Upstream comment id.
    pub id: u64,
    /// Id of the parent review submission.
    #[serde(default)]
    pub pull_request_review_id: Option<u64>,
    /// Comment author.
    #[serde(default)]
    pub user: Option<ApiAccount>,
    /// Comment body.
    #[serde(default)]
    pub body: Option<String>,
    /// File path the comment is attached to.
    #[serde(default)]
    pub path: Option<String>,
    /// Line in the current diff.
    #[serde(default)]
    pub line: Option<i64>,
    /// Line in the original diff.
    #[serde(default)]
    pub original_line: Option<i64>,
    /// Position in the diff; absent when the comment is outdated.
    #[serde(default)]
    pub position: Option<i64>,
    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update timestamp (ISO 8601).
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Reaction summary on a discussion comment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiReactions {
    /// Total reaction count.
    pub total_count: Option<i64>,
}

/// PR-level discussion comment (issue comment).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiIssueComment {
    /// Upstream comment id.
    pub id: u64,
    /// Comment author.
    #[serde(default)]
    pub user: Option<ApiAccount>,
    /// Comment body.
    #[serde(default)]
    pub body: Option<String>,
    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created_at: Option<String>,
    /// Last update timestamp (ISO 8601).
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Reaction summary.
    #[serde(default)]
    pub reactions: Option<ApiReactions>,
}

/// Changed file in a pull request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiFileChange {
    /// Path of the changed file.
    pub filename: Option<String>,
    /// Change status (`added`, `modified`, `removed`, ...).
    pub status: Option<String>,
    /// Lines added.
    pub additions: Option<i64>,
    /// Lines removed.
    pub deletions: Option<i64>,
    /// Total changed lines.
    pub changes: Option<i64>,
}

/// CI check run for a commit.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCheckRun {
    /// Upstream check run id.
    pub id: u64,
    /// Check name.
    #[serde(default)]
    pub name: Option<String>,
    /// Execution status (`queued`, `in_progress`, `completed`).
    #[serde(default)]
    pub status: Option<String>,
    /// Conclusion once completed (`success`, `failure`, ...).
    #[serde(default)]
    pub conclusion: Option<String>,
    /// Start timestamp (ISO 8601).
    #[serde(default)]
    pub started_at: Option<String>,
    /// Completion timestamp (ISO 8601).
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Envelope the check-runs endpoint wraps its results in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiCheckRunList {
    /// The check runs for the requested commit.
    pub check_runs: Vec<ApiCheckRun>,
}

/// Timeline event on a pull request.
///
/// The timeline is polymorphic: the actor and timestamp live in different
/// fields depending on the event kind, and some kinds carry no upstream id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiTimelineEvent {
    /// Upstream event id, absent for some event kinds.
    pub id: Option<u64>,
    /// Event kind (`merged`, `reviewed`, `ready_for_review`, ...).
    pub event: Option<String>,
    /// Acting account for most event kinds.
    pub actor: Option<ApiAccount>,
    /// Acting account for review-shaped events.
    pub user: Option<ApiAccount>,
    /// Creation timestamp for most event kinds.
    pub created_at: Option<String>,
    /// Submission timestamp for review-shaped events.
    pub submitted_at: Option<String>,
    /// Commit timestamp for commit-shaped events.
    pub committed_at: Option<String>,
}

impl ApiTimelineEvent {
    /// The acting account, wherever the event kind put it.
    #[must_use]
    pub const fn acting_account(&self) -> Option<&ApiAccount> {
        match (&self.actor, &self.user) {
            (Some(actor), _) => Some(actor),
            (None, Some(user)) => Some(user),
            (None, None) => None,
        }
    }

    /// The event timestamp, wherever the event kind put it.
    #[must_use]
    pub fn occurred_at(&self) -> Option<&str> {
        self.created_at
            .as_deref()
            .or(self.submitted_at.as_deref())
            .or(self.committed_at.as_deref())
    }
}
