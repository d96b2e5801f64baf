//! Shared fixtures for unit and integration tests.
//!
//! Builders return the JSON payloads a forge would serve, plus a fully
//! populated [`PrBundle`] exercising every table: a bot-authored review
//! comment, an empty-body approval, a generated lockfile change, and an
//! unrecognized timeline event kind.

use serde_json::{Value, json};

use crate::extract::normalize::PrBundle;

/// JSON payload for one pull request as the listing endpoint returns it.
#[must_use]
pub fn pull_request_json(number: u64, updated_at: &str) -> Value {
    json!({
        "number": number,
        "id": 1000 + number,
        "title": format!("Change #{number}"),
        "body": "Implements the thing.",
        "state": "closed",
        "draft": false,
        "user": { "login": "alice", "id": 7, "type": "User" },
        "base": { "ref": "main", "sha": "base000" },
        "head": { "ref": format!("feature-{number}"), "sha": format!("head{number:03}") },
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": updated_at,
        "merged_at": "2025-01-05T00:00:00Z",
        "closed_at": "2025-01-05T00:00:00Z",
        "merge_commit_sha": "merge000"
    })
}

/// JSON payload for a review list with one empty-body approval.
#[must_use]
pub fn reviews_json(review_id: u64) -> Value {
    json!([{
        "id": review_id,
        "user": { "login": "bob", "id": 8, "type": "User" },
        "state": "APPROVED",
        "submitted_at": "2025-01-04T12:00:00Z",
        "commit_id": "head001"
    }])
}

/// JSON payload for an inline review comment list authored by a bot.
#[must_use]
pub fn review_comments_json(comment_id: u64, review_id: u64) -> Value {
    json!([{
        "id": comment_id,
        "pull_request_review_id": review_id,
        "user": { "login": "renovate[bot]", "id": 9, "type": "Bot" },
        "body": "Consider bumping this dependency.",
        "path": "Cargo.lock",
        "line": 3,
        "position": null,
        "created_at": "2025-01-03T09:00:00Z",
        "updated_at": "2025-01-03T09:00:00Z"
    }])
}

/// JSON payload for a discussion comment list.
#[must_use]
pub fn issue_comments_json(comment_id: u64) -> Value {
    json!([{
        "id": comment_id,
        "user": { "login": "alice", "id": 7, "type": "User" },
        "body": "Ready for another look.",
        "created_at": "2025-01-02T10:00:00Z",
        "updated_at": "2025-01-02T10:00:00Z",
        "reactions": { "total_count": 2 }
    }])
}

/// JSON payload for a changed-file list with one source file and one
/// generated lockfile.
#[must_use]
pub fn files_json() -> Value {
    json!([
        {
            "filename": "src/core/engine.rs",
            "status": "modified",
            "additions": 12,
            "deletions": 3,
            "changes": 15
        },
        {
            "filename": "Cargo.lock",
            "status": "modified",
            "additions": 3,
            "deletions": 1,
            "changes": 4
        }
    ])
}

/// JSON payload for the check-runs envelope.
#[must_use]
pub fn check_runs_json(check_id: u64) -> Value {
    json!({
        "total_count": 1,
        "check_runs": [{
            "id": check_id,
            "name": "ci/test",
            "status": "completed",
            "conclusion": "success",
            "started_at": "2025-01-04T00:00:00Z",
            "completed_at": "2025-01-04T00:08:20Z"
        }]
    })
}

/// JSON payload for a timeline with one merged event and one event kind
/// outside the recognized set.
#[must_use]
pub fn timeline_json() -> Value {
    json!([
        {
            "id": 501,
            "event": "merged",
            "actor": { "login": "alice", "id": 7, "type": "User" },
            "created_at": "2025-01-05T00:00:00Z"
        },
        {
            "event": "locked",
            "actor": { "login": "alice", "id": 7, "type": "User" },
            "created_at": "2025-01-06T00:00:00Z"
        }
    ])
}

/// A fully populated bundle built from the JSON fixtures above.
///
/// # Panics
///
/// Panics when the fixture JSON does not deserialize; that is a bug in the
/// fixtures themselves.
#[must_use]
pub fn sample_bundle() -> PrBundle {
    PrBundle {
        pull_request: serde_json::from_value(pull_request_json(1, "2025-01-05T00:00:00Z"))
            .expect("fixture pull request should deserialize"),
        reviews: serde_json::from_value(reviews_json(77))
            .expect("fixture reviews should deserialize"),
        issue_comments: serde_json::from_value(issue_comments_json(301))
            .expect("fixture comments should deserialize"),
        review_comments: serde_json::from_value(review_comments_json(201, 77))
            .expect("fixture review comments should deserialize"),
        files: serde_json::from_value(files_json())
            .expect("fixture files should deserialize"),
        check_runs: serde_json::from_value(
            check_runs_json(401)
                .get("check_runs")
                .cloned()
                .unwrap_or_default(),
        )
        .expect("fixture check runs should deserialize"),
        timeline: serde_json::from_value(timeline_json())
            .expect("fixture timeline should deserialize"),
    }
}
