//! Merge-upsert table store for the eight normalized extraction tables.
//!
//! All writes go through [`TableStore::commit_batch`], which applies one
//! `SQLite` transaction per batch: every row is inserted with
//! `ON CONFLICT ... DO UPDATE`, so re-applying a batch with the same keys is
//! idempotent and observably equivalent to a single application. Readers are
//! provided for the query layer and for tests.

use chrono::{DateTime, Utc};
use diesel::Connection;
use diesel::QueryableByName;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::sqlite::SqliteConnection;

use crate::extract::rows::{
    CheckRunRow, FileRow, PrCommentRow, PullRequestRow, ReviewCommentRow, ReviewRow, RowCounts,
    TableBatch, TimelineEventRow, UserRow,
};

use super::{StoreError, establish_connection, format_timestamp, parse_stored_timestamp};

/// SQLite-backed merge-upsert writer and reader for the extraction tables.
#[derive(Debug, Clone)]
pub struct TableStore {
    database_url: String,
}

impl TableStore {
    /// Creates a store targeting the configured `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BlankDatabaseUrl`] when the URL is blank.
    pub fn new(database_url: impl Into<String>) -> Result<Self, StoreError> {
        let database_url_string = database_url.into();
        if database_url_string.trim().is_empty() {
            return Err(StoreError::BlankDatabaseUrl);
        }
        Ok(Self {
            database_url: database_url_string,
        })
    }

    /// The database URL this store writes to.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Commits a batch atomically, inserting new keys and replacing existing
    /// rows that share a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the connection cannot be established, the
    /// schema is missing, or any statement fails; the transaction is rolled
    /// back and nothing from the batch is visible.
    pub fn commit_batch(&self, batch: &TableBatch) -> Result<RowCounts, StoreError> {
        let mut connection = establish_connection(&self.database_url)?;

        connection
            .transaction::<_, diesel::result::Error, _>(|transaction| {
                for row in &batch.pull_requests {
                    upsert_pull_request(transaction, row)?;
                }
                for row in &batch.reviews {
                    upsert_review(transaction, row)?;
                }
                for row in &batch.review_comments {
                    upsert_review_comment(transaction, row)?;
                }
                for row in &batch.pr_comments {
                    upsert_pr_comment(transaction, row)?;
                }
                for row in &batch.files {
                    upsert_file(transaction, row)?;
                }
                for row in &batch.check_runs {
                    upsert_check_run(transaction, row)?;
                }
                for row in &batch.timeline_events {
                    upsert_timeline_event(transaction, row)?;
                }
                for row in &batch.users {
                    upsert_user(transaction, row)?;
                }
                Ok(())
            })
            .map_err(|error| Self::map_write_error(&mut connection, &error))?;

        Ok(batch.counts())
    }

    /// Row counts across all eight tables.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be read.
    pub fn table_counts(&self) -> Result<RowCounts, StoreError> {
        let mut connection = establish_connection(&self.database_url)?;
        Ok(RowCounts {
            pull_requests: count_table(&mut connection, "pull_requests")?,
            reviews: count_table(&mut connection, "reviews")?,
            review_comments: count_table(&mut connection, "review_comments")?,
            pr_comments: count_table(&mut connection, "pr_comments")?,
            files: count_table(&mut connection, "files")?,
            check_runs: count_table(&mut connection, "check_runs")?,
            timeline_events: count_table(&mut connection, "timeline_events")?,
            users: count_table(&mut connection, "users")?,
        })
    }

    /// PR numbers whose stored `updated_at` falls at or after the cutoff.
    ///
    /// Used to build the `--refresh-days` re-fetch window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn pr_numbers_updated_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, StoreError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            pr_number: i64,
        }

        let mut connection = establish_connection(&self.database_url)?;
        let rows: Vec<Row> = sql_query(
            "SELECT pr_number FROM pull_requests WHERE updated_at >= ? ORDER BY pr_number;",
        )
        .bind::<Text, _>(format_timestamp(cutoff))
        .load(&mut connection)
        .map_err(|error| Self::map_query_error(&mut connection, &error))?;

        Ok(rows.into_iter().map(|row| row.pr_number).collect())
    }

    /// Reads all pull request rows ordered by number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn read_pull_requests(&self) -> Result<Vec<PullRequestRow>, StoreError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            pr_number: i64,
            #[diesel(sql_type = BigInt)]
            pr_id: i64,
            #[diesel(sql_type = Text)]
            title: String,
            #[diesel(sql_type = Text)]
            body: String,
            #[diesel(sql_type = Text)]
            author_login: String,
            #[diesel(sql_type = BigInt)]
            author_id: i64,
            #[diesel(sql_type = Bool)]
            author_is_bot: bool,
            #[diesel(sql_type = Text)]
            state: String,
            #[diesel(sql_type = Bool)]
            draft: bool,
            #[diesel(sql_type = Bool)]
            merged: bool,
            #[diesel(sql_type = Text)]
            base_ref: String,
            #[diesel(sql_type = Text)]
            head_ref: String,
            #[diesel(sql_type = Text)]
            created_at: String,
            #[diesel(sql_type = Text)]
            updated_at: String,
            #[diesel(sql_type = Nullable<Text>)]
            merged_at: Option<String>,
            #[diesel(sql_type = Nullable<Text>)]
            closed_at: Option<String>,
            #[diesel(sql_type = BigInt)]
            additions: i64,
            #[diesel(sql_type = BigInt)]
            deletions: i64,
            #[diesel(sql_type = BigInt)]
            changed_files: i64,
            #[diesel(sql_type = BigInt)]
            commits: i64,
            #[diesel(sql_type = Text)]
            merge_commit_sha: String,
        }

        let mut connection = establish_connection(&self.database_url)?;
        let rows: Vec<Row> = sql_query("SELECT * FROM pull_requests ORDER BY pr_number;")
            .load(&mut connection)
            .map_err(|error| Self::map_query_error(&mut connection, &error))?;

        Ok(rows
            .into_iter()
            .map(|row| PullRequestRow {
                pr_number: row.pr_number,
                pr_id: row.pr_id,
                title: row.title,
                body: row.body,
                author_login: row.author_login,
                author_id: row.author_id,
                author_is_bot: row.author_is_bot,
                state: row.state,
                draft: row.draft,
                merged: row.merged,
                base_ref: row.base_ref,
                head_ref: row.head_ref,
                created_at: parse_stored_timestamp(&row.created_at),
                updated_at: parse_stored_timestamp(&row.updated_at),
                merged_at: row.merged_at.as_deref().map(parse_stored_timestamp),
                closed_at: row.closed_at.as_deref().map(parse_stored_timestamp),
                additions: row.additions,
                deletions: row.deletions,
                changed_files: row.changed_files,
                commits: row.commits,
                merge_commit_sha: row.merge_commit_sha,
            })
            .collect())
    }

    /// Reads all review rows ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn read_reviews(&self) -> Result<Vec<ReviewRow>, StoreError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            review_id: i64,
            #[diesel(sql_type = BigInt)]
            pr_number: i64,
            #[diesel(sql_type = Text)]
            reviewer_login: String,
            #[diesel(sql_type = BigInt)]
            reviewer_id: i64,
            #[diesel(sql_type = Bool)]
            reviewer_is_bot: bool,
            #[diesel(sql_type = Text)]
            state: String,
            #[diesel(sql_type = Text)]
            body: String,
            #[diesel(sql_type = Text)]
            submitted_at: String,
            #[diesel(sql_type = Text)]
            commit_sha: String,
        }

        let mut connection = establish_connection(&self.database_url)?;
        let rows: Vec<Row> = sql_query("SELECT * FROM reviews ORDER BY review_id;")
            .load(&mut connection)
            .map_err(|error| Self::map_query_error(&mut connection, &error))?;

        Ok(rows
            .into_iter()
            .map(|row| ReviewRow {
                review_id: row.review_id,
                pr_number: row.pr_number,
                reviewer_login: row.reviewer_login,
                reviewer_id: row.reviewer_id,
                reviewer_is_bot: row.reviewer_is_bot,
                state: row.state,
                body: row.body,
                submitted_at: parse_stored_timestamp(&row.submitted_at),
                commit_sha: row.commit_sha,
            })
            .collect())
    }

    /// Reads all file rows ordered by (PR number, path).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn read_files(&self) -> Result<Vec<FileRow>, StoreError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            pr_number: i64,
            #[diesel(sql_type = Text)]
            path: String,
            #[diesel(sql_type = Text)]
            status: String,
            #[diesel(sql_type = BigInt)]
            additions: i64,
            #[diesel(sql_type = BigInt)]
            deletions: i64,
            #[diesel(sql_type = BigInt)]
            changes: i64,
            #[diesel(sql_type = Text)]
            module: String,
            #[diesel(sql_type = Bool)]
            generated: bool,
        }

        let mut connection = establish_connection(&self.database_url)?;
        let rows: Vec<Row> = sql_query("SELECT * FROM files ORDER BY pr_number, path;")
            .load(&mut connection)
            .map_err(|error| Self::map_query_error(&mut connection, &error))?;

        Ok(rows
            .into_iter()
            .map(|row| FileRow {
                pr_number: row.pr_number,
                path: row.path,
                status: row.status,
                additions: row.additions,
                deletions: row.deletions,
                changes: row.changes,
                module: row.module,
                generated: row.generated,
            })
            .collect())
    }

    /// Reads all user rows ordered by login.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn read_users(&self) -> Result<Vec<StoredUser>, StoreError> {
        let mut connection = establish_connection(&self.database_url)?;
        let rows: Vec<StoredUser> = sql_query("SELECT * FROM users ORDER BY login;")
            .load(&mut connection)
            .map_err(|error| Self::map_query_error(&mut connection, &error))?;
        Ok(rows)
    }

    fn cache_tables_exist(connection: &mut SqliteConnection) -> Result<bool, diesel::result::Error> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            count: i64,
        }

        let row: Row = sql_query(
            "SELECT COUNT(*) AS count FROM sqlite_master \
             WHERE type = 'table' AND name = 'pull_requests';",
        )
        .get_result(connection)?;

        Ok(row.count > 0)
    }

    fn map_error_with_schema_check<F>(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
        create_error: F,
    ) -> StoreError
    where
        F: Fn(String) -> StoreError,
    {
        match Self::cache_tables_exist(connection) {
            Ok(false) => StoreError::SchemaNotInitialised,
            Ok(true) => create_error(error.to_string()),
            Err(check_error) => create_error(format!(
                "schema presence check failed: {check_error}; original error: {error}"
            )),
        }
    }

    fn map_query_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> StoreError {
        Self::map_error_with_schema_check(connection, error, |message| StoreError::QueryFailed {
            message,
        })
    }

    fn map_write_error(
        connection: &mut SqliteConnection,
        error: &diesel::result::Error,
    ) -> StoreError {
        Self::map_error_with_schema_check(connection, error, |message| StoreError::WriteFailed {
            message,
        })
    }
}

/// A user row as stored, with the classification signal in string form.
#[derive(Debug, Clone, PartialEq, Eq, QueryableByName)]
pub struct StoredUser {
    /// Account login.
    #[diesel(sql_type = Text)]
    pub login: String,
    /// Upstream account id.
    #[diesel(sql_type = BigInt)]
    pub user_id: i64,
    /// Whether the account is a bot.
    #[diesel(sql_type = Bool)]
    pub is_bot: bool,
    /// Which rule decided the classification.
    #[diesel(sql_type = Text)]
    pub bot_signal: String,
    /// Friendly bot name for known bots.
    #[diesel(sql_type = Nullable<Text>)]
    pub bot_name: Option<String>,
}

fn count_table(connection: &mut SqliteConnection, table: &str) -> Result<u64, StoreError> {
    #[derive(Debug, QueryableByName)]
    struct Row {
        #[diesel(sql_type = BigInt)]
        count: i64,
    }

    // Table names come from the fixed list above, never from user input.
    let row: Row = sql_query(format!("SELECT COUNT(*) AS count FROM {table};"))
        .get_result(&mut *connection)
        .map_err(|error| TableStore::map_query_error(connection, &error))?;

    Ok(u64::try_from(row.count).unwrap_or(0))
}

fn upsert_pull_request(
    connection: &mut SqliteConnection,
    row: &PullRequestRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO pull_requests \
         (pr_number, pr_id, title, body, author_login, author_id, author_is_bot, state, draft, \
          merged, base_ref, head_ref, created_at, updated_at, merged_at, closed_at, additions, \
          deletions, changed_files, commits, merge_commit_sha) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(pr_number) DO UPDATE SET \
           pr_id = excluded.pr_id, \
           title = excluded.title, \
           body = excluded.body, \
           author_login = excluded.author_login, \
           author_id = excluded.author_id, \
           author_is_bot = excluded.author_is_bot, \
           state = excluded.state, \
           draft = excluded.draft, \
           merged = excluded.merged, \
           base_ref = excluded.base_ref, \
           head_ref = excluded.head_ref, \
           created_at = excluded.created_at, \
           updated_at = excluded.updated_at, \
           merged_at = excluded.merged_at, \
           closed_at = excluded.closed_at, \
           additions = excluded.additions, \
           deletions = excluded.deletions, \
           changed_files = excluded.changed_files, \
           commits = excluded.commits, \
           merge_commit_sha = excluded.merge_commit_sha;",
    )
    .bind::<BigInt, _>(row.pr_number)
    .bind::<BigInt, _>(row.pr_id)
    .bind::<Text, _>(&row.title)
    .bind::<Text, _>(&row.body)
    .bind::<Text, _>(&row.author_login)
    .bind::<BigInt, _>(row.author_id)
    .bind::<Bool, _>(row.author_is_bot)
    .bind::<Text, _>(&row.state)
    .bind::<Bool, _>(row.draft)
    .bind::<Bool, _>(row.merged)
    .bind::<Text, _>(&row.base_ref)
    .bind::<Text, _>(&row.head_ref)
    .bind::<Text, _>(format_timestamp(row.created_at))
    .bind::<Text, _>(format_timestamp(row.updated_at))
    .bind::<Nullable<Text>, _>(row.merged_at.map(format_timestamp))
    .bind::<Nullable<Text>, _>(row.closed_at.map(format_timestamp))
    .bind::<BigInt, _>(row.additions)
    .bind::<BigInt, _>(row.deletions)
    .bind::<BigInt, _>(row.changed_files)
    .bind::<BigInt, _>(row.commits)
    .bind::<Text, _>(&row.merge_commit_sha)
    .execute(connection)
    .map(drop)
}

fn upsert_review(
    connection: &mut SqliteConnection,
    row: &ReviewRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO reviews \
         (review_id, pr_number, reviewer_login, reviewer_id, reviewer_is_bot, state, body, \
          submitted_at, commit_sha) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(review_id) DO UPDATE SET \
           pr_number = excluded.pr_number, \
           reviewer_login = excluded.reviewer_login, \
           reviewer_id = excluded.reviewer_id, \
           reviewer_is_bot = excluded.reviewer_is_bot, \
           state = excluded.state, \
           body = excluded.body, \
           submitted_at = excluded.submitted_at, \
           commit_sha = excluded.commit_sha;",
    )
    .bind::<BigInt, _>(row.review_id)
    .bind::<BigInt, _>(row.pr_number)
    .bind::<Text, _>(&row.reviewer_login)
    .bind::<BigInt, _>(row.reviewer_id)
    .bind::<Bool, _>(row.reviewer_is_bot)
    .bind::<Text, _>(&row.state)
    .bind::<Text, _>(&row.body)
    .bind::<Text, _>(format_timestamp(row.submitted_at))
    .bind::<Text, _>(&row.commit_sha)
    .execute(connection)
    .map(drop)
}

fn upsert_review_comment(
    connection: &mut SqliteConnection,
    row: &ReviewCommentRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO review_comments \
         (comment_id, review_id, pr_number, author_login, author_is_bot, body, path, line, \
          created_at, updated_at, outdated) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(comment_id) DO UPDATE SET \
           review_id = excluded.review_id, \
           pr_number = excluded.pr_number, \
           author_login = excluded.author_login, \
           author_is_bot = excluded.author_is_bot, \
           body = excluded.body, \
           path = excluded.path, \
           line = excluded.line, \
           created_at = excluded.created_at, \
           updated_at = excluded.updated_at, \
           outdated = excluded.outdated;",
    )
    .bind::<BigInt, _>(row.comment_id)
    .bind::<Nullable<BigInt>, _>(row.review_id)
    .bind::<BigInt, _>(row.pr_number)
    .bind::<Text, _>(&row.author_login)
    .bind::<Bool, _>(row.author_is_bot)
    .bind::<Text, _>(&row.body)
    .bind::<Text, _>(&row.path)
    .bind::<Nullable<BigInt>, _>(row.line)
    .bind::<Text, _>(format_timestamp(row.created_at))
    .bind::<Text, _>(format_timestamp(row.updated_at))
    .bind::<Bool, _>(row.outdated)
    .execute(connection)
    .map(drop)
}

fn upsert_pr_comment(
    connection: &mut SqliteConnection,
    row: &PrCommentRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO pr_comments \
         (comment_id, pr_number, author_login, author_is_bot, body, created_at, updated_at, \
          reactions_total) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(comment_id) DO UPDATE SET \
           pr_number = excluded.pr_number, \
           author_login = excluded.author_login, \
           author_is_bot = excluded.author_is_bot, \
           body = excluded.body, \
           created_at = excluded.created_at, \
           updated_at = excluded.updated_at, \
           reactions_total = excluded.reactions_total;",
    )
    .bind::<BigInt, _>(row.comment_id)
    .bind::<BigInt, _>(row.pr_number)
    .bind::<Text, _>(&row.author_login)
    .bind::<Bool, _>(row.author_is_bot)
    .bind::<Text, _>(&row.body)
    .bind::<Text, _>(format_timestamp(row.created_at))
    .bind::<Text, _>(format_timestamp(row.updated_at))
    .bind::<BigInt, _>(row.reactions_total)
    .execute(connection)
    .map(drop)
}

fn upsert_file(
    connection: &mut SqliteConnection,
    row: &FileRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO files \
         (pr_number, path, status, additions, deletions, changes, module, generated) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(pr_number, path) DO UPDATE SET \
           status = excluded.status, \
           additions = excluded.additions, \
           deletions = excluded.deletions, \
           changes = excluded.changes, \
           module = excluded.module, \
           generated = excluded.generated;",
    )
    .bind::<BigInt, _>(row.pr_number)
    .bind::<Text, _>(&row.path)
    .bind::<Text, _>(&row.status)
    .bind::<BigInt, _>(row.additions)
    .bind::<BigInt, _>(row.deletions)
    .bind::<BigInt, _>(row.changes)
    .bind::<Text, _>(&row.module)
    .bind::<Bool, _>(row.generated)
    .execute(connection)
    .map(drop)
}

fn upsert_check_run(
    connection: &mut SqliteConnection,
    row: &CheckRunRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO check_runs \
         (check_id, pr_number, name, status, conclusion, started_at, completed_at, \
          duration_seconds) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(check_id) DO UPDATE SET \
           pr_number = excluded.pr_number, \
           name = excluded.name, \
           status = excluded.status, \
           conclusion = excluded.conclusion, \
           started_at = excluded.started_at, \
           completed_at = excluded.completed_at, \
           duration_seconds = excluded.duration_seconds;",
    )
    .bind::<BigInt, _>(row.check_id)
    .bind::<BigInt, _>(row.pr_number)
    .bind::<Text, _>(&row.name)
    .bind::<Text, _>(&row.status)
    .bind::<Nullable<Text>, _>(row.conclusion.as_deref())
    .bind::<Nullable<Text>, _>(row.started_at.map(format_timestamp))
    .bind::<Nullable<Text>, _>(row.completed_at.map(format_timestamp))
    .bind::<Nullable<BigInt>, _>(row.duration_seconds)
    .execute(connection)
    .map(drop)
}

fn upsert_timeline_event(
    connection: &mut SqliteConnection,
    row: &TimelineEventRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO timeline_events \
         (pr_number, event_type, actor_login, occurred_at, event_id) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(pr_number, event_type, actor_login, occurred_at) DO UPDATE SET \
           event_id = excluded.event_id;",
    )
    .bind::<BigInt, _>(row.pr_number)
    .bind::<Text, _>(row.kind.as_str())
    .bind::<Text, _>(&row.actor_login)
    .bind::<Text, _>(format_timestamp(row.occurred_at))
    .bind::<Nullable<BigInt>, _>(row.event_id)
    .execute(connection)
    .map(drop)
}

fn upsert_user(
    connection: &mut SqliteConnection,
    row: &UserRow,
) -> Result<(), diesel::result::Error> {
    sql_query(
        "INSERT INTO users (login, user_id, is_bot, bot_signal, bot_name) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(login) DO UPDATE SET \
           user_id = excluded.user_id, \
           is_bot = excluded.is_bot, \
           bot_signal = excluded.bot_signal, \
           bot_name = excluded.bot_name;",
    )
    .bind::<Text, _>(&row.login)
    .bind::<BigInt, _>(row.user_id)
    .bind::<Bool, _>(row.is_bot)
    .bind::<Text, _>(row.signal.as_str())
    .bind::<Nullable<Text>, _>(row.bot_name.as_deref())
    .execute(connection)
    .map(drop)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::TableStore;
    use crate::classify::{BotClassifier, BotConfig, ModuleClassifier, ModuleConfig};
    use crate::extract::normalize::Normalizer;
    use crate::github::models::test_support::sample_bundle;
    use crate::persistence::migrate_database;
    use crate::telemetry::NoopTelemetrySink;

    fn migrated_store() -> (TableStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir
            .path()
            .join("extraction.sqlite")
            .to_string_lossy()
            .into_owned();
        migrate_database(&path, &NoopTelemetrySink).expect("migrations should run");
        (TableStore::new(path).expect("store should be created"), dir)
    }

    fn sample_batch() -> crate::extract::rows::TableBatch {
        let normalizer = Normalizer::new(
            ModuleClassifier::new(&ModuleConfig::default()),
            BotClassifier::new(&BotConfig::default()),
        );
        normalizer.normalize(&sample_bundle())
    }

    #[test]
    fn commit_batch_persists_rows_for_all_tables() {
        let (store, _dir) = migrated_store();
        let batch = sample_batch();

        let written = store.commit_batch(&batch).expect("commit should succeed");
        assert_eq!(written.pull_requests, 1);

        let counts = store.table_counts().expect("counts should be readable");
        assert_eq!(counts.pull_requests, 1);
        assert_eq!(counts.reviews, 1);
        assert_eq!(counts.review_comments, 1);
        assert_eq!(counts.pr_comments, 1);
        assert_eq!(counts.files, 2);
        assert_eq!(counts.check_runs, 1);
        assert_eq!(counts.timeline_events, 2);
        assert!(counts.users >= 2);
    }

    #[test]
    fn merge_upsert_is_idempotent() {
        let (store, _dir) = migrated_store();
        let batch = sample_batch();

        store.commit_batch(&batch).expect("first commit should succeed");
        let after_first = store.table_counts().expect("counts should be readable");
        let rows_first = store.read_pull_requests().expect("read should succeed");

        store.commit_batch(&batch).expect("second commit should succeed");
        let after_second = store.table_counts().expect("counts should be readable");
        let rows_second = store.read_pull_requests().expect("read should succeed");

        assert_eq!(after_first, after_second);
        assert_eq!(rows_first, rows_second);
    }

    #[test]
    fn upsert_replaces_mutable_fields_for_an_existing_key() {
        let (store, _dir) = migrated_store();
        let mut batch = sample_batch();
        store.commit_batch(&batch).expect("first commit should succeed");

        if let Some(pr) = batch.pull_requests.first_mut() {
            pr.state = "closed".to_owned();
            pr.title = "Retitled".to_owned();
        }
        store.commit_batch(&batch).expect("second commit should succeed");

        let rows = store.read_pull_requests().expect("read should succeed");
        assert_eq!(rows.len(), 1);
        let pr = rows.first().expect("row should exist");
        assert_eq!(pr.title, "Retitled");
    }

    #[test]
    fn timestamps_round_trip_through_storage() {
        let (store, _dir) = migrated_store();
        let batch = sample_batch();
        store.commit_batch(&batch).expect("commit should succeed");

        let stored = store.read_pull_requests().expect("read should succeed");
        let original = batch.pull_requests.first().expect("batch row");
        let persisted = stored.first().expect("stored row");
        assert_eq!(persisted.created_at, original.created_at);
        assert_eq!(persisted.merged_at, original.merged_at);
    }

    #[test]
    fn refresh_window_query_returns_recent_prs_only() {
        let (store, _dir) = migrated_store();
        let batch = sample_batch();
        store.commit_batch(&batch).expect("commit should succeed");

        let pr_updated = batch
            .pull_requests
            .first()
            .expect("batch row")
            .updated_at;

        let recent = store
            .pr_numbers_updated_since(pr_updated - Duration::days(1))
            .expect("query should succeed");
        assert_eq!(recent, vec![1]);

        let future = store
            .pr_numbers_updated_since(Utc::now() + Duration::days(365))
            .expect("query should succeed");
        assert!(future.is_empty());
    }

    #[test]
    fn commit_without_schema_reports_uninitialised() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir
            .path()
            .join("empty.sqlite")
            .to_string_lossy()
            .into_owned();
        let store = TableStore::new(path).expect("store should be created");

        let error = store
            .commit_batch(&sample_batch())
            .expect_err("commit should fail without schema");
        assert_eq!(error, crate::persistence::StoreError::SchemaNotInitialised);
    }

    #[test]
    fn users_store_the_classification_signal() {
        let (store, _dir) = migrated_store();
        store.commit_batch(&sample_batch()).expect("commit should succeed");

        let users = store.read_users().expect("read should succeed");
        let bot = users
            .iter()
            .find(|user| user.login == "renovate[bot]")
            .expect("bot user should be stored");
        assert!(bot.is_bot);
        assert_eq!(bot.bot_signal, "pattern");
        assert_eq!(bot.bot_name.as_deref(), Some("renovate"));
    }
}
