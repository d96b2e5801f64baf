//! Checkpoint store: the extraction high-water mark.
//!
//! The checkpoint records the highest pull request number and update time
//! whose rows are durably committed. It lives in the same `SQLite` database
//! as the tables but is written in its own transaction *after* a batch
//! commit succeeds, so a crash between the two leaves the checkpoint behind
//! the tables — the safe side, since merge-upsert makes re-fetching the
//! in-flight batch idempotent.

use chrono::{DateTime, Utc};
use diesel::OptionalExtension;
use diesel::QueryableByName;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};

use super::{StoreError, establish_connection, format_timestamp, parse_stored_timestamp};

/// The persisted high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Highest fully-committed pull request number.
    pub last_pr_number: i64,
    /// Update time of the most recently committed pull request.
    pub last_pr_updated_at: DateTime<Utc>,
}

/// SQLite-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    database_url: String,
}

impl CheckpointStore {
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

    /// Loads the stored checkpoint, if any run has committed one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be read.
    pub fn load(&self) -> Result<Option<Checkpoint>, StoreError> {
        #[derive(Debug, QueryableByName)]
        struct Row {
            #[diesel(sql_type = BigInt)]
            last_pr_number: i64,
            #[diesel(sql_type = Text)]
            last_pr_updated_at: String,
        }

        let mut connection = establish_connection(&self.database_url)?;
        let result: Option<Row> = sql_query(
            "SELECT last_pr_number, last_pr_updated_at \
             FROM extraction_checkpoint WHERE id = 1 LIMIT 1;",
        )
        .get_result(&mut connection)
        .optional()
        .map_err(|error| StoreError::QueryFailed {
            message: error.to_string(),
        })?;

        Ok(result.map(|row| Checkpoint {
            last_pr_number: row.last_pr_number,
            last_pr_updated_at: parse_stored_timestamp(&row.last_pr_updated_at),
        }))
    }

    /// Advances the checkpoint to the given mark.
    ///
    /// The advance is monotonic: a mark lower than the stored one is kept at
    /// the stored value, so a refresh pass over old pull requests can never
    /// rewind the high-water mark.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    pub fn advance(
        &self,
        pr_number: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut connection = establish_connection(&self.database_url)?;

        sql_query(
            "INSERT INTO extraction_checkpoint (id, last_pr_number, last_pr_updated_at, advanced_at) \
             VALUES (1, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
               last_pr_number = MAX(last_pr_number, excluded.last_pr_number), \
               last_pr_updated_at = MAX(last_pr_updated_at, excluded.last_pr_updated_at), \
               advanced_at = excluded.advanced_at;",
        )
        .bind::<BigInt, _>(pr_number)
        .bind::<Text, _>(format_timestamp(updated_at))
        .bind::<Text, _>(format_timestamp(Utc::now()))
        .execute(&mut connection)
        .map(drop)
        .map_err(|error| StoreError::WriteFailed {
            message: error.to_string(),
        })
    }

    /// Removes the stored checkpoint so the next run starts from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut connection = establish_connection(&self.database_url)?;
        sql_query("DELETE FROM extraction_checkpoint WHERE id = 1;")
            .execute(&mut connection)
            .map(drop)
            .map_err(|error| StoreError::WriteFailed {
                message: error.to_string(),
            })
    }
}
