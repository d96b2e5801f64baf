//! Local persistence: the table store, checkpoint store, and migrations.
//!
//! Extraction output lives in a per-repository `SQLite` database so the
//! analysis layer can read it with any SQL engine. The schema is managed
//! with Diesel migrations so the database can be created and upgraded
//! consistently across machines. All batch writes are transactional
//! merge-upserts; the checkpoint advances only after a batch commit has
//! returned.

mod checkpoint;
mod error;
mod migrator;
mod tables;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::StoreError;
pub use migrator::{INITIAL_SCHEMA_VERSION, MIGRATIONS, SchemaVersion, migrate_database};
pub use tables::{StoredUser, TableStore};

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::Connection;
use diesel::RunQueryDsl;
use diesel::sql_query;
use diesel::sqlite::SqliteConnection;

/// Opens a connection with foreign key enforcement enabled.
pub(crate) fn establish_connection(database_url: &str) -> Result<SqliteConnection, StoreError> {
    let mut connection =
        SqliteConnection::establish(database_url).map_err(|error| StoreError::ConnectionFailed {
            message: error.to_string(),
        })?;

    sql_query("PRAGMA foreign_keys = ON;")
        .execute(&mut connection)
        .map(drop)
        .map_err(|error| StoreError::ForeignKeysEnableFailed {
            message: error.to_string(),
        })?;

    Ok(connection)
}

/// Canonical stored form for timestamps: RFC 3339 in UTC with a `Z` suffix.
///
/// Fixed-width and zone-normalized, so lexicographic comparison in SQL
/// matches chronological order.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a stored timestamp, falling back to the Unix epoch for values a
/// foreign writer may have corrupted.
pub(crate) fn parse_stored_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(|error| {
            tracing::warn!(timestamp = value, "malformed stored timestamp: {error}");
            DateTime::UNIX_EPOCH
        })
}
