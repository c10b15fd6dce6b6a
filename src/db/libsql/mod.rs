//! Embedded libSQL backend.
//!
//! Runs against a local file, or against a local replica that syncs with a
//! remote libSQL server when a URL and auth token are configured.

mod connections;
mod credentials;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::{Connection, Value};

use crate::db::Database;
use crate::db::libsql_migrations;
use crate::error::DatabaseError;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub struct LibSqlBackend {
    db: Arc<libsql::Database>,
}

impl LibSqlBackend {
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        ensure_parent_dir(path)?;
        let built = libsql::Builder::new_local(path).build().await;
        Self::from_built(built, path)
    }

    /// Local file kept in sync with a remote libSQL primary.
    pub async fn new_remote_replica(
        path: &Path,
        url: &str,
        auth_token: &str,
    ) -> Result<Self, DatabaseError> {
        ensure_parent_dir(path)?;
        let built = libsql::Builder::new_remote_replica(path, url.to_string(), auth_token.to_string())
            .build()
            .await;
        Self::from_built(built, path)
    }

    fn from_built(
        built: Result<libsql::Database, libsql::Error>,
        path: &Path,
    ) -> Result<Self, DatabaseError> {
        let db = built.map_err(|e| {
            DatabaseError::Pool(format!("cannot open libSQL database {}: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "libSQL database opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Open a connection with the busy timeout applied.
    pub async fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("cannot connect to libSQL: {e}")))?;
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("cannot set busy_timeout: {e}")))?;
        Ok(conn)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), DatabaseError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| DatabaseError::Pool(format!("cannot create {}: {e}", parent.display()))),
        _ => Ok(()),
    }
}

/// Timestamps are stored as RFC 3339 text with millisecond precision.
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts what [`fmt_ts`] writes, and the `YYYY-MM-DD HH:MM:SS[.fff]` form
/// SQLite's own date functions produce.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Bind an optional string as TEXT or NULL.
pub(crate) fn nullable(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_owned()))
}

pub(crate) fn text(row: &libsql::Row, idx: i32) -> Result<String, DatabaseError> {
    nullable_text(row, idx)?.ok_or_else(|| {
        DatabaseError::Serialization(format!("column {idx} is unexpectedly NULL"))
    })
}

pub(crate) fn nullable_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(DatabaseError::Serialization(format!(
            "column {idx} holds {other:?}, expected text"
        ))),
    }
}

pub(crate) fn timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>, DatabaseError> {
    let raw = text(row, idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("column {idx} is not a timestamp: {raw:?}"))
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        // journal_mode is a property of the file, so setting it once suffices.
        conn.query("PRAGMA journal_mode=WAL", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("cannot enable WAL: {e}")))?;
        conn.execute_batch(libsql_migrations::SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(format!("libSQL schema: {e}")))?;
        Ok(())
    }
}
