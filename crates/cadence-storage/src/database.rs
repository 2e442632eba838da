// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! Within one process all statements are serialized through tokio-rusqlite's
//! single background thread. Several processes may open the same file; WAL
//! mode plus a busy timeout lets their writers queue instead of failing.

use std::path::Path;
use std::str::FromStr;

use cadence_config::model::StorageConfig;
use cadence_core::CadenceError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use tracing::debug;

use crate::migrations;

/// Timestamp layout used for every TEXT time column. Fixed width, so
/// lexicographic order equals chronological order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Handle to an open, migrated SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at the configured path, apply
    /// connection PRAGMAs and run pending migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, CadenceError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CadenceError::storage)?;
        }

        // Migrations need a plain connection; refinery drives it synchronously.
        {
            let mut conn = rusqlite::Connection::open(&path).map_err(CadenceError::storage)?;
            apply_pragmas(&conn, config).map_err(CadenceError::storage)?;
            migrations::run_migrations(&mut conn)?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(CadenceError::storage)?;
        let pragma_config = config.clone();
        conn.call(move |conn| apply_pragmas(conn, &pragma_config))
            .await
            .map_err(map_tr_err)?;

        debug!(path = %path, wal = config.wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The async connection all queries go through.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }
}

fn apply_pragmas(conn: &rusqlite::Connection, config: &StorageConfig) -> rusqlite::Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if config.wal_mode {
        // journal_mode returns the resulting mode as a row.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    }
    Ok(())
}

/// Convert a tokio-rusqlite error into the storage variant.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CadenceError {
    CadenceError::Storage {
        source: Box::new(e),
    }
}

/// Format a timestamp for storage.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a stored timestamp, reporting the column on failure.
pub fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse an optional stored timestamp.
pub fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, &v)).transpose()
}

/// Parse a strum-encoded enum column.
pub fn parse_enum<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn timestamps_are_fixed_width_and_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        let s = fmt_ts(&ts);
        assert_eq!(s, "2026-03-01T09:05:00.000Z");
        assert_eq!(parse_ts(0, &s).unwrap(), ts);
    }

    #[test]
    fn bad_enum_value_is_a_conversion_error() {
        let err = parse_enum::<cadence_core::ItemStatus>(3, "sent").unwrap_err();
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, _)
        ));
    }

    #[tokio::test]
    async fn open_creates_parent_dirs_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cadence.db");
        let config = StorageConfig {
            database_path: path.to_string_lossy().into_owned(),
            wal_mode: true,
            busy_timeout_ms: 1000,
        };
        let db = Database::open(&config).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<Result<Vec<String>, _>>()
            })
            .await
            .unwrap();
        for table in [
            "channel_audit",
            "channels",
            "outcome_signals",
            "publish_attempts",
            "scheduled_items",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
    }

    #[tokio::test]
    async fn reopening_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("re.db").to_string_lossy().into_owned(),
            wal_mode: true,
            busy_timeout_ms: 1000,
        };
        drop(Database::open(&config).await.unwrap());
        assert!(Database::open(&config).await.is_ok());
    }
}
