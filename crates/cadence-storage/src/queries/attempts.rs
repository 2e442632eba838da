// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only publish attempt log.

use cadence_core::{CadenceError, PublishAttempt};
use rusqlite::{Row, params};

use crate::database::{Database, fmt_ts, map_tr_err, parse_enum, parse_ts};

const ATTEMPT_COLUMNS: &str = "id, item_id, channel_id, attempt_number, started_at, finished_at, \
     outcome, error_detail, external_id";

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<PublishAttempt> {
    Ok(PublishAttempt {
        id: row.get(0)?,
        item_id: row.get(1)?,
        channel_id: row.get(2)?,
        attempt_number: row.get(3)?,
        started_at: parse_ts(4, &row.get::<_, String>(4)?)?,
        finished_at: parse_ts(5, &row.get::<_, String>(5)?)?,
        outcome: parse_enum(6, &row.get::<_, String>(6)?)?,
        error_detail: row.get(7)?,
        external_id: row.get(8)?,
    })
}

/// Append an attempt. Returns the auto-generated sequence number.
pub async fn append_attempt(db: &Database, attempt: &PublishAttempt) -> Result<i64, CadenceError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO publish_attempts (item_id, channel_id, attempt_number, started_at,
                     finished_at, outcome, error_detail, external_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    attempt.item_id,
                    attempt.channel_id,
                    attempt.attempt_number,
                    fmt_ts(&attempt.started_at),
                    fmt_ts(&attempt.finished_at),
                    attempt.outcome.to_string(),
                    attempt.error_detail,
                    attempt.external_id,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// All attempts for an item, oldest first.
pub async fn attempts_for(db: &Database, item_id: &str) -> Result<Vec<PublishAttempt>, CadenceError> {
    let item_id = item_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM publish_attempts WHERE item_id = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![item_id], row_to_attempt)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent item-level attempts on a channel, newest first.
pub async fn recent_attempts(
    db: &Database,
    channel_id: &str,
    limit: usize,
) -> Result<Vec<PublishAttempt>, CadenceError> {
    let channel_id = channel_id.to_string();
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ATTEMPT_COLUMNS} FROM publish_attempts
                 WHERE channel_id = ?1 AND outcome != 'channel_unavailable'
                 ORDER BY id DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![channel_id, limit], row_to_attempt)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
