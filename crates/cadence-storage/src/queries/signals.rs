// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream outcome signals (bounces, unsubscribes, engagement).

use cadence_core::{CadenceError, OutcomeSignal, SignalSummary};
use rusqlite::params;

use crate::database::{Database, fmt_ts, map_tr_err, parse_ts};

/// Record one signal for a published item.
pub async fn record_signal(db: &Database, signal: &OutcomeSignal) -> Result<(), CadenceError> {
    let signal = signal.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO outcome_signals (item_id, channel_id, kind, reported_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    signal.item_id,
                    signal.channel_id,
                    signal.kind.to_string(),
                    fmt_ts(&signal.reported_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Signal counts per item for the channel's `window` most recently published items.
pub async fn recent_signal_summaries(
    db: &Database,
    channel_id: &str,
    window: usize,
) -> Result<Vec<SignalSummary>, CadenceError> {
    let channel_id = channel_id.to_string();
    let window = window as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT i.id, i.updated_at,
                        COALESCE(SUM(CASE WHEN s.kind = 'negative' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN s.kind = 'positive' THEN 1 ELSE 0 END), 0)
                 FROM (SELECT id, updated_at FROM scheduled_items
                       WHERE channel_id = ?1 AND status = 'published'
                       ORDER BY updated_at DESC, id DESC
                       LIMIT ?2) i
                 LEFT JOIN outcome_signals s ON s.item_id = i.id
                 GROUP BY i.id, i.updated_at
                 ORDER BY i.updated_at DESC, i.id DESC",
            )?;
            let rows = stmt.query_map(params![channel_id, window], |row| {
                Ok(SignalSummary {
                    item_id: row.get(0)?,
                    published_at: parse_ts(1, &row.get::<_, String>(1)?)?,
                    negative: row.get(2)?,
                    positive: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
