// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel trust/pause state and the channel audit log.

use std::collections::VecDeque;

use cadence_core::{
    CadenceError, CampaignKind, ChannelAuditEntry, ChannelState, TrustState,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, fmt_ts, map_tr_err, parse_enum, parse_opt_ts, parse_ts};

const CHANNEL_COLUMNS: &str = "channel_id, campaign, tier, consecutive_clean_approvals, \
     total_approvals, total_edits, review_window, auto_cleared_edits, last_demotion_reason, \
     status, pause_reason, disconnected_at, last_probe_at, outage_target, resumed_at, version, \
     updated_at";

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<ChannelState> {
    let window_json: String = row.get(6)?;
    let review_window: VecDeque<bool> = serde_json::from_str(&window_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let outage_target: Option<String> = row.get(13)?;

    Ok(ChannelState {
        trust: TrustState {
            channel_id: row.get(0)?,
            campaign: parse_enum(1, &row.get::<_, String>(1)?)?,
            tier: parse_enum(2, &row.get::<_, String>(2)?)?,
            consecutive_clean_approvals: row.get(3)?,
            total_approvals: row.get(4)?,
            total_edits: row.get(5)?,
            review_window,
            auto_cleared_edits: row.get(7)?,
            last_demotion_reason: row.get(8)?,
        },
        status: parse_enum(9, &row.get::<_, String>(9)?)?,
        pause_reason: row.get(10)?,
        disconnected_at: parse_opt_ts(11, row.get(11)?)?,
        last_probe_at: parse_opt_ts(12, row.get(12)?)?,
        outage_target: outage_target.map(|t| parse_enum(13, &t)).transpose()?,
        resumed_at: parse_opt_ts(14, row.get(14)?)?,
        version: row.get(15)?,
        updated_at: parse_ts(16, &row.get::<_, String>(16)?)?,
    })
}

fn select_channel(
    conn: &rusqlite::Connection,
    channel_id: &str,
) -> rusqlite::Result<Option<ChannelState>> {
    conn.query_row(
        &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = ?1"),
        params![channel_id],
        row_to_channel,
    )
    .optional()
}

/// Get a channel by ID. Returns `None` if not registered.
pub async fn get_channel(
    db: &Database,
    channel_id: &str,
) -> Result<Option<ChannelState>, CadenceError> {
    let channel_id = channel_id.to_string();
    db.connection()
        .call(move |conn| select_channel(conn, &channel_id))
        .await
        .map_err(map_tr_err)
}

/// Insert the channel if absent, then return the stored row.
pub async fn ensure_channel(
    db: &Database,
    channel_id: &str,
    campaign: CampaignKind,
    now: DateTime<Utc>,
) -> Result<ChannelState, CadenceError> {
    let channel_id = channel_id.to_string();
    let campaign = campaign.to_string();
    let now = fmt_ts(&now);
    let result = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO channels (channel_id, campaign, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![channel_id, campaign, now],
            )?;
            select_channel(conn, &channel_id)
        })
        .await
        .map_err(map_tr_err)?;
    result.ok_or_else(|| CadenceError::Internal("channel row vanished after insert".into()))
}

/// Optimistic write: succeeds only if the stored version is `expected_version`.
pub async fn save_channel(
    db: &Database,
    state: &ChannelState,
    expected_version: i64,
) -> Result<bool, CadenceError> {
    let state = state.clone();
    let window_json = serde_json::to_string(&state.trust.review_window)
        .map_err(|e| CadenceError::Internal(format!("review window encoding: {e}")))?;
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE channels
                 SET tier = ?1, consecutive_clean_approvals = ?2, total_approvals = ?3,
                     total_edits = ?4, review_window = ?5, auto_cleared_edits = ?6,
                     last_demotion_reason = ?7, status = ?8, pause_reason = ?9,
                     disconnected_at = ?10, last_probe_at = ?11, outage_target = ?12,
                     resumed_at = ?13, updated_at = ?14, version = version + 1
                 WHERE channel_id = ?15 AND version = ?16",
                params![
                    state.trust.tier.to_string(),
                    state.trust.consecutive_clean_approvals,
                    state.trust.total_approvals,
                    state.trust.total_edits,
                    window_json,
                    state.trust.auto_cleared_edits,
                    state.trust.last_demotion_reason,
                    state.status.to_string(),
                    state.pause_reason,
                    state.disconnected_at.as_ref().map(fmt_ts),
                    state.last_probe_at.as_ref().map(fmt_ts),
                    state.outage_target.map(|t| t.to_string()),
                    state.resumed_at.as_ref().map(fmt_ts),
                    fmt_ts(&state.updated_at),
                    state.trust.channel_id,
                    expected_version,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// All channels ordered by ID.
pub async fn list_channels(db: &Database) -> Result<Vec<ChannelState>, CadenceError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY channel_id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_channel)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Append an audit entry. Returns the auto-generated sequence number.
pub async fn append_channel_audit(
    db: &Database,
    entry: &ChannelAuditEntry,
) -> Result<i64, CadenceError> {
    let channel_id = entry.channel_id.clone();
    let action = entry.action.to_string();
    let detail = entry.detail.to_string();
    let actor = entry.actor.clone();
    let created_at = fmt_ts(&entry.created_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO channel_audit (channel_id, action, detail, actor, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel_id, action, detail, actor, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Audit entries for a channel, newest first.
pub async fn channel_audit(
    db: &Database,
    channel_id: &str,
    limit: usize,
) -> Result<Vec<ChannelAuditEntry>, CadenceError> {
    let channel_id = channel_id.to_string();
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, action, detail, actor, created_at FROM channel_audit
                 WHERE channel_id = ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![channel_id, limit], |row| {
                let detail: String = row.get(3)?;
                Ok(ChannelAuditEntry {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    action: parse_enum(2, &row.get::<_, String>(2)?)?,
                    detail: serde_json::from_str(&detail).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?,
                    actor: row.get(4)?,
                    created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
