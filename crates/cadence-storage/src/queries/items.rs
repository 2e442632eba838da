// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled item operations, including the atomic claim.

use cadence_core::{CadenceError, ClaimLease, ItemFilter, ItemStatus, ScheduledItem};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use crate::database::{Database, fmt_ts, map_tr_err, parse_enum, parse_opt_ts, parse_ts};

const ITEM_COLUMNS: &str = "id, payload_ref, channel_id, target, campaign, quality, scheduled_at, \
     status, attempt_count, max_retries, last_error, external_id, auto_cleared, claimed_by, \
     claimed_at, created_at, updated_at";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<ScheduledItem> {
    Ok(ScheduledItem {
        id: row.get(0)?,
        payload_ref: row.get(1)?,
        channel_id: row.get(2)?,
        target: parse_enum(3, &row.get::<_, String>(3)?)?,
        campaign: parse_enum(4, &row.get::<_, String>(4)?)?,
        quality: parse_enum(5, &row.get::<_, String>(5)?)?,
        scheduled_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        status: parse_enum(7, &row.get::<_, String>(7)?)?,
        attempt_count: row.get(8)?,
        max_retries: row.get(9)?,
        last_error: row.get(10)?,
        external_id: row.get(11)?,
        auto_cleared: row.get(12)?,
        claimed_by: row.get(13)?,
        claimed_at: parse_opt_ts(14, row.get(14)?)?,
        created_at: parse_ts(15, &row.get::<_, String>(15)?)?,
        updated_at: parse_ts(16, &row.get::<_, String>(16)?)?,
    })
}

fn select_item(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<ScheduledItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM scheduled_items WHERE id = ?1"),
        params![id],
        row_to_item,
    )
    .optional()
}

/// Insert a new item. The channel row must already exist.
pub async fn insert_item(db: &Database, item: &ScheduledItem) -> Result<(), CadenceError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO scheduled_items ({ITEM_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    item.id,
                    item.payload_ref,
                    item.channel_id,
                    item.target.to_string(),
                    item.campaign.to_string(),
                    item.quality.to_string(),
                    fmt_ts(&item.scheduled_at),
                    item.status.to_string(),
                    item.attempt_count,
                    item.max_retries,
                    item.last_error,
                    item.external_id,
                    item.auto_cleared,
                    item.claimed_by,
                    item.claimed_at.as_ref().map(fmt_ts),
                    fmt_ts(&item.created_at),
                    fmt_ts(&item.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get an item by ID. Returns `None` if not found.
pub async fn get_item(db: &Database, id: &str) -> Result<Option<ScheduledItem>, CadenceError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_item(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// List items, optionally filtered by channel and status.
pub async fn list_items(
    db: &Database,
    filter: &ItemFilter,
) -> Result<Vec<ScheduledItem>, CadenceError> {
    let channel_id = filter.channel_id.clone();
    let status = filter.status.map(|s| s.to_string());
    let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM scheduled_items
                 WHERE (?1 IS NULL OR channel_id = ?1) AND (?2 IS NULL OR status = ?2)
                 ORDER BY scheduled_at ASC, id ASC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![channel_id, status, limit], row_to_item)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` due items on active channels for `instance_id`.
///
/// Runs inside an IMMEDIATE transaction so the write lock is taken before
/// the candidate read; each row is still moved with a conditional UPDATE
/// and only rows this call actually changed are returned.
pub async fn claim_due(
    db: &Database,
    now: DateTime<Utc>,
    instance_id: &str,
    limit: usize,
) -> Result<Vec<ScheduledItem>, CadenceError> {
    let now = fmt_ts(&now);
    let instance_id = instance_id.to_string();
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let candidates: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT i.id FROM scheduled_items i
                     JOIN channels c ON c.channel_id = i.channel_id
                     WHERE i.status = 'scheduled' AND i.scheduled_at <= ?1
                       AND c.status = 'active'
                     ORDER BY i.scheduled_at ASC, i.id ASC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![now, limit], |row| row.get(0))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };

            let mut claimed = Vec::with_capacity(candidates.len());
            for id in candidates {
                let changed = tx.execute(
                    "UPDATE scheduled_items
                     SET status = 'claimed', claimed_by = ?1, claimed_at = ?2, updated_at = ?2
                     WHERE id = ?3 AND status = 'scheduled'",
                    params![instance_id, now, id],
                )?;
                if changed == 1
                    && let Some(item) = select_item(&tx, &id)?
                {
                    claimed.push(item);
                }
            }

            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Write every mutable column of `item` if its stored status is still `expected`.
///
/// With a `lease`, the stored `claimed_by`/`claimed_at` must match it too.
pub async fn compare_and_set(
    db: &Database,
    item: &ScheduledItem,
    expected: ItemStatus,
    lease: Option<&ClaimLease>,
) -> Result<bool, CadenceError> {
    let item = item.clone();
    let expected = expected.to_string();
    let owner = lease.map(|l| l.owner.clone());
    let leased_at = lease.map(|l| fmt_ts(&l.claimed_at));
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE scheduled_items
                 SET status = ?1, scheduled_at = ?2, attempt_count = ?3, last_error = ?4,
                     external_id = ?5, auto_cleared = ?6, claimed_by = ?7, claimed_at = ?8,
                     updated_at = ?9
                 WHERE id = ?10 AND status = ?11
                   AND (?12 IS NULL OR (claimed_by = ?12 AND claimed_at = ?13))",
                params![
                    item.status.to_string(),
                    fmt_ts(&item.scheduled_at),
                    item.attempt_count,
                    item.last_error,
                    item.external_id,
                    item.auto_cleared,
                    item.claimed_by,
                    item.claimed_at.as_ref().map(fmt_ts),
                    fmt_ts(&item.updated_at),
                    item.id,
                    expected,
                    owner,
                    leased_at,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Items in `status` whose claim timestamp is older than `cutoff`.
pub async fn stale_items(
    db: &Database,
    status: ItemStatus,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ScheduledItem>, CadenceError> {
    let status = status.to_string();
    let cutoff = fmt_ts(&cutoff);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM scheduled_items
                 WHERE status = ?1 AND claimed_at IS NOT NULL AND claimed_at < ?2
                 ORDER BY claimed_at ASC"
            ))?;
            let rows = stmt.query_map(params![status, cutoff], row_to_item)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
