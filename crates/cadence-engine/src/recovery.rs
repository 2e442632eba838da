// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery of items whose claim outlived its lease (crashed instance).

use cadence_core::{AttemptOutcome, CadenceError, ItemStatus, ScheduledItem};
use tracing::{info, warn};

use crate::context::EngineContext;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub released: usize,
    pub published: usize,
    pub failed: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.released + self.published + self.failed
    }
}

/// Return stale `claimed` and `executing` items to a consistent state.
///
/// An `executing` item whose publish log holds a success is marked published
/// with the logged external id; it is never delivered again.
pub async fn recover_stale(ctx: &EngineContext) -> Result<RecoveryReport, CadenceError> {
    let mut report = RecoveryReport::default();
    let now = ctx.now();
    let cutoff = now - ctx.claim_lease();

    for mut item in ctx.store.stale_items(ItemStatus::Claimed, cutoff).await? {
        let stale = item.clone();
        item.status = ItemStatus::Scheduled;
        item.claimed_by = None;
        item.claimed_at = None;
        item.updated_at = now;
        if write_over(ctx, &item, &stale).await? {
            info!(item_id = %item.id, "released expired claim");
            report.released += 1;
        }
    }

    for mut item in ctx.store.stale_items(ItemStatus::Executing, cutoff).await? {
        let stale = item.clone();
        let attempts = ctx.store.attempts_for(&item.id).await?;
        item.updated_at = now;

        if let Some(success) = attempts.iter().find(|a| a.outcome == AttemptOutcome::Success) {
            item.status = ItemStatus::Published;
            item.external_id = Some(success.external_id.clone().unwrap_or_default());
            item.attempt_count = item.attempt_count.max(success.attempt_number);
            item.last_error = None;
            if write_over(ctx, &item, &stale).await? {
                info!(item_id = %item.id, "recovered logged publish");
                report.published += 1;
            }
            continue;
        }

        let logged_failures = attempts.iter().filter(|a| a.outcome.is_failure()).count() as u32;
        item.attempt_count = item
            .attempt_count
            .max(logged_failures)
            .min(item.max_retries + 1);
        item.claimed_by = None;
        item.claimed_at = None;
        if item.attempt_count > item.max_retries {
            item.status = ItemStatus::Failed;
            item.last_error = Some(format!(
                "retries exhausted after {} attempts (recovered)",
                item.attempt_count
            ));
        } else {
            item.status = ItemStatus::Scheduled;
        }

        if write_over(ctx, &item, &stale).await? {
            if item.status == ItemStatus::Failed {
                warn!(item_id = %item.id, "stale execution failed on recovery");
                report.failed += 1;
            } else {
                info!(item_id = %item.id, "stale execution requeued");
                report.released += 1;
            }
        }
    }

    Ok(report)
}

/// Replace `stale` with `item` unless its status or claim changed since it was read.
async fn write_over(
    ctx: &EngineContext,
    item: &ScheduledItem,
    stale: &ScheduledItem,
) -> Result<bool, CadenceError> {
    match stale.lease() {
        Some(lease) => {
            ctx.store
                .compare_and_set_leased(item, stale.status, &lease)
                .await
        }
        None => ctx.store.compare_and_set(item, stale.status).await,
    }
}
