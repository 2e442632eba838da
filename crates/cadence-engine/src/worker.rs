// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution worker: delivers one item and records the outcome.
//!
//! The attempt is appended to the publish log before the item's status is
//! updated. If the process dies in between, recovery finds the logged success
//! and finishes the transition without delivering twice.

use std::time::Instant;

use cadence_core::{
    AttemptOutcome, CadenceError, ClaimLease, DeliveryError, DeliveryReceipt, DeliveryRequest,
    ItemStatus, PublishAttempt, ScheduledItem,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::channels;
use crate::context::EngineContext;
use crate::events::EngineEvent;
use crate::metrics;
use crate::retry::RetryDecision;
use crate::safety;

/// What happened to an item handed to [`execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Published {
        external_id: String,
    },
    /// The publish log already held a success; no delivery was made.
    AlreadyPublished {
        external_id: String,
    },
    Requeued {
        retry_at: chrono::DateTime<chrono::Utc>,
    },
    Failed {
        reason: String,
    },
    /// Channel outage: the item waits at its original time.
    Held,
    /// Not executed (channel not active, or another writer moved the item).
    Skipped {
        reason: String,
    },
}

/// An item this instance moved to `executing`.
///
/// Later writes are fenced by `lease` and lose once the item has been
/// recovered and claimed again.
#[derive(Debug)]
pub(crate) struct Started {
    item: ScheduledItem,
    lease: ClaimLease,
}

/// Execute a `claimed` or `pending_approval` item.
///
/// `auto_cleared` is true when the trust gate let the item through without
/// a human.
#[instrument(skip_all, fields(item_id = %item.id, channel_id = %item.channel_id))]
pub async fn execute(
    ctx: &EngineContext,
    mut item: ScheduledItem,
    auto_cleared: bool,
) -> Result<ExecutionOutcome, CadenceError> {
    check_executable(&item)?;

    let channel = ctx
        .store
        .get_channel(&item.channel_id)
        .await?
        .ok_or_else(|| CadenceError::channel_not_found(&item.channel_id))?;
    if !channel.is_dispatchable() {
        let reason = format!("channel is {}", channel.status);
        if item.status == ItemStatus::Claimed {
            release(ctx, &mut item).await?;
        }
        debug!(%reason, "item not executed");
        return Ok(ExecutionOutcome::Skipped { reason });
    }

    match start(ctx, item, auto_cleared).await? {
        Some(started) => run(ctx, started).await,
        None => Ok(ExecutionOutcome::Skipped {
            reason: "item moved by another writer".into(),
        }),
    }
}

fn check_executable(item: &ScheduledItem) -> Result<(), CadenceError> {
    if item.status.can_transition_to(ItemStatus::Executing) {
        Ok(())
    } else {
        Err(CadenceError::InvalidTransition {
            item_id: item.id.clone(),
            from: item.status.to_string(),
            to: ItemStatus::Executing.to_string(),
        })
    }
}

/// Move `item` to `executing` under a fresh lease held by this instance.
///
/// Returns `None` when another writer moved the item first.
pub(crate) async fn start(
    ctx: &EngineContext,
    mut item: ScheduledItem,
    auto_cleared: bool,
) -> Result<Option<Started>, CadenceError> {
    check_executable(&item)?;
    let expected = item.status;
    let previous = item.lease();

    let now = ctx.now();
    let lease = ClaimLease {
        owner: ctx.instance_id.clone(),
        claimed_at: now,
    };
    item.status = ItemStatus::Executing;
    item.auto_cleared = auto_cleared;
    item.claimed_by = Some(lease.owner.clone());
    item.claimed_at = Some(lease.claimed_at);
    item.updated_at = now;
    let won = match &previous {
        Some(previous) => {
            ctx.store
                .compare_and_set_leased(&item, expected, previous)
                .await?
        }
        None => ctx.store.compare_and_set(&item, expected).await?,
    };
    Ok(won.then_some(Started { item, lease }))
}

/// Deliver a started item and record the outcome.
pub(crate) async fn run(
    ctx: &EngineContext,
    started: Started,
) -> Result<ExecutionOutcome, CadenceError> {
    let Started { mut item, lease } = started;

    let history = ctx.store.attempts_for(&item.id).await?;
    if let Some(success) = history
        .iter()
        .find(|a| a.outcome == AttemptOutcome::Success)
    {
        let external_id = success.external_id.clone().unwrap_or_default();
        info!(%external_id, "publish log already records success, skipping delivery");
        item.attempt_count = item.attempt_count.max(success.attempt_number);
        return finish_published(ctx, item, &lease, external_id, true).await;
    }

    let started_at = ctx.now();
    let timer = Instant::now();
    let result = deliver(ctx, &item).await;
    metrics::record_delivery_latency(item.target, timer.elapsed().as_secs_f64());
    let finished_at = ctx.now();

    let attempt = PublishAttempt {
        id: 0,
        item_id: item.id.clone(),
        channel_id: item.channel_id.clone(),
        attempt_number: item.next_attempt_number(),
        started_at,
        finished_at,
        outcome: match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(e) => e.outcome(),
        },
        error_detail: result.as_ref().err().map(|e| e.detail.clone()),
        external_id: result.as_ref().ok().map(|r| r.external_id.clone()),
    };
    let attempt_id = ctx.store.append_attempt(&attempt).await?;
    metrics::record_attempt(item.target, attempt.outcome);
    debug!(attempt_id, outcome = %attempt.outcome, "attempt recorded");

    let outcome = match result {
        Ok(receipt) => {
            item.attempt_count += 1;
            finish_published(ctx, item, &lease, receipt.external_id, false).await?
        }
        Err(error) => finish_failed(ctx, item, &lease, error).await?,
    };
    Ok(outcome)
}

async fn deliver(ctx: &EngineContext, item: &ScheduledItem) -> Result<DeliveryReceipt, DeliveryError> {
    let adapter = ctx
        .adapters
        .get(item.target)
        .map_err(|e| DeliveryError::permanent(e.to_string()))?;
    let request = DeliveryRequest {
        item_id: item.id.clone(),
        channel_id: item.channel_id.clone(),
        payload_ref: item.payload_ref.clone(),
        attempt_number: item.next_attempt_number(),
    };
    let timeout = ctx.delivery_timeout();
    match tokio::time::timeout(timeout, adapter.deliver(&request)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::transient(format!(
            "delivery timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

async fn finish_published(
    ctx: &EngineContext,
    mut item: ScheduledItem,
    lease: &ClaimLease,
    external_id: String,
    already: bool,
) -> Result<ExecutionOutcome, CadenceError> {
    item.status = ItemStatus::Published;
    item.external_id = Some(external_id.clone());
    item.last_error = None;
    item.updated_at = ctx.now();
    if !ctx
        .store
        .compare_and_set_leased(&item, ItemStatus::Executing, lease)
        .await?
    {
        warn!("lease lost before publish was recorded");
        return Ok(ExecutionOutcome::Skipped {
            reason: "item moved by another writer".into(),
        });
    }

    info!(%external_id, "item published");
    ctx.events.publish(EngineEvent::ItemPublished {
        item_id: item.id.clone(),
        channel_id: item.channel_id.clone(),
        external_id: external_id.clone(),
    });
    if already {
        return Ok(ExecutionOutcome::AlreadyPublished { external_id });
    }
    observe_safety(ctx, &item.channel_id).await;
    Ok(ExecutionOutcome::Published { external_id })
}

async fn finish_failed(
    ctx: &EngineContext,
    mut item: ScheduledItem,
    lease: &ClaimLease,
    error: DeliveryError,
) -> Result<ExecutionOutcome, CadenceError> {
    let now = ctx.now();
    let decision = ctx.retry_policy().decide(&item, &error);
    item.last_error = Some(error.detail.clone());
    item.updated_at = now;

    let outcome = match decision {
        RetryDecision::Hold => {
            // Not counted against retries.
            item.status = ItemStatus::Scheduled;
            item.claimed_by = None;
            item.claimed_at = None;
            ExecutionOutcome::Held
        }
        RetryDecision::Retry { delay } => {
            let retry_at = now
                + chrono::Duration::from_std(delay)
                    .map_err(|e| CadenceError::Internal(e.to_string()))?;
            item.attempt_count += 1;
            item.status = ItemStatus::Scheduled;
            item.scheduled_at = retry_at;
            item.claimed_by = None;
            item.claimed_at = None;
            ExecutionOutcome::Requeued { retry_at }
        }
        RetryDecision::GiveUp { reason } => {
            item.attempt_count += 1;
            item.status = ItemStatus::Failed;
            item.last_error = Some(reason.clone());
            ExecutionOutcome::Failed { reason }
        }
    };

    if !ctx
        .store
        .compare_and_set_leased(&item, ItemStatus::Executing, lease)
        .await?
    {
        warn!("lease lost before failure was recorded");
        return Ok(ExecutionOutcome::Skipped {
            reason: "item moved by another writer".into(),
        });
    }

    match &outcome {
        ExecutionOutcome::Held => {
            channels::mark_disconnected(ctx, &item.channel_id, item.target, &error.detail).await?;
        }
        ExecutionOutcome::Requeued { retry_at } => {
            info!(%retry_at, attempt = item.attempt_count, error = %error.detail, "delivery failed, requeued");
            ctx.events.publish(EngineEvent::ItemRequeued {
                item_id: item.id.clone(),
                channel_id: item.channel_id.clone(),
                retry_at: *retry_at,
                attempt_count: item.attempt_count,
            });
            observe_safety(ctx, &item.channel_id).await;
        }
        ExecutionOutcome::Failed { reason } => {
            warn!(%reason, "item failed");
            ctx.events.publish(EngineEvent::ItemFailed {
                item_id: item.id.clone(),
                channel_id: item.channel_id.clone(),
                reason: reason.clone(),
            });
            observe_safety(ctx, &item.channel_id).await;
        }
        _ => {}
    }
    Ok(outcome)
}

/// Put a claimed item back to `scheduled` without counting an attempt.
pub(crate) async fn release(ctx: &EngineContext, item: &mut ScheduledItem) -> Result<bool, CadenceError> {
    let expected = item.status;
    let lease = item.lease();
    item.status = ItemStatus::Scheduled;
    item.claimed_by = None;
    item.claimed_at = None;
    item.updated_at = ctx.now();
    match &lease {
        Some(lease) => ctx.store.compare_and_set_leased(item, expected, lease).await,
        None => ctx.store.compare_and_set(item, expected).await,
    }
}

async fn observe_safety(ctx: &EngineContext, channel_id: &str) {
    if let Err(e) = safety::observe(ctx, channel_id).await {
        warn!(channel_id, error = %e, "safety evaluation failed");
    }
}
