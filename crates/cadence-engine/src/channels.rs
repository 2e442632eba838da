// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel state transitions: pause, outage, resume, tier changes, reviews.
//!
//! Every write takes the channel's in-process lock and then an optimistic
//! version check in the store, so concurrent instances and concurrent tasks
//! never lose an update.

use cadence_core::{
    CadenceError, ChannelAction, ChannelAuditEntry, ChannelState, ChannelStatus, ReviewDecision,
    SafetyBreach, TargetPlatform, TrustTier,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::events::EngineEvent;
use crate::metrics;
use crate::trust::{self, TierChange};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Actor recorded for engine-initiated changes.
pub const ENGINE_ACTOR: &str = "engine";

/// Load, modify and conditionally save a channel.
///
/// `apply` returns `Ok(None)` to leave the channel untouched. It may run more
/// than once when another writer wins the version race.
pub(crate) async fn mutate_channel<T>(
    ctx: &EngineContext,
    channel_id: &str,
    mut apply: impl FnMut(&mut ChannelState) -> Result<Option<T>, CadenceError>,
) -> Result<Option<(ChannelState, T)>, CadenceError> {
    let _guard = ctx.locks.lock(channel_id).await;

    for _ in 0..MAX_WRITE_ATTEMPTS {
        let Some(mut state) = ctx.store.get_channel(channel_id).await? else {
            return Err(CadenceError::channel_not_found(channel_id));
        };
        let Some(out) = apply(&mut state)? else {
            return Ok(None);
        };
        let expected = state.version;
        state.updated_at = ctx.now();
        if ctx.store.save_channel(&state, expected).await? {
            state.version = expected + 1;
            return Ok(Some((state, out)));
        }
        debug!(channel_id, expected, "channel write lost version race, retrying");
    }

    Err(CadenceError::Conflict(format!(
        "channel {channel_id} changed concurrently {MAX_WRITE_ATTEMPTS} times"
    )))
}

async fn audit(
    ctx: &EngineContext,
    channel_id: &str,
    action: ChannelAction,
    detail: serde_json::Value,
    actor: &str,
) -> Result<(), CadenceError> {
    let entry = ChannelAuditEntry {
        id: 0,
        channel_id: channel_id.to_string(),
        action,
        detail,
        actor: actor.to_string(),
        created_at: ctx.now(),
    };
    ctx.store.append_channel_audit(&entry).await?;
    Ok(())
}

async fn refresh_paused_gauge(ctx: &EngineContext) {
    match ctx.store.list_channels().await {
        Ok(channels) => metrics::set_paused_channels(
            channels
                .iter()
                .filter(|c| c.status == ChannelStatus::AutoPaused)
                .count(),
        ),
        Err(e) => debug!(error = %e, "could not refresh paused channel gauge"),
    }
}

/// Auto-pause a channel after a safety breach and demote it to `manual`.
///
/// Returns `false` if the channel was already paused.
pub async fn pause_for_breach(
    ctx: &EngineContext,
    breach: &SafetyBreach,
) -> Result<bool, CadenceError> {
    let reason = breach.summary();
    let changed = mutate_channel(ctx, &breach.channel_id, |state| {
        if state.status == ChannelStatus::AutoPaused {
            return Ok(None);
        }
        let from = state.trust.tier;
        state.status = ChannelStatus::AutoPaused;
        state.pause_reason = Some(reason.clone());
        state.trust.demote(format!("safety breach: {reason}"));
        Ok(Some(from))
    })
    .await?;

    let Some((state, from)) = changed else {
        return Ok(false);
    };

    let channel_id = state.channel_id();
    audit(
        ctx,
        channel_id,
        ChannelAction::Paused,
        json!({ "reason": reason, "breach": breach, "demoted_from": from }),
        ENGINE_ACTOR,
    )
    .await?;
    metrics::record_safety_breach(channel_id, breach.metric);
    refresh_paused_gauge(ctx).await;

    warn!(channel_id, %reason, "channel auto-paused");
    ctx.events.publish(EngineEvent::ChannelPaused {
        channel_id: channel_id.to_string(),
        reason: reason.clone(),
        breach: Some(breach.clone()),
    });
    if from != TrustTier::Manual {
        ctx.events.publish(EngineEvent::TierChanged {
            channel_id: channel_id.to_string(),
            from,
            to: TrustTier::Manual,
            reason: format!("safety breach: {reason}"),
        });
    }
    Ok(true)
}

/// Record a channel-level outage reported by a platform adapter.
///
/// Returns `false` if the channel was not active (already reconnecting or paused).
pub async fn mark_disconnected(
    ctx: &EngineContext,
    channel_id: &str,
    target: TargetPlatform,
    detail: &str,
) -> Result<bool, CadenceError> {
    let now = ctx.now();
    let changed = mutate_channel(ctx, channel_id, |state| {
        if state.status != ChannelStatus::Active {
            return Ok(None);
        }
        state.status = ChannelStatus::Reconnecting;
        state.disconnected_at = Some(now);
        state.last_probe_at = Some(now);
        state.outage_target = Some(target);
        Ok(Some(()))
    })
    .await?;
    if changed.is_none() {
        return Ok(false);
    }

    audit(
        ctx,
        channel_id,
        ChannelAction::Disconnected,
        json!({ "target": target, "detail": detail }),
        ENGINE_ACTOR,
    )
    .await?;
    warn!(channel_id, %target, detail, "channel unavailable, holding its items");
    ctx.events.publish(EngineEvent::ChannelDisconnected {
        channel_id: channel_id.to_string(),
        target,
        detail: detail.to_string(),
    });
    Ok(true)
}

/// A reconnect probe succeeded: the channel dispatches again.
pub async fn mark_reconnected(ctx: &EngineContext, channel_id: &str) -> Result<bool, CadenceError> {
    let changed = mutate_channel(ctx, channel_id, |state| {
        if state.status != ChannelStatus::Reconnecting {
            return Ok(None);
        }
        let down_since = state.disconnected_at;
        state.status = ChannelStatus::Active;
        state.disconnected_at = None;
        state.last_probe_at = None;
        state.outage_target = None;
        Ok(Some(down_since))
    })
    .await?;
    let Some((_, down_since)) = changed else {
        return Ok(false);
    };

    audit(
        ctx,
        channel_id,
        ChannelAction::Reconnected,
        json!({ "disconnected_at": down_since }),
        ENGINE_ACTOR,
    )
    .await?;
    info!(channel_id, "channel reconnected");
    ctx.events.publish(EngineEvent::ChannelReconnected {
        channel_id: channel_id.to_string(),
    });
    Ok(true)
}

/// Remember that a probe ran and failed.
pub async fn record_probe(ctx: &EngineContext, channel_id: &str) -> Result<(), CadenceError> {
    let now = ctx.now();
    mutate_channel(ctx, channel_id, |state| {
        if state.status != ChannelStatus::Reconnecting {
            return Ok(None);
        }
        state.last_probe_at = Some(now);
        Ok(Some(()))
    })
    .await?;
    Ok(())
}

/// The reconnect ceiling passed: hand the channel to a human. Trust is kept.
pub async fn pause_for_outage(
    ctx: &EngineContext,
    channel_id: &str,
    reason: &str,
) -> Result<bool, CadenceError> {
    let changed = mutate_channel(ctx, channel_id, |state| {
        if state.status != ChannelStatus::Reconnecting {
            return Ok(None);
        }
        state.status = ChannelStatus::AutoPaused;
        state.pause_reason = Some(reason.to_string());
        Ok(Some(state.disconnected_at))
    })
    .await?;
    let Some((_, down_since)) = changed else {
        return Ok(false);
    };

    audit(
        ctx,
        channel_id,
        ChannelAction::Paused,
        json!({ "reason": reason, "disconnected_at": down_since }),
        ENGINE_ACTOR,
    )
    .await?;
    refresh_paused_gauge(ctx).await;
    warn!(channel_id, reason, "channel auto-paused after outage");
    ctx.events.publish(EngineEvent::ChannelPaused {
        channel_id: channel_id.to_string(),
        reason: reason.to_string(),
        breach: None,
    });
    Ok(true)
}

/// Human resume of a paused or reconnecting channel.
///
/// The safety window restarts from this moment.
pub async fn resume(
    ctx: &EngineContext,
    channel_id: &str,
    actor: &str,
) -> Result<ChannelState, CadenceError> {
    let now = ctx.now();
    let changed = mutate_channel(ctx, channel_id, |state| {
        if state.status == ChannelStatus::Active {
            return Err(CadenceError::Rejected(format!(
                "channel {channel_id} is already active"
            )));
        }
        let previous = (state.status, state.pause_reason.take());
        state.status = ChannelStatus::Active;
        state.disconnected_at = None;
        state.last_probe_at = None;
        state.outage_target = None;
        state.resumed_at = Some(now);
        Ok(Some(previous))
    })
    .await?;
    let Some((state, (previous_status, previous_reason))) = changed else {
        return Err(CadenceError::Internal(format!(
            "resume of {channel_id} made no change"
        )));
    };

    audit(
        ctx,
        channel_id,
        ChannelAction::Resumed,
        json!({ "previous_status": previous_status, "pause_reason": previous_reason }),
        actor,
    )
    .await?;
    refresh_paused_gauge(ctx).await;
    info!(channel_id, actor, "channel resumed");
    ctx.events.publish(EngineEvent::ChannelResumed {
        channel_id: channel_id.to_string(),
        actor: actor.to_string(),
    });
    Ok(state)
}

/// Explicit tier override by an operator.
pub async fn set_tier(
    ctx: &EngineContext,
    channel_id: &str,
    tier: TrustTier,
    actor: &str,
) -> Result<ChannelState, CadenceError> {
    let changed = mutate_channel(ctx, channel_id, |state| {
        if tier == TrustTier::FullAutopilot
            && state.trust.campaign == cadence_core::CampaignKind::OneShot
        {
            return Err(CadenceError::Rejected(format!(
                "one-shot channel {channel_id} cannot be set to {tier}"
            )));
        }
        let from = state.trust.tier;
        if from == tier {
            return Ok(None);
        }
        if tier < from {
            state.trust.demote(format!("set to {tier} by {actor}"));
        }
        state.trust.tier = tier;
        Ok(Some(from))
    })
    .await?;

    let Some((state, from)) = changed else {
        return ctx
            .store
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| CadenceError::channel_not_found(channel_id));
    };

    let reason = format!("set by {actor}");
    audit(
        ctx,
        channel_id,
        ChannelAction::TierChanged,
        json!({ "from": from, "to": tier, "reason": reason }),
        actor,
    )
    .await?;
    ctx.events.publish(EngineEvent::TierChanged {
        channel_id: channel_id.to_string(),
        from,
        to: tier,
        reason,
    });
    Ok(state)
}

/// Fold a human review into the channel's trust state, promoting or demoting.
pub async fn apply_review(
    ctx: &EngineContext,
    channel_id: &str,
    decision: ReviewDecision,
    auto_cleared: bool,
    reviewer: &str,
) -> Result<Option<TierChange>, CadenceError> {
    let config = &ctx.config.trust;
    let changed = mutate_channel(ctx, channel_id, |state| {
        Ok(Some(trust::record_review(
            &mut state.trust,
            decision,
            auto_cleared,
            config,
        )))
    })
    .await?;
    let Some((state, change)) = changed else {
        return Ok(None);
    };

    let Some(change) = change else {
        debug!(
            channel_id,
            %decision,
            clean = state.trust.consecutive_clean_approvals,
            edit_rate = state.trust.edit_rate(),
            "review recorded"
        );
        return Ok(None);
    };

    let (from, to, reason) = match &change {
        TierChange::Promoted { from, to } => (
            *from,
            *to,
            format!(
                "{} consecutive clean approvals, edit rate {:.2}",
                state.trust.consecutive_clean_approvals,
                state.trust.edit_rate()
            ),
        ),
        TierChange::Demoted { from, reason } => (*from, TrustTier::Manual, reason.clone()),
    };
    audit(
        ctx,
        channel_id,
        ChannelAction::TierChanged,
        json!({ "from": from, "to": to, "reason": reason }),
        reviewer,
    )
    .await?;
    info!(channel_id, %from, %to, %reason, "trust tier changed");
    ctx.events.publish(EngineEvent::TierChanged {
        channel_id: channel_id.to_string(),
        from,
        to,
        reason,
    });
    Ok(Some(change))
}
