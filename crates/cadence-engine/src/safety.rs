// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel safety monitor.
//!
//! Evaluated after every recorded attempt and every outcome signal, over a
//! count-based window of the channel's most recent activity. Rates use the
//! configured window size as the denominator, so a channel with fewer items
//! than the window cannot trip on a single early failure.

use cadence_config::SafetyThresholds;
use cadence_core::{
    CadenceError, ChannelStatus, PublishAttempt, SafetyBreach, SafetyMetric, SignalSummary,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::channels;
use crate::context::EngineContext;

/// Check the window against the thresholds.
///
/// `attempts` and `summaries` are newest first and already limited to the
/// window. Failure and negative rates trip when strictly above the limit; the
/// success-signal rate trips when below it and only once the window is full.
pub fn evaluate(
    channel_id: &str,
    thresholds: &SafetyThresholds,
    attempts: &[PublishAttempt],
    summaries: &[SignalSummary],
    now: DateTime<Utc>,
) -> Option<SafetyBreach> {
    let window = thresholds.window_size.max(1);
    let attempts = &attempts[..attempts.len().min(window)];
    let summaries = &summaries[..summaries.len().min(window)];

    let failed: Vec<&PublishAttempt> = attempts.iter().filter(|a| a.outcome.is_failure()).collect();
    let failure_rate = failed.len() as f64 / window as f64;
    if failure_rate > thresholds.max_failure_rate {
        return Some(SafetyBreach {
            channel_id: channel_id.to_string(),
            metric: SafetyMetric::FailureRate,
            observed: failure_rate,
            limit: thresholds.max_failure_rate,
            window_size: window,
            triggering_items: dedup_items(failed.iter().map(|a| a.item_id.as_str())),
            triggering_attempts: failed.iter().map(|a| a.id).collect(),
            detected_at: now,
        });
    }

    if let Some(limit) = thresholds.max_negative_rate {
        let negative: Vec<&SignalSummary> = summaries.iter().filter(|s| s.negative > 0).collect();
        let rate = negative.len() as f64 / window as f64;
        if rate > limit {
            return Some(SafetyBreach {
                channel_id: channel_id.to_string(),
                metric: SafetyMetric::NegativeRate,
                observed: rate,
                limit,
                window_size: window,
                triggering_items: negative.iter().map(|s| s.item_id.clone()).collect(),
                triggering_attempts: Vec::new(),
                detected_at: now,
            });
        }
    }

    if let Some(limit) = thresholds.min_success_signal_rate
        && summaries.len() >= window
    {
        let positive = summaries.iter().filter(|s| s.positive > 0).count();
        let rate = positive as f64 / window as f64;
        if rate < limit {
            return Some(SafetyBreach {
                channel_id: channel_id.to_string(),
                metric: SafetyMetric::SuccessSignalRate,
                observed: rate,
                limit,
                window_size: window,
                triggering_items: summaries
                    .iter()
                    .filter(|s| s.positive == 0)
                    .map(|s| s.item_id.clone())
                    .collect(),
                triggering_attempts: Vec::new(),
                detected_at: now,
            });
        }
    }

    None
}

fn dedup_items<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.iter().any(|seen| seen == id) {
            out.push(id.to_string());
        }
    }
    out
}

/// Re-evaluate one channel and pause it on a breach.
///
/// Only activity after the channel's last resume is counted. Returns the
/// breach that paused the channel, if any.
pub async fn observe(
    ctx: &EngineContext,
    channel_id: &str,
) -> Result<Option<SafetyBreach>, CadenceError> {
    let Some(channel) = ctx.store.get_channel(channel_id).await? else {
        return Err(CadenceError::channel_not_found(channel_id));
    };
    if channel.status == ChannelStatus::AutoPaused {
        return Ok(None);
    }

    let thresholds = ctx.config.safety.thresholds_for(channel_id);
    let mut attempts = ctx
        .store
        .recent_attempts(channel_id, thresholds.window_size)
        .await?;
    let mut summaries = ctx
        .store
        .recent_signal_summaries(channel_id, thresholds.window_size)
        .await?;
    if let Some(resumed_at) = channel.resumed_at {
        attempts.retain(|a| a.finished_at > resumed_at);
        summaries.retain(|s| s.published_at > resumed_at);
    }

    let Some(breach) = evaluate(channel_id, &thresholds, &attempts, &summaries, ctx.now()) else {
        debug!(channel_id, attempts = attempts.len(), "safety window within limits");
        return Ok(None);
    };

    warn!(
        channel_id,
        metric = %breach.metric,
        observed = breach.observed,
        limit = breach.limit,
        "safety threshold breached"
    );
    let paused = channels::pause_for_breach(ctx, &breach).await?;
    Ok(paused.then_some(breach))
}
