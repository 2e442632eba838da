// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconnect supervision for channels in an outage.
//!
//! Each dispatcher tick probes reconnecting channels whose probe interval has
//! elapsed. A channel still down at the ceiling is auto-paused for a human.

use cadence_core::{CadenceError, ChannelState, ChannelStatus};
use chrono::Duration;
use tracing::{debug, warn};

use crate::channels;
use crate::context::EngineContext;

/// Outcome counts of one supervision pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectReport {
    pub probed: usize,
    pub reconnected: usize,
    pub paused: usize,
}

pub async fn supervise(ctx: &EngineContext) -> Result<ReconnectReport, CadenceError> {
    let mut report = ReconnectReport::default();
    let now = ctx.now();
    let interval = Duration::seconds(ctx.config.reconnect.interval_secs as i64);
    let ceiling = Duration::seconds(ctx.config.reconnect.ceiling_secs as i64);

    let reconnecting: Vec<ChannelState> = ctx
        .store
        .list_channels()
        .await?
        .into_iter()
        .filter(|c| c.status == ChannelStatus::Reconnecting)
        .collect();

    for channel in reconnecting {
        let channel_id = channel.channel_id();
        let down_since = channel.disconnected_at.unwrap_or(channel.updated_at);

        if now - down_since >= ceiling {
            let reason = format!(
                "channel unavailable for {}s, reconnect ceiling {}s reached",
                (now - down_since).num_seconds(),
                ceiling.num_seconds()
            );
            if channels::pause_for_outage(ctx, channel_id, &reason).await? {
                report.paused += 1;
            }
            continue;
        }

        let probe_due = channel
            .last_probe_at
            .is_none_or(|last| now - last >= interval);
        if !probe_due {
            continue;
        }

        report.probed += 1;
        if probe(ctx, &channel).await {
            if channels::mark_reconnected(ctx, channel_id).await? {
                report.reconnected += 1;
            }
        } else {
            channels::record_probe(ctx, channel_id).await?;
        }
    }

    Ok(report)
}

async fn probe(ctx: &EngineContext, channel: &ChannelState) -> bool {
    let channel_id = channel.channel_id();
    let Some(target) = channel.outage_target else {
        return true;
    };
    let adapter = match ctx.adapters.get(target) {
        Ok(adapter) => adapter,
        Err(e) => {
            warn!(channel_id, error = %e, "no adapter to probe");
            return false;
        }
    };
    match adapter.health_check().await {
        Ok(status) if status.is_available() => true,
        Ok(status) => {
            debug!(channel_id, ?status, "reconnect probe: still down");
            false
        }
        Err(e) => {
            debug!(channel_id, error = %e, "reconnect probe failed");
            false
        }
    }
}
