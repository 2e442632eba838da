// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine events for the human-facing layer.
//!
//! Events are broadcast in-process. A slow subscriber lags and loses old
//! events; durable history lives in the attempt log and the channel audit.

use cadence_core::{SafetyBreach, TargetPlatform, TrustTier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

/// Something a human may need to know about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ApprovalRequired {
        item_id: String,
        channel_id: String,
        reason: String,
    },
    ItemPublished {
        item_id: String,
        channel_id: String,
        external_id: String,
    },
    ItemRequeued {
        item_id: String,
        channel_id: String,
        retry_at: DateTime<Utc>,
        attempt_count: u32,
    },
    ItemFailed {
        item_id: String,
        channel_id: String,
        reason: String,
    },
    /// Distinct alert: the channel stopped dispatching until a human resumes it.
    ChannelPaused {
        channel_id: String,
        reason: String,
        breach: Option<SafetyBreach>,
    },
    ChannelResumed {
        channel_id: String,
        actor: String,
    },
    ChannelDisconnected {
        channel_id: String,
        target: TargetPlatform,
        detail: String,
    },
    ChannelReconnected {
        channel_id: String,
    },
    TierChanged {
        channel_id: String,
        from: TrustTier,
        to: TrustTier,
        reason: String,
    },
}

/// Broadcast sender wrapper.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            trace!("engine event dropped, no subscribers");
        }
    }
}
