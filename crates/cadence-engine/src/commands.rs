// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command surface of the engine: schedule, cancel, review, status, and the
//! channel operations a human needs after a pause.

use std::sync::Arc;

use cadence_core::{
    CadenceError, CampaignKind, ChannelAction, ChannelAuditEntry, ChannelState, ItemFilter,
    ItemReport, ItemStatus, OutcomeSignal, ReviewDecision, SafetyBreach, ScheduleRequest,
    ScheduledItem, SignalKind, TrustTier,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::info;

use crate::channels;
use crate::context::EngineContext;
use crate::dispatcher::{Dispatcher, TickReport};
use crate::events::EngineEvent;
use crate::metrics;
use crate::safety;
use crate::trust::TierChange;
use crate::worker::{self, ExecutionOutcome};

/// Result of a human review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub item: ScheduledItem,
    /// Present when the review sent the item to execution.
    pub execution: Option<ExecutionOutcome>,
    pub tier_change: Option<TierChange>,
}

/// Facade over one [`EngineContext`].
#[derive(Clone)]
pub struct PublishingEngine {
    ctx: Arc<EngineContext>,
}

impl PublishingEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.ctx.clone())
    }

    /// Run one dispatcher pass now.
    pub async fn tick(&self) -> Result<TickReport, CadenceError> {
        self.dispatcher().tick().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.ctx.events.subscribe()
    }

    /// Accept a new item. Rejects past times, empty references and
    /// targets without a registered adapter.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<ScheduledItem, CadenceError> {
        let now = self.ctx.now();
        if request.payload_ref.trim().is_empty() {
            return Err(CadenceError::Rejected("payload_ref must not be empty".into()));
        }
        if request.channel_id.trim().is_empty() {
            return Err(CadenceError::Rejected("channel_id must not be empty".into()));
        }
        if request.scheduled_at < now {
            return Err(CadenceError::Rejected(format!(
                "scheduled time {} is in the past",
                request.scheduled_at.to_rfc3339()
            )));
        }
        if !self.ctx.adapters.contains(request.target) {
            return Err(CadenceError::AdapterNotFound {
                target: request.target.to_string(),
            });
        }

        self.register_channel(&request.channel_id, request.campaign)
            .await?;

        let max_retries = request
            .max_retries
            .unwrap_or(self.ctx.config.retry.default_max_retries);
        let item = ScheduledItem::new(request, max_retries, now);
        self.ctx.store.insert_item(&item).await?;
        metrics::record_scheduled(item.target);
        info!(
            item_id = %item.id,
            channel_id = %item.channel_id,
            target = %item.target,
            scheduled_at = %item.scheduled_at,
            "item scheduled"
        );
        Ok(item)
    }

    /// Cancel an item that has not been claimed yet.
    pub async fn cancel(&self, item_id: &str) -> Result<ScheduledItem, CadenceError> {
        let mut item = self.get_item(item_id).await?;
        let from = item.status;
        if from != ItemStatus::Scheduled {
            return Err(invalid_transition(&item, ItemStatus::Cancelled));
        }
        item.status = ItemStatus::Cancelled;
        item.updated_at = self.ctx.now();
        if !self.ctx.store.compare_and_set(&item, from).await? {
            let current = self.get_item(item_id).await?;
            return Err(invalid_transition(&current, ItemStatus::Cancelled));
        }
        info!(item_id, "item cancelled");
        Ok(item)
    }

    /// Apply a human decision to an item.
    ///
    /// Approve and edit execute a `pending_approval` item immediately. An
    /// edit to an item the gate auto-cleared is recorded against the
    /// channel's trust. Reject cancels a pending item.
    pub async fn review(
        &self,
        item_id: &str,
        decision: ReviewDecision,
        reviewer: &str,
    ) -> Result<ReviewOutcome, CadenceError> {
        let mut item = self.get_item(item_id).await?;
        let ctx = self.ctx.as_ref();

        if item.status != ItemStatus::PendingApproval {
            let correcting_auto = decision == ReviewDecision::Edit
                && item.auto_cleared
                && matches!(item.status, ItemStatus::Executing | ItemStatus::Published);
            if !correcting_auto {
                return Err(CadenceError::Rejected(format!(
                    "item {item_id} is {}, not awaiting review",
                    item.status
                )));
            }
            let tier_change =
                channels::apply_review(ctx, &item.channel_id, decision, true, reviewer).await?;
            info!(item_id, reviewer, "edit to auto-cleared item recorded");
            return Ok(ReviewOutcome {
                item,
                execution: None,
                tier_change,
            });
        }

        if decision == ReviewDecision::Reject {
            item.status = ItemStatus::Cancelled;
            item.last_error = Some(format!("rejected by {reviewer}"));
            item.updated_at = ctx.now();
            if !ctx
                .store
                .compare_and_set(&item, ItemStatus::PendingApproval)
                .await?
            {
                let current = self.get_item(item_id).await?;
                return Err(invalid_transition(&current, ItemStatus::Cancelled));
            }
            let tier_change =
                channels::apply_review(ctx, &item.channel_id, decision, false, reviewer).await?;
            info!(item_id, reviewer, "item rejected");
            return Ok(ReviewOutcome {
                item,
                execution: None,
                tier_change,
            });
        }

        let channel = self.channel(&item.channel_id).await?;
        if !channel.is_dispatchable() {
            return Err(CadenceError::ChannelPaused {
                channel_id: item.channel_id.clone(),
            });
        }

        // Only the reviewer whose approval moves the item counts toward trust.
        let channel_id = item.channel_id.clone();
        let Some(started) = worker::start(ctx, item, false).await? else {
            let current = self.get_item(item_id).await?;
            return Err(invalid_transition(&current, ItemStatus::Executing));
        };
        let tier_change =
            channels::apply_review(ctx, &channel_id, decision, false, reviewer).await?;
        info!(item_id, reviewer, %decision, "item approved");
        let execution = worker::run(ctx, started).await?;
        let item = self.get_item(item_id).await?;
        Ok(ReviewOutcome {
            item,
            execution: Some(execution),
            tier_change,
        })
    }

    /// Current state of an item and its attempt history.
    pub async fn status(&self, item_id: &str) -> Result<ItemReport, CadenceError> {
        let item = self.get_item(item_id).await?;
        let attempts = self.ctx.store.attempts_for(item_id).await?;
        Ok(ItemReport { item, attempts })
    }

    pub async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ScheduledItem>, CadenceError> {
        self.ctx.store.list_items(filter).await
    }

    /// Create the channel if it does not exist yet. New channels start in
    /// `manual` with the given campaign kind.
    pub async fn register_channel(
        &self,
        channel_id: &str,
        campaign: CampaignKind,
    ) -> Result<ChannelState, CadenceError> {
        if let Some(existing) = self.ctx.store.get_channel(channel_id).await? {
            return Ok(existing);
        }
        let now = self.ctx.now();
        let state = self
            .ctx
            .store
            .ensure_channel(channel_id, campaign, now)
            .await?;
        self.ctx
            .store
            .append_channel_audit(&ChannelAuditEntry {
                id: 0,
                channel_id: channel_id.to_string(),
                action: ChannelAction::Registered,
                detail: json!({ "campaign": campaign, "tier": state.trust.tier }),
                actor: channels::ENGINE_ACTOR.to_string(),
                created_at: now,
            })
            .await?;
        info!(channel_id, %campaign, "channel registered");
        Ok(state)
    }

    pub async fn channel(&self, channel_id: &str) -> Result<ChannelState, CadenceError> {
        self.ctx
            .store
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| CadenceError::channel_not_found(channel_id))
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelState>, CadenceError> {
        self.ctx.store.list_channels().await
    }

    pub async fn channel_audit(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<ChannelAuditEntry>, CadenceError> {
        self.ctx.store.channel_audit(channel_id, limit).await
    }

    /// Human resume of a paused channel.
    pub async fn resume(&self, channel_id: &str, actor: &str) -> Result<ChannelState, CadenceError> {
        channels::resume(&self.ctx, channel_id, actor).await
    }

    pub async fn set_tier(
        &self,
        channel_id: &str,
        tier: TrustTier,
        actor: &str,
    ) -> Result<ChannelState, CadenceError> {
        channels::set_tier(&self.ctx, channel_id, tier, actor).await
    }

    /// Record a downstream signal for a published item and re-check the
    /// channel's safety window. Returns the breach if the channel was paused.
    pub async fn report_signal(
        &self,
        item_id: &str,
        kind: SignalKind,
    ) -> Result<Option<SafetyBreach>, CadenceError> {
        let item = self.get_item(item_id).await?;
        if item.status != ItemStatus::Published {
            return Err(CadenceError::Rejected(format!(
                "signals apply to published items; {item_id} is {}",
                item.status
            )));
        }
        self.ctx
            .store
            .record_signal(&OutcomeSignal {
                item_id: item.id.clone(),
                channel_id: item.channel_id.clone(),
                kind,
                reported_at: self.ctx.now(),
            })
            .await?;
        safety::observe(&self.ctx, &item.channel_id).await
    }

    /// Close the store.
    pub async fn shutdown(&self) -> Result<(), CadenceError> {
        self.ctx.store.close().await
    }

    async fn get_item(&self, item_id: &str) -> Result<ScheduledItem, CadenceError> {
        self.ctx
            .store
            .get_item(item_id)
            .await?
            .ok_or_else(|| CadenceError::item_not_found(item_id))
    }
}

fn invalid_transition(item: &ScheduledItem, to: ItemStatus) -> CadenceError {
    CadenceError::InvalidTransition {
        item_id: item.id.clone(),
        from: item.status.to_string(),
        to: to.to_string(),
    }
}
