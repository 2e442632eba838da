// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the engine, and platform adapters.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

impl HealthStatus {
    /// Whether work may be sent through the adapter.
    pub fn is_available(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy(_))
    }
}

/// Identifies the type of adapter in the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Platform,
    Storage,
}

// --- Items ---

/// Lifecycle state of a [`ScheduledItem`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Scheduled,
    Claimed,
    PendingApproval,
    Executing,
    Published,
    Failed,
    Cancelled,
}

impl ItemStatus {
    /// Terminal states are never left.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Published | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    /// Whether the item state machine allows `self -> next`.
    ///
    /// `Claimed -> Scheduled` and `Executing -> Scheduled` cover requeues:
    /// expired claims, held items on an unavailable channel, and transient retries.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Scheduled, Claimed)
                | (Scheduled, Cancelled)
                | (Claimed, PendingApproval)
                | (Claimed, Executing)
                | (Claimed, Scheduled)
                | (PendingApproval, Executing)
                | (PendingApproval, Cancelled)
                | (Executing, Published)
                | (Executing, Failed)
                | (Executing, Scheduled)
        )
    }
}

/// The delivery target of an item. Each target is served by one platform adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TargetPlatform {
    SocialPost,
    EmailSend,
}

/// Whether an item (or a channel) belongs to a repeating sequence.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    #[default]
    Recurring,
    OneShot,
}

/// Pass/fail quality check attached to the payload by the authoring service.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QualitySignal {
    Passed,
    Failed,
    #[default]
    Unknown,
}

/// A content item waiting for, or done with, delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: String,
    /// Opaque reference to the content, owned by the authoring service.
    pub payload_ref: String,
    pub channel_id: String,
    pub target: TargetPlatform,
    pub campaign: CampaignKind,
    pub quality: QualitySignal,
    pub scheduled_at: DateTime<Utc>,
    pub status: ItemStatus,
    /// Item-level delivery attempts made so far. Channel-unavailable holds do not count.
    pub attempt_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    /// Set if and only if `status == Published`.
    pub external_id: Option<String>,
    /// The item reached `Executing` without a human approval.
    pub auto_cleared: bool,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledItem {
    /// Build a fresh `scheduled` item from a scheduling request.
    pub fn new(request: ScheduleRequest, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload_ref: request.payload_ref,
            channel_id: request.channel_id,
            target: request.target,
            campaign: request.campaign,
            quality: request.quality,
            scheduled_at: request.scheduled_at,
            status: ItemStatus::Scheduled,
            attempt_count: 0,
            max_retries,
            last_error: None,
            external_id: None,
            auto_cleared: false,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the item needs a human regardless of the channel tier.
    pub fn is_one_shot(&self) -> bool {
        self.campaign == CampaignKind::OneShot
    }

    /// Whether another transient failure may still be retried.
    pub fn has_retries_left(&self) -> bool {
        self.attempt_count < self.max_retries
    }

    /// The attempt number the next delivery will carry (1-based).
    pub fn next_attempt_number(&self) -> u32 {
        self.attempt_count + 1
    }

    /// The claim currently held on this item, if any.
    pub fn lease(&self) -> Option<ClaimLease> {
        Some(ClaimLease {
            owner: self.claimed_by.clone()?,
            claimed_at: self.claimed_at?,
        })
    }
}

/// Who holds a claimed or executing item, and since when.
///
/// Writes fenced by a lease fail once the item has been recovered and
/// claimed again, even by the same instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLease {
    pub owner: String,
    pub claimed_at: DateTime<Utc>,
}

/// A request to schedule a new item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub payload_ref: String,
    pub channel_id: String,
    pub target: TargetPlatform,
    pub scheduled_at: DateTime<Utc>,
    /// Falls back to `retry.default_max_retries` when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub campaign: CampaignKind,
    #[serde(default)]
    pub quality: QualitySignal,
}

/// Filter for [`PublishStore::list_items`](crate::traits::PublishStore::list_items).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub channel_id: Option<String>,
    pub status: Option<ItemStatus>,
    pub limit: Option<usize>,
}

// --- Attempts ---

/// Classified outcome of one delivery attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
    /// The channel was down; the item was held, not failed.
    ChannelUnavailable,
}

impl AttemptOutcome {
    /// Whether the outcome counts as an item-level failure for safety metrics.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            AttemptOutcome::TransientFailure | AttemptOutcome::PermanentFailure
        )
    }
}

/// Append-only audit record of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishAttempt {
    /// Store-assigned sequence number; zero until appended.
    pub id: i64,
    pub item_id: String,
    pub channel_id: String,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub error_detail: Option<String>,
    pub external_id: Option<String>,
}

/// An item together with its attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub item: ScheduledItem,
    pub attempts: Vec<PublishAttempt>,
}

// --- Delivery ---

/// What a platform adapter is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub item_id: String,
    pub channel_id: String,
    pub payload_ref: String,
    pub attempt_number: u32,
}

/// Successful delivery result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub external_id: String,
}

/// Classification of a failed delivery.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    /// Rate limit, timeout, temporary unavailability.
    Transient,
    /// Content rejected, auth revoked, validation failure.
    Permanent,
    /// The whole channel is unreachable.
    ChannelDown,
}

/// A classified delivery failure returned by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} delivery error: {detail}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub detail: String,
}

impl DeliveryError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::Permanent,
            detail: detail.into(),
        }
    }

    pub fn channel_down(detail: impl Into<String>) -> Self {
        Self {
            kind: DeliveryErrorKind::ChannelDown,
            detail: detail.into(),
        }
    }

    /// The attempt outcome recorded for this failure.
    pub fn outcome(&self) -> AttemptOutcome {
        match self.kind {
            DeliveryErrorKind::Transient => AttemptOutcome::TransientFailure,
            DeliveryErrorKind::Permanent => AttemptOutcome::PermanentFailure,
            DeliveryErrorKind::ChannelDown => AttemptOutcome::ChannelUnavailable,
        }
    }
}

// --- Trust ---

/// Automation-confidence level of a channel.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    #[default]
    Manual,
    SmartAutopilot,
    FullAutopilot,
}

impl TrustTier {
    /// The tier one step up, if any.
    pub fn next(self) -> Option<TrustTier> {
        match self {
            TrustTier::Manual => Some(TrustTier::SmartAutopilot),
            TrustTier::SmartAutopilot => Some(TrustTier::FullAutopilot),
            TrustTier::FullAutopilot => None,
        }
    }
}

/// Human review decision on an item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Edit,
    Reject,
}

/// Per-channel trust counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustState {
    pub channel_id: String,
    pub campaign: CampaignKind,
    pub tier: TrustTier,
    pub consecutive_clean_approvals: u32,
    pub total_approvals: u32,
    pub total_edits: u32,
    /// Most recent review decisions, oldest first; `true` marks an edit.
    pub review_window: VecDeque<bool>,
    /// Edits made to items the gate had auto-cleared since the last demotion.
    pub auto_cleared_edits: u32,
    pub last_demotion_reason: Option<String>,
}

impl TrustState {
    pub fn new(channel_id: impl Into<String>, campaign: CampaignKind) -> Self {
        Self {
            channel_id: channel_id.into(),
            campaign,
            tier: TrustTier::Manual,
            consecutive_clean_approvals: 0,
            total_approvals: 0,
            total_edits: 0,
            review_window: VecDeque::new(),
            auto_cleared_edits: 0,
            last_demotion_reason: None,
        }
    }

    /// Rolling edit rate over the review window. Zero with no reviews.
    pub fn edit_rate(&self) -> f64 {
        if self.review_window.is_empty() {
            return 0.0;
        }
        let edits = self.review_window.iter().filter(|e| **e).count();
        edits as f64 / self.review_window.len() as f64
    }

    /// Push a review into the rolling window, keeping at most `capacity` entries.
    pub fn push_review(&mut self, was_edit: bool, capacity: usize) {
        self.review_window.push_back(was_edit);
        while self.review_window.len() > capacity.max(1) {
            self.review_window.pop_front();
        }
    }

    /// Drop to `manual` and reset the earned counters.
    pub fn demote(&mut self, reason: impl Into<String>) {
        self.tier = TrustTier::Manual;
        self.consecutive_clean_approvals = 0;
        self.auto_cleared_edits = 0;
        self.last_demotion_reason = Some(reason.into());
    }
}

// --- Channels ---

/// Dispatch status of a channel.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Active,
    Reconnecting,
    AutoPaused,
}

/// Trust and pause state of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub trust: TrustState,
    pub status: ChannelStatus,
    pub pause_reason: Option<String>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub last_probe_at: Option<DateTime<Utc>>,
    /// Platform whose adapter reported the outage.
    pub outage_target: Option<TargetPlatform>,
    /// Last human resume. Safety windows only count activity after it.
    pub resumed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ChannelState {
    pub fn new(channel_id: impl Into<String>, campaign: CampaignKind, now: DateTime<Utc>) -> Self {
        Self {
            trust: TrustState::new(channel_id, campaign),
            status: ChannelStatus::Active,
            pause_reason: None,
            disconnected_at: None,
            last_probe_at: None,
            outage_target: None,
            resumed_at: None,
            version: 0,
            updated_at: now,
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.trust.channel_id
    }

    /// Only active channels are dispatched.
    pub fn is_dispatchable(&self) -> bool {
        self.status == ChannelStatus::Active
    }
}

/// Kind of channel audit entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChannelAction {
    Registered,
    Paused,
    Resumed,
    Disconnected,
    Reconnected,
    TierChanged,
}

/// Durable record of a pause, resume, outage, or tier change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAuditEntry {
    pub id: i64,
    pub channel_id: String,
    pub action: ChannelAction,
    pub detail: serde_json::Value,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

// --- Safety ---

/// Rolling metric that tripped a safety threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SafetyMetric {
    FailureRate,
    NegativeRate,
    SuccessSignalRate,
}

/// Diagnostic record emitted when a channel is auto-paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyBreach {
    pub channel_id: String,
    pub metric: SafetyMetric,
    pub observed: f64,
    pub limit: f64,
    pub window_size: usize,
    pub triggering_items: Vec<String>,
    pub triggering_attempts: Vec<i64>,
    pub detected_at: DateTime<Utc>,
}

impl SafetyBreach {
    /// One-line summary used as the pause reason.
    pub fn summary(&self) -> String {
        let relation = match self.metric {
            SafetyMetric::SuccessSignalRate => "below",
            _ => "above",
        };
        format!(
            "{} {:.2} {relation} limit {:.2} over last {}",
            self.metric, self.observed, self.limit, self.window_size
        )
    }
}

/// Kind of downstream outcome signal for a published item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Bounce, unsubscribe, takedown.
    Negative,
    /// Engagement.
    Positive,
}

/// One reported signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSignal {
    pub item_id: String,
    pub channel_id: String,
    pub kind: SignalKind,
    pub reported_at: DateTime<Utc>,
}

/// Signals seen for one published item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub item_id: String,
    pub published_at: DateTime<Utc>,
    pub negative: u32,
    pub positive: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        let all = [
            ItemStatus::Scheduled,
            ItemStatus::Claimed,
            ItemStatus::PendingApproval,
            ItemStatus::Executing,
            ItemStatus::Published,
            ItemStatus::Failed,
            ItemStatus::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in &all {
                assert!(!from.can_transition_to(*to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn cancel_only_before_claim_or_during_review() {
        assert!(ItemStatus::Scheduled.can_transition_to(ItemStatus::Cancelled));
        assert!(ItemStatus::PendingApproval.can_transition_to(ItemStatus::Cancelled));
        assert!(!ItemStatus::Claimed.can_transition_to(ItemStatus::Cancelled));
        assert!(!ItemStatus::Executing.can_transition_to(ItemStatus::Cancelled));
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(ItemStatus::PendingApproval.to_string(), "pending_approval");
        assert_eq!(
            ItemStatus::from_str("pending_approval").unwrap(),
            ItemStatus::PendingApproval
        );
        assert_eq!(TargetPlatform::EmailSend.to_string(), "email-send");
        assert_eq!(TrustTier::FullAutopilot.to_string(), "full_autopilot");
        let json = serde_json::to_string(&ChannelStatus::AutoPaused).unwrap();
        assert_eq!(json, "\"auto_paused\"");
    }

    #[test]
    fn delivery_error_maps_to_outcome() {
        assert_eq!(
            DeliveryError::transient("429").outcome(),
            AttemptOutcome::TransientFailure
        );
        assert_eq!(
            DeliveryError::permanent("401").outcome(),
            AttemptOutcome::PermanentFailure
        );
        assert_eq!(
            DeliveryError::channel_down("refused").outcome(),
            AttemptOutcome::ChannelUnavailable
        );
        assert!(!AttemptOutcome::ChannelUnavailable.is_failure());
    }

    #[test]
    fn edit_rate_is_rolling() {
        let mut trust = TrustState::new("ch", CampaignKind::Recurring);
        assert_eq!(trust.edit_rate(), 0.0);
        trust.push_review(true, 4);
        trust.push_review(false, 4);
        trust.push_review(false, 4);
        trust.push_review(false, 4);
        assert!((trust.edit_rate() - 0.25).abs() < f64::EPSILON);
        // The edit falls out of the window.
        trust.push_review(false, 4);
        assert_eq!(trust.edit_rate(), 0.0);
        assert_eq!(trust.review_window.len(), 4);
    }

    #[test]
    fn demote_resets_earned_counters() {
        let mut trust = TrustState::new("ch", CampaignKind::Recurring);
        trust.tier = TrustTier::FullAutopilot;
        trust.consecutive_clean_approvals = 40;
        trust.auto_cleared_edits = 2;
        trust.demote("safety breach");
        assert_eq!(trust.tier, TrustTier::Manual);
        assert_eq!(trust.consecutive_clean_approvals, 0);
        assert_eq!(trust.auto_cleared_edits, 0);
        assert_eq!(trust.last_demotion_reason.as_deref(), Some("safety breach"));
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(TrustTier::Manual < TrustTier::SmartAutopilot);
        assert_eq!(TrustTier::Manual.next(), Some(TrustTier::SmartAutopilot));
        assert_eq!(TrustTier::FullAutopilot.next(), None);
    }
}
