// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable store trait for items, attempts, channel state, and signals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CadenceError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    CampaignKind, ChannelAuditEntry, ChannelState, ClaimLease, ItemFilter, ItemStatus,
    OutcomeSignal, PublishAttempt, ScheduledItem, SignalSummary,
};

/// Persistence backend for the publishing engine.
///
/// Item status changes go through [`claim_due`](Self::claim_due) or
/// [`compare_and_set`](Self::compare_and_set); both are conditional on the
/// status the caller last observed, so concurrent instances never both win.
/// Attempts and channel audit entries are append-only.
#[async_trait]
pub trait PublishStore: PluginAdapter {
    /// Initializes the backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), CadenceError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), CadenceError>;

    // --- items ---

    async fn insert_item(&self, item: &ScheduledItem) -> Result<(), CadenceError>;

    async fn get_item(&self, id: &str) -> Result<Option<ScheduledItem>, CadenceError>;

    /// Items ordered by `scheduled_at`, optionally filtered.
    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ScheduledItem>, CadenceError>;

    /// Atomically moves up to `limit` due `scheduled` items on active channels
    /// to `claimed` and returns the ones this caller won.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        instance_id: &str,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>, CadenceError>;

    /// Writes `item` only if the stored status still equals `expected`.
    ///
    /// Returns `false` when another writer moved the item first.
    async fn compare_and_set(
        &self,
        item: &ScheduledItem,
        expected: ItemStatus,
    ) -> Result<bool, CadenceError>;

    /// [`compare_and_set`](Self::compare_and_set) that also requires the
    /// stored claim to still be `lease`.
    ///
    /// Returns `false` when the item was recovered or reclaimed meanwhile.
    async fn compare_and_set_leased(
        &self,
        item: &ScheduledItem,
        expected: ItemStatus,
        lease: &ClaimLease,
    ) -> Result<bool, CadenceError>;

    /// Items in `status` whose claim is older than `cutoff`.
    async fn stale_items(
        &self,
        status: ItemStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScheduledItem>, CadenceError>;

    // --- attempts ---

    /// Appends an attempt and returns its sequence number.
    async fn append_attempt(&self, attempt: &PublishAttempt) -> Result<i64, CadenceError>;

    /// All attempts for one item, oldest first.
    async fn attempts_for(&self, item_id: &str) -> Result<Vec<PublishAttempt>, CadenceError>;

    /// The channel's most recent item-level attempts, newest first.
    /// Channel-unavailable holds are excluded.
    async fn recent_attempts(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<PublishAttempt>, CadenceError>;

    // --- channels ---

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelState>, CadenceError>;

    /// Returns the channel, creating it in `manual`/`active` if absent.
    async fn ensure_channel(
        &self,
        channel_id: &str,
        campaign: CampaignKind,
        now: DateTime<Utc>,
    ) -> Result<ChannelState, CadenceError>;

    /// Writes `state` only if the stored version equals `expected_version`.
    /// The stored version becomes `expected_version + 1`.
    async fn save_channel(
        &self,
        state: &ChannelState,
        expected_version: i64,
    ) -> Result<bool, CadenceError>;

    async fn list_channels(&self) -> Result<Vec<ChannelState>, CadenceError>;

    async fn append_channel_audit(&self, entry: &ChannelAuditEntry) -> Result<i64, CadenceError>;

    /// Audit entries for a channel, newest first.
    async fn channel_audit(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<ChannelAuditEntry>, CadenceError>;

    // --- outcome signals ---

    async fn record_signal(&self, signal: &OutcomeSignal) -> Result<(), CadenceError>;

    /// Signal counts for the channel's `window` most recently published items,
    /// newest first.
    async fn recent_signal_summaries(
        &self,
        channel_id: &str,
        window: usize,
    ) -> Result<Vec<SignalSummary>, CadenceError>;
}
