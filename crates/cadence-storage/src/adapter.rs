// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the PublishStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use cadence_config::model::StorageConfig;
use cadence_core::{
    AdapterType, CadenceError, CampaignKind, ChannelAuditEntry, ChannelState, ClaimLease,
    HealthStatus, ItemFilter, ItemStatus, OutcomeSignal, PluginAdapter, PublishAttempt, PublishStore,
    ScheduledItem, SignalSummary,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed publish store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call
/// to [`PublishStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new store with the given configuration.
    ///
    /// The database connection is not opened until [`PublishStore::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, CadenceError> {
        self.db.get().ok_or_else(|| CadenceError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), CadenceError> {
        if !self.config.wal_mode {
            return Ok(());
        }
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CadenceError> {
        if self.db.get().is_some() {
            self.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PublishStore for SqliteStore {
    async fn initialize(&self) -> Result<(), CadenceError> {
        let db = Database::open(&self.config).await?;
        self.db.set(db).map_err(|_| CadenceError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CadenceError> {
        self.checkpoint().await
    }

    // --- items ---

    async fn insert_item(&self, item: &ScheduledItem) -> Result<(), CadenceError> {
        queries::items::insert_item(self.db()?, item).await
    }

    async fn get_item(&self, id: &str) -> Result<Option<ScheduledItem>, CadenceError> {
        queries::items::get_item(self.db()?, id).await
    }

    async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ScheduledItem>, CadenceError> {
        queries::items::list_items(self.db()?, filter).await
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        instance_id: &str,
        limit: usize,
    ) -> Result<Vec<ScheduledItem>, CadenceError> {
        queries::items::claim_due(self.db()?, now, instance_id, limit).await
    }

    async fn compare_and_set(
        &self,
        item: &ScheduledItem,
        expected: ItemStatus,
    ) -> Result<bool, CadenceError> {
        queries::items::compare_and_set(self.db()?, item, expected, None).await
    }

    async fn compare_and_set_leased(
        &self,
        item: &ScheduledItem,
        expected: ItemStatus,
        lease: &ClaimLease,
    ) -> Result<bool, CadenceError> {
        queries::items::compare_and_set(self.db()?, item, expected, Some(lease)).await
    }

    async fn stale_items(
        &self,
        status: ItemStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScheduledItem>, CadenceError> {
        queries::items::stale_items(self.db()?, status, cutoff).await
    }

    // --- attempts ---

    async fn append_attempt(&self, attempt: &PublishAttempt) -> Result<i64, CadenceError> {
        queries::attempts::append_attempt(self.db()?, attempt).await
    }

    async fn attempts_for(&self, item_id: &str) -> Result<Vec<PublishAttempt>, CadenceError> {
        queries::attempts::attempts_for(self.db()?, item_id).await
    }

    async fn recent_attempts(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<PublishAttempt>, CadenceError> {
        queries::attempts::recent_attempts(self.db()?, channel_id, limit).await
    }

    // --- channels ---

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelState>, CadenceError> {
        queries::channels::get_channel(self.db()?, channel_id).await
    }

    async fn ensure_channel(
        &self,
        channel_id: &str,
        campaign: CampaignKind,
        now: DateTime<Utc>,
    ) -> Result<ChannelState, CadenceError> {
        queries::channels::ensure_channel(self.db()?, channel_id, campaign, now).await
    }

    async fn save_channel(
        &self,
        state: &ChannelState,
        expected_version: i64,
    ) -> Result<bool, CadenceError> {
        queries::channels::save_channel(self.db()?, state, expected_version).await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelState>, CadenceError> {
        queries::channels::list_channels(self.db()?).await
    }

    async fn append_channel_audit(&self, entry: &ChannelAuditEntry) -> Result<i64, CadenceError> {
        queries::channels::append_channel_audit(self.db()?, entry).await
    }

    async fn channel_audit(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<ChannelAuditEntry>, CadenceError> {
        queries::channels::channel_audit(self.db()?, channel_id, limit).await
    }

    // --- outcome signals ---

    async fn record_signal(&self, signal: &OutcomeSignal) -> Result<(), CadenceError> {
        queries::signals::record_signal(self.db()?, signal).await
    }

    async fn recent_signal_summaries(
        &self,
        channel_id: &str,
        window: usize,
    ) -> Result<Vec<SignalSummary>, CadenceError> {
        queries::signals::recent_signal_summaries(self.db()?, channel_id, window).await
    }
}
