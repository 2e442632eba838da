// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete engine with mock platforms, a temp
//! SQLite database, and a manual clock. Tests drive it by scheduling items,
//! advancing the clock, and calling `tick()`.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_config::CadenceConfig;
use cadence_core::{
    CadenceError, CampaignKind, PublishStore, QualitySignal, ScheduleRequest, ScheduledItem,
    TargetPlatform,
};
use cadence_engine::{AdapterRegistry, EngineContext, PublishingEngine, TickReport};
use cadence_storage::SqliteStore;

use crate::clock::ManualClock;
use crate::mock_platform::MockPlatform;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: CadenceConfig,
    clock: ManualClock,
    targets: Vec<TargetPlatform>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = CadenceConfig::default();
        config.engine.instance_id = Some("test-a".into());
        Self {
            config,
            clock: ManualClock::fixed(),
            targets: vec![TargetPlatform::SocialPost, TargetPlatform::EmailSend],
        }
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, edit: impl FnOnce(&mut CadenceConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Only register mock platforms for these targets.
    pub fn with_targets(mut self, targets: &[TargetPlatform]) -> Self {
        self.targets = targets.to_vec();
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, CadenceError> {
        let temp_dir = tempfile::TempDir::new().map_err(CadenceError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage.database_path = db_path.to_string_lossy().to_string();

        let platforms: HashMap<TargetPlatform, Arc<MockPlatform>> = self
            .targets
            .iter()
            .map(|t| (*t, Arc::new(MockPlatform::new(*t))))
            .collect();

        let engine = engine_for(&config, &platforms, &self.clock).await?;

        Ok(TestHarness {
            engine,
            config,
            clock: self.clock,
            platforms,
            _temp_dir: temp_dir,
        })
    }
}

async fn engine_for(
    config: &CadenceConfig,
    platforms: &HashMap<TargetPlatform, Arc<MockPlatform>>,
    clock: &ManualClock,
) -> Result<PublishingEngine, CadenceError> {
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    let store: Arc<dyn PublishStore> = Arc::new(store);

    let mut adapters = AdapterRegistry::new();
    for platform in platforms.values() {
        adapters.register(platform.clone());
    }

    let ctx = EngineContext::new(store, adapters, config.clone()).with_clock(clock.clock());
    Ok(PublishingEngine::new(ctx))
}

/// A complete test environment with mock platforms and temp storage.
pub struct TestHarness {
    pub engine: PublishingEngine,
    pub config: CadenceConfig,
    pub clock: ManualClock,
    pub platforms: HashMap<TargetPlatform, Arc<MockPlatform>>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default configuration.
    pub async fn new() -> Result<Self, CadenceError> {
        Self::builder().build().await
    }

    /// The mock platform for `target`.
    ///
    /// # Panics
    ///
    /// If the harness was built without that target.
    pub fn platform(&self, target: TargetPlatform) -> Arc<MockPlatform> {
        match self.platforms.get(&target) {
            Some(platform) => platform.clone(),
            None => panic!("harness has no mock platform for {target}"),
        }
    }

    pub fn social(&self) -> Arc<MockPlatform> {
        self.platform(TargetPlatform::SocialPost)
    }

    /// A second engine instance on the same database, sharing clock and platforms.
    pub async fn second_instance(&self, instance_id: &str) -> Result<PublishingEngine, CadenceError> {
        let mut config = self.config.clone();
        config.engine.instance_id = Some(instance_id.to_string());
        engine_for(&config, &self.platforms, &self.clock).await
    }

    /// A request for a recurring social post due `in_secs` from now.
    pub fn request(&self, channel_id: &str, in_secs: i64) -> ScheduleRequest {
        ScheduleRequest {
            payload_ref: format!("content://{channel_id}/{in_secs}"),
            channel_id: channel_id.to_string(),
            target: TargetPlatform::SocialPost,
            scheduled_at: self.clock.now() + chrono::Duration::seconds(in_secs),
            max_retries: None,
            campaign: CampaignKind::Recurring,
            quality: QualitySignal::Passed,
        }
    }

    /// Schedule a recurring social post due `in_secs` from now.
    pub async fn schedule(&self, channel_id: &str, in_secs: i64) -> Result<ScheduledItem, CadenceError> {
        self.engine.schedule(self.request(channel_id, in_secs)).await
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }

    pub async fn tick(&self) -> Result<TickReport, CadenceError> {
        self.engine.tick().await
    }
}
