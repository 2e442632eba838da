// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit engine context shared by the dispatcher, workers and commands.
//!
//! Several contexts can live in one process (tests, multiple engines); nothing
//! here is global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cadence_config::CadenceConfig;
use cadence_core::{CadenceError, PlatformAdapter, PublishStore, TargetPlatform};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::events::EventBus;
use crate::retry::RetryPolicy;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Platform adapters keyed by the target they serve.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<TargetPlatform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own target, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.target(), adapter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, target: TargetPlatform) -> Result<Arc<dyn PlatformAdapter>, CadenceError> {
        self.adapters
            .get(&target)
            .cloned()
            .ok_or_else(|| CadenceError::AdapterNotFound {
                target: target.to_string(),
            })
    }

    pub fn contains(&self, target: TargetPlatform) -> bool {
        self.adapters.contains_key(&target)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn PlatformAdapter>> {
        self.adapters.values()
    }
}

/// Per-channel async mutexes. Trust and pause writes for one channel
/// hold the channel's lock; different channels never contend.
#[derive(Default)]
pub struct ChannelLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChannelLocks {
    pub async fn lock(&self, channel_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

/// Everything a scheduler or worker instance needs.
pub struct EngineContext {
    pub store: Arc<dyn PublishStore>,
    pub adapters: AdapterRegistry,
    pub config: CadenceConfig,
    pub events: EventBus,
    pub locks: ChannelLocks,
    pub instance_id: String,
    clock: Clock,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn PublishStore>,
        adapters: AdapterRegistry,
        config: CadenceConfig,
    ) -> Self {
        let instance_id = config.engine.resolved_instance_id();
        Self {
            store,
            adapters,
            config,
            events: EventBus::default(),
            locks: ChannelLocks::default(),
            instance_id,
            clock: system_clock(),
        }
    }

    /// Replace the clock (tests drive time manually).
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.retry)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.config.engine.delivery_timeout_secs)
    }

    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config.engine.claim_lease_secs as i64)
    }
}
