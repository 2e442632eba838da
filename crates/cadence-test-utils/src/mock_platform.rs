// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock platform adapter for deterministic testing.
//!
//! `MockPlatform` implements `PlatformAdapter` with scripted results,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cadence_core::traits::adapter::PluginAdapter;
use cadence_core::traits::platform::PlatformAdapter;
use cadence_core::types::{
    AdapterType, DeliveryError, DeliveryReceipt, DeliveryRequest, HealthStatus, TargetPlatform,
};
use cadence_core::CadenceError;

/// One scripted delivery result.
#[derive(Debug, Clone)]
pub enum ScriptedDelivery {
    /// Succeed with a generated external id.
    Succeed,
    /// Succeed with this external id.
    SucceedWith(String),
    Fail(DeliveryError),
    /// Sleep before succeeding (drives delivery timeouts).
    Hang(Duration),
}

/// A platform adapter that pops results from a FIFO queue.
///
/// When the queue is empty every delivery succeeds.
pub struct MockPlatform {
    target: TargetPlatform,
    script: Arc<Mutex<VecDeque<ScriptedDelivery>>>,
    delivered: Arc<Mutex<Vec<DeliveryRequest>>>,
    health: Arc<Mutex<HealthStatus>>,
    sequence: AtomicU64,
}

impl MockPlatform {
    pub fn new(target: TargetPlatform) -> Self {
        Self {
            target,
            script: Arc::new(Mutex::new(VecDeque::new())),
            delivered: Arc::new(Mutex::new(Vec::new())),
            health: Arc::new(Mutex::new(HealthStatus::Healthy)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Queue one result.
    pub async fn push(&self, result: ScriptedDelivery) {
        self.script.lock().await.push_back(result);
    }

    /// Queue `n` copies of `error`.
    pub async fn fail_times(&self, n: usize, error: DeliveryError) {
        let mut script = self.script.lock().await;
        for _ in 0..n {
            script.push_back(ScriptedDelivery::Fail(error.clone()));
        }
    }

    pub async fn set_health(&self, status: HealthStatus) {
        *self.health.lock().await = status;
    }

    /// Every request that reached `deliver`, in order.
    pub async fn deliveries(&self) -> Vec<DeliveryRequest> {
        self.delivered.lock().await.clone()
    }

    pub async fn delivery_count(&self) -> usize {
        self.delivered.lock().await.len()
    }

    /// Deliveries made for one item.
    pub async fn deliveries_for(&self, item_id: &str) -> usize {
        self.delivered
            .lock()
            .await
            .iter()
            .filter(|r| r.item_id == item_id)
            .count()
    }

    fn next_external_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{n}", self.target)
    }
}

#[async_trait]
impl PluginAdapter for MockPlatform {
    fn name(&self) -> &str {
        "mock-platform"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }

    async fn health_check(&self) -> Result<HealthStatus, CadenceError> {
        Ok(self.health.lock().await.clone())
    }

    async fn shutdown(&self) -> Result<(), CadenceError> {
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for MockPlatform {
    fn target(&self) -> TargetPlatform {
        self.target
    }

    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        self.delivered.lock().await.push(request.clone());
        let next = self.script.lock().await.pop_front();
        match next {
            None | Some(ScriptedDelivery::Succeed) => Ok(DeliveryReceipt {
                external_id: self.next_external_id(),
            }),
            Some(ScriptedDelivery::SucceedWith(external_id)) => Ok(DeliveryReceipt { external_id }),
            Some(ScriptedDelivery::Fail(error)) => Err(error),
            Some(ScriptedDelivery::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(DeliveryReceipt {
                    external_id: self.next_external_id(),
                })
            }
        }
    }
}
