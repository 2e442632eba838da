// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler/dispatcher loop.
//!
//! Each tick recovers stale claims, supervises reconnecting channels, claims
//! due items, routes them through the trust gate and executes the ones that
//! may run unattended, up to `max_concurrent_deliveries` at a time.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{CadenceError, ItemStatus, ScheduledItem};
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::events::EngineEvent;
use crate::metrics;
use crate::reconnect::{self, ReconnectReport};
use crate::recovery::{self, RecoveryReport};
use crate::trust::{self, GateDecision};
use crate::worker::{self, ExecutionOutcome};

/// Summary of one dispatcher tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub recovery: RecoveryReport,
    pub reconnect: ReconnectReport,
    pub claimed: usize,
    pub awaiting_approval: usize,
    pub released: usize,
    pub executions: Vec<(String, ExecutionOutcome)>,
}

impl TickReport {
    pub fn published(&self) -> usize {
        self.executions
            .iter()
            .filter(|(_, o)| matches!(o, ExecutionOutcome::Published { .. }))
            .count()
    }
}

/// Where a freshly claimed item goes before any delivery starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Run,
    AwaitingApproval,
    Released,
    /// Another writer moved the item.
    Lost,
}

/// Send a claimed item through the trust gate.
///
/// On error the item keeps its claim and `item` may hold a partial update;
/// the caller releases it.
async fn route(ctx: &EngineContext, item: &mut ScheduledItem) -> Result<Route, CadenceError> {
    let channel = ctx.store.get_channel(&item.channel_id).await?;
    let Some(channel) = channel.filter(|c| c.is_dispatchable()) else {
        return Ok(if worker::release(ctx, item).await? {
            Route::Released
        } else {
            Route::Lost
        });
    };

    match trust::gate(item, &channel.trust) {
        GateDecision::AutoExecute => Ok(Route::Run),
        GateDecision::RequireApproval(reason) => {
            let lease = item.lease();
            item.status = ItemStatus::PendingApproval;
            item.updated_at = ctx.now();
            let moved = match &lease {
                Some(lease) => {
                    ctx.store
                        .compare_and_set_leased(item, ItemStatus::Claimed, lease)
                        .await?
                }
                None => ctx.store.compare_and_set(item, ItemStatus::Claimed).await?,
            };
            if !moved {
                return Ok(Route::Lost);
            }
            metrics::record_approval_required(&item.channel_id);
            debug!(item_id = %item.id, %reason, "item awaiting approval");
            ctx.events.publish(EngineEvent::ApprovalRequired {
                item_id: item.id.clone(),
                channel_id: item.channel_id.clone(),
                reason: reason.to_string(),
            });
            Ok(Route::AwaitingApproval)
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<EngineContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Run one dispatch pass.
    pub async fn tick(&self) -> Result<TickReport, CadenceError> {
        let ctx = self.ctx.as_ref();
        let mut report = TickReport {
            recovery: recovery::recover_stale(ctx).await?,
            reconnect: reconnect::supervise(ctx).await?,
            ..TickReport::default()
        };

        let claimed = ctx
            .store
            .claim_due(
                ctx.now(),
                &ctx.instance_id,
                ctx.config.engine.claim_batch_size,
            )
            .await?;
        report.claimed = claimed.len();
        if claimed.is_empty() {
            return Ok(report);
        }
        metrics::record_claimed(claimed.len());

        let mut runnable: Vec<ScheduledItem> = Vec::with_capacity(claimed.len());
        for mut item in claimed {
            match route(ctx, &mut item).await {
                Ok(Route::Run) => runnable.push(item),
                Ok(Route::AwaitingApproval) => report.awaiting_approval += 1,
                Ok(Route::Released) => report.released += 1,
                Ok(Route::Lost) => {}
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "routing failed, releasing claim");
                    item.status = ItemStatus::Claimed;
                    match worker::release(ctx, &mut item).await {
                        Ok(true) => report.released += 1,
                        Ok(false) => {}
                        Err(e) => warn!(
                            item_id = %item.id,
                            error = %e,
                            "release failed, claim left to expire"
                        ),
                    }
                }
            }
        }

        let concurrency = ctx.config.engine.max_concurrent_deliveries.max(1);
        let results: Vec<(String, Result<ExecutionOutcome, CadenceError>)> =
            stream::iter(runnable)
                .map(|item| async move {
                    let id = item.id.clone();
                    (id, worker::execute(ctx, item, true).await)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        for (item_id, result) in results {
            match result {
                Ok(outcome) => report.executions.push((item_id, outcome)),
                Err(e) => warn!(%item_id, error = %e, "execution failed"),
            }
        }
        Ok(report)
    }

    /// Tick until `cancel` fires. An in-flight tick always finishes.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(self.ctx.config.engine.tick_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            instance_id = %self.ctx.instance_id,
            tick_secs = period.as_secs(),
            "dispatcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.tick().await {
                Ok(report) if report.claimed > 0 || report.recovery.total() > 0 => {
                    info!(
                        claimed = report.claimed,
                        awaiting_approval = report.awaiting_approval,
                        executed = report.executions.len(),
                        published = report.published(),
                        recovered = report.recovery.total(),
                        "dispatch tick"
                    );
                }
                Ok(_) => debug!("dispatch tick: nothing due"),
                Err(e) => {
                    metrics::record_tick_skipped();
                    warn!(error = %e, "dispatch tick skipped");
                }
            }
        }

        info!("dispatcher stopped");
    }
}
