// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end engine scenarios over a temp SQLite store and mock platforms.

use cadence_core::{
    AttemptOutcome, CampaignKind, ChannelAction, ChannelStatus, DeliveryError, HealthStatus,
    ItemFilter, ItemStatus, QualitySignal, ReviewDecision, SafetyMetric, TargetPlatform,
    TrustTier,
};
use cadence_engine::{EngineEvent, ExecutionOutcome, PublishingEngine};
use cadence_test_utils::{ScriptedDelivery, TestHarness};

async fn autopilot(engine: &PublishingEngine, channel_id: &str) {
    engine
        .register_channel(channel_id, CampaignKind::Recurring)
        .await
        .unwrap();
    engine
        .set_tier(channel_id, TrustTier::FullAutopilot, "ops")
        .await
        .unwrap();
}

async fn assert_external_id_invariant(engine: &PublishingEngine) {
    for item in engine.list_items(&ItemFilter::default()).await.unwrap() {
        assert_eq!(
            item.external_id.is_some(),
            item.status == ItemStatus::Published,
            "item {} in {}",
            item.id,
            item.status
        );
    }
}

async fn assert_attempts_serialized(engine: &PublishingEngine, item_id: &str) {
    let attempts = engine.status(item_id).await.unwrap().attempts;
    for pair in attempts.windows(2) {
        assert!(pair[0].finished_at <= pair[1].started_at);
    }
}

#[tokio::test]
async fn success_on_first_call_publishes() {
    let h = TestHarness::new().await.unwrap();
    autopilot(&h.engine, "weekly").await;

    let mut request = h.request("weekly", 60);
    request.max_retries = Some(3);
    let item = h.engine.schedule(request).await.unwrap();

    let early = h.tick().await.unwrap();
    assert_eq!(early.claimed, 0);

    h.advance_secs(60);
    let report = h.tick().await.unwrap();
    assert_eq!(report.published(), 1);

    let status = h.engine.status(&item.id).await.unwrap();
    assert_eq!(status.item.status, ItemStatus::Published);
    assert_eq!(status.item.external_id.as_deref(), Some("social-post-1"));
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(status.attempts[0].external_id.as_deref(), Some("social-post-1"));
    assert_external_id_invariant(&h.engine).await;
}

#[tokio::test]
async fn three_transient_failures_then_success() {
    let h = TestHarness::builder()
        .with_config(|c| c.safety.max_failure_rate = 0.5)
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    h.social()
        .fail_times(3, DeliveryError::transient("429 too many requests"))
        .await;

    let item = h.schedule("weekly", 0).await.unwrap();

    h.tick().await.unwrap();
    for backoff in [30, 60, 120] {
        let current = h.engine.status(&item.id).await.unwrap().item;
        assert_eq!(current.status, ItemStatus::Scheduled);
        assert_eq!(current.scheduled_at, h.clock.now() + chrono::Duration::seconds(backoff));

        // Not due one second early.
        h.advance_secs(backoff - 1);
        assert_eq!(h.tick().await.unwrap().claimed, 0);
        h.advance_secs(1);
        h.tick().await.unwrap();
    }

    let status = h.engine.status(&item.id).await.unwrap();
    assert_eq!(status.item.status, ItemStatus::Published);
    assert_eq!(status.attempts.len(), 4);
    let numbers: Vec<u32> = status.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(status.item.attempt_count, 4);
    assert_attempts_serialized(&h.engine, &item.id).await;
}

#[tokio::test]
async fn retries_exhausted_after_max_retries() {
    let h = TestHarness::builder()
        .with_config(|c| c.safety.max_failure_rate = 0.5)
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    h.social()
        .fail_times(10, DeliveryError::transient("503"))
        .await;

    let mut request = h.request("weekly", 0);
    request.max_retries = Some(2);
    let item = h.engine.schedule(request).await.unwrap();

    for _ in 0..6 {
        h.tick().await.unwrap();
        h.advance_secs(3600);
    }

    let status = h.engine.status(&item.id).await.unwrap();
    assert_eq!(status.item.status, ItemStatus::Failed);
    assert_eq!(status.attempts.len(), 3);
    assert!(
        status
            .item
            .last_error
            .as_deref()
            .unwrap()
            .contains("retries exhausted")
    );
    assert_eq!(h.social().delivery_count().await, 3);
    assert_external_id_invariant(&h.engine).await;
}

#[tokio::test]
async fn permanent_failure_is_terminal() {
    let h = TestHarness::new().await.unwrap();
    autopilot(&h.engine, "weekly").await;
    h.social()
        .push(ScriptedDelivery::Fail(DeliveryError::permanent("401 token revoked")))
        .await;
    let item = h.schedule("weekly", 0).await.unwrap();

    let report = h.tick().await.unwrap();
    assert!(matches!(
        report.executions[0].1,
        ExecutionOutcome::Failed { ref reason } if reason.contains("401")
    ));
    let status = h.engine.status(&item.id).await.unwrap();
    assert_eq!(status.item.status, ItemStatus::Failed);
    assert_eq!(status.item.attempt_count, 1);
}

#[tokio::test]
async fn outage_beyond_ceiling_pauses_and_holds_items() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.engine.max_concurrent_deliveries = 1;
            c.reconnect.interval_secs = 60;
            c.reconnect.ceiling_secs = 300;
        })
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    let social = h.social();
    social
        .push(ScriptedDelivery::Fail(DeliveryError::channel_down(
            "connection refused",
        )))
        .await;
    social
        .set_health(HealthStatus::Unhealthy("connection refused".into()))
        .await;

    let mut items = Vec::new();
    for _ in 0..3 {
        items.push(h.schedule("weekly", 0).await.unwrap());
    }

    // The first delivery reports the outage; the rest of the batch is released.
    let report = h.tick().await.unwrap();
    let held = report
        .executions
        .iter()
        .filter(|(_, o)| *o == ExecutionOutcome::Held)
        .count();
    assert_eq!(held, 1);
    assert_eq!(social.delivery_count().await, 1);
    assert_eq!(
        h.engine.channel("weekly").await.unwrap().status,
        ChannelStatus::Reconnecting
    );

    for _ in 0..4 {
        h.advance_secs(60);
        let report = h.tick().await.unwrap();
        assert_eq!(report.claimed, 0);
        assert_eq!(report.reconnect.probed, 1);
    }

    h.advance_secs(60);
    let report = h.tick().await.unwrap();
    assert_eq!(report.reconnect.paused, 1);
    let channel = h.engine.channel("weekly").await.unwrap();
    assert_eq!(channel.status, ChannelStatus::AutoPaused);
    // An outage is not a trust problem.
    assert_eq!(channel.trust.tier, TrustTier::FullAutopilot);

    // Recovered platform does not self-resume the channel.
    social.set_health(HealthStatus::Healthy).await;
    h.advance_secs(600);
    assert_eq!(h.tick().await.unwrap().claimed, 0);

    let mut unavailable = 0;
    for item in &items {
        let status = h.engine.status(&item.id).await.unwrap();
        assert_eq!(status.item.status, ItemStatus::Scheduled);
        assert_eq!(status.item.attempt_count, 0);
        unavailable += status
            .attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::ChannelUnavailable)
            .count();
    }
    assert_eq!(unavailable, 1);

    h.engine.resume("weekly", "ops@example.com").await.unwrap();
    let report = h.tick().await.unwrap();
    assert_eq!(report.published(), 3);
    assert_eq!(social.delivery_count().await, 4);

    let actions: Vec<ChannelAction> = h
        .engine
        .channel_audit("weekly", 20)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        &actions[..3],
        &[
            ChannelAction::Resumed,
            ChannelAction::Paused,
            ChannelAction::Disconnected
        ]
    );
}

#[tokio::test]
async fn probe_success_reconnects_before_ceiling() {
    let h = TestHarness::new().await.unwrap();
    autopilot(&h.engine, "weekly").await;
    h.social()
        .push(ScriptedDelivery::Fail(DeliveryError::channel_down("dns failure")))
        .await;
    let item = h.schedule("weekly", 0).await.unwrap();
    h.tick().await.unwrap();

    h.advance_secs(h.config.reconnect.interval_secs as i64);
    let report = h.tick().await.unwrap();
    assert_eq!(report.reconnect.reconnected, 1);
    // Reconnected in the same tick, so the held item goes out right away.
    assert_eq!(report.published(), 1);
    assert_eq!(
        h.engine.status(&item.id).await.unwrap().item.status,
        ItemStatus::Published
    );
}

#[tokio::test]
async fn third_failure_in_window_pauses_on_that_attempt() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.engine.claim_batch_size = 1;
            c.safety.window_size = 10;
            c.safety.max_failure_rate = 0.2;
        })
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    let mut events = h.engine.subscribe();
    h.social()
        .fail_times(3, DeliveryError::permanent("content rejected"))
        .await;

    let mut items = Vec::new();
    for i in 0..5 {
        items.push(h.schedule("weekly", i).await.unwrap());
    }
    h.advance_secs(5);

    h.tick().await.unwrap();
    h.tick().await.unwrap();
    let channel = h.engine.channel("weekly").await.unwrap();
    assert_eq!(channel.status, ChannelStatus::Active);
    assert_eq!(channel.trust.tier, TrustTier::FullAutopilot);

    h.tick().await.unwrap();
    let channel = h.engine.channel("weekly").await.unwrap();
    assert_eq!(channel.status, ChannelStatus::AutoPaused);
    assert_eq!(channel.trust.tier, TrustTier::Manual);

    // Dispatch stops; remaining items stay scheduled.
    assert_eq!(h.tick().await.unwrap().claimed, 0);
    for item in &items[3..] {
        assert_eq!(
            h.engine.status(&item.id).await.unwrap().item.status,
            ItemStatus::Scheduled
        );
    }

    let mut breach = None;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::ChannelPaused { breach: b, .. } = event {
            breach = b;
        }
    }
    let breach = breach.expect("pause alert carries the diagnostic");
    assert_eq!(breach.metric, SafetyMetric::FailureRate);
    assert_eq!(breach.triggering_items.len(), 3);
    assert!(breach.triggering_items.contains(&items[2].id));

    let audit = h.engine.channel_audit("weekly", 1).await.unwrap();
    assert_eq!(audit[0].action, ChannelAction::Paused);
    assert_eq!(audit[0].detail["breach"]["metric"], "failure_rate");
}

#[tokio::test]
async fn resume_restarts_the_safety_window() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.claim_batch_size = 1)
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    h.social()
        .fail_times(4, DeliveryError::permanent("rejected"))
        .await;
    for i in 0..4 {
        h.schedule("weekly", i).await.unwrap();
    }
    h.advance_secs(4);
    for _ in 0..3 {
        h.tick().await.unwrap();
    }
    assert_eq!(
        h.engine.channel("weekly").await.unwrap().status,
        ChannelStatus::AutoPaused
    );

    h.engine.resume("weekly", "ops").await.unwrap();
    h.engine
        .set_tier("weekly", TrustTier::FullAutopilot, "ops")
        .await
        .unwrap();
    h.advance_secs(1);
    h.tick().await.unwrap();
    // One failure after the resume is within limits again.
    assert_eq!(
        h.engine.channel("weekly").await.unwrap().status,
        ChannelStatus::Active
    );
}

#[tokio::test]
async fn one_shot_item_needs_approval_on_full_autopilot() {
    let h = TestHarness::new().await.unwrap();
    autopilot(&h.engine, "weekly").await;
    let mut events = h.engine.subscribe();

    let mut request = h.request("weekly", 0);
    request.campaign = CampaignKind::OneShot;
    let item = h.engine.schedule(request).await.unwrap();

    let report = h.tick().await.unwrap();
    assert_eq!(report.awaiting_approval, 1);
    assert!(report.executions.is_empty());
    assert_eq!(
        h.engine.status(&item.id).await.unwrap().item.status,
        ItemStatus::PendingApproval
    );
    assert!(matches!(
        events.try_recv().unwrap(),
        EngineEvent::ApprovalRequired { ref item_id, .. } if *item_id == item.id
    ));
    assert_eq!(h.social().delivery_count().await, 0);

    let outcome = h
        .engine
        .review(&item.id, ReviewDecision::Approve, "editor")
        .await
        .unwrap();
    assert!(matches!(
        outcome.execution,
        Some(ExecutionOutcome::Published { .. })
    ));
    assert_eq!(outcome.item.status, ItemStatus::Published);
    assert!(!outcome.item.auto_cleared);
}

#[tokio::test]
async fn approvals_promote_and_auto_cleared_edits_demote() {
    let h = TestHarness::builder()
        .with_config(|c| {
            c.trust.smart_min_clean_approvals = 2;
            c.trust.full_min_clean_approvals = 4;
            c.trust.auto_cleared_edit_limit = 1;
        })
        .build()
        .await
        .unwrap();

    // Manual: every item waits for a human.
    for _ in 0..2 {
        let item = h.schedule("weekly", 0).await.unwrap();
        assert_eq!(h.tick().await.unwrap().awaiting_approval, 1);
        h.engine
            .review(&item.id, ReviewDecision::Approve, "editor")
            .await
            .unwrap();
    }
    let channel = h.engine.channel("weekly").await.unwrap();
    assert_eq!(channel.trust.tier, TrustTier::SmartAutopilot);
    assert_eq!(channel.trust.total_approvals, 2);

    // Smart: a passed item goes out alone, an unchecked one waits.
    let passed = h.schedule("weekly", 0).await.unwrap();
    let mut unchecked = h.request("weekly", 0);
    unchecked.quality = QualitySignal::Unknown;
    let unchecked = h.engine.schedule(unchecked).await.unwrap();
    let report = h.tick().await.unwrap();
    assert_eq!(report.published(), 1);
    assert_eq!(report.awaiting_approval, 1);
    let auto = h.engine.status(&passed.id).await.unwrap().item;
    assert!(auto.auto_cleared);
    assert_eq!(
        h.engine.status(&unchecked.id).await.unwrap().item.status,
        ItemStatus::PendingApproval
    );

    // A human correcting the auto-cleared item demotes the channel.
    let outcome = h
        .engine
        .review(&passed.id, ReviewDecision::Edit, "editor")
        .await
        .unwrap();
    assert!(outcome.tier_change.is_some());
    let channel = h.engine.channel("weekly").await.unwrap();
    assert_eq!(channel.trust.tier, TrustTier::Manual);
    assert_eq!(channel.trust.total_edits, 1);
}

#[tokio::test]
async fn edit_counts_against_edit_rate_even_when_approved() {
    let h = TestHarness::new().await.unwrap();
    let item = h.schedule("weekly", 0).await.unwrap();
    h.tick().await.unwrap();

    let outcome = h
        .engine
        .review(&item.id, ReviewDecision::Edit, "editor")
        .await
        .unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Published);
    let trust = h.engine.channel("weekly").await.unwrap().trust;
    assert_eq!(trust.total_edits, 1);
    assert_eq!(trust.consecutive_clean_approvals, 0);
    assert!((trust.edit_rate() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn reject_cancels_pending_item() {
    let h = TestHarness::new().await.unwrap();
    let item = h.schedule("weekly", 0).await.unwrap();
    h.tick().await.unwrap();

    let outcome = h
        .engine
        .review(&item.id, ReviewDecision::Reject, "editor")
        .await
        .unwrap();
    assert_eq!(outcome.item.status, ItemStatus::Cancelled);
    assert!(outcome.execution.is_none());
    assert_eq!(h.social().delivery_count().await, 0);

    let again = h
        .engine
        .review(&item.id, ReviewDecision::Approve, "editor")
        .await;
    assert!(again.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_approvals_count_once() {
    let h = TestHarness::new().await.unwrap();
    let item = h.schedule("weekly", 0).await.unwrap();
    assert_eq!(h.tick().await.unwrap().awaiting_approval, 1);
    h.social()
        .push(ScriptedDelivery::Hang(std::time::Duration::from_millis(200)))
        .await;

    let reviews: Vec<_> = ["editor-1", "editor-2"]
        .into_iter()
        .map(|reviewer| {
            let engine = h.engine.clone();
            let id = item.id.clone();
            tokio::spawn(async move { engine.review(&id, ReviewDecision::Approve, reviewer).await })
        })
        .collect();
    let mut results = Vec::new();
    for review in reviews {
        results.push(review.await.unwrap());
    }

    let won: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(won.len(), 1, "{results:?}");
    for lost in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(
                lost,
                cadence_core::CadenceError::InvalidTransition { .. }
                    | cadence_core::CadenceError::Rejected(_)
            ),
            "{lost:?}"
        );
    }

    let trust = h.engine.channel("weekly").await.unwrap().trust;
    assert_eq!(trust.total_approvals, 1);
    assert_eq!(trust.consecutive_clean_approvals, 1);
    assert_eq!(h.social().delivery_count().await, 1);
    assert_eq!(
        h.engine.status(&item.id).await.unwrap().item.status,
        ItemStatus::Published
    );
}

#[tokio::test]
async fn store_failure_mid_batch_releases_item_and_runs_the_rest() {
    let h = TestHarness::new().await.unwrap();
    autopilot(&h.engine, "autopilot").await;
    h.engine
        .register_channel("manual", CampaignKind::Recurring)
        .await
        .unwrap();

    // The manual item is claimed first, so its failure comes before the
    // autopilot item is routed.
    let manual = h.schedule("manual", 0).await.unwrap();
    let auto = h.schedule("autopilot", 10).await.unwrap();
    h.advance_secs(10);

    let db = rusqlite::Connection::open(&h.config.storage.database_path).unwrap();
    db.execute_batch(
        "CREATE TRIGGER fail_pending BEFORE UPDATE OF status ON scheduled_items
         WHEN NEW.status = 'pending_approval'
         BEGIN SELECT RAISE(ABORT, 'injected write failure'); END;",
    )
    .unwrap();

    let report = h.tick().await.unwrap();
    assert_eq!(report.claimed, 2);
    assert_eq!(report.released, 1);
    assert_eq!(report.awaiting_approval, 0);
    assert_eq!(report.published(), 1);
    assert_eq!(
        h.engine.status(&auto.id).await.unwrap().item.status,
        ItemStatus::Published
    );
    let held = h.engine.status(&manual.id).await.unwrap().item;
    assert_eq!(held.status, ItemStatus::Scheduled);
    assert!(held.claimed_by.is_none());

    // Next tick picks it straight back up.
    db.execute_batch("DROP TRIGGER fail_pending;").unwrap();
    let report = h.tick().await.unwrap();
    assert_eq!(report.awaiting_approval, 1);
    assert_eq!(
        h.engine.status(&manual.id).await.unwrap().item.status,
        ItemStatus::PendingApproval
    );
}

#[tokio::test]
async fn approval_on_paused_channel_is_refused() {
    let h = TestHarness::new().await.unwrap();
    let item = h.schedule("weekly", 0).await.unwrap();
    h.tick().await.unwrap();

    let breach = cadence_core::SafetyBreach {
        channel_id: "weekly".into(),
        metric: SafetyMetric::NegativeRate,
        observed: 0.5,
        limit: 0.2,
        window_size: 10,
        triggering_items: vec![],
        triggering_attempts: vec![],
        detected_at: h.clock.now(),
    };
    assert!(
        cadence_engine::channels::pause_for_breach(h.engine.context(), &breach)
            .await
            .unwrap()
    );

    let err = h
        .engine
        .review(&item.id, ReviewDecision::Approve, "editor")
        .await
        .unwrap_err();
    assert!(matches!(err, cadence_core::CadenceError::ChannelPaused { .. }));
    assert_eq!(
        h.engine.status(&item.id).await.unwrap().item.status,
        ItemStatus::PendingApproval
    );
}

#[tokio::test]
async fn cancel_only_while_scheduled() {
    let h = TestHarness::new().await.unwrap();
    let later = h.schedule("weekly", 600).await.unwrap();
    let cancelled = h.engine.cancel(&later.id).await.unwrap();
    assert_eq!(cancelled.status, ItemStatus::Cancelled);

    let pending = h.schedule("weekly", 0).await.unwrap();
    h.tick().await.unwrap();
    let err = h.engine.cancel(&pending.id).await.unwrap_err();
    assert!(matches!(
        err,
        cadence_core::CadenceError::InvalidTransition { .. }
    ));

    h.advance_secs(600);
    assert_eq!(h.tick().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn list_items_filters_by_channel_and_status() {
    let h = TestHarness::new().await.unwrap();
    let first = h.schedule("weekly", 120).await.unwrap();
    let second = h.schedule("weekly", 60).await.unwrap();
    let other = h.schedule("daily", 30).await.unwrap();
    h.engine.cancel(&first.id).await.unwrap();

    let weekly = h
        .engine
        .list_items(&ItemFilter {
            channel_id: Some("weekly".into()),
            ..ItemFilter::default()
        })
        .await
        .unwrap();
    let ids: Vec<&str> = weekly.iter().map(|i| i.id.as_str()).collect();
    // Ordered by scheduled time.
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

    let scheduled = h
        .engine
        .list_items(&ItemFilter {
            status: Some(ItemStatus::Scheduled),
            ..ItemFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(scheduled.len(), 2);
    assert!(scheduled.iter().all(|i| i.id != first.id));
    assert!(scheduled.iter().any(|i| i.id == other.id));

    let limited = h
        .engine
        .list_items(&ItemFilter {
            limit: Some(1),
            ..ItemFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, other.id);
}

#[tokio::test]
async fn schedule_validates_input() {
    let h = TestHarness::builder()
        .with_targets(&[TargetPlatform::SocialPost])
        .build()
        .await
        .unwrap();

    let past = h.request("weekly", -1);
    assert!(matches!(
        h.engine.schedule(past).await,
        Err(cadence_core::CadenceError::Rejected(_))
    ));

    let mut email = h.request("weekly", 10);
    email.target = TargetPlatform::EmailSend;
    assert!(matches!(
        h.engine.schedule(email).await,
        Err(cadence_core::CadenceError::AdapterNotFound { .. })
    ));

    let mut empty = h.request("weekly", 10);
    empty.payload_ref = "  ".into();
    assert!(h.engine.schedule(empty).await.is_err());

    let ok = h.engine.schedule(h.request("weekly", 0)).await.unwrap();
    assert_eq!(ok.max_retries, h.config.retry.default_max_retries);
    assert_eq!(ok.status, ItemStatus::Scheduled);
}

#[tokio::test]
async fn one_shot_channel_cannot_be_set_to_full() {
    let h = TestHarness::new().await.unwrap();
    h.engine
        .register_channel("launch", CampaignKind::OneShot)
        .await
        .unwrap();
    let err = h
        .engine
        .set_tier("launch", TrustTier::FullAutopilot, "ops")
        .await
        .unwrap_err();
    assert!(matches!(err, cadence_core::CadenceError::Rejected(_)));
    h.engine
        .set_tier("launch", TrustTier::SmartAutopilot, "ops")
        .await
        .unwrap();
}

#[tokio::test]
async fn negative_signals_pause_the_channel() {
    let h = TestHarness::builder()
        .with_config(|c| c.safety.max_negative_rate = Some(0.2))
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    let mut published = Vec::new();
    for _ in 0..3 {
        published.push(h.schedule("weekly", 0).await.unwrap());
    }
    assert_eq!(h.tick().await.unwrap().published(), 3);

    let draft = h.schedule("weekly", 60).await.unwrap();
    assert!(
        h.engine
            .report_signal(&draft.id, cadence_core::SignalKind::Negative)
            .await
            .is_err()
    );

    for item in &published[..2] {
        let breach = h
            .engine
            .report_signal(&item.id, cadence_core::SignalKind::Negative)
            .await
            .unwrap();
        assert!(breach.is_none());
    }
    let breach = h
        .engine
        .report_signal(&published[2].id, cadence_core::SignalKind::Negative)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(breach.metric, SafetyMetric::NegativeRate);
    assert_eq!(
        h.engine.channel("weekly").await.unwrap().status,
        ChannelStatus::AutoPaused
    );
}

#[tokio::test]
async fn delivery_timeout_is_transient() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.delivery_timeout_secs = 1)
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    h.social()
        .push(ScriptedDelivery::Hang(std::time::Duration::from_secs(5)))
        .await;
    let item = h.schedule("weekly", 0).await.unwrap();

    let report = h.tick().await.unwrap();
    assert!(matches!(
        report.executions[0].1,
        ExecutionOutcome::Requeued { .. }
    ));
    let status = h.engine.status(&item.id).await.unwrap();
    assert_eq!(status.attempts[0].outcome, AttemptOutcome::TransientFailure);
    assert!(
        status.attempts[0]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("timed out")
    );
}

#[tokio::test]
async fn two_instances_never_deliver_an_item_twice() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.claim_batch_size = 7)
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    let other = h.second_instance("test-b").await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(h.schedule("weekly", 0).await.unwrap().id);
    }

    for _ in 0..3 {
        let (a, b) = tokio::join!(h.tick(), other.tick());
        a.unwrap();
        b.unwrap();
    }

    let social = h.social();
    assert_eq!(social.delivery_count().await, 20);
    for id in &ids {
        assert_eq!(social.deliveries_for(id).await, 1);
        assert_eq!(
            h.engine.status(id).await.unwrap().item.status,
            ItemStatus::Published
        );
    }
    assert_external_id_invariant(&h.engine).await;
}

#[tokio::test]
async fn dispatcher_run_stops_on_cancel() {
    let h = TestHarness::builder()
        .with_config(|c| c.engine.tick_interval_secs = 1)
        .build()
        .await
        .unwrap();
    autopilot(&h.engine, "weekly").await;
    let item = h.schedule("weekly", 0).await.unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let dispatcher = h.engine.dispatcher();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { dispatcher.run(token).await });

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        h.engine.status(&item.id).await.unwrap().item.status,
        ItemStatus::Published
    );
}
