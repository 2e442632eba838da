// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder they are no-ops.

use cadence_core::{AttemptOutcome, SafetyMetric, TargetPlatform};
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Cadence metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("cadence_items_scheduled_total", "Items accepted for scheduling");
    describe_counter!("cadence_items_claimed_total", "Items claimed by this instance");
    describe_counter!("cadence_attempts_total", "Delivery attempts by outcome");
    describe_counter!(
        "cadence_approvals_required_total",
        "Items routed to human approval"
    );
    describe_counter!("cadence_safety_breaches_total", "Safety threshold breaches");
    describe_counter!("cadence_ticks_skipped_total", "Dispatcher ticks skipped on error");
    describe_gauge!("cadence_paused_channels", "Channels currently auto-paused");
    describe_histogram!(
        "cadence_delivery_latency_seconds",
        "Platform delivery latency in seconds"
    );
}

pub fn record_scheduled(target: TargetPlatform) {
    metrics::counter!("cadence_items_scheduled_total", "target" => target.to_string())
        .increment(1);
}

pub fn record_claimed(count: usize) {
    metrics::counter!("cadence_items_claimed_total").increment(count as u64);
}

pub fn record_attempt(target: TargetPlatform, outcome: AttemptOutcome) {
    metrics::counter!(
        "cadence_attempts_total",
        "target" => target.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_approval_required(channel_id: &str) {
    metrics::counter!("cadence_approvals_required_total", "channel" => channel_id.to_string())
        .increment(1);
}

pub fn record_safety_breach(channel_id: &str, metric: SafetyMetric) {
    metrics::counter!(
        "cadence_safety_breaches_total",
        "channel" => channel_id.to_string(),
        "metric" => metric.to_string()
    )
    .increment(1);
}

pub fn record_tick_skipped() {
    metrics::counter!("cadence_ticks_skipped_total").increment(1);
}

pub fn set_paused_channels(count: usize) {
    metrics::gauge!("cadence_paused_channels").set(count as f64);
}

pub fn record_delivery_latency(target: TargetPlatform, seconds: f64) {
    metrics::histogram!("cadence_delivery_latency_seconds", "target" => target.to_string())
        .record(seconds);
}
