// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cadence publishing engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use cadence_core::TargetPlatform;
use serde::{Deserialize, Serialize};

/// Top-level Cadence configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CadenceConfig {
    /// Scheduler and worker settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Item-level retry and backoff.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Channel-level reconnect supervision.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Trust-tier promotion and demotion thresholds.
    #[serde(default)]
    pub trust: TrustConfig,

    /// Safety thresholds for auto-pause.
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Webhook platform connectors.
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

/// Scheduler/worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Identifier written into claims. Generated per process when unset.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between dispatcher ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Maximum items claimed per tick.
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: usize,

    /// Seconds after which a `claimed`/`executing` item is considered abandoned.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,

    /// Upper bound on a single platform delivery call.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// Deliveries run in parallel per tick.
    #[serde(default = "default_max_concurrent_deliveries")]
    pub max_concurrent_deliveries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            log_level: default_log_level(),
            tick_interval_secs: default_tick_interval_secs(),
            claim_batch_size: default_claim_batch_size(),
            claim_lease_secs: default_claim_lease_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            max_concurrent_deliveries: default_max_concurrent_deliveries(),
        }
    }
}

impl EngineConfig {
    /// The configured instance id, or a fresh one.
    pub fn resolved_instance_id(&self) -> String {
        self.instance_id
            .clone()
            .unwrap_or_else(|| format!("cadence-{}", uuid::Uuid::new_v4()))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval_secs() -> u64 {
    20
}

fn default_claim_batch_size() -> usize {
    50
}

fn default_claim_lease_secs() -> u64 {
    120
}

fn default_delivery_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_deliveries() -> usize {
    8
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("cadence").join("cadence.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("cadence.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Backoff for transient delivery failures: `min(base * 2^n, max)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Used when a scheduling request does not carry `max_retries`.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            default_max_retries: default_max_retries(),
        }
    }
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}

/// Channel reconnect supervision.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Seconds between health probes of a disconnected channel.
    #[serde(default = "default_reconnect_interval_secs")]
    pub interval_secs: u64,

    /// Seconds after the disconnect at which the channel is auto-paused.
    #[serde(default = "default_reconnect_ceiling_secs")]
    pub ceiling_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconnect_interval_secs(),
            ceiling_secs: default_reconnect_ceiling_secs(),
        }
    }
}

fn default_reconnect_interval_secs() -> u64 {
    60
}

fn default_reconnect_ceiling_secs() -> u64 {
    900
}

/// Trust-tier thresholds. Promotion moves one tier at a time.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Apply promotion automatically after each review.
    #[serde(default = "default_auto_promote")]
    pub auto_promote: bool,

    /// Number of recent reviews the edit rate is computed over.
    #[serde(default = "default_edit_window")]
    pub edit_window: usize,

    #[serde(default = "default_smart_min_clean_approvals")]
    pub smart_min_clean_approvals: u32,

    #[serde(default = "default_smart_max_edit_rate")]
    pub smart_max_edit_rate: f64,

    #[serde(default = "default_full_min_clean_approvals")]
    pub full_min_clean_approvals: u32,

    #[serde(default = "default_full_max_edit_rate")]
    pub full_max_edit_rate: f64,

    /// Human edits to auto-cleared items that demote the channel to manual.
    #[serde(default = "default_auto_cleared_edit_limit")]
    pub auto_cleared_edit_limit: u32,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            auto_promote: default_auto_promote(),
            edit_window: default_edit_window(),
            smart_min_clean_approvals: default_smart_min_clean_approvals(),
            smart_max_edit_rate: default_smart_max_edit_rate(),
            full_min_clean_approvals: default_full_min_clean_approvals(),
            full_max_edit_rate: default_full_max_edit_rate(),
            auto_cleared_edit_limit: default_auto_cleared_edit_limit(),
        }
    }
}

fn default_auto_promote() -> bool {
    true
}

fn default_edit_window() -> usize {
    20
}

fn default_smart_min_clean_approvals() -> u32 {
    15
}

fn default_smart_max_edit_rate() -> f64 {
    0.15
}

fn default_full_min_clean_approvals() -> u32 {
    30
}

fn default_full_max_edit_rate() -> f64 {
    0.05
}

fn default_auto_cleared_edit_limit() -> u32 {
    3
}

/// Effective safety thresholds for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyThresholds {
    pub window_size: usize,
    pub max_failure_rate: f64,
    pub max_negative_rate: Option<f64>,
    pub min_success_signal_rate: Option<f64>,
}

/// Rolling-window safety limits, with optional per-channel overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    /// Number of recent attempts (or published items, for signal rates) per window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,

    /// Bounce/unsubscribe-equivalent rate limit. Disabled when unset.
    #[serde(default)]
    pub max_negative_rate: Option<f64>,

    /// Minimum engagement rate once the window is full. Disabled when unset.
    #[serde(default)]
    pub min_success_signal_rate: Option<f64>,

    /// Per-channel overrides keyed by channel id.
    #[serde(default)]
    pub channels: HashMap<String, SafetyOverride>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            max_failure_rate: default_max_failure_rate(),
            max_negative_rate: None,
            min_success_signal_rate: None,
            channels: HashMap::new(),
        }
    }
}

impl SafetyConfig {
    /// Resolve the thresholds for a channel, applying its override if present.
    pub fn thresholds_for(&self, channel_id: &str) -> SafetyThresholds {
        let base = SafetyThresholds {
            window_size: self.window_size,
            max_failure_rate: self.max_failure_rate,
            max_negative_rate: self.max_negative_rate,
            min_success_signal_rate: self.min_success_signal_rate,
        };
        match self.channels.get(channel_id) {
            Some(o) => SafetyThresholds {
                window_size: o.window_size.unwrap_or(base.window_size),
                max_failure_rate: o.max_failure_rate.unwrap_or(base.max_failure_rate),
                max_negative_rate: o.max_negative_rate.or(base.max_negative_rate),
                min_success_signal_rate: o
                    .min_success_signal_rate
                    .or(base.min_success_signal_rate),
            },
            None => base,
        }
    }
}

/// Per-channel safety override. Unset fields inherit from `[safety]`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyOverride {
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default)]
    pub max_failure_rate: Option<f64>,
    #[serde(default)]
    pub max_negative_rate: Option<f64>,
    #[serde(default)]
    pub min_success_signal_rate: Option<f64>,
}

fn default_window_size() -> usize {
    10
}

fn default_max_failure_rate() -> f64 {
    0.2
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen_address")]
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_listen_address(),
        }
    }
}

fn default_metrics_listen_address() -> String {
    "127.0.0.1:9464".to_string()
}

/// One webhook platform connector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Target served by this connector.
    pub platform: TargetPlatform,

    /// Endpoint receiving `POST` deliveries.
    pub url: String,

    /// Endpoint probed with `GET` during reconnect supervision. Defaults to `url`.
    #[serde(default)]
    pub health_url: Option<String>,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// JSON field in the response body holding the platform-assigned id.
    #[serde(default = "default_external_id_field")]
    pub external_id_field: String,
}

fn default_external_id_field() -> String {
    "id".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CadenceConfig::default();
        assert_eq!(config.engine.tick_interval_secs, 20);
        assert_eq!(config.retry.base_delay_secs, 30);
        assert_eq!(config.retry.default_max_retries, 3);
        assert_eq!(config.reconnect.ceiling_secs, 900);
        assert_eq!(config.trust.smart_min_clean_approvals, 15);
        assert_eq!(config.safety.window_size, 10);
        assert!((config.safety.max_failure_rate - 0.2).abs() < f64::EPSILON);
        assert!(config.platforms.is_empty());
    }

    #[test]
    fn channel_override_inherits_unset_fields() {
        let mut safety = SafetyConfig {
            max_negative_rate: Some(0.05),
            ..SafetyConfig::default()
        };
        safety.channels.insert(
            "launch".into(),
            SafetyOverride {
                max_failure_rate: Some(0.1),
                ..SafetyOverride::default()
            },
        );

        let launch = safety.thresholds_for("launch");
        assert!((launch.max_failure_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(launch.window_size, 10);
        assert_eq!(launch.max_negative_rate, Some(0.05));

        let other = safety.thresholds_for("weekly");
        assert!((other.max_failure_rate - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn instance_id_is_generated_when_unset() {
        let engine = EngineConfig::default();
        assert!(engine.resolved_instance_id().starts_with("cadence-"));
        let pinned = EngineConfig {
            instance_id: Some("node-a".into()),
            ..EngineConfig::default()
        };
        assert_eq!(pinned.resolved_instance_id(), "node-a");
    }
}
