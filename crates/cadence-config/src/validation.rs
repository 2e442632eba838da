// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as rates within `[0, 1]`, ordered delay bounds, and unique platforms.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{CadenceConfig, SafetyThresholds};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CadenceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let engine = &config.engine;
    if engine.tick_interval_secs == 0 {
        errors.push(invalid("engine.tick_interval_secs must be positive"));
    }
    if engine.claim_batch_size == 0 {
        errors.push(invalid("engine.claim_batch_size must be positive"));
    }
    if engine.delivery_timeout_secs == 0 {
        errors.push(invalid("engine.delivery_timeout_secs must be positive"));
    }
    if engine.max_concurrent_deliveries == 0 {
        errors.push(invalid("engine.max_concurrent_deliveries must be positive"));
    }
    // Recovery may only see an executing item once its delivery has surely ended.
    let min_lease = engine
        .delivery_timeout_secs
        .saturating_mul(2)
        .saturating_add(engine.tick_interval_secs);
    if engine.claim_lease_secs < min_lease {
        errors.push(invalid(format!(
            "engine.claim_lease_secs ({}) must be at least 2 x engine.delivery_timeout_secs \
             + engine.tick_interval_secs ({min_lease})",
            engine.claim_lease_secs
        )));
    }
    if let Some(id) = &engine.instance_id
        && id.trim().is_empty()
    {
        errors.push(invalid("engine.instance_id must not be empty when set"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path must not be empty"));
    }

    let retry = &config.retry;
    if retry.base_delay_secs == 0 {
        errors.push(invalid("retry.base_delay_secs must be positive"));
    }
    if retry.base_delay_secs > retry.max_delay_secs {
        errors.push(invalid(format!(
            "retry.base_delay_secs ({}) must not exceed retry.max_delay_secs ({})",
            retry.base_delay_secs, retry.max_delay_secs
        )));
    }

    let reconnect = &config.reconnect;
    if reconnect.interval_secs == 0 {
        errors.push(invalid("reconnect.interval_secs must be positive"));
    }
    if reconnect.ceiling_secs < reconnect.interval_secs {
        errors.push(invalid(format!(
            "reconnect.ceiling_secs ({}) must be at least reconnect.interval_secs ({})",
            reconnect.ceiling_secs, reconnect.interval_secs
        )));
    }

    let trust = &config.trust;
    if trust.edit_window == 0 {
        errors.push(invalid("trust.edit_window must be positive"));
    }
    check_rate(&mut errors, "trust.smart_max_edit_rate", trust.smart_max_edit_rate);
    check_rate(&mut errors, "trust.full_max_edit_rate", trust.full_max_edit_rate);
    if trust.full_min_clean_approvals < trust.smart_min_clean_approvals {
        errors.push(invalid(
            "trust.full_min_clean_approvals must be at least trust.smart_min_clean_approvals",
        ));
    }
    if trust.full_max_edit_rate > trust.smart_max_edit_rate {
        errors.push(invalid(
            "trust.full_max_edit_rate must not exceed trust.smart_max_edit_rate",
        ));
    }
    if trust.auto_cleared_edit_limit == 0 {
        errors.push(invalid("trust.auto_cleared_edit_limit must be positive"));
    }

    check_thresholds(
        &mut errors,
        "safety",
        &SafetyThresholds {
            window_size: config.safety.window_size,
            max_failure_rate: config.safety.max_failure_rate,
            max_negative_rate: config.safety.max_negative_rate,
            min_success_signal_rate: config.safety.min_success_signal_rate,
        },
    );
    let mut channel_ids: Vec<&String> = config.safety.channels.keys().collect();
    channel_ids.sort();
    for channel_id in channel_ids {
        check_thresholds(
            &mut errors,
            &format!("safety.channels.{channel_id}"),
            &config.safety.thresholds_for(channel_id),
        );
    }

    if config.metrics.enabled
        && config
            .metrics
            .listen_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(invalid(format!(
            "metrics.listen_address `{}` is not a valid socket address",
            config.metrics.listen_address
        )));
    }

    // Each target is served by exactly one connector.
    let mut seen_platforms = HashSet::new();
    for (i, platform) in config.platforms.iter().enumerate() {
        if !seen_platforms.insert(platform.platform) {
            errors.push(invalid(format!(
                "duplicate platform `{}` in [[platforms]] array",
                platform.platform
            )));
        }
        if !platform.url.starts_with("http://") && !platform.url.starts_with("https://") {
            errors.push(invalid(format!(
                "platforms[{i}].url must be an http(s) URL, got `{}`",
                platform.url
            )));
        }
        if platform.external_id_field.trim().is_empty() {
            errors.push(invalid(format!(
                "platforms[{i}].external_id_field must not be empty"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

fn check_rate(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(invalid(format!("{key} must be within [0, 1], got {value}")));
    }
}

fn check_thresholds(errors: &mut Vec<ConfigError>, prefix: &str, t: &SafetyThresholds) {
    if t.window_size == 0 {
        errors.push(invalid(format!("{prefix}.window_size must be positive")));
    }
    check_rate(errors, &format!("{prefix}.max_failure_rate"), t.max_failure_rate);
    if let Some(rate) = t.max_negative_rate {
        check_rate(errors, &format!("{prefix}.max_negative_rate"), rate);
    }
    if let Some(rate) = t.min_success_signal_rate {
        check_rate(errors, &format!("{prefix}.min_success_signal_rate"), rate);
    }
}
