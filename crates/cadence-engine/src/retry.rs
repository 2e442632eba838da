// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry and backoff policy for item-level delivery failures.

use std::time::Duration;

use cadence_config::model::RetryConfig;
use cadence_core::{DeliveryError, DeliveryErrorKind, ScheduledItem};

/// What to do with an item after a failed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after `delay`.
    Retry { delay: Duration },
    /// Terminal failure.
    GiveUp { reason: String },
    /// Channel-level outage: keep the item scheduled at its original time.
    Hold,
}

/// Exponential backoff: `min(base * 2^n, ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub ceiling: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self { base, ceiling }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_secs(config.base_delay_secs),
            Duration::from_secs(config.max_delay_secs),
        )
    }

    /// Delay before the retry that follows attempt number `attempt` (zero-based).
    /// Saturates at the ceiling instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.ceiling, |delay| delay.min(self.ceiling))
    }

    /// Classify a failure for `item`, whose `attempt_count` does not yet include it.
    pub fn decide(&self, item: &ScheduledItem, error: &DeliveryError) -> RetryDecision {
        match error.kind {
            DeliveryErrorKind::ChannelDown => RetryDecision::Hold,
            DeliveryErrorKind::Permanent => RetryDecision::GiveUp {
                reason: format!("permanent failure: {}", error.detail),
            },
            DeliveryErrorKind::Transient if item.has_retries_left() => RetryDecision::Retry {
                delay: self.delay_for(item.attempt_count),
            },
            DeliveryErrorKind::Transient => RetryDecision::GiveUp {
                reason: format!(
                    "retries exhausted after {} attempts: {}",
                    item.attempt_count + 1,
                    error.detail
                ),
            },
        }
    }
}
