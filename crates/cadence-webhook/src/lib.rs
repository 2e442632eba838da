// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook platform adapter for Cadence.
//!
//! Delivers items by POSTing a JSON envelope to a configured endpoint and
//! classifies HTTP failures into transient, permanent and channel-down
//! delivery errors.

pub mod adapter;

use std::sync::Arc;
use std::time::Duration;

use cadence_config::model::PlatformConfig;
use cadence_core::{CadenceError, PlatformAdapter};

pub use adapter::WebhookPlatform;

/// Build one adapter per `[[platforms]]` entry.
pub fn from_config(
    platforms: &[PlatformConfig],
    timeout: Duration,
) -> Result<Vec<Arc<dyn PlatformAdapter>>, CadenceError> {
    platforms
        .iter()
        .map(|p| WebhookPlatform::new(p, timeout).map(|w| Arc::new(w) as Arc<dyn PlatformAdapter>))
        .collect()
}
