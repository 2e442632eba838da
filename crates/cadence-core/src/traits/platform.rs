// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform adapter trait for external delivery connectors (social, email, etc.).

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryError, DeliveryReceipt, DeliveryRequest, TargetPlatform};

/// Adapter for one external delivery platform.
///
/// This is the only place platform-specific API differences live. The engine
/// looks adapters up by [`TargetPlatform`] and never branches on the target itself.
/// Adapters classify every failure as transient, permanent, or channel-down.
#[async_trait]
pub trait PlatformAdapter: PluginAdapter {
    /// The target this adapter serves.
    fn target(&self) -> TargetPlatform;

    /// Delivers one payload and returns the platform-assigned identifier.
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError>;
}
