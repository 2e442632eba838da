// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cadence publishing engine.
//!
//! This crate provides the trait definitions, error types, and domain types
//! used throughout the Cadence workspace. Platform connectors and storage
//! backends implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CadenceError;
pub use types::{
    AdapterType, AttemptOutcome, CampaignKind, ChannelAction, ChannelAuditEntry, ChannelState,
    ChannelStatus, ClaimLease, DeliveryError, DeliveryErrorKind, DeliveryReceipt, DeliveryRequest,
    HealthStatus, ItemFilter, ItemReport, ItemStatus, OutcomeSignal, PublishAttempt,
    QualitySignal, ReviewDecision, SafetyBreach, SafetyMetric, ScheduleRequest, ScheduledItem,
    SignalKind, SignalSummary, TargetPlatform, TrustState, TrustTier,
};

pub use traits::{PlatformAdapter, PluginAdapter, PublishStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_error_has_all_variants() {
        let _config = CadenceError::Config("test".into());
        let _storage = CadenceError::storage(std::io::Error::other("test"));
        let _platform = CadenceError::Platform {
            message: "test".into(),
            source: None,
        };
        let _adapter = CadenceError::AdapterNotFound {
            target: "social-post".into(),
        };
        let _not_found = CadenceError::item_not_found("x");
        let _transition = CadenceError::InvalidTransition {
            item_id: "x".into(),
            from: "claimed".into(),
            to: "cancelled".into(),
        };
        let _rejected = CadenceError::Rejected("past".into());
        let _paused = CadenceError::ChannelPaused {
            channel_id: "ch".into(),
        };
        let _conflict = CadenceError::Conflict("ch".into());
        let _timeout = CadenceError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = CadenceError::Internal("test".into());
    }

    #[test]
    fn error_messages_name_the_entity() {
        let err = CadenceError::channel_not_found("newsletter");
        assert_eq!(err.to_string(), "channel not found: newsletter");
        let err = CadenceError::InvalidTransition {
            item_id: "i1".into(),
            from: "executing".into(),
            to: "cancelled".into(),
        };
        assert!(err.to_string().contains("executing"));
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;
        for variant in [AdapterType::Platform, AdapterType::Storage] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn new_item_starts_scheduled() {
        let now = chrono::Utc::now();
        let item = ScheduledItem::new(
            ScheduleRequest {
                payload_ref: "content://post/1".into(),
                channel_id: "weekly".into(),
                target: TargetPlatform::SocialPost,
                scheduled_at: now,
                max_retries: None,
                campaign: CampaignKind::Recurring,
                quality: QualitySignal::Passed,
            },
            3,
            now,
        );
        assert_eq!(item.status, ItemStatus::Scheduled);
        assert_eq!(item.attempt_count, 0);
        assert!(item.external_id.is_none());
        assert!(item.has_retries_left());
        assert_eq!(item.next_attempt_number(), 1);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_platform_adapter<T: PlatformAdapter>() {}
        fn _assert_publish_store<T: PublishStore>() {}
    }
}
