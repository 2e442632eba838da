// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cadence publishing engine.
//!
//! Delivery outcomes reported by platform adapters are not errors of the
//! engine itself; they are classified separately as
//! [`DeliveryError`](crate::types::DeliveryError).

use thiserror::Error;

/// The primary error type used across all Cadence traits and engine operations.
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Platform adapter plumbing errors (client construction, health probe failure).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No platform adapter is registered for the item's target.
    #[error("no platform adapter registered for `{target}`")]
    AdapterNotFound { target: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The requested state change is not allowed from the item's current state.
    #[error("item {item_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        item_id: String,
        from: String,
        to: String,
    },

    /// A command was refused because its input violates a rule.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The channel is not accepting work until a human resumes it.
    #[error("channel {channel_id} is paused")]
    ChannelPaused { channel_id: String },

    /// A conditional write lost to a concurrent writer too many times.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CadenceError {
    /// Wrap any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CadenceError::Storage {
            source: Box::new(err),
        }
    }

    /// Shorthand for a missing scheduled item.
    pub fn item_not_found(id: impl Into<String>) -> Self {
        CadenceError::NotFound {
            entity: "item",
            id: id.into(),
        }
    }

    /// Shorthand for a missing channel.
    pub fn channel_not_found(id: impl Into<String>) -> Self {
        CadenceError::NotFound {
            entity: "channel",
            id: id.into(),
        }
    }
}
