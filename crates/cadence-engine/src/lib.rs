// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling and execution engine for Cadence.
//!
//! The [`Dispatcher`] claims due items and routes them through the trust gate;
//! the worker delivers them through a [`PlatformAdapter`](cadence_core::PlatformAdapter)
//! and records every attempt; the safety monitor pauses channels whose recent
//! activity goes bad. [`PublishingEngine`] is the command surface over all of it.

pub mod channels;
pub mod commands;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod metrics;
pub mod reconnect;
pub mod recovery;
pub mod retry;
pub mod safety;
pub mod shutdown;
pub mod trust;
pub mod worker;

pub use commands::{PublishingEngine, ReviewOutcome};
pub use context::{AdapterRegistry, Clock, EngineContext, system_clock};
pub use dispatcher::{Dispatcher, TickReport};
pub use events::{EngineEvent, EventBus};
pub use retry::{RetryDecision, RetryPolicy};
pub use trust::{ApprovalReason, GateDecision, TierChange};
pub use worker::ExecutionOutcome;
