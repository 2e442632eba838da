// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cadence integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockPlatform`] - Platform adapter with scripted delivery results
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`TestHarness`] - Engine over a temp SQLite database

pub mod clock;
pub mod harness;
pub mod mock_platform;

pub use clock::ManualClock;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_platform::{MockPlatform, ScriptedDelivery};
