// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Cadence publishing engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, typed queries
//! for items, attempts, channels and signals, and the atomic claim that lets
//! several engine instances share one database.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
