// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cadence - scheduled publishing with trust-gated automation.
//!
//! This is the binary entry point: `serve` runs the dispatcher, every other
//! subcommand performs one command or query against the shared store and
//! prints JSON.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cli;
mod serve;

use std::path::PathBuf;
use std::str::FromStr;

use cadence_core::{
    CampaignKind, ItemStatus, QualitySignal, ReviewDecision, SignalKind, TargetPlatform, TrustTier,
};
use clap::{Parser, Subcommand};

/// Cadence - scheduled publishing with trust-gated automation.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the XDG lookup).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn parse_enum<T: FromStr>(value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| format!("`{value}`: {e}"))
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher until SIGINT/SIGTERM.
    Serve,
    /// Schedule a content item.
    Schedule {
        #[arg(long)]
        channel: String,
        #[arg(long, value_parser = parse_enum::<TargetPlatform>)]
        target: TargetPlatform,
        /// Opaque content reference from the authoring service.
        #[arg(long)]
        payload: String,
        /// Delivery time (RFC 3339).
        #[arg(long, conflicts_with = "in_secs")]
        at: Option<String>,
        /// Delivery time relative to now.
        #[arg(long)]
        in_secs: Option<i64>,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long, value_parser = parse_enum::<CampaignKind>, default_value = "recurring")]
        campaign: CampaignKind,
        #[arg(long, value_parser = parse_enum::<QualitySignal>, default_value = "unknown")]
        quality: QualitySignal,
    },
    /// Cancel a scheduled item.
    Cancel { item_id: String },
    /// Approve, edit or reject an item.
    Review {
        item_id: String,
        #[arg(value_parser = parse_enum::<ReviewDecision>)]
        decision: ReviewDecision,
        #[arg(long, default_value = "cli")]
        reviewer: String,
    },
    /// Show an item and its attempt history.
    Status { item_id: String },
    /// List items.
    List {
        #[arg(long)]
        channel: Option<String>,
        #[arg(long, value_parser = parse_enum::<ItemStatus>)]
        status: Option<ItemStatus>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List channels, or show one channel with its audit log.
    Channels {
        channel_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        audit: usize,
    },
    /// Resume an auto-paused channel.
    Resume {
        channel_id: String,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Override a channel's trust tier.
    SetTier {
        channel_id: String,
        #[arg(value_parser = parse_enum::<TrustTier>)]
        tier: TrustTier,
        #[arg(long, default_value = "cli")]
        actor: String,
    },
    /// Report a downstream outcome signal for a published item.
    Signal {
        item_id: String,
        #[arg(value_parser = parse_enum::<SignalKind>)]
        kind: SignalKind,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => cadence_config::load_and_validate_path(path),
        None => cadence_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            cadence_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        command => cli::run(command, config).await,
    };

    if let Err(e) = result {
        eprintln!("cadence: {e}");
        std::process::exit(1);
    }
}
