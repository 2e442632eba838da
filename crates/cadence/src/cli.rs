// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot commands and queries. Results are printed as JSON on stdout.

use cadence_config::CadenceConfig;
use cadence_core::{CadenceError, ItemFilter, ScheduleRequest};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;

use crate::Commands;
use crate::serve;

fn print<T: Serialize>(value: &T) -> Result<(), CadenceError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CadenceError::Internal(format!("failed to render output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn resolve_time(at: Option<String>, in_secs: Option<i64>) -> Result<DateTime<Utc>, CadenceError> {
    match (at, in_secs) {
        (Some(at), _) => DateTime::parse_from_rfc3339(&at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| CadenceError::Rejected(format!("invalid --at `{at}`: {e}"))),
        (None, Some(secs)) => Ok(Utc::now() + Duration::seconds(secs)),
        (None, None) => Ok(Utc::now()),
    }
}

pub async fn run(command: Commands, config: CadenceConfig) -> Result<(), CadenceError> {
    serve::init_tracing(&config.engine.log_level);
    let engine = serve::build_engine(&config).await?;

    let result = match command {
        Commands::Serve => Err(CadenceError::Internal("serve is not a one-shot command".into())),
        Commands::Schedule {
            channel,
            target,
            payload,
            at,
            in_secs,
            max_retries,
            campaign,
            quality,
        } => {
            let request = ScheduleRequest {
                payload_ref: payload,
                channel_id: channel,
                target,
                scheduled_at: resolve_time(at, in_secs)?,
                max_retries,
                campaign,
                quality,
            };
            let item = engine.schedule(request).await?;
            print(&item)
        }
        Commands::Cancel { item_id } => print(&engine.cancel(&item_id).await?),
        Commands::Review {
            item_id,
            decision,
            reviewer,
        } => print(&engine.review(&item_id, decision, &reviewer).await?),
        Commands::Status { item_id } => print(&engine.status(&item_id).await?),
        Commands::List {
            channel,
            status,
            limit,
        } => {
            let filter = ItemFilter {
                channel_id: channel,
                status,
                limit,
            };
            print(&engine.list_items(&filter).await?)
        }
        Commands::Channels { channel_id, audit } => match channel_id {
            Some(id) => {
                let channel = engine.channel(&id).await?;
                let entries = engine.channel_audit(&id, audit).await?;
                print(&json!({ "channel": channel, "audit": entries }))
            }
            None => print(&engine.list_channels().await?),
        },
        Commands::Resume { channel_id, actor } => print(&engine.resume(&channel_id, &actor).await?),
        Commands::SetTier {
            channel_id,
            tier,
            actor,
        } => print(&engine.set_tier(&channel_id, tier, &actor).await?),
        Commands::Signal { item_id, kind } => {
            let breach = engine.report_signal(&item_id, kind).await?;
            print(&json!({ "item_id": item_id, "paused": breach.is_some(), "breach": breach }))
        }
    };

    engine.shutdown().await?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_rfc3339() {
        let t = resolve_time(Some("2030-01-02T03:04:05Z".into()), None).unwrap();
        assert_eq!(t.to_rfc3339(), "2030-01-02T03:04:05+00:00");
    }

    #[test]
    fn relative_time_is_in_the_future() {
        let t = resolve_time(None, Some(120)).unwrap();
        assert!(t > Utc::now() + Duration::seconds(100));
    }

    #[test]
    fn bad_time_is_rejected() {
        assert!(matches!(
            resolve_time(Some("tomorrow".into()), None),
            Err(CadenceError::Rejected(_))
        ));
    }
}
