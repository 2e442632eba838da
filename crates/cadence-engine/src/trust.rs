// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trust-tier gate, promotion and demotion.
//!
//! Everything here is pure: the caller loads the channel's [`TrustState`],
//! applies a function, and persists the result under the channel lock.

use cadence_config::TrustConfig;
use cadence_core::{QualitySignal, ReviewDecision, ScheduledItem, TrustState, TrustTier};
use serde::Serialize;

/// Why an item was routed to a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReason {
    /// One-shot campaigns always need a human.
    OneShotCampaign,
    ManualTier,
    /// `smart_autopilot` and the quality check did not pass.
    QualityCheck,
}

impl std::fmt::Display for ApprovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ApprovalReason::OneShotCampaign => "one-shot campaign requires approval",
            ApprovalReason::ManualTier => "channel is in manual tier",
            ApprovalReason::QualityCheck => "quality check did not pass",
        };
        f.write_str(text)
    }
}

/// Result of running a claimed item through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    AutoExecute,
    RequireApproval(ApprovalReason),
}

/// Decide whether `item` may execute without a human.
pub fn gate(item: &ScheduledItem, trust: &TrustState) -> GateDecision {
    if item.is_one_shot() || trust.campaign == cadence_core::CampaignKind::OneShot {
        return GateDecision::RequireApproval(ApprovalReason::OneShotCampaign);
    }
    match trust.tier {
        TrustTier::Manual => GateDecision::RequireApproval(ApprovalReason::ManualTier),
        TrustTier::SmartAutopilot if item.quality == QualitySignal::Passed => {
            GateDecision::AutoExecute
        }
        TrustTier::SmartAutopilot => GateDecision::RequireApproval(ApprovalReason::QualityCheck),
        TrustTier::FullAutopilot => GateDecision::AutoExecute,
    }
}

/// The tier `trust` has earned, if it is higher than the current one.
///
/// Moves at most one step. A one-shot channel never reaches `full_autopilot`.
pub fn evaluate_promotion(trust: &TrustState, config: &TrustConfig) -> Option<TrustTier> {
    let next = trust.tier.next()?;
    let (min_clean, max_rate) = match next {
        TrustTier::SmartAutopilot => (
            config.smart_min_clean_approvals,
            config.smart_max_edit_rate,
        ),
        TrustTier::FullAutopilot => {
            if trust.campaign == cadence_core::CampaignKind::OneShot {
                return None;
            }
            (config.full_min_clean_approvals, config.full_max_edit_rate)
        }
        TrustTier::Manual => return None,
    };
    let earned = trust.consecutive_clean_approvals >= min_clean && trust.edit_rate() <= max_rate;
    earned.then_some(next)
}

/// Tier change caused by a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TierChange {
    Promoted { from: TrustTier, to: TrustTier },
    Demoted { from: TrustTier, reason: String },
}

/// Fold one human review into the channel's trust counters.
///
/// `auto_cleared` marks a correction to an item the gate let through without
/// a human; enough of those demote the channel.
pub fn record_review(
    trust: &mut TrustState,
    decision: ReviewDecision,
    auto_cleared: bool,
    config: &TrustConfig,
) -> Option<TierChange> {
    let from = trust.tier;

    if auto_cleared {
        if decision != ReviewDecision::Edit {
            return None;
        }
        trust.total_edits += 1;
        trust.consecutive_clean_approvals = 0;
        trust.auto_cleared_edits += 1;
        trust.push_review(true, config.edit_window);
        if trust.auto_cleared_edits >= config.auto_cleared_edit_limit
            && trust.tier != TrustTier::Manual
        {
            let reason = format!(
                "{} edits to auto-cleared items",
                trust.auto_cleared_edits
            );
            trust.demote(reason.clone());
            return Some(TierChange::Demoted { from, reason });
        }
        return None;
    }

    match decision {
        ReviewDecision::Approve => {
            trust.total_approvals += 1;
            trust.consecutive_clean_approvals += 1;
            trust.push_review(false, config.edit_window);
        }
        ReviewDecision::Edit => {
            trust.total_approvals += 1;
            trust.total_edits += 1;
            trust.consecutive_clean_approvals = 0;
            trust.push_review(true, config.edit_window);
        }
        ReviewDecision::Reject => {
            trust.consecutive_clean_approvals = 0;
        }
    }

    if !config.auto_promote {
        return None;
    }
    let to = evaluate_promotion(trust, config)?;
    trust.tier = to;
    Some(TierChange::Promoted { from, to })
}
