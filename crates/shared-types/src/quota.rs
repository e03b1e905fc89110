//! Monthly bot quota policy.

use serde::{Deserialize, Serialize};

use crate::PlanTier;

/// Why a dispatch was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum DenyReason {
    FreeTier,
    SubscriptionInactive,
    CapReached { cap: u32, used: u32 },
}

impl DenyReason {
    pub fn as_str(&self) -> &str {
        match self {
            DenyReason::FreeTier => "free_tier",
            DenyReason::SubscriptionInactive => "subscription_inactive",
            DenyReason::CapReached { .. } => "cap_reached",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuotaDecision {
    Allow,
    Deny(DenyReason),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allow)
    }
}

/// Decide whether an account may dispatch another bot this period.
///
/// Free tier is denied before anything else, then inactive subscriptions,
/// then finite caps that are already used up.
pub fn evaluate_quota(tier: PlanTier, subscription_active: bool, used: u32) -> QuotaDecision {
    if tier == PlanTier::Free {
        return QuotaDecision::Deny(DenyReason::FreeTier);
    }

    if !subscription_active {
        return QuotaDecision::Deny(DenyReason::SubscriptionInactive);
    }

    match tier.monthly_cap() {
        Some(cap) if used >= cap => QuotaDecision::Deny(DenyReason::CapReached { cap, used }),
        _ => QuotaDecision::Allow,
    }
}
