//! Common types used across Storefront

use serde::{Deserialize, Serialize};

/// Canonical plan order, cheapest first. Business logic and the pricing UI
/// both derive upgrade direction from this list, never from string
/// comparison or enum ordinals.
pub const PLAN_CODES: [PlanCode; 3] = [PlanCode::Starter, PlanCode::Growth, PlanCode::Pro];

/// Plan code for billing. Closed enumeration: plans are seeded, never
/// created through any UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanCode {
    Starter,
    Growth,
    Pro,
}

impl PlanCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Growth => "growth",
            Self::Pro => "pro",
        }
    }

    /// Human-facing plan title, used in limit messages and the pricing page.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Growth => "Growth",
            Self::Pro => "Pro",
        }
    }

    /// Position in the canonical plan order.
    pub fn rank(&self) -> usize {
        PLAN_CODES.iter().position(|c| c == self).unwrap_or(0)
    }

    /// The next plan up in canonical order, if any. Suggested as the
    /// upgrade target when a ceiling is hit.
    pub fn next(&self) -> Option<PlanCode> {
        PLAN_CODES.get(self.rank() + 1).copied()
    }

    pub fn parse(s: &str) -> Option<PlanCode> {
        match s {
            "starter" => Some(Self::Starter),
            "growth" => Some(Self::Growth),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription lifecycle status. Mutated only by the billing event
/// reconciler; `Canceled` is terminal until a new payment event arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resource kinds subject to plan ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Products,
    Catalogs,
}

impl ResourceKind {
    /// Singular label used in human-facing limit messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Products => "product",
            Self::Catalogs => "catalog",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_order_is_canonical() {
        assert_eq!(PlanCode::Starter.rank(), 0);
        assert_eq!(PlanCode::Growth.rank(), 1);
        assert_eq!(PlanCode::Pro.rank(), 2);
    }

    #[test]
    fn upgrade_target_follows_canonical_order() {
        assert_eq!(PlanCode::Starter.next(), Some(PlanCode::Growth));
        assert_eq!(PlanCode::Growth.next(), Some(PlanCode::Pro));
        assert_eq!(PlanCode::Pro.next(), None);
    }

    #[test]
    fn plan_codes_round_trip() {
        for code in PLAN_CODES {
            assert_eq!(PlanCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(PlanCode::parse("enterprise"), None);
    }
}
