use serde::{Deserialize, Serialize};

/// Ordinal loyalty level. Every membership starts at `Bronze`; promotion is
/// driven by reward logic outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoyaltyTier::Bronze => "bronze",
            LoyaltyTier::Silver => "silver",
            LoyaltyTier::Gold => "gold",
            LoyaltyTier::Platinum => "platinum",
        }
    }
}

/// Loyalty-program membership, independent of room occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Loyalty {
    NotEnrolled,
    Enrolled {
        tier: LoyaltyTier,
        points: u64,
        available_points: u64,
    },
}

impl Loyalty {
    /// Fresh membership: Bronze with an empty balance.
    ///
    /// Re-enrolling always lands here; balances from an earlier membership are
    /// never carried over.
    pub fn fresh_enrollment() -> Self {
        Loyalty::Enrolled {
            tier: LoyaltyTier::Bronze,
            points: 0,
            available_points: 0,
        }
    }

    pub fn is_enrolled(&self) -> bool {
        matches!(self, Loyalty::Enrolled { .. })
    }

    pub fn tier(&self) -> Option<LoyaltyTier> {
        match self {
            Loyalty::Enrolled { tier, .. } => Some(*tier),
            Loyalty::NotEnrolled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_enrollment_is_bronze_with_zero_balance() {
        assert_eq!(
            Loyalty::fresh_enrollment(),
            Loyalty::Enrolled {
                tier: LoyaltyTier::Bronze,
                points: 0,
                available_points: 0
            }
        );
        assert!(Loyalty::fresh_enrollment().is_enrolled());
        assert!(!Loyalty::NotEnrolled.is_enrolled());
        assert_eq!(Loyalty::NotEnrolled.tier(), None);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(LoyaltyTier::Bronze < LoyaltyTier::Silver);
        assert!(LoyaltyTier::Gold < LoyaltyTier::Platinum);
    }
}
