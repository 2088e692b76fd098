//! Cost-bounded extraction tier selection.
//!
//! Maps an input's complexity signal (character length) to a discrete tier
//! through fixed, ordered thresholds, then walks the choice down until its
//! worst-case estimated cost fits the remaining budget. Selection is a pure
//! function: same inputs, same decision, no I/O.

use inflow_core::defaults;
use inflow_core::{ExtractionTier, TierDecision};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ordered character thresholds separating the tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Inputs at or below this length take the lite tier.
    pub lite_max_chars: usize,
    /// Inputs at or below this length (and above `lite_max_chars`) take the
    /// standard tier; anything larger takes the deep tier.
    pub standard_max_chars: usize,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            lite_max_chars: defaults::TIER_LITE_MAX_CHARS,
            standard_max_chars: defaults::TIER_STANDARD_MAX_CHARS,
        }
    }
}

/// Worst-case unit costs per tier, in dollars per 1,000 input characters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCosts {
    pub lite_per_kchar: f64,
    pub standard_per_kchar: f64,
    pub deep_per_kchar: f64,
}

impl Default for TierCosts {
    fn default() -> Self {
        Self {
            lite_per_kchar: defaults::TIER_LITE_COST_PER_KCHAR,
            standard_per_kchar: defaults::TIER_STANDARD_COST_PER_KCHAR,
            deep_per_kchar: defaults::TIER_DEEP_COST_PER_KCHAR,
        }
    }
}

impl TierCosts {
    fn per_kchar(&self, tier: ExtractionTier) -> f64 {
        match tier {
            ExtractionTier::Lite => self.lite_per_kchar,
            ExtractionTier::Standard => self.standard_per_kchar,
            ExtractionTier::Deep => self.deep_per_kchar,
        }
    }
}

/// Tier selector with configurable thresholds and cost table.
#[derive(Debug, Clone, Default)]
pub struct TierSelector {
    thresholds: TierThresholds,
    costs: TierCosts,
}

impl TierSelector {
    pub fn new(thresholds: TierThresholds, costs: TierCosts) -> Self {
        Self { thresholds, costs }
    }

    /// Worst-case estimated cost of running `tier` over `chars` input
    /// characters. Inputs are billed per started kilo-character.
    pub fn estimated_cost(&self, tier: ExtractionTier, chars: usize) -> f64 {
        let kchars = (chars as f64 / 1000.0).ceil().max(1.0);
        self.costs.per_kchar(tier) * kchars
    }

    /// Nominal tier for an input length, before quality bias and budget.
    fn nominal_tier(&self, chars: usize) -> ExtractionTier {
        if chars <= self.thresholds.lite_max_chars {
            ExtractionTier::Lite
        } else if chars <= self.thresholds.standard_max_chars {
            ExtractionTier::Standard
        } else {
            ExtractionTier::Deep
        }
    }

    /// Choose a tier for `input` under `remaining_budget` dollars.
    ///
    /// The decision never carries a tier whose worst-case estimate exceeds
    /// the budget — except that the cheapest tier is the floor: when even it
    /// does not fit, the decision is returned flagged `budget_constrained`
    /// instead of silently violating the budget, and the caller chooses
    /// whether to proceed with a lower quality expectation or reject.
    pub fn select(&self, input: &str, remaining_budget: f64, quality_target: f32) -> TierDecision {
        let complexity = input.chars().count();
        let mut tier = self.nominal_tier(complexity);

        if quality_target >= defaults::QUALITY_PROMOTE_AT {
            tier = tier.promote();
        } else if quality_target < defaults::QUALITY_DEMOTE_BELOW {
            tier = tier.demote();
        }

        let mut budget_constrained = false;
        while self.estimated_cost(tier, complexity) > remaining_budget {
            budget_constrained = true;
            let cheaper = tier.demote();
            if cheaper == tier {
                break;
            }
            tier = cheaper;
        }

        let estimated_cost = self.estimated_cost(tier, complexity);
        debug!(
            tier = tier.as_str(),
            complexity,
            estimated_cost,
            budget_constrained,
            "Selected extraction tier"
        );

        TierDecision {
            tier,
            complexity,
            estimated_cost,
            quality_target,
            budget_constrained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> TierSelector {
        TierSelector::default()
    }

    #[test]
    fn test_nominal_tier_by_length() {
        let s = selector();
        assert_eq!(
            s.select(&"a".repeat(500), 10.0, 0.8).tier,
            ExtractionTier::Lite
        );
        assert_eq!(
            s.select(&"a".repeat(5_000), 10.0, 0.8).tier,
            ExtractionTier::Standard
        );
        assert_eq!(
            s.select(&"a".repeat(50_000), 10.0, 0.8).tier,
            ExtractionTier::Deep
        );
    }

    #[test]
    fn test_small_input_small_budget_unconstrained() {
        // 500 chars with a $0.01 budget: the lite tier fits comfortably.
        let decision = selector().select(&"a".repeat(500), 0.01, 0.8);
        assert_eq!(decision.tier, ExtractionTier::Lite);
        assert!(!decision.budget_constrained);
        assert!(decision.estimated_cost <= 0.01);
    }

    #[test]
    fn test_large_input_small_budget_flags_constraint() {
        // 50,000 chars with a $0.01 budget: even the cheapest tier exceeds
        // the budget, so the decision is flagged rather than violated.
        let decision = selector().select(&"a".repeat(50_000), 0.01, 0.8);
        assert_eq!(decision.tier, ExtractionTier::Lite);
        assert!(decision.budget_constrained);
    }

    #[test]
    fn test_downgrade_stops_at_first_fitting_tier() {
        // 5,000 chars nominally standard ($0.02); a $0.01 budget forces lite
        // ($0.004), which fits.
        let decision = selector().select(&"a".repeat(5_000), 0.01, 0.8);
        assert_eq!(decision.tier, ExtractionTier::Lite);
        assert!(decision.budget_constrained);
        assert!(decision.estimated_cost <= 0.01);
    }

    #[test]
    fn test_budget_never_exceeded_when_a_tier_fits() {
        let s = selector();
        for chars in [100usize, 1_500, 3_000, 20_000, 80_000] {
            for budget in [0.001f64, 0.01, 0.1, 1.0] {
                let decision = s.select(&"a".repeat(chars), budget, 0.8);
                if !decision.budget_constrained {
                    assert!(
                        decision.estimated_cost <= budget,
                        "unflagged decision exceeds budget: {:?}",
                        decision
                    );
                }
            }
        }
    }

    #[test]
    fn test_quality_target_promotes() {
        let decision = selector().select(&"a".repeat(500), 10.0, 0.95);
        assert_eq!(decision.tier, ExtractionTier::Standard);
    }

    #[test]
    fn test_quality_target_demotes() {
        let decision = selector().select(&"a".repeat(5_000), 10.0, 0.2);
        assert_eq!(decision.tier, ExtractionTier::Lite);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let s = selector();
        let a = s.select(&"a".repeat(7_000), 0.05, 0.8);
        let b = s.select(&"a".repeat(7_000), 0.05, 0.8);
        assert_eq!(a, b);
    }

    #[test]
    fn test_decision_records_inputs() {
        let decision = selector().select(&"a".repeat(1_234), 0.05, 0.7);
        assert_eq!(decision.complexity, 1_234);
        assert!((decision.quality_target - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_estimated_cost_bills_started_kchars() {
        let s = selector();
        // 1 char and 999 chars both bill one kilo-character.
        assert_eq!(
            s.estimated_cost(ExtractionTier::Lite, 1),
            s.estimated_cost(ExtractionTier::Lite, 999)
        );
        // 1001 chars bills two.
        assert!(
            s.estimated_cost(ExtractionTier::Lite, 1_001)
                > s.estimated_cost(ExtractionTier::Lite, 1_000)
        );
    }

    #[test]
    fn test_empty_input_takes_lite() {
        let decision = selector().select("", 0.05, 0.8);
        assert_eq!(decision.tier, ExtractionTier::Lite);
        assert_eq!(decision.complexity, 0);
        assert!(!decision.budget_constrained);
    }
}
