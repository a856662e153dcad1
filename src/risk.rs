//! Trade risk assessment: a rule-accumulation scorer, not a weighted model.
//! Rules run in a fixed order so the warning list is stable for display and
//! for tests that assert on it.

use crate::model::{Actor, RiskLevel};
use crate::reputation::trust_score;

const LOW_TRUST_THRESHOLD: f64 = 40.0;
const NEW_TRADER_THRESHOLD: u32 = 5;
const DISPUTE_COUNT_THRESHOLD: u32 = 2;
const VALUE_RATIO_CAUTION: f64 = 2.0;
const VALUE_RATIO_SEVERE: f64 = 3.0;
const COMBINED_VALUE_HIGH: f64 = 100_000.0;
const COMBINED_VALUE_EXTREME: f64 = 1_000_000.0;

const HIGH_RISK_FACTORS: u32 = 5;
const CAUTION_FACTORS: u32 = 2;

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: u32,
    pub warnings: Vec<String>,
}

/// Score one trade. `requester_value`/`target_value` are the snapshot totals
/// of each side's offered items at assessment time.
pub fn assess_trade_risk(
    requester: &Actor,
    target: &Actor,
    requester_value: f64,
    target_value: f64,
    now: u64,
) -> RiskAssessment {
    let mut factors = 0u32;
    let mut warnings = Vec::new();

    // (a) low trust score, either party
    for (label, actor) in [("requester", requester), ("target", target)] {
        let score = trust_score(actor, now);
        if score < LOW_TRUST_THRESHOLD {
            factors += 2;
            warnings.push(format!("{} has a low trust score ({:.1})", label, score));
        }
    }

    // (b) lopsided value ratio, only when both sides carry value
    if requester_value > 0.0 && target_value > 0.0 {
        let ratio = requester_value.max(target_value) / requester_value.min(target_value);
        if ratio > VALUE_RATIO_SEVERE {
            factors += 2;
            warnings.push(format!("offered values differ by {:.1}x", ratio));
        } else if ratio > VALUE_RATIO_CAUTION {
            factors += 1;
            warnings.push(format!("offered values differ by {:.1}x", ratio));
        }
    }

    // (c) thin history, either party
    for (label, actor) in [("requester", requester), ("target", target)] {
        if actor.total_trades < NEW_TRADER_THRESHOLD {
            factors += 1;
            warnings.push(format!(
                "{} is a new trader ({} completed trades)",
                label, actor.total_trades
            ));
        }
    }

    // (d) dispute history, either party
    for (label, actor) in [("requester", requester), ("target", target)] {
        if actor.disputed_trades > DISPUTE_COUNT_THRESHOLD {
            factors += 2;
            warnings.push(format!(
                "{} has {} disputed trades",
                label, actor.disputed_trades
            ));
        }
    }

    // (e) absolute value of the trade
    let combined = requester_value + target_value;
    if combined > COMBINED_VALUE_EXTREME {
        factors += 2;
        warnings.push(format!("very high combined value ({:.0})", combined));
    } else if combined > COMBINED_VALUE_HIGH {
        factors += 1;
        warnings.push(format!("high combined value ({:.0})", combined));
    }

    let level = if factors >= HIGH_RISK_FACTORS {
        RiskLevel::HighRisk
    } else if factors >= CAUTION_FACTORS {
        RiskLevel::Caution
    } else {
        RiskLevel::Safe
    };

    RiskAssessment { level, factors, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Actor;

    const NOW: u64 = 1_700_000_000;

    fn veteran(id: i64) -> Actor {
        let mut a = Actor::new(id, NOW);
        a.external_created_at = Some(NOW - 2 * 365 * 86_400);
        a.secondary_created_at = Some(NOW - 365 * 86_400);
        a.total_trades = 50;
        a.successful_trades = 48;
        a
    }

    #[test]
    fn test_veterans_with_balanced_trade_are_safe() {
        let r = assess_trade_risk(&veteran(1), &veteran(2), 1000.0, 900.0, NOW);
        assert_eq!(r.level, RiskLevel::Safe);
        assert_eq!(r.factors, 0);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn test_two_new_traders_reach_caution() {
        let r = assess_trade_risk(&Actor::new(1, NOW), &Actor::new(2, NOW), 1000.0, 0.0, NOW);
        assert_eq!(r.level, RiskLevel::Caution);
        assert_eq!(r.factors, 2);
        assert!(r.warnings.iter().any(|w| w.contains("requester is a new trader")));
        assert!(r.warnings.iter().any(|w| w.contains("target is a new trader")));
    }

    #[test]
    fn test_value_ratio_tiers() {
        let a = veteran(1);
        let b = veteran(2);
        // 2.5x: one factor
        let r = assess_trade_risk(&a, &b, 2500.0, 1000.0, NOW);
        assert_eq!(r.factors, 1);
        // 4x: two factors
        let r = assess_trade_risk(&a, &b, 4000.0, 1000.0, NOW);
        assert_eq!(r.factors, 2);
        // Ratio is only evaluated when both sides carry value.
        let r = assess_trade_risk(&a, &b, 4000.0, 0.0, NOW);
        assert_eq!(r.factors, 0);
    }

    #[test]
    fn test_dispute_history_counts_double() {
        let a = veteran(1);
        let mut b = veteran(2);
        b.disputed_trades = 3;
        let r = assess_trade_risk(&a, &b, 1000.0, 1000.0, NOW);
        assert_eq!(r.factors, 2);
        assert!(r.warnings.iter().any(|w| w.contains("3 disputed trades")));
    }

    #[test]
    fn test_combined_value_thresholds() {
        let a = veteran(1);
        let b = veteran(2);
        let r = assess_trade_risk(&a, &b, 90_000.0, 60_000.0, NOW);
        assert_eq!(r.factors, 1);
        let r = assess_trade_risk(&a, &b, 900_000.0, 600_000.0, NOW);
        assert_eq!(r.factors, 2);
    }

    #[test]
    fn test_lopsided_high_value_between_new_traders_is_high_risk() {
        // ratio >3x (+2), both new (+1+1), combined >1M (+2): six factors
        let r = assess_trade_risk(
            &Actor::new(1, NOW),
            &Actor::new(2, NOW),
            3_001_000.0,
            100.0,
            NOW,
        );
        assert_eq!(r.factors, 6);
        assert_eq!(r.level, RiskLevel::HighRisk);
    }

    #[test]
    fn test_adding_a_trigger_never_lowers_the_count() {
        // Risk monotonicity: flip one more condition on, factor count must
        // not decrease.
        let a = veteran(1);
        let b = veteran(2);
        let base = assess_trade_risk(&a, &b, 1000.0, 900.0, NOW).factors;

        let mut low_trust = b.clone();
        low_trust.behavior_score = 0.0;
        low_trust.total_trades = 10;
        low_trust.successful_trades = 2;
        low_trust.disputed_trades = 2;
        low_trust.external_created_at = None;
        low_trust.secondary_created_at = None;
        let with_trust = assess_trade_risk(&a, &low_trust, 1000.0, 900.0, NOW).factors;
        assert!(with_trust >= base);

        let with_value = assess_trade_risk(&a, &b, 1_000_000.0, 900_000.0, NOW).factors;
        assert!(with_value >= base);
    }

    #[test]
    fn test_warning_order_is_stable() {
        let mut a = Actor::new(1, NOW);
        a.behavior_score = 0.0;
        let mut b = Actor::new(2, NOW);
        b.behavior_score = 0.0;
        let r = assess_trade_risk(&a, &b, 4000.0, 1000.0, NOW);
        // trust warnings first, then ratio, then new-trader, in rule order
        assert!(r.warnings[0].starts_with("requester has a low trust score"));
        assert!(r.warnings[1].starts_with("target has a low trust score"));
        assert!(r.warnings[2].contains("differ by"));
        assert!(r.warnings[3].contains("requester is a new trader"));
        assert!(r.warnings[4].contains("target is a new trader"));
    }
}
