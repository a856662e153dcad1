//! Pure reputation scoring. No I/O; callers persist the returned snapshot.

use crate::model::{Actor, TrustTier};

// Factor weights. Must sum to 1.0 when adding factors.
const W_AGE: f64 = 0.15;
const W_SECONDARY_AGE: f64 = 0.15;
const W_COMPLETION: f64 = 0.25;
const W_DISPUTE: f64 = 0.20;
const W_VOLUME: f64 = 0.10;
const W_BEHAVIOR: f64 = 0.15;

const SECS_PER_DAY: u64 = 86_400;

fn clamp_score(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}

fn age_score(created_at: Option<u64>, now: u64) -> f64 {
    match created_at {
        Some(ts) => {
            let days = now.saturating_sub(ts) as f64 / SECS_PER_DAY as f64;
            clamp_score(days / 365.0 * 100.0)
        }
        None => 0.0,
    }
}

fn completion_score(actor: &Actor) -> f64 {
    if actor.total_trades == 0 {
        // Neutral default so new actors are not penalized for an empty record.
        50.0
    } else {
        actor.successful_trades as f64 / actor.total_trades as f64 * 100.0
    }
}

fn dispute_score(actor: &Actor) -> f64 {
    if actor.total_trades == 0 {
        return 100.0;
    }
    let dispute_rate = actor.disputed_trades as f64 / actor.total_trades as f64;
    // Disputes weigh far heavier than plain non-completion.
    (100.0 - dispute_rate * 500.0).max(0.0)
}

fn volume_score(actor: &Actor) -> f64 {
    clamp_score(50.0 + actor.total_trades as f64 * 2.0)
}

/// Weighted trust score in [0, 100], rounded to one decimal.
pub fn trust_score(actor: &Actor, now: u64) -> f64 {
    let score = age_score(actor.external_created_at, now) * W_AGE
        + age_score(actor.secondary_created_at, now) * W_SECONDARY_AGE
        + completion_score(actor) * W_COMPLETION
        + dispute_score(actor) * W_DISPUTE
        + volume_score(actor) * W_VOLUME
        + clamp_score(actor.behavior_score) * W_BEHAVIOR;
    (clamp_score(score) * 10.0).round() / 10.0
}

/// Threshold table, descending, first match wins.
pub fn trust_tier(score: f64) -> TrustTier {
    if score >= 90.0 {
        TrustTier::Diamond
    } else if score >= 75.0 {
        TrustTier::Platinum
    } else if score >= 60.0 {
        TrustTier::Gold
    } else if score >= 40.0 {
        TrustTier::Silver
    } else {
        TrustTier::Bronze
    }
}

/// Lifecycle events that move reputation. The lifecycle machine guarantees
/// exactly-once invocation per event by gating on state transitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReputationEvent {
    TradeCompleted { value: f64 },
    TradeDisputed,
    TradeCancelled,
    ProofSubmitted,
    ScamDetected,
}

impl ReputationEvent {
    pub fn tag(&self) -> &'static str {
        match self {
            ReputationEvent::TradeCompleted { .. } => "trade_completed",
            ReputationEvent::TradeDisputed => "trade_disputed",
            ReputationEvent::TradeCancelled => "trade_cancelled",
            ReputationEvent::ProofSubmitted => "proof_submitted",
            ReputationEvent::ScamDetected => "scam_detected",
        }
    }
}

/// Apply one event's deltas and return a self-consistent snapshot with
/// `trust_score` recomputed. Component scores clamp to [0, 100]; they are
/// never allowed to escape the range and never panic on it.
pub fn update_reputation(actor: &Actor, event: ReputationEvent, now: u64) -> Actor {
    let mut next = actor.clone();
    match event {
        ReputationEvent::TradeCompleted { value } => {
            next.successful_trades += 1;
            next.total_trades += 1;
            next.reliability = clamp_score(next.reliability + 2.0);
            next.total_value_traded += value;
        }
        ReputationEvent::TradeDisputed => {
            next.disputed_trades += 1;
            next.total_trades += 1;
            next.reliability = clamp_score(next.reliability - 10.0);
            next.fairness = clamp_score(next.fairness - 5.0);
        }
        ReputationEvent::TradeCancelled => {
            next.cancelled_trades += 1;
            next.responsiveness = clamp_score(next.responsiveness - 2.0);
        }
        ReputationEvent::ProofSubmitted => {
            next.proof_compliance = clamp_score(next.proof_compliance + 5.0);
        }
        ReputationEvent::ScamDetected => {
            next.reliability = clamp_score(next.reliability - 20.0);
            next.fairness = clamp_score(next.fairness - 15.0);
        }
    }
    next.trust_score = trust_score(&next, now);
    next.updated_at = now;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn fresh(id: i64) -> Actor {
        Actor::new(id, NOW)
    }

    #[test]
    fn test_new_actor_gets_neutral_score() {
        // No linked accounts, no trades: 50*.25 + 100*.20 + 50*.10 + 50*.15
        let score = trust_score(&fresh(1), NOW);
        assert_eq!(score, 45.0);
        assert_eq!(trust_tier(score), TrustTier::Silver);
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let mut a = fresh(1);
        a.external_created_at = Some(NOW - 20 * 365 * 86_400);
        a.secondary_created_at = Some(NOW - 20 * 365 * 86_400);
        a.total_trades = 10_000;
        a.successful_trades = 10_000;
        a.behavior_score = 100.0;
        let high = trust_score(&a, NOW);
        assert!(high <= 100.0, "score escaped upper bound: {}", high);

        let mut b = fresh(2);
        b.total_trades = 10;
        b.disputed_trades = 10;
        b.behavior_score = 0.0;
        let low = trust_score(&b, NOW);
        assert!(low >= 0.0, "score escaped lower bound: {}", low);
    }

    #[test]
    fn test_tier_thresholds_descending() {
        assert_eq!(trust_tier(95.0), TrustTier::Diamond);
        assert_eq!(trust_tier(90.0), TrustTier::Diamond);
        assert_eq!(trust_tier(89.9), TrustTier::Platinum);
        assert_eq!(trust_tier(75.0), TrustTier::Platinum);
        assert_eq!(trust_tier(60.0), TrustTier::Gold);
        assert_eq!(trust_tier(40.0), TrustTier::Silver);
        assert_eq!(trust_tier(39.9), TrustTier::Bronze);
    }

    #[test]
    fn test_tier_monotonic_in_score() {
        let mut prev = trust_tier(0.0);
        for i in 0..=1000 {
            let tier = trust_tier(i as f64 / 10.0);
            assert!(tier >= prev, "tier regressed at score {}", i as f64 / 10.0);
            prev = tier;
        }
    }

    #[test]
    fn test_completed_deltas_exact() {
        let a = fresh(1);
        let next = update_reputation(&a, ReputationEvent::TradeCompleted { value: 1234.0 }, NOW);
        assert_eq!(next.successful_trades, a.successful_trades + 1);
        assert_eq!(next.total_trades, a.total_trades + 1);
        assert_eq!(next.disputed_trades, a.disputed_trades);
        assert_eq!(next.cancelled_trades, a.cancelled_trades);
        assert_eq!(next.reliability, 52.0);
        assert_eq!(next.total_value_traded, 1234.0);
    }

    #[test]
    fn test_dispute_more_punitive_than_cancel() {
        let a = fresh(1);
        let disputed = update_reputation(&a, ReputationEvent::TradeDisputed, NOW);
        let cancelled = update_reputation(&a, ReputationEvent::TradeCancelled, NOW);
        assert!(disputed.trust_score < cancelled.trust_score);
        assert_eq!(disputed.reliability, 40.0);
        assert_eq!(disputed.fairness, 45.0);
        assert_eq!(cancelled.responsiveness, 48.0);
    }

    #[test]
    fn test_component_scores_clamp_at_floor() {
        let mut a = fresh(1);
        a.reliability = 5.0;
        a.fairness = 3.0;
        let next = update_reputation(&a, ReputationEvent::ScamDetected, NOW);
        assert_eq!(next.reliability, 0.0);
        assert_eq!(next.fairness, 0.0);
    }

    #[test]
    fn test_proof_submission_caps_at_100() {
        let mut a = fresh(1);
        a.proof_compliance = 98.0;
        let next = update_reputation(&a, ReputationEvent::ProofSubmitted, NOW);
        assert_eq!(next.proof_compliance, 100.0);
    }

    #[test]
    fn test_dispute_rate_dominates_completion() {
        // Same completion ratio; the disputed record must score lower.
        let mut clean = fresh(1);
        clean.total_trades = 10;
        clean.successful_trades = 8;
        let mut disputed = clean.clone();
        disputed.disputed_trades = 2;
        assert!(trust_score(&disputed, NOW) < trust_score(&clean, NOW));
        // Two disputes in ten trades already zeroes the dispute factor.
        assert_eq!(super::dispute_score(&disputed), 0.0);
    }

    #[test]
    fn test_veteran_hits_diamond() {
        let mut a = fresh(1);
        a.external_created_at = Some(NOW - 2 * 365 * 86_400);
        a.secondary_created_at = Some(NOW - 2 * 365 * 86_400);
        a.total_trades = 100;
        a.successful_trades = 100;
        let score = trust_score(&a, NOW);
        assert_eq!(score, 92.5);
        assert_eq!(trust_tier(score), TrustTier::Diamond);
    }
}
