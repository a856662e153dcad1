//! Trade lifecycle state machine.
//!
//! Pure transitions: `apply_event` takes the current trade snapshot and one
//! event, mutates the snapshot, and returns the side effects the caller must
//! execute (reputation updates, receipt generation, risk assessment). All
//! I/O, locking, and effect execution live in the broker layer; this module
//! never suspends.

use crate::error::{BrokerError, BrokerResult};
use crate::model::{ItemStack, RiskLevel, Trade, TradeStatus};
use crate::reputation::ReputationEvent;

#[derive(Debug, Clone)]
pub enum TradeEvent {
    /// draft → pending. Guard: at least one offered item.
    Submit,
    /// pending → accepted. Only the designated target; an open offer adopts
    /// the acceptor as target.
    Accept { actor_id: i64 },
    /// pending → cancelled, target-initiated. Carries no reputation penalty
    /// for the target.
    Decline { actor_id: i64 },
    /// pending → counter_offered: the counterparty names their side.
    Counter { actor_id: i64, target_items: Vec<ItemStack> },
    /// counter_offered → pending (requester rejects the counter).
    CounterDecline { actor_id: i64 },
    /// counter_offered → accepted (requester takes the counter).
    CounterAccept { actor_id: i64 },
    /// accepted → trust_check, recording the assessment. HighRisk arms the
    /// approval deadline; anything else is waved through by `RiskCleared`.
    RiskAssessed {
        level: RiskLevel,
        warnings: Vec<String>,
        deadline: Option<u64>,
    },
    /// trust_check → in_game_trade for Safe/Caution trades.
    RiskCleared,
    /// trust_check → in_game_trade, the explicit secondary confirmation a
    /// HighRisk trade requires.
    RiskApproved { actor_id: i64 },
    /// trust_check → cancelled. `actor_id` is None when the sweep
    /// default-denies on timeout.
    RiskDenied { actor_id: Option<i64> },
    /// in_game_trade: set the caller's own confirmation flag. Idempotent;
    /// the second distinct confirmation completes the trade.
    ConfirmHandoff { actor_id: i64 },
    /// any active state → disputed, either party.
    Dispute { actor_id: i64 },
    /// draft/pending/accepted/trust_check → cancelled. Requester self-cancel
    /// is the only cancellation that draws a penalty.
    Cancel { actor_id: i64 },
    /// disputed → completed/cancelled, moderator privilege only.
    ModeratorResolve {
        moderator_id: i64,
        resolution: Resolution,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Complete,
    Cancel,
    /// Cancel and mark the named party as the scammer.
    Scam { actor_id: i64 },
}

/// Side effects owed after a successful transition. The broker executes
/// these exactly once, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Reputation { actor_id: i64, event: ReputationEvent },
    /// Run the risk assessor over the item snapshots and feed the result
    /// back as `RiskAssessed`.
    AssessRisk,
    /// Stamp the receipt hash. Only ever emitted alongside completion.
    GenerateReceipt,
}

pub fn apply_event(trade: &mut Trade, event: TradeEvent, now: u64) -> BrokerResult<Vec<Effect>> {
    match (trade.status, event) {
        (TradeStatus::Draft, TradeEvent::Submit) => {
            if trade.requester_items.is_empty() {
                return Err(BrokerError::Validation(
                    "a trade offer needs at least one item".to_string(),
                ));
            }
            trade.status = TradeStatus::Pending;
            trade.updated_at = now;
            Ok(vec![])
        }

        (TradeStatus::Pending, TradeEvent::Accept { actor_id }) => {
            match trade.target_id {
                Some(target) if target != actor_id => {
                    return Err(BrokerError::Unauthorized(
                        "only the offer's target may accept".to_string(),
                    ));
                }
                None if actor_id == trade.requester_id => {
                    return Err(BrokerError::Validation(
                        "requester cannot accept their own open offer".to_string(),
                    ));
                }
                None => trade.target_id = Some(actor_id),
                Some(_) => {}
            }
            trade.status = TradeStatus::Accepted;
            trade.updated_at = now;
            Ok(vec![Effect::AssessRisk])
        }
        // Accepting a draft is nonsensical: no target can exist yet.
        (TradeStatus::Draft, TradeEvent::Accept { .. }) => Err(BrokerError::StateConflict(
            "offer has not been submitted".to_string(),
        )),

        (TradeStatus::Pending, TradeEvent::Decline { actor_id }) => {
            match trade.target_id {
                Some(target) if target != actor_id => {
                    return Err(BrokerError::Unauthorized(
                        "only the offer's target may decline".to_string(),
                    ));
                }
                None => {
                    return Err(BrokerError::StateConflict(
                        "open offer has no target to decline it".to_string(),
                    ));
                }
                Some(_) => {}
            }
            trade.status = TradeStatus::Cancelled;
            trade.updated_at = now;
            // Target decline deliberately carries no reputation effect.
            Ok(vec![])
        }

        (TradeStatus::Pending, TradeEvent::Counter { actor_id, target_items }) => {
            if actor_id == trade.requester_id {
                return Err(BrokerError::Validation(
                    "requester cannot counter their own offer".to_string(),
                ));
            }
            if let Some(target) = trade.target_id {
                if target != actor_id {
                    return Err(BrokerError::Unauthorized(
                        "only the offer's target may counter".to_string(),
                    ));
                }
            }
            if target_items.is_empty() {
                return Err(BrokerError::Validation(
                    "a counter-offer needs at least one item".to_string(),
                ));
            }
            trade.target_id = Some(actor_id);
            trade.target_items = target_items;
            trade.status = TradeStatus::CounterOffered;
            trade.updated_at = now;
            Ok(vec![])
        }

        (TradeStatus::CounterOffered, TradeEvent::CounterDecline { actor_id }) => {
            if actor_id != trade.requester_id {
                return Err(BrokerError::Unauthorized(
                    "only the requester may decline a counter-offer".to_string(),
                ));
            }
            trade.target_items.clear();
            trade.status = TradeStatus::Pending;
            trade.updated_at = now;
            Ok(vec![])
        }

        (TradeStatus::CounterOffered, TradeEvent::CounterAccept { actor_id }) => {
            if actor_id != trade.requester_id {
                return Err(BrokerError::Unauthorized(
                    "only the requester may accept a counter-offer".to_string(),
                ));
            }
            trade.status = TradeStatus::Accepted;
            trade.updated_at = now;
            Ok(vec![Effect::AssessRisk])
        }

        (TradeStatus::Accepted, TradeEvent::RiskAssessed { level, warnings, deadline }) => {
            trade.risk_level = Some(level);
            trade.risk_warnings = warnings;
            trade.status = TradeStatus::TrustCheck;
            trade.risk_deadline = if level == RiskLevel::HighRisk { deadline } else { None };
            trade.updated_at = now;
            Ok(vec![])
        }

        (TradeStatus::TrustCheck, TradeEvent::RiskCleared) => {
            match trade.risk_level {
                Some(RiskLevel::HighRisk) => Err(BrokerError::StateConflict(
                    "high-risk trade requires explicit approval".to_string(),
                )),
                Some(_) => {
                    trade.status = TradeStatus::InGameTrade;
                    trade.updated_at = now;
                    Ok(vec![])
                }
                None => Err(BrokerError::Invariant(
                    "trust_check reached without a risk assessment".to_string(),
                )),
            }
        }

        (TradeStatus::TrustCheck, TradeEvent::RiskApproved { actor_id }) => {
            if !trade.is_party(actor_id) {
                return Err(BrokerError::Unauthorized(
                    "only a trade party may approve the risk gate".to_string(),
                ));
            }
            if let Some(deadline) = trade.risk_deadline {
                if now > deadline {
                    return Err(BrokerError::StateConflict(
                        "approval window elapsed".to_string(),
                    ));
                }
            }
            trade.risk_deadline = None;
            trade.status = TradeStatus::InGameTrade;
            trade.updated_at = now;
            Ok(vec![])
        }

        (TradeStatus::TrustCheck, TradeEvent::RiskDenied { actor_id }) => {
            if let Some(id) = actor_id {
                if !trade.is_party(id) {
                    return Err(BrokerError::Unauthorized(
                        "only a trade party may deny the risk gate".to_string(),
                    ));
                }
            }
            trade.status = TradeStatus::Cancelled;
            trade.updated_at = now;
            Ok(vec![])
        }

        (TradeStatus::InGameTrade, TradeEvent::ConfirmHandoff { actor_id }) => {
            let target = trade.target_id.ok_or_else(|| {
                BrokerError::Invariant("in_game_trade without a target".to_string())
            })?;
            if actor_id == trade.requester_id {
                if trade.requester_confirmed {
                    return Ok(vec![]); // re-confirming is a no-op
                }
                trade.requester_confirmed = true;
            } else if actor_id == target {
                if trade.target_confirmed {
                    return Ok(vec![]);
                }
                trade.target_confirmed = true;
            } else {
                return Err(BrokerError::Unauthorized(
                    "only a trade party may confirm the handoff".to_string(),
                ));
            }
            trade.updated_at = now;

            if !(trade.requester_confirmed && trade.target_confirmed) {
                return Ok(vec![]);
            }
            // Second flag just landed: the single completion trigger point.
            trade.status = TradeStatus::Completed;
            trade.completed_at = Some(now);
            let value = trade.requester_value() + trade.target_value();
            Ok(vec![
                Effect::Reputation {
                    actor_id: trade.requester_id,
                    event: ReputationEvent::TradeCompleted { value },
                },
                Effect::Reputation {
                    actor_id: target,
                    event: ReputationEvent::TradeCompleted { value },
                },
                Effect::GenerateReceipt,
            ])
        }

        (status, TradeEvent::Dispute { actor_id }) if status.is_active() => {
            if !trade.is_party(actor_id) {
                return Err(BrokerError::Unauthorized(
                    "only a trade party may open a dispute".to_string(),
                ));
            }
            trade.status = TradeStatus::Disputed;
            trade.updated_at = now;
            let mut effects = vec![Effect::Reputation {
                actor_id: trade.requester_id,
                event: ReputationEvent::TradeDisputed,
            }];
            if let Some(target) = trade.target_id {
                effects.push(Effect::Reputation {
                    actor_id: target,
                    event: ReputationEvent::TradeDisputed,
                });
            }
            Ok(effects)
        }

        (
            TradeStatus::Draft
            | TradeStatus::Pending
            | TradeStatus::CounterOffered
            | TradeStatus::Accepted
            | TradeStatus::TrustCheck,
            TradeEvent::Cancel { actor_id },
        ) => {
            if !trade.is_party(actor_id) {
                return Err(BrokerError::Unauthorized(
                    "only a trade party may cancel".to_string(),
                ));
            }
            trade.status = TradeStatus::Cancelled;
            trade.updated_at = now;
            if actor_id == trade.requester_id {
                Ok(vec![Effect::Reputation {
                    actor_id,
                    event: ReputationEvent::TradeCancelled,
                }])
            } else {
                Ok(vec![])
            }
        }
        // A trade in active handoff must resolve to completed or disputed;
        // it cannot silently vanish.
        (TradeStatus::InGameTrade, TradeEvent::Cancel { .. }) => Err(BrokerError::StateConflict(
            "handoff in progress; dispute it instead of cancelling".to_string(),
        )),

        (TradeStatus::Disputed, TradeEvent::ModeratorResolve { resolution, .. }) => {
            match resolution {
                Resolution::Complete => {
                    let target = trade.target_id.ok_or_else(|| {
                        BrokerError::Invariant("disputed trade without a target".to_string())
                    })?;
                    trade.status = TradeStatus::Completed;
                    trade.completed_at = Some(now);
                    trade.updated_at = now;
                    let value = trade.requester_value() + trade.target_value();
                    Ok(vec![
                        Effect::Reputation {
                            actor_id: trade.requester_id,
                            event: ReputationEvent::TradeCompleted { value },
                        },
                        Effect::Reputation {
                            actor_id: target,
                            event: ReputationEvent::TradeCompleted { value },
                        },
                        Effect::GenerateReceipt,
                    ])
                }
                Resolution::Cancel => {
                    trade.status = TradeStatus::Cancelled;
                    trade.updated_at = now;
                    Ok(vec![])
                }
                Resolution::Scam { actor_id } => {
                    if !trade.is_party(actor_id) {
                        return Err(BrokerError::Validation(
                            "scam ruling must name a trade party".to_string(),
                        ));
                    }
                    trade.status = TradeStatus::Cancelled;
                    trade.updated_at = now;
                    Ok(vec![Effect::Reputation {
                        actor_id,
                        event: ReputationEvent::ScamDetected,
                    }])
                }
            }
        }
        (_, TradeEvent::ModeratorResolve { .. }) => Err(BrokerError::StateConflict(
            "moderator resolution applies to disputed trades only".to_string(),
        )),

        (TradeStatus::Completed, _) => Err(BrokerError::StateConflict(
            "trade already completed".to_string(),
        )),
        (TradeStatus::Cancelled, _) => Err(BrokerError::StateConflict(
            "trade was cancelled".to_string(),
        )),
        (TradeStatus::Disputed, _) => Err(BrokerError::StateConflict(
            "trade is frozen pending moderation".to_string(),
        )),

        (status, _) => Err(BrokerError::StateConflict(format!(
            "event not legal from {}",
            status.as_str()
        ))),
    }
}
