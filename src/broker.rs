//! Async trade orchestration.
//!
//! The broker owns I/O and serialization around the pure lifecycle machine:
//! every mutating operation takes the trade's keyed lock, re-fetches fresh
//! state from the store (never trusting a caller-supplied status), applies
//! one event, persists, then executes the returned side effects exactly
//! once. Reputation writes take the actor's keyed lock one at a time so two
//! trades completing near-simultaneously cannot lose an update.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::resolver::ItemResolver;
use crate::error::{BrokerError, BrokerResult};
use crate::history::{HistoryAction, HistoryEvent, HistoryLog};
use crate::lifecycle::{apply_event, Effect, Resolution, TradeEvent};
use crate::locks::{actor_key, trade_key, KeyedLocks};
use crate::logging::{log, obj, v_int, v_num, v_str, Domain, Level};
use crate::model::{Game, ItemStack, RiskLevel, Trade, TradeStatus};
use crate::ratelimit::{GuardAction, RateGuard, RateLimits};
use crate::receipt::generate_receipt_hash;
use crate::reputation::{update_reputation, ReputationEvent};
use crate::risk::assess_trade_risk;
use crate::state::Config;
use crate::storage::Store;

/// One free-text line of an offer: "what" and "how many".
#[derive(Debug, Clone)]
pub struct OfferLine {
    pub query: String,
    pub quantity: u32,
}

pub struct Broker {
    cfg: Config,
    store: Arc<Store>,
    resolver: Arc<ItemResolver>,
    history: Arc<HistoryLog>,
    guard: Arc<RateGuard>,
    locks: Arc<KeyedLocks>,
}

impl Broker {
    /// Collaborators are constructed once at process start and passed in;
    /// the rate guard and lock registry are shared with the auction house.
    pub fn new(
        cfg: Config,
        store: Arc<Store>,
        resolver: Arc<ItemResolver>,
        guard: Arc<RateGuard>,
        locks: Arc<KeyedLocks>,
    ) -> BrokerResult<Self> {
        let history = HistoryLog::open(&cfg.history_path)
            .map_err(|e| BrokerError::External(format!("history log: {}", e)))?;
        Ok(Self {
            cfg,
            store,
            resolver,
            history: Arc::new(history),
            guard,
            locks,
        })
    }

    fn trade_limits(&self) -> RateLimits {
        RateLimits {
            per_minute: self.cfg.trades_per_minute,
            per_hour: self.cfg.trades_per_hour,
        }
    }

    fn fetch_trade(&self, id: i64) -> BrokerResult<Trade> {
        self.store
            .get_trade(id)?
            .ok_or_else(|| BrokerError::NotFound(format!("trade {}", id)))
    }

    fn require_not_banned(&self, actor_id: i64, now: u64) -> BrokerResult<()> {
        let actor = self.store.get_or_create_actor(actor_id, now)?;
        if actor.banned {
            return Err(BrokerError::Unauthorized(format!(
                "actor {} is banned: {}",
                actor_id,
                actor.ban_reason.as_deref().unwrap_or("no reason recorded")
            )));
        }
        Ok(())
    }

    fn record(&self, event: HistoryEvent) {
        // History is audit-only; a write failure must not fail the trade,
        // but it is an operational problem worth a loud log line.
        if let Err(e) = self.history.append(&event) {
            log(
                Level::Error,
                Domain::Audit,
                "history_append_failed",
                obj(&[("trade_id", v_int(event.trade_id)), ("error", v_str(&e.to_string()))]),
            );
        }
    }

    /// Apply one reputation event against the latest stored snapshot,
    /// serialized per actor.
    async fn apply_reputation(&self, actor_id: i64, event: ReputationEvent, now: u64) -> BrokerResult<()> {
        let _guard = self.locks.acquire(&actor_key(actor_id)).await;
        let actor = self.store.get_or_create_actor(actor_id, now)?;
        let updated = update_reputation(&actor, event, now);
        if !(0.0..=100.0).contains(&updated.trust_score) {
            // Defect in the scoring model, not user error.
            log(
                Level::Error,
                Domain::Reputation,
                "score_out_of_bounds",
                obj(&[("actor_id", v_int(actor_id)), ("score", v_num(updated.trust_score))]),
            );
            return Err(BrokerError::Invariant(format!(
                "trust score {} out of range for actor {}",
                updated.trust_score, actor_id
            )));
        }
        self.store.update_actor(&updated)?;
        log(
            Level::Info,
            Domain::Reputation,
            event.tag(),
            obj(&[
                ("actor_id", v_int(actor_id)),
                ("trust_score", v_num(updated.trust_score)),
            ]),
        );
        Ok(())
    }

    async fn execute_effects(&self, effects: Vec<Effect>, now: u64) -> BrokerResult<()> {
        for effect in effects {
            match effect {
                Effect::Reputation { actor_id, event } => {
                    self.apply_reputation(actor_id, event, now).await?;
                }
                // AssessRisk and GenerateReceipt are handled inline by the
                // operations that produce them; reaching here is a wiring bug.
                Effect::AssessRisk | Effect::GenerateReceipt => {
                    return Err(BrokerError::Invariant(
                        "unexecuted inline effect reached the effect runner".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn resolve_lines(
        &self,
        game: Game,
        lines: &[OfferLine],
        now: u64,
    ) -> BrokerResult<Vec<ItemStack>> {
        let mut stacks = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 || line.quantity > 10_000 {
                return Err(BrokerError::Validation(format!(
                    "quantity {} out of range for \"{}\"",
                    line.quantity, line.query
                )));
            }
            let item = match self.resolver.resolve_item(game, &line.query, now).await? {
                Some(item) => item,
                None => {
                    let suggestions = self
                        .resolver
                        .suggest_items(game, &line.query, self.cfg.suggest_limit, now)
                        .await
                        .unwrap_or_default();
                    let hint = suggestions
                        .first()
                        .map(|i| format!("; did you mean \"{}\"?", i.name))
                        .unwrap_or_default();
                    return Err(BrokerError::Validation(format!(
                        "unknown item \"{}\"{}",
                        line.query, hint
                    )));
                }
            };
            if !item.tradeable {
                return Err(BrokerError::Validation(format!(
                    "\"{}\" is not tradeable",
                    item.name
                )));
            }
            stacks.push(ItemStack { item, quantity: line.quantity });
        }
        Ok(stacks)
    }

    // ------------------------------------------------------------------
    // Trade operations
    // ------------------------------------------------------------------

    /// Create and submit a trade offer. `target_id == None` publishes an
    /// open offer anyone may accept.
    pub async fn propose_trade(
        &self,
        requester_id: i64,
        target_id: Option<i64>,
        game: Game,
        offered: &[OfferLine],
        requested: &[OfferLine],
        now: u64,
    ) -> BrokerResult<Trade> {
        self.require_not_banned(requester_id, now)?;
        if target_id == Some(requester_id) {
            return Err(BrokerError::Validation("cannot trade with yourself".to_string()));
        }
        self.guard
            .check_and_count(requester_id, GuardAction::ProposeTrade, self.trade_limits(), now)
            .map_err(|retry_after| BrokerError::RateLimited { retry_after })?;

        let requester_items = self.resolve_lines(game, offered, now).await?;
        let target_items = self.resolve_lines(game, requested, now).await?;

        let mut trade = Trade {
            id: 0,
            requester_id,
            target_id,
            game,
            status: TradeStatus::Draft,
            risk_level: None,
            risk_warnings: vec![],
            requester_items,
            target_items,
            requester_confirmed: false,
            target_confirmed: false,
            receipt_hash: None,
            moderator_note: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            risk_deadline: None,
        };
        let effects = apply_event(&mut trade, TradeEvent::Submit, now)?;
        debug_assert!(effects.is_empty());
        trade.id = self.store.create_trade(&trade)?;

        self.record(HistoryEvent {
            ts: now,
            trade_id: trade.id,
            action: HistoryAction::Proposed,
            actor_id: Some(requester_id),
            moderator: false,
            details: target_id.map(|t| format!("target {}", t)),
        });
        log(
            Level::Info,
            Domain::Trade,
            "proposed",
            obj(&[
                ("trade_id", v_int(trade.id)),
                ("requester_id", v_int(requester_id)),
                ("game", v_str(game.as_str())),
                ("offer_value", v_num(trade.requester_value())),
                ("ask_value", v_num(trade.target_value())),
            ]),
        );
        Ok(trade)
    }

    /// Accept an offer and run the risk gate. Safe/Caution trades move
    /// straight into the handoff phase; HighRisk trades stop in
    /// `trust_check` awaiting `approve_high_risk` before the deadline.
    pub async fn accept_trade(&self, trade_id: i64, actor_id: i64, now: u64) -> BrokerResult<Trade> {
        self.require_not_banned(actor_id, now)?;
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(&mut trade, TradeEvent::Accept { actor_id }, now)?;
        self.store.update_trade(&trade)?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::Accepted,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        if effects.contains(&Effect::AssessRisk) {
            self.run_risk_gate(&mut trade, now).await?;
        }
        Ok(trade)
    }

    /// Risk assessment plus the automatic trust_check transition chain.
    /// Caller holds the trade lock.
    async fn run_risk_gate(&self, trade: &mut Trade, now: u64) -> BrokerResult<()> {
        let target_id = trade.target_id.ok_or_else(|| {
            BrokerError::Invariant("risk gate without a target".to_string())
        })?;
        let requester = self.store.get_or_create_actor(trade.requester_id, now)?;
        let target = self.store.get_or_create_actor(target_id, now)?;
        let assessment = assess_trade_risk(
            &requester,
            &target,
            trade.requester_value(),
            trade.target_value(),
            now,
        );
        log(
            Level::Info,
            Domain::Risk,
            "assessed",
            obj(&[
                ("trade_id", v_int(trade.id)),
                ("level", v_str(assessment.level.as_str())),
                ("factors", v_num(assessment.factors as f64)),
            ]),
        );
        let deadline = now + self.cfg.risk_confirm_timeout_secs;
        apply_event(
            trade,
            TradeEvent::RiskAssessed {
                level: assessment.level,
                warnings: assessment.warnings.clone(),
                deadline: Some(deadline),
            },
            now,
        )?;
        self.store.update_trade(trade)?;
        self.record(HistoryEvent {
            ts: now,
            trade_id: trade.id,
            action: HistoryAction::RiskAssessed,
            actor_id: None,
            moderator: false,
            details: Some(assessment.level.as_str().to_string()),
        });

        if assessment.level != RiskLevel::HighRisk {
            apply_event(trade, TradeEvent::RiskCleared, now)?;
            self.store.update_trade(trade)?;
        }
        Ok(())
    }

    /// Target turns the offer down. No reputation penalty on either side.
    pub async fn decline_trade(&self, trade_id: i64, actor_id: i64, now: u64) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(&mut trade, TradeEvent::Decline { actor_id }, now)?;
        self.store.update_trade(&trade)?;
        self.execute_effects(effects, now).await?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::Declined,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        Ok(trade)
    }

    /// Counterparty answers with their own side of the bargain.
    pub async fn counter_offer(
        &self,
        trade_id: i64,
        actor_id: i64,
        counter: &[OfferLine],
        now: u64,
    ) -> BrokerResult<Trade> {
        self.require_not_banned(actor_id, now)?;
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let target_items = self.resolve_lines(trade.game, counter, now).await?;
        apply_event(&mut trade, TradeEvent::Counter { actor_id, target_items }, now)?;
        self.store.update_trade(&trade)?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::Countered,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        Ok(trade)
    }

    /// Requester answers a counter-offer: take it (risk gate runs) or send
    /// the trade back to pending.
    pub async fn respond_counter(
        &self,
        trade_id: i64,
        actor_id: i64,
        accept: bool,
        now: u64,
    ) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let (event, action) = if accept {
            (TradeEvent::CounterAccept { actor_id }, HistoryAction::CounterAccepted)
        } else {
            (TradeEvent::CounterDecline { actor_id }, HistoryAction::CounterDeclined)
        };
        let effects = apply_event(&mut trade, event, now)?;
        self.store.update_trade(&trade)?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        if effects.contains(&Effect::AssessRisk) {
            self.run_risk_gate(&mut trade, now).await?;
        }
        Ok(trade)
    }

    /// Secondary confirmation for a HighRisk trade.
    pub async fn approve_high_risk(&self, trade_id: i64, actor_id: i64, now: u64) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        apply_event(&mut trade, TradeEvent::RiskApproved { actor_id }, now)?;
        self.store.update_trade(&trade)?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::RiskApproved,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        Ok(trade)
    }

    /// Explicit refusal of the HighRisk gate; cancels the trade.
    pub async fn deny_high_risk(&self, trade_id: i64, actor_id: i64, now: u64) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(&mut trade, TradeEvent::RiskDenied { actor_id: Some(actor_id) }, now)?;
        self.store.update_trade(&trade)?;
        self.execute_effects(effects, now).await?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::RiskDenied,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        Ok(trade)
    }

    /// Record one party's confirmation of the out-of-band handoff. The
    /// second confirmation completes the trade: reputation for both
    /// parties, receipt stamp, completion timestamp. This fires exactly once.
    pub async fn confirm_handoff(&self, trade_id: i64, actor_id: i64, now: u64) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(&mut trade, TradeEvent::ConfirmHandoff { actor_id }, now)?;

        let completing = effects.iter().any(|e| matches!(e, Effect::GenerateReceipt));
        if completing {
            trade.receipt_hash = Some(generate_receipt_hash(&trade)?);
        }
        self.store.update_trade(&trade)?;

        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::HandoffConfirmed,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });

        let reputation: Vec<Effect> = effects
            .into_iter()
            .filter(|e| matches!(e, Effect::Reputation { .. }))
            .collect();
        self.execute_effects(reputation, now).await?;

        if completing {
            self.record(HistoryEvent {
                ts: now,
                trade_id,
                action: HistoryAction::Completed,
                actor_id: None,
                moderator: false,
                details: trade.receipt_hash.clone(),
            });
            log(
                Level::Info,
                Domain::Trade,
                "completed",
                obj(&[
                    ("trade_id", v_int(trade_id)),
                    ("receipt", v_str(trade.receipt_hash.as_deref().unwrap_or(""))),
                ]),
            );
        }
        Ok(trade)
    }

    /// Freeze the trade for moderation.
    pub async fn dispute_trade(
        &self,
        trade_id: i64,
        actor_id: i64,
        reason: Option<String>,
        now: u64,
    ) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(&mut trade, TradeEvent::Dispute { actor_id }, now)?;
        self.store.update_trade(&trade)?;
        self.execute_effects(effects, now).await?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::Disputed,
            actor_id: Some(actor_id),
            moderator: false,
            details: reason,
        });
        Ok(trade)
    }

    /// Withdraw a trade that has not reached the handoff phase. A requester
    /// self-cancel draws the cancellation penalty and a proposal cooldown.
    pub async fn cancel_trade(&self, trade_id: i64, actor_id: i64, now: u64) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(&mut trade, TradeEvent::Cancel { actor_id }, now)?;
        self.store.update_trade(&trade)?;
        self.execute_effects(effects, now).await?;
        if actor_id == trade.requester_id && self.cfg.proposal_cooldown_secs > 0 {
            self.guard.set_cooldown(
                actor_id,
                GuardAction::ProposeTrade,
                Duration::from_secs(self.cfg.proposal_cooldown_secs),
                now,
            );
        }
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::Cancelled,
            actor_id: Some(actor_id),
            moderator: false,
            details: None,
        });
        Ok(trade)
    }

    /// Moderator override: the only legal bypass of the normal guards.
    /// The caller is responsible for having authenticated moderator
    /// privilege; the override is always logged with the moderator marker.
    pub async fn resolve_disputed(
        &self,
        trade_id: i64,
        moderator_id: i64,
        resolution: Resolution,
        note: Option<String>,
        now: u64,
    ) -> BrokerResult<Trade> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let mut trade = self.fetch_trade(trade_id)?;
        let effects = apply_event(
            &mut trade,
            TradeEvent::ModeratorResolve { moderator_id, resolution },
            now,
        )?;
        trade.moderator_note = note.clone();
        if effects.iter().any(|e| matches!(e, Effect::GenerateReceipt)) {
            trade.receipt_hash = Some(generate_receipt_hash(&trade)?);
        }
        self.store.update_trade(&trade)?;
        let reputation: Vec<Effect> = effects
            .into_iter()
            .filter(|e| matches!(e, Effect::Reputation { .. }))
            .collect();
        self.execute_effects(reputation, now).await?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::ModeratorResolved,
            actor_id: Some(moderator_id),
            moderator: true,
            details: note,
        });
        log(
            Level::Warn,
            Domain::Trade,
            "moderator_override",
            obj(&[
                ("trade_id", v_int(trade_id)),
                ("moderator_id", v_int(moderator_id)),
                ("status", v_str(trade.status.as_str())),
            ]),
        );
        Ok(trade)
    }

    /// Record out-of-band proof for an active trade. Rewards the submitter's
    /// proof compliance; does not move the lifecycle.
    pub async fn submit_proof(
        &self,
        trade_id: i64,
        actor_id: i64,
        details: Option<String>,
        now: u64,
    ) -> BrokerResult<()> {
        let _guard = self.locks.acquire(&trade_key(trade_id)).await;
        let trade = self.fetch_trade(trade_id)?;
        if !trade.is_party(actor_id) {
            return Err(BrokerError::Unauthorized(
                "only a trade party may attach proof".to_string(),
            ));
        }
        if !trade.status.is_active() {
            return Err(BrokerError::StateConflict(
                "proof can only be attached to an active trade".to_string(),
            ));
        }
        self.apply_reputation(actor_id, ReputationEvent::ProofSubmitted, now).await?;
        self.record(HistoryEvent {
            ts: now,
            trade_id,
            action: HistoryAction::ProofSubmitted,
            actor_id: Some(actor_id),
            moderator: false,
            details,
        });
        Ok(())
    }

    /// Default-deny HighRisk trades whose approval window elapsed. Called
    /// by the periodic sweep; returns how many trades were cancelled.
    pub async fn expire_overdue_risk_checks(&self, now: u64) -> BrokerResult<usize> {
        let overdue = self.store.list_overdue_trust_checks(now)?;
        let mut expired = 0;
        for stale in overdue {
            let _guard = self.locks.acquire(&trade_key(stale.id)).await;
            // Re-check under the lock: an approval may have raced the sweep.
            let mut trade = self.fetch_trade(stale.id)?;
            let still_overdue = trade.status == TradeStatus::TrustCheck
                && trade.risk_deadline.map(|d| d <= now).unwrap_or(false);
            if !still_overdue {
                continue;
            }
            apply_event(&mut trade, TradeEvent::RiskDenied { actor_id: None }, now)?;
            self.store.update_trade(&trade)?;
            self.record(HistoryEvent {
                ts: now,
                trade_id: trade.id,
                action: HistoryAction::RiskDenied,
                actor_id: None,
                moderator: false,
                details: Some("approval timeout".to_string()),
            });
            expired += 1;
        }
        Ok(expired)
    }

    // ------------------------------------------------------------------
    // Actor surface
    // ------------------------------------------------------------------

    /// Attach a linked external account's creation time; it feeds the
    /// account-age reputation factors. `secondary` targets the second
    /// linked identity slot.
    pub async fn link_external_account(
        &self,
        actor_id: i64,
        account_created_at: u64,
        secondary: bool,
        now: u64,
    ) -> BrokerResult<()> {
        let _guard = self.locks.acquire(&actor_key(actor_id)).await;
        let mut actor = self.store.get_or_create_actor(actor_id, now)?;
        if secondary {
            actor.secondary_created_at = Some(account_created_at);
        } else {
            actor.external_created_at = Some(account_created_at);
        }
        actor.trust_score = crate::reputation::trust_score(&actor, now);
        actor.updated_at = now;
        self.store.update_actor(&actor)
    }

    /// Soft ban: the record survives, the actor just loses the surface.
    /// Privileged, like `resolve_disputed`; the caller authenticates
    /// moderator identity.
    pub async fn set_ban(
        &self,
        moderator_id: i64,
        actor_id: i64,
        banned: bool,
        reason: Option<String>,
        now: u64,
    ) -> BrokerResult<()> {
        let _guard = self.locks.acquire(&actor_key(actor_id)).await;
        let mut actor = self.store.get_or_create_actor(actor_id, now)?;
        actor.banned = banned;
        actor.ban_reason = if banned { reason } else { None };
        actor.updated_at = now;
        self.store.update_actor(&actor)?;
        log(
            Level::Warn,
            Domain::Reputation,
            if banned { "banned" } else { "unbanned" },
            obj(&[("actor_id", v_int(actor_id)), ("moderator_id", v_int(moderator_id))]),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn get_trade(&self, trade_id: i64) -> BrokerResult<Trade> {
        self.fetch_trade(trade_id)
    }

    /// Full per-trade audit timeline in timestamp order.
    pub fn trade_timeline(&self, trade_id: i64) -> BrokerResult<Vec<HistoryEvent>> {
        HistoryLog::timeline(&self.cfg.history_path, trade_id)
            .map_err(|e| BrokerError::External(format!("history log: {}", e)))
    }

    /// Receipt verification by (possibly truncated) hash prefix. Each hit
    /// is returned with the result of recomputing its hash.
    pub fn verify_receipt_by_prefix(&self, prefix: &str) -> BrokerResult<Vec<(Trade, bool)>> {
        let hits = self.store.find_completed_by_hash_prefix(prefix)?;
        Ok(hits
            .into_iter()
            .map(|trade| {
                let ok = trade
                    .receipt_hash
                    .as_deref()
                    .map(|h| crate::receipt::verify_receipt(&trade, h))
                    .unwrap_or(false);
                if !ok {
                    log(
                        Level::Error,
                        Domain::Audit,
                        "receipt_mismatch",
                        obj(&[("trade_id", v_int(trade.id))]),
                    );
                }
                (trade, ok)
            })
            .collect())
    }
}
