//! End-to-end scenarios over the public broker surface.
//!
//! These drive full trade and auction lifecycles against a real sqlite
//! store and history log in a temp directory, with a fixture catalog in
//! place of the remote source. They are the gate between "modules pass
//! their unit tests" and "the system behaves."

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use tradebroker::auction::AuctionHouse;
use tradebroker::broker::{Broker, OfferLine};
use tradebroker::catalog::resolver::{ItemResolver, ResolverConfig};
use tradebroker::catalog::CatalogSource;
use tradebroker::error::BrokerError;
use tradebroker::history::HistoryAction;
use tradebroker::lifecycle::Resolution;
use tradebroker::locks::KeyedLocks;
use tradebroker::model::{normalize_name, Game, Item, Rarity, RiskLevel, TradeStatus};
use tradebroker::ratelimit::RateGuard;
use tradebroker::receipt::verify_receipt;
use tradebroker::state::Config;
use tradebroker::storage::Store;

const NOW: u64 = 1_700_000_000;

struct FixtureCatalog;

#[async_trait]
impl CatalogSource for FixtureCatalog {
    async fn fetch_all(&self, game: Game) -> anyhow::Result<Vec<Item>> {
        let rows = [
            ("huge-cat", "Huge Cat", 1_000.0),
            ("golden-hydra", "Golden Hydra", 3_001_000.0),
            ("basic-egg", "Basic Egg", 100.0),
            ("frost-dragon", "Frost Dragon", 800.0),
        ];
        Ok(rows
            .iter()
            .map(|(id, name, value)| Item {
                game,
                item_id: id.to_string(),
                name: name.to_string(),
                normalized_name: normalize_name(name),
                rarity: Rarity::Legendary,
                value: *value,
                tradeable: true,
                metadata: serde_json::Map::new(),
            })
            .collect())
    }
}

struct Harness {
    broker: Broker,
    auctions: AuctionHouse,
    store: Arc<Store>,
    _dir: TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::from_env();
    cfg.sqlite_path = dir.path().join("broker.sqlite").to_str().unwrap().to_string();
    cfg.history_path = dir.path().join("broker.history").to_str().unwrap().to_string();
    cfg.trades_per_minute = 100;
    cfg.trades_per_hour = 1000;
    cfg.auctions_per_minute = 100;
    cfg.auctions_per_hour = 1000;
    cfg.proposal_cooldown_secs = 0;
    cfg.risk_confirm_timeout_secs = 900;
    cfg.snipe_window_secs = 300;

    let store = Arc::new(Store::new(&cfg.sqlite_path).unwrap());
    let resolver = Arc::new(ItemResolver::new(
        Box::new(FixtureCatalog),
        ResolverConfig::default(),
    ));
    let guard = Arc::new(RateGuard::new());
    let locks = Arc::new(KeyedLocks::new());
    let broker = Broker::new(
        cfg.clone(),
        store.clone(),
        resolver.clone(),
        guard.clone(),
        locks.clone(),
    )
    .unwrap();
    let auctions = AuctionHouse::new(cfg, store.clone(), resolver, guard, locks);
    Harness { broker, auctions, store, _dir: dir }
}

fn line(query: &str) -> OfferLine {
    OfferLine { query: query.to_string(), quantity: 1 }
}

// ---------------------------------------------------------------------------
// Scenario A: two new traders, caution gate, both confirm, receipt verifies
// ---------------------------------------------------------------------------
#[tokio::test]
async fn scenario_a_new_traders_complete_a_trade() {
    let h = harness();

    let trade = h
        .broker
        .propose_trade(101, Some(102), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Pending);
    assert_eq!(trade.requester_value(), 1000.0);

    let trade = h.broker.accept_trade(trade.id, 102, NOW + 10).await.unwrap();
    // both parties are brand new: caution, with a new-trader warning each
    assert_eq!(trade.risk_level, Some(RiskLevel::Caution));
    assert!(trade.risk_warnings.iter().any(|w| w.contains("requester is a new trader")));
    assert!(trade.risk_warnings.iter().any(|w| w.contains("target is a new trader")));
    assert_eq!(trade.status, TradeStatus::InGameTrade);

    let trade = h.broker.confirm_handoff(trade.id, 101, NOW + 20).await.unwrap();
    assert_eq!(trade.status, TradeStatus::InGameTrade);
    let trade = h.broker.confirm_handoff(trade.id, 102, NOW + 30).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    assert_eq!(trade.completed_at, Some(NOW + 30));

    // exactly one completion credit per actor
    for actor_id in [101, 102] {
        let actor = h.store.get_actor(actor_id).unwrap().unwrap();
        assert_eq!(actor.successful_trades, 1);
        assert_eq!(actor.total_trades, 1);
        assert_eq!(actor.total_value_traded, 1000.0);
    }

    // the stamped receipt verifies, and the prefix lookup finds it
    let hash = trade.receipt_hash.clone().unwrap();
    assert!(verify_receipt(&trade, &hash));
    let hits = h.broker.verify_receipt_by_prefix(&hash[..8]).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].1, "stored receipt failed verification");

    // audit timeline reconstructs the full path in order
    let timeline = h.broker.trade_timeline(trade.id).unwrap();
    let actions: Vec<HistoryAction> = timeline.iter().map(|e| e.action).collect();
    assert_eq!(actions[0], HistoryAction::Proposed);
    assert!(actions.contains(&HistoryAction::Accepted));
    assert!(actions.contains(&HistoryAction::RiskAssessed));
    assert_eq!(*actions.last().unwrap(), HistoryAction::Completed);
}

// ---------------------------------------------------------------------------
// Scenario B: lopsided high-value trade, high-risk gate, default deny
// ---------------------------------------------------------------------------
#[tokio::test]
async fn scenario_b_high_risk_denial_blocks_completion() {
    let h = harness();

    let trade = h
        .broker
        .propose_trade(201, Some(202), Game::Ps99, &[line("golden hydra")], &[line("basic egg")], NOW)
        .await
        .unwrap();
    let trade = h.broker.accept_trade(trade.id, 202, NOW + 10).await.unwrap();

    // ~30,000x value ratio between two new traders over a million combined
    assert_eq!(trade.risk_level, Some(RiskLevel::HighRisk));
    assert_eq!(trade.status, TradeStatus::TrustCheck);

    // confirmation cannot jump the gate
    let err = h.broker.confirm_handoff(trade.id, 201, NOW + 20).await.unwrap_err();
    assert!(matches!(err, BrokerError::StateConflict(_)));

    let trade = h.broker.deny_high_risk(trade.id, 202, NOW + 30).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Cancelled);

    // no completion reputation fired for either party
    for actor_id in [201, 202] {
        let actor = h.store.get_actor(actor_id).unwrap().unwrap();
        assert_eq!(actor.successful_trades, 0);
    }
    assert!(trade.receipt_hash.is_none());
}

#[tokio::test]
async fn scenario_b2_high_risk_timeout_default_denies() {
    let h = harness();

    let trade = h
        .broker
        .propose_trade(211, Some(212), Game::Ps99, &[line("golden hydra")], &[line("basic egg")], NOW)
        .await
        .unwrap();
    let trade = h.broker.accept_trade(trade.id, 212, NOW + 10).await.unwrap();
    assert_eq!(trade.status, TradeStatus::TrustCheck);

    // before the deadline the sweep leaves it alone
    assert_eq!(h.broker.expire_overdue_risk_checks(NOW + 500).await.unwrap(), 0);
    // past it, default-deny cancels the trade
    assert_eq!(h.broker.expire_overdue_risk_checks(NOW + 911).await.unwrap(), 1);

    let trade = h.broker.get_trade(trade.id).unwrap();
    assert_eq!(trade.status, TradeStatus::Cancelled);
    let actor = h.store.get_actor(211).unwrap().unwrap();
    assert_eq!(actor.successful_trades, 0);

    // a late approval attempt hits a state conflict, not a completion
    let err = h.broker.approve_high_risk(trade.id, 211, NOW + 920).await.unwrap_err();
    assert!(matches!(err, BrokerError::StateConflict(_)));
}

#[tokio::test]
async fn scenario_b3_high_risk_approval_lets_the_trade_through() {
    let h = harness();

    let trade = h
        .broker
        .propose_trade(221, Some(222), Game::Ps99, &[line("golden hydra")], &[line("basic egg")], NOW)
        .await
        .unwrap();
    let trade = h.broker.accept_trade(trade.id, 222, NOW + 10).await.unwrap();
    assert_eq!(trade.status, TradeStatus::TrustCheck);

    let trade = h.broker.approve_high_risk(trade.id, 221, NOW + 60).await.unwrap();
    assert_eq!(trade.status, TradeStatus::InGameTrade);

    h.broker.confirm_handoff(trade.id, 221, NOW + 70).await.unwrap();
    let trade = h.broker.confirm_handoff(trade.id, 222, NOW + 80).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    assert!(verify_receipt(&trade, trade.receipt_hash.as_deref().unwrap()));
}

// ---------------------------------------------------------------------------
// Scenario C: auction bid ladder end to end, sweep settles the winner
// ---------------------------------------------------------------------------
#[tokio::test]
async fn scenario_c_auction_bid_ladder_and_settlement() {
    let h = harness();

    let auction = h
        .auctions
        .create_auction(301, Game::AdoptMe, &line("frost dragon"), 100, 3600, NOW)
        .await
        .unwrap();

    assert!(h.auctions.place_bid(auction.id, 302, 50, NOW + 1).await.is_err());
    let a = h.auctions.place_bid(auction.id, 302, 100, NOW + 2).await.unwrap();
    assert_eq!(a.current_bid, 100);
    assert!(h.auctions.place_bid(auction.id, 303, 100, NOW + 3).await.is_err());
    let a = h.auctions.place_bid(auction.id, 303, 150, NOW + 4).await.unwrap();
    assert_eq!(a.current_bid, 150);
    assert_eq!(a.current_bidder, Some(303));

    assert_eq!(h.auctions.sweep_expired(NOW + 3601).await.unwrap(), 1);
    let settled = h.store.get_auction(auction.id).unwrap().unwrap();
    assert_eq!(settled.current_bidder, Some(303));
    // auctions stay out of the trust-score loop
    let winner = h.store.get_actor(303).unwrap().unwrap();
    assert_eq!(winner.total_trades, 0);
}

// ---------------------------------------------------------------------------
// Counter-offer branch, dispute path, moderator override
// ---------------------------------------------------------------------------
#[tokio::test]
async fn counter_offer_branch_reaches_completion() {
    let h = harness();

    let trade = h
        .broker
        .propose_trade(401, Some(402), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    let trade = h
        .broker
        .counter_offer(trade.id, 402, &[line("frost dragon")], NOW + 5)
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::CounterOffered);
    assert_eq!(trade.target_value(), 800.0);

    let trade = h.broker.respond_counter(trade.id, 401, true, NOW + 10).await.unwrap();
    assert_eq!(trade.status, TradeStatus::InGameTrade);

    h.broker.confirm_handoff(trade.id, 401, NOW + 20).await.unwrap();
    let trade = h.broker.confirm_handoff(trade.id, 402, NOW + 30).await.unwrap();
    assert_eq!(trade.status, TradeStatus::Completed);
    // the receipt covers the countered snapshot
    assert!(verify_receipt(&trade, trade.receipt_hash.as_deref().unwrap()));
}

#[tokio::test]
async fn dispute_freezes_and_moderator_scam_ruling_penalizes() {
    let h = harness();

    let trade = h
        .broker
        .propose_trade(501, Some(502), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    let trade = h.broker.accept_trade(trade.id, 502, NOW + 10).await.unwrap();
    h.broker.confirm_handoff(trade.id, 501, NOW + 20).await.unwrap();

    let trade = h
        .broker
        .dispute_trade(trade.id, 501, Some("never delivered".to_string()), NOW + 30)
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Disputed);

    // both dispute counters moved
    for actor_id in [501, 502] {
        let actor = h.store.get_actor(actor_id).unwrap().unwrap();
        assert_eq!(actor.disputed_trades, 1);
    }

    // frozen: the counterpart cannot push it to completion
    let err = h.broker.confirm_handoff(trade.id, 502, NOW + 40).await.unwrap_err();
    assert!(matches!(err, BrokerError::StateConflict(_)));

    let before = h.store.get_actor(502).unwrap().unwrap();
    let trade = h
        .broker
        .resolve_disputed(
            trade.id,
            900,
            Resolution::Scam { actor_id: 502 },
            Some("proof showed non-delivery".to_string()),
            NOW + 50,
        )
        .await
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Cancelled);

    let after = h.store.get_actor(502).unwrap().unwrap();
    assert_eq!(after.reliability, (before.reliability - 20.0).max(0.0));

    // the override is on the record with the moderator marker
    let timeline = h.broker.trade_timeline(trade.id).unwrap();
    let resolved = timeline
        .iter()
        .find(|e| e.action == HistoryAction::ModeratorResolved)
        .unwrap();
    assert!(resolved.moderator);
}

// ---------------------------------------------------------------------------
// Guard rails: rate limit surfacing, validation, authorization
// ---------------------------------------------------------------------------
#[tokio::test]
async fn rate_limit_returns_wait_not_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::from_env();
    cfg.sqlite_path = dir.path().join("b.sqlite").to_str().unwrap().to_string();
    cfg.history_path = dir.path().join("b.history").to_str().unwrap().to_string();
    cfg.trades_per_minute = 2;
    cfg.trades_per_hour = 100;
    cfg.proposal_cooldown_secs = 0;

    let store = Arc::new(Store::new(&cfg.sqlite_path).unwrap());
    let resolver = Arc::new(ItemResolver::new(
        Box::new(FixtureCatalog),
        ResolverConfig::default(),
    ));
    let broker = Broker::new(
        cfg,
        store,
        resolver,
        Arc::new(RateGuard::new()),
        Arc::new(KeyedLocks::new()),
    )
    .unwrap();

    for _ in 0..2 {
        broker
            .propose_trade(601, None, Game::Ps99, &[line("huge cat")], &[], NOW)
            .await
            .unwrap();
    }
    let err = broker
        .propose_trade(601, None, Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap_err();
    match err {
        BrokerError::RateLimited { retry_after } => {
            assert!(retry_after.as_secs() <= 60);
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn unresolvable_item_is_a_validation_error_with_a_hint() {
    let h = harness();
    // three edits from "huge cat": outside the resolve threshold, inside
    // the suggestion range
    let err = h
        .broker
        .propose_trade(701, None, Game::Ps99, &[line("hg ct")], &[], NOW)
        .await
        .unwrap_err();
    match err {
        BrokerError::Validation(msg) => {
            assert!(msg.contains("unknown item"), "unexpected message: {}", msg);
            assert!(msg.contains("Huge Cat"), "expected a did-you-mean hint: {}", msg);
        }
        other => panic!("expected Validation, got {:?}", other),
    }

    // nowhere near anything: still a validation error, just without a hint
    let err = h
        .broker
        .propose_trade(701, None, Game::Ps99, &[line("zzglorb")], &[], NOW)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Validation(_)));
}

#[tokio::test]
async fn stranger_cannot_drive_someone_elses_trade() {
    let h = harness();
    let trade = h
        .broker
        .propose_trade(801, Some(802), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    let err = h.broker.accept_trade(trade.id, 803, NOW + 1).await.unwrap_err();
    assert!(matches!(err, BrokerError::Unauthorized(_)));

    let err = h.broker.cancel_trade(trade.id, 803, NOW + 2).await.unwrap_err();
    assert!(matches!(err, BrokerError::Unauthorized(_)));
}

#[tokio::test]
async fn proof_submission_rewards_compliance_without_moving_state() {
    let h = harness();
    let trade = h
        .broker
        .propose_trade(1001, Some(1002), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    h.broker
        .submit_proof(trade.id, 1001, Some("screenshot attached".to_string()), NOW + 1)
        .await
        .unwrap();

    let actor = h.store.get_actor(1001).unwrap().unwrap();
    assert_eq!(actor.proof_compliance, 55.0);
    assert_eq!(h.broker.get_trade(trade.id).unwrap().status, TradeStatus::Pending);

    // outsiders cannot pad their compliance on someone else's trade
    let err = h.broker.submit_proof(trade.id, 1003, None, NOW + 2).await.unwrap_err();
    assert!(matches!(err, BrokerError::Unauthorized(_)));
}

#[tokio::test]
async fn banned_actor_loses_the_surface_but_keeps_the_record() {
    let h = harness();
    h.broker
        .propose_trade(1101, Some(1102), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    h.broker
        .set_ban(900, 1101, true, Some("chargeback fraud".to_string()), NOW + 1)
        .await
        .unwrap();

    let err = h
        .broker
        .propose_trade(1101, Some(1102), Game::Ps99, &[line("huge cat")], &[], NOW + 2)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Unauthorized(_)));

    // soft flag only: the reputation record is intact and reversible
    let actor = h.store.get_actor(1101).unwrap().unwrap();
    assert!(actor.banned);
    assert_eq!(actor.ban_reason.as_deref(), Some("chargeback fraud"));

    h.broker.set_ban(900, 1101, false, None, NOW + 3).await.unwrap();
    h.broker
        .propose_trade(1101, Some(1102), Game::Ps99, &[line("huge cat")], &[], NOW + 4)
        .await
        .unwrap();
}

#[tokio::test]
async fn linked_account_age_lifts_trust_score() {
    let h = harness();
    let before = h.store.get_or_create_actor(1201, NOW).unwrap();
    h.broker
        .link_external_account(1201, NOW - 2 * 365 * 86_400, false, NOW)
        .await
        .unwrap();
    let after = h.store.get_actor(1201).unwrap().unwrap();
    assert!(
        after.trust_score > before.trust_score,
        "age factor did not lift the score"
    );
}

#[tokio::test]
async fn accepting_a_cancelled_trade_reports_fresh_state() {
    let h = harness();
    let trade = h
        .broker
        .propose_trade(901, Some(902), Game::Ps99, &[line("huge cat")], &[], NOW)
        .await
        .unwrap();
    h.broker.cancel_trade(trade.id, 901, NOW + 1).await.unwrap();
    // the caller may still hold the pending snapshot; the broker re-fetches
    let err = h.broker.accept_trade(trade.id, 902, NOW + 2).await.unwrap_err();
    assert!(matches!(err, BrokerError::StateConflict(_)));

    // requester self-cancel drew the penalty
    let requester = h.store.get_actor(901).unwrap().unwrap();
    assert_eq!(requester.cancelled_trades, 1);
    assert_eq!(requester.responsiveness, 48.0);
    // the target was not penalized
    let target = h.store.get_actor(902).unwrap().unwrap();
    assert_eq!(target.cancelled_trades, 0);
}
