//! Time-boxed competitive-bid auctions.
//!
//! A deliberately simpler sibling of the trade lifecycle: `active → ended`
//! by expiry sweep, `active → cancelled` by the seller while no bid has
//! landed. Bid acceptance is serialized per auction so two bids can never
//! both pass the "beats the current bid" check against a stale read.
//! Auction handoffs stay out of the reputation feedback loop; only direct
//! trades move trust scores.

use std::sync::Arc;

use crate::catalog::resolver::ItemResolver;
use crate::error::{BrokerError, BrokerResult};
use crate::locks::{auction_key, KeyedLocks};
use crate::logging::{log, obj, v_int, v_num, v_str, Domain, Level};
use crate::model::{Auction, AuctionStatus, Bid, Game};
use crate::ratelimit::{GuardAction, RateGuard, RateLimits};
use crate::state::Config;
use crate::storage::Store;

use crate::broker::OfferLine;

const MIN_DURATION_SECS: u64 = 60;
const MAX_DURATION_SECS: u64 = 7 * 24 * 3600;

pub struct AuctionHouse {
    cfg: Config,
    store: Arc<Store>,
    resolver: Arc<ItemResolver>,
    guard: Arc<RateGuard>,
    locks: Arc<KeyedLocks>,
}

impl AuctionHouse {
    pub fn new(
        cfg: Config,
        store: Arc<Store>,
        resolver: Arc<ItemResolver>,
        guard: Arc<RateGuard>,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self { cfg, store, resolver, guard, locks }
    }

    fn auction_limits(&self) -> RateLimits {
        RateLimits {
            per_minute: self.cfg.auctions_per_minute,
            per_hour: self.cfg.auctions_per_hour,
        }
    }

    pub async fn create_auction(
        &self,
        seller_id: i64,
        game: Game,
        line: &OfferLine,
        starting_bid: u64,
        duration_secs: u64,
        now: u64,
    ) -> BrokerResult<Auction> {
        let seller = self.store.get_or_create_actor(seller_id, now)?;
        if seller.banned {
            return Err(BrokerError::Unauthorized(format!("actor {} is banned", seller_id)));
        }
        if starting_bid == 0 {
            return Err(BrokerError::Validation("starting bid must be positive".to_string()));
        }
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration_secs) {
            return Err(BrokerError::Validation(format!(
                "auction duration must be between {}s and {}s",
                MIN_DURATION_SECS, MAX_DURATION_SECS
            )));
        }
        self.guard
            .check_and_count(seller_id, GuardAction::CreateAuction, self.auction_limits(), now)
            .map_err(|retry_after| BrokerError::RateLimited { retry_after })?;

        if line.quantity == 0 {
            return Err(BrokerError::Validation("quantity must be positive".to_string()));
        }
        let item = self
            .resolver
            .resolve_item(game, &line.query, now)
            .await?
            .ok_or_else(|| BrokerError::Validation(format!("unknown item \"{}\"", line.query)))?;
        if !item.tradeable {
            return Err(BrokerError::Validation(format!("\"{}\" is not tradeable", item.name)));
        }

        let mut auction = Auction {
            id: 0,
            seller_id,
            game,
            item: crate::model::ItemStack { item, quantity: line.quantity },
            starting_bid,
            current_bid: 0,
            current_bidder: None,
            status: AuctionStatus::Active,
            ends_at: now + duration_secs,
            created_at: now,
        };
        auction.id = self.store.create_auction(&auction)?;
        log(
            Level::Info,
            Domain::Auction,
            "created",
            obj(&[
                ("auction_id", v_int(auction.id)),
                ("seller_id", v_int(seller_id)),
                ("starting_bid", v_num(starting_bid as f64)),
                ("ends_at", v_num(auction.ends_at as f64)),
            ]),
        );
        Ok(auction)
    }

    /// Accept a bid that strictly beats the standing one (or meets the
    /// opening bid on a virgin auction). Read-check-write runs under the
    /// auction's lock. A bid landing inside the snipe window pushes
    /// `ends_at` out to `now + window`, repeatedly and unboundedly.
    pub async fn place_bid(
        &self,
        auction_id: i64,
        bidder_id: i64,
        amount: u64,
        now: u64,
    ) -> BrokerResult<Auction> {
        let bidder = self.store.get_or_create_actor(bidder_id, now)?;
        if bidder.banned {
            return Err(BrokerError::Unauthorized(format!("actor {} is banned", bidder_id)));
        }
        let _guard = self.locks.acquire(&auction_key(auction_id)).await;
        let mut auction = self
            .store
            .get_auction(auction_id)?
            .ok_or_else(|| BrokerError::NotFound(format!("auction {}", auction_id)))?;

        if auction.status != AuctionStatus::Active || auction.ends_at <= now {
            return Err(BrokerError::StateConflict("auction is no longer open".to_string()));
        }
        if bidder_id == auction.seller_id {
            return Err(BrokerError::Validation("seller cannot bid on their own auction".to_string()));
        }
        let min_accept = if auction.current_bid == 0 {
            auction.starting_bid
        } else {
            auction.current_bid + 1
        };
        if amount < min_accept {
            return Err(BrokerError::Validation(format!(
                "bid must be at least {}",
                min_accept
            )));
        }

        auction.current_bid = amount;
        auction.current_bidder = Some(bidder_id);
        let remaining = auction.ends_at.saturating_sub(now);
        if remaining < self.cfg.snipe_window_secs {
            auction.ends_at = now + self.cfg.snipe_window_secs;
        }
        self.store.update_auction(&auction)?;
        self.store.append_bid(&Bid { auction_id, bidder_id, amount, ts: now })?;

        log(
            Level::Info,
            Domain::Auction,
            "bid_accepted",
            obj(&[
                ("auction_id", v_int(auction_id)),
                ("bidder_id", v_int(bidder_id)),
                ("amount", v_num(amount as f64)),
                ("ends_at", v_num(auction.ends_at as f64)),
            ]),
        );
        Ok(auction)
    }

    /// Seller withdrawal, only legal before any bid locks in competitive
    /// interest.
    pub async fn cancel_auction(&self, auction_id: i64, seller_id: i64) -> BrokerResult<Auction> {
        let _guard = self.locks.acquire(&auction_key(auction_id)).await;
        let mut auction = self
            .store
            .get_auction(auction_id)?
            .ok_or_else(|| BrokerError::NotFound(format!("auction {}", auction_id)))?;
        if auction.seller_id != seller_id {
            return Err(BrokerError::Unauthorized("only the seller may cancel".to_string()));
        }
        if auction.status != AuctionStatus::Active {
            return Err(BrokerError::StateConflict("auction is no longer active".to_string()));
        }
        if auction.current_bid > 0 {
            return Err(BrokerError::StateConflict(
                "auction already has a bid and must run to its end".to_string(),
            ));
        }
        auction.status = AuctionStatus::Cancelled;
        self.store.update_auction(&auction)?;
        log(
            Level::Info,
            Domain::Auction,
            "cancelled",
            obj(&[("auction_id", v_int(auction_id)), ("seller_id", v_int(seller_id))]),
        );
        Ok(auction)
    }

    /// Periodic expiry scan: end every active auction past its deadline.
    /// Winner and seller are notified via the log; reputation is left
    /// untouched by design.
    pub async fn sweep_expired(&self, now: u64) -> BrokerResult<usize> {
        let expired = self.store.list_expired_active_auctions(now)?;
        let mut ended = 0;
        for stale in expired {
            let _guard = self.locks.acquire(&auction_key(stale.id)).await;
            // Re-check under the lock: an anti-snipe extension may have
            // raced the scan.
            let mut auction = match self.store.get_auction(stale.id)? {
                Some(a) => a,
                None => continue,
            };
            if auction.status != AuctionStatus::Active || auction.ends_at > now {
                continue;
            }
            auction.status = AuctionStatus::Ended;
            self.store.update_auction(&auction)?;
            ended += 1;
            match auction.current_bidder {
                Some(winner) => log(
                    Level::Info,
                    Domain::Auction,
                    "ended_with_winner",
                    obj(&[
                        ("auction_id", v_int(auction.id)),
                        ("seller_id", v_int(auction.seller_id)),
                        ("winner_id", v_int(winner)),
                        ("winning_bid", v_num(auction.current_bid as f64)),
                        ("item", v_str(&auction.item.item.name)),
                    ]),
                ),
                None => log(
                    Level::Info,
                    Domain::Auction,
                    "ended_without_bids",
                    obj(&[("auction_id", v_int(auction.id)), ("seller_id", v_int(auction.seller_id))]),
                ),
            }
        }
        Ok(ended)
    }
}
