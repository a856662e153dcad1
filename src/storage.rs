//! Sqlite-backed repository for actors, trades, auctions, and bids.
//!
//! The store is the sole source of truth: callers re-fetch fresh state at
//! the start of every logical operation and never cache entity state across
//! one. The connection sits behind a mutex so the store can be shared by
//! concurrent request tasks; individual statements are short and blocking.

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{BrokerError, BrokerResult};
use crate::model::{
    Actor, Auction, AuctionStatus, Bid, Game, ItemStack, RiskLevel, Trade, TradeStatus,
};
use crate::reputation::trust_score;

fn db_err(e: rusqlite::Error) -> BrokerError {
    BrokerError::External(format!("sqlite: {}", e))
}

fn corrupt(msg: &str) -> BrokerError {
    BrokerError::Invariant(format!("corrupt row: {}", msg))
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(path: &str) -> BrokerResult<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> BrokerResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> BrokerResult<()> {
        self.conn
            .lock()
            .expect("store lock poisoned")
            .execute_batch(
                "BEGIN;
                CREATE TABLE IF NOT EXISTS actors (
                    id INTEGER PRIMARY KEY,
                    external_created_at INTEGER,
                    secondary_created_at INTEGER,
                    reliability REAL NOT NULL,
                    fairness REAL NOT NULL,
                    responsiveness REAL NOT NULL,
                    proof_compliance REAL NOT NULL,
                    behavior_score REAL NOT NULL,
                    total_trades INTEGER NOT NULL,
                    successful_trades INTEGER NOT NULL,
                    disputed_trades INTEGER NOT NULL,
                    cancelled_trades INTEGER NOT NULL,
                    total_value_traded REAL NOT NULL,
                    trust_score REAL NOT NULL,
                    banned INTEGER NOT NULL DEFAULT 0,
                    ban_reason TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS trades (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    requester_id INTEGER NOT NULL,
                    target_id INTEGER,
                    game TEXT NOT NULL,
                    status TEXT NOT NULL,
                    risk_level TEXT,
                    risk_warnings TEXT NOT NULL,
                    requester_items TEXT NOT NULL,
                    target_items TEXT NOT NULL,
                    requester_confirmed INTEGER NOT NULL,
                    target_confirmed INTEGER NOT NULL,
                    receipt_hash TEXT,
                    moderator_note TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    completed_at INTEGER,
                    risk_deadline INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_trades_receipt_hash
                    ON trades(receipt_hash);
                CREATE INDEX IF NOT EXISTS idx_trades_status
                    ON trades(status);
                CREATE TABLE IF NOT EXISTS auctions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    seller_id INTEGER NOT NULL,
                    game TEXT NOT NULL,
                    item TEXT NOT NULL,
                    starting_bid INTEGER NOT NULL,
                    current_bid INTEGER NOT NULL,
                    current_bidder INTEGER,
                    status TEXT NOT NULL,
                    ends_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_auctions_status_ends
                    ON auctions(status, ends_at);
                CREATE TABLE IF NOT EXISTS bids (
                    auction_id INTEGER NOT NULL,
                    bidder_id INTEGER NOT NULL,
                    amount INTEGER NOT NULL,
                    ts INTEGER NOT NULL
                );
                COMMIT;",
            )
            .map_err(db_err)
    }

    // ------------------------------------------------------------------
    // Actors
    // ------------------------------------------------------------------

    pub fn get_actor(&self, id: i64) -> BrokerResult<Option<Actor>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM actors WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(actor_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Actors are created lazily on their first trade-relevant action.
    /// Two tasks racing on the same unseen id both succeed; the insert is
    /// an upsert-if-absent and the stored row wins.
    pub fn get_or_create_actor(&self, id: i64, now: u64) -> BrokerResult<Actor> {
        if let Some(actor) = self.get_actor(id)? {
            return Ok(actor);
        }
        let mut actor = Actor::new(id, now);
        actor.trust_score = trust_score(&actor, now);
        self.insert_actor(&actor)?;
        self.get_actor(id)?
            .ok_or_else(|| BrokerError::Invariant(format!("actor {} vanished after insert", id)))
    }

    fn insert_actor(&self, a: &Actor) -> BrokerResult<()> {
        self.conn
            .lock()
            .expect("store lock poisoned")
            .execute(
                "INSERT OR IGNORE INTO actors (id, external_created_at, secondary_created_at,
                    reliability, fairness, responsiveness, proof_compliance, behavior_score,
                    total_trades, successful_trades, disputed_trades, cancelled_trades,
                    total_value_traded, trust_score, banned, ban_reason, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    a.id,
                    a.external_created_at.map(|v| v as i64),
                    a.secondary_created_at.map(|v| v as i64),
                    a.reliability,
                    a.fairness,
                    a.responsiveness,
                    a.proof_compliance,
                    a.behavior_score,
                    a.total_trades,
                    a.successful_trades,
                    a.disputed_trades,
                    a.cancelled_trades,
                    a.total_value_traded,
                    a.trust_score,
                    a.banned as i64,
                    a.ban_reason,
                    a.created_at as i64,
                    a.updated_at as i64,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn update_actor(&self, a: &Actor) -> BrokerResult<()> {
        let changed = self
            .conn
            .lock()
            .expect("store lock poisoned")
            .execute(
                "UPDATE actors SET external_created_at = ?2, secondary_created_at = ?3,
                    reliability = ?4, fairness = ?5, responsiveness = ?6,
                    proof_compliance = ?7, behavior_score = ?8, total_trades = ?9,
                    successful_trades = ?10, disputed_trades = ?11, cancelled_trades = ?12,
                    total_value_traded = ?13, trust_score = ?14, banned = ?15,
                    ban_reason = ?16, updated_at = ?17
                 WHERE id = ?1",
                params![
                    a.id,
                    a.external_created_at.map(|v| v as i64),
                    a.secondary_created_at.map(|v| v as i64),
                    a.reliability,
                    a.fairness,
                    a.responsiveness,
                    a.proof_compliance,
                    a.behavior_score,
                    a.total_trades,
                    a.successful_trades,
                    a.disputed_trades,
                    a.cancelled_trades,
                    a.total_value_traded,
                    a.trust_score,
                    a.banned as i64,
                    a.ban_reason,
                    a.updated_at as i64,
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(BrokerError::NotFound(format!("actor {}", a.id)));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub fn create_trade(&self, trade: &Trade) -> BrokerResult<i64> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO trades (requester_id, target_id, game, status, risk_level,
                risk_warnings, requester_items, target_items, requester_confirmed,
                target_confirmed, receipt_hash, moderator_note, created_at, updated_at,
                completed_at, risk_deadline)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                trade.requester_id,
                trade.target_id,
                trade.game.as_str(),
                trade.status.as_str(),
                trade.risk_level.map(|r| r.as_str()),
                encode_json(&trade.risk_warnings)?,
                encode_json(&trade.requester_items)?,
                encode_json(&trade.target_items)?,
                trade.requester_confirmed as i64,
                trade.target_confirmed as i64,
                trade.receipt_hash,
                trade.moderator_note,
                trade.created_at as i64,
                trade.updated_at as i64,
                trade.completed_at.map(|v| v as i64),
                trade.risk_deadline.map(|v| v as i64),
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_trade(&self, id: i64) -> BrokerResult<Option<Trade>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM trades WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(trade_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Persist a trade snapshot. Once a receipt hash is stamped the record
    /// is frozen: the hash covers the item snapshots and both party ids, so
    /// any further write would break verifiability.
    pub fn update_trade(&self, trade: &Trade) -> BrokerResult<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let stamped: Option<Option<String>> = conn
            .query_row(
                "SELECT receipt_hash FROM trades WHERE id = ?1",
                params![trade.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let stamped = match stamped {
            Some(v) => v,
            None => return Err(BrokerError::NotFound(format!("trade {}", trade.id))),
        };
        if stamped.is_some() {
            return Err(BrokerError::Invariant(format!(
                "trade {} already carries a receipt and is immutable",
                trade.id
            )));
        }
        let changed = conn
            .execute(
                "UPDATE trades SET requester_id = ?2, target_id = ?3, game = ?4,
                    status = ?5, risk_level = ?6, risk_warnings = ?7,
                    requester_items = ?8, target_items = ?9, requester_confirmed = ?10,
                    target_confirmed = ?11, receipt_hash = ?12, moderator_note = ?13,
                    updated_at = ?14, completed_at = ?15, risk_deadline = ?16
                 WHERE id = ?1",
                params![
                    trade.id,
                    trade.requester_id,
                    trade.target_id,
                    trade.game.as_str(),
                    trade.status.as_str(),
                    trade.risk_level.map(|r| r.as_str()),
                    encode_json(&trade.risk_warnings)?,
                    encode_json(&trade.requester_items)?,
                    encode_json(&trade.target_items)?,
                    trade.requester_confirmed as i64,
                    trade.target_confirmed as i64,
                    trade.receipt_hash,
                    trade.moderator_note,
                    trade.updated_at as i64,
                    trade.completed_at.map(|v| v as i64),
                    trade.risk_deadline.map(|v| v as i64),
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(BrokerError::NotFound(format!("trade {}", trade.id)));
        }
        Ok(())
    }

    /// Trades whose high-risk approval window has elapsed; the sweep
    /// default-denies these.
    pub fn list_overdue_trust_checks(&self, now: u64) -> BrokerResult<Vec<Trade>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT * FROM trades
                 WHERE status = 'trust_check' AND risk_deadline IS NOT NULL
                   AND risk_deadline <= ?1",
            )
            .map_err(db_err)?;
        let mut rows = stmt.query(params![now as i64]).map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(trade_from_row(row)?);
        }
        Ok(out)
    }

    /// Receipt lookup tolerating truncated display copies: the caller may
    /// hold only the first N hex characters.
    pub fn find_completed_by_hash_prefix(&self, prefix: &str) -> BrokerResult<Vec<Trade>> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < 4 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BrokerError::Validation(
                "receipt prefix must be at least 4 hex characters".to_string(),
            ));
        }
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT * FROM trades WHERE receipt_hash LIKE ?1 || '%'
                 ORDER BY completed_at DESC",
            )
            .map_err(db_err)?;
        let mut rows = stmt.query(params![prefix]).map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(trade_from_row(row)?);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Auctions
    // ------------------------------------------------------------------

    pub fn create_auction(&self, auction: &Auction) -> BrokerResult<i64> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO auctions (seller_id, game, item, starting_bid, current_bid,
                current_bidder, status, ends_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                auction.seller_id,
                auction.game.as_str(),
                encode_json(&auction.item)?,
                auction.starting_bid as i64,
                auction.current_bid as i64,
                auction.current_bidder,
                auction.status.as_str(),
                auction.ends_at as i64,
                auction.created_at as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_auction(&self, id: i64) -> BrokerResult<Option<Auction>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM auctions WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(auction_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn update_auction(&self, auction: &Auction) -> BrokerResult<()> {
        let changed = self
            .conn
            .lock()
            .expect("store lock poisoned")
            .execute(
                "UPDATE auctions SET current_bid = ?2, current_bidder = ?3, status = ?4,
                    ends_at = ?5
                 WHERE id = ?1",
                params![
                    auction.id,
                    auction.current_bid as i64,
                    auction.current_bidder,
                    auction.status.as_str(),
                    auction.ends_at as i64,
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(BrokerError::NotFound(format!("auction {}", auction.id)));
        }
        Ok(())
    }

    pub fn list_expired_active_auctions(&self, now: u64) -> BrokerResult<Vec<Auction>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM auctions WHERE status = 'active' AND ends_at <= ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![now as i64]).map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            out.push(auction_from_row(row)?);
        }
        Ok(out)
    }

    pub fn append_bid(&self, bid: &Bid) -> BrokerResult<()> {
        self.conn
            .lock()
            .expect("store lock poisoned")
            .execute(
                "INSERT INTO bids (auction_id, bidder_id, amount, ts)
                 VALUES (?1, ?2, ?3, ?4)",
                params![bid.auction_id, bid.bidder_id, bid.amount as i64, bid.ts as i64],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn bids_for(&self, auction_id: i64) -> BrokerResult<Vec<Bid>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare("SELECT auction_id, bidder_id, amount, ts FROM bids WHERE auction_id = ?1 ORDER BY ts, rowid")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![auction_id], |row| {
                Ok(Bid {
                    auction_id: row.get(0)?,
                    bidder_id: row.get(1)?,
                    amount: row.get::<_, i64>(2)? as u64,
                    ts: row.get::<_, i64>(3)? as u64,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> BrokerResult<String> {
    serde_json::to_string(value)
        .map_err(|e| BrokerError::Invariant(format!("serialize: {}", e)))
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> BrokerResult<T> {
    serde_json::from_str(raw).map_err(|_| corrupt(what))
}

fn actor_from_row(row: &Row<'_>) -> BrokerResult<Actor> {
    Ok(Actor {
        id: row.get("id").map_err(db_err)?,
        external_created_at: row
            .get::<_, Option<i64>>("external_created_at")
            .map_err(db_err)?
            .map(|v| v as u64),
        secondary_created_at: row
            .get::<_, Option<i64>>("secondary_created_at")
            .map_err(db_err)?
            .map(|v| v as u64),
        reliability: row.get("reliability").map_err(db_err)?,
        fairness: row.get("fairness").map_err(db_err)?,
        responsiveness: row.get("responsiveness").map_err(db_err)?,
        proof_compliance: row.get("proof_compliance").map_err(db_err)?,
        behavior_score: row.get("behavior_score").map_err(db_err)?,
        total_trades: row.get("total_trades").map_err(db_err)?,
        successful_trades: row.get("successful_trades").map_err(db_err)?,
        disputed_trades: row.get("disputed_trades").map_err(db_err)?,
        cancelled_trades: row.get("cancelled_trades").map_err(db_err)?,
        total_value_traded: row.get("total_value_traded").map_err(db_err)?,
        trust_score: row.get("trust_score").map_err(db_err)?,
        banned: row.get::<_, i64>("banned").map_err(db_err)? != 0,
        ban_reason: row.get("ban_reason").map_err(db_err)?,
        created_at: row.get::<_, i64>("created_at").map_err(db_err)? as u64,
        updated_at: row.get::<_, i64>("updated_at").map_err(db_err)? as u64,
    })
}

fn trade_from_row(row: &Row<'_>) -> BrokerResult<Trade> {
    let game: String = row.get("game").map_err(db_err)?;
    let status: String = row.get("status").map_err(db_err)?;
    let risk_level: Option<String> = row.get("risk_level").map_err(db_err)?;
    let warnings: String = row.get("risk_warnings").map_err(db_err)?;
    let requester_items: String = row.get("requester_items").map_err(db_err)?;
    let target_items: String = row.get("target_items").map_err(db_err)?;
    Ok(Trade {
        id: row.get("id").map_err(db_err)?,
        requester_id: row.get("requester_id").map_err(db_err)?,
        target_id: row.get("target_id").map_err(db_err)?,
        game: Game::parse(&game).ok_or_else(|| corrupt("unknown game"))?,
        status: TradeStatus::parse(&status).ok_or_else(|| corrupt("unknown trade status"))?,
        risk_level: match risk_level {
            Some(raw) => Some(RiskLevel::parse(&raw).ok_or_else(|| corrupt("unknown risk level"))?),
            None => None,
        },
        risk_warnings: decode_json(&warnings, "risk_warnings")?,
        requester_items: decode_json::<Vec<ItemStack>>(&requester_items, "requester_items")?,
        target_items: decode_json::<Vec<ItemStack>>(&target_items, "target_items")?,
        requester_confirmed: row.get::<_, i64>("requester_confirmed").map_err(db_err)? != 0,
        target_confirmed: row.get::<_, i64>("target_confirmed").map_err(db_err)? != 0,
        receipt_hash: row.get("receipt_hash").map_err(db_err)?,
        moderator_note: row.get("moderator_note").map_err(db_err)?,
        created_at: row.get::<_, i64>("created_at").map_err(db_err)? as u64,
        updated_at: row.get::<_, i64>("updated_at").map_err(db_err)? as u64,
        completed_at: row
            .get::<_, Option<i64>>("completed_at")
            .map_err(db_err)?
            .map(|v| v as u64),
        risk_deadline: row
            .get::<_, Option<i64>>("risk_deadline")
            .map_err(db_err)?
            .map(|v| v as u64),
    })
}

fn auction_from_row(row: &Row<'_>) -> BrokerResult<Auction> {
    let game: String = row.get("game").map_err(db_err)?;
    let status: String = row.get("status").map_err(db_err)?;
    let item: String = row.get("item").map_err(db_err)?;
    Ok(Auction {
        id: row.get("id").map_err(db_err)?,
        seller_id: row.get("seller_id").map_err(db_err)?,
        game: Game::parse(&game).ok_or_else(|| corrupt("unknown game"))?,
        item: decode_json(&item, "auction item")?,
        starting_bid: row.get::<_, i64>("starting_bid").map_err(db_err)? as u64,
        current_bid: row.get::<_, i64>("current_bid").map_err(db_err)? as u64,
        current_bidder: row.get("current_bidder").map_err(db_err)?,
        status: AuctionStatus::parse(&status).ok_or_else(|| corrupt("unknown auction status"))?,
        ends_at: row.get::<_, i64>("ends_at").map_err(db_err)? as u64,
        created_at: row.get::<_, i64>("created_at").map_err(db_err)? as u64,
    })
}
