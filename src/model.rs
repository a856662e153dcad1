use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of supported games. A fixed sum type, not a plugin registry:
/// the catalog selects per-game behavior by matching on this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Game {
    Ps99,
    Gag,
    AdoptMe,
    BloxFruits,
    StealABrainrot,
}

impl Game {
    pub fn as_str(&self) -> &'static str {
        match self {
            Game::Ps99 => "ps99",
            Game::Gag => "gag",
            Game::AdoptMe => "adopt_me",
            Game::BloxFruits => "blox_fruits",
            Game::StealABrainrot => "steal_a_brainrot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ps99" => Some(Game::Ps99),
            "gag" => Some(Game::Gag),
            "adopt_me" => Some(Game::AdoptMe),
            "blox_fruits" => Some(Game::BloxFruits),
            "steal_a_brainrot" => Some(Game::StealABrainrot),
            _ => None,
        }
    }

    pub const ALL: [Game; 5] = [
        Game::Ps99,
        Game::Gag,
        Game::AdoptMe,
        Game::BloxFruits,
        Game::StealABrainrot,
    ];
}

/// Rarity tiers in ascending order. Game vocabularies are folded into this
/// ladder at parse time; unknown labels land on Common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
    Secret,
}

impl Rarity {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "uncommon" => Rarity::Uncommon,
            "rare" | "ultra-rare" | "ultra rare" => Rarity::Rare,
            "epic" | "exclusive" => Rarity::Epic,
            "legendary" | "huge" => Rarity::Legendary,
            "mythic" | "mythical" | "titanic" => Rarity::Mythic,
            "secret" | "godly" => Rarity::Secret,
            _ => Rarity::Common,
        }
    }
}

/// Lowercase, punctuation-stripped form used for catalog matching.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical catalog item. The core only ever holds value-copies of these;
/// a trade's snapshot must not drift if the catalog updates later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub game: Game,
    pub item_id: String,
    pub name: String,
    pub normalized_name: String,
    pub rarity: Rarity,
    pub value: f64,
    pub tradeable: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// An item snapshot with quantity, as embedded in trade records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: Item,
    pub quantity: u32,
}

impl ItemStack {
    pub fn total_value(&self) -> f64 {
        self.item.value * self.quantity as f64
    }
}

pub fn stacks_value(stacks: &[ItemStack]) -> f64 {
    stacks.iter().map(|s| s.total_value()).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrustTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl TrustTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Bronze => "bronze",
            TrustTier::Silver => "silver",
            TrustTier::Gold => "gold",
            TrustTier::Platinum => "platinum",
            TrustTier::Diamond => "diamond",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Caution,
    HighRisk,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Caution => "caution",
            RiskLevel::HighRisk => "high_risk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "safe" => Some(RiskLevel::Safe),
            "caution" => Some(RiskLevel::Caution),
            "high_risk" => Some(RiskLevel::HighRisk),
            _ => None,
        }
    }
}

/// A participant's reputation record. `trust_score` is derived; it is
/// recomputed from the other fields before every persist, never edited
/// directly. Actors are created lazily and never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    /// Epoch seconds the primary linked external account was created.
    pub external_created_at: Option<u64>,
    /// Second linked identity, if any.
    pub secondary_created_at: Option<u64>,
    pub reliability: f64,
    pub fairness: f64,
    pub responsiveness: f64,
    pub proof_compliance: f64,
    pub behavior_score: f64,
    pub total_trades: u32,
    pub successful_trades: u32,
    pub disputed_trades: u32,
    pub cancelled_trades: u32,
    pub total_value_traded: f64,
    pub trust_score: f64,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Actor {
    pub fn new(id: i64, now: u64) -> Self {
        Self {
            id,
            external_created_at: None,
            secondary_created_at: None,
            reliability: 50.0,
            fairness: 50.0,
            responsiveness: 50.0,
            proof_compliance: 50.0,
            behavior_score: 50.0,
            total_trades: 0,
            successful_trades: 0,
            disputed_trades: 0,
            cancelled_trades: 0,
            total_value_traded: 0.0,
            trust_score: 0.0,
            banned: false,
            ban_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Draft,
    Pending,
    CounterOffered,
    Accepted,
    TrustCheck,
    InGameTrade,
    Completed,
    Disputed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Draft => "draft",
            TradeStatus::Pending => "pending",
            TradeStatus::CounterOffered => "counter_offered",
            TradeStatus::Accepted => "accepted",
            TradeStatus::TrustCheck => "trust_check",
            TradeStatus::InGameTrade => "in_game_trade",
            TradeStatus::Completed => "completed",
            TradeStatus::Disputed => "disputed",
            TradeStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TradeStatus::Draft),
            "pending" => Some(TradeStatus::Pending),
            "counter_offered" => Some(TradeStatus::CounterOffered),
            "accepted" => Some(TradeStatus::Accepted),
            "trust_check" => Some(TradeStatus::TrustCheck),
            "in_game_trade" => Some(TradeStatus::InGameTrade),
            "completed" => Some(TradeStatus::Completed),
            "disputed" => Some(TradeStatus::Disputed),
            "cancelled" => Some(TradeStatus::Cancelled),
            _ => None,
        }
    }

    /// States from which a dispute can still be raised.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TradeStatus::Pending
                | TradeStatus::CounterOffered
                | TradeStatus::Accepted
                | TradeStatus::TrustCheck
                | TradeStatus::InGameTrade
        )
    }
}

/// The central entity. Item lists are value snapshots taken at offer time.
/// Once `receipt_hash` is set the snapshots and both party ids are frozen;
/// the hash is computed over exactly those fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub requester_id: i64,
    pub target_id: Option<i64>,
    pub game: Game,
    pub status: TradeStatus,
    pub risk_level: Option<RiskLevel>,
    pub risk_warnings: Vec<String>,
    pub requester_items: Vec<ItemStack>,
    pub target_items: Vec<ItemStack>,
    pub requester_confirmed: bool,
    pub target_confirmed: bool,
    pub receipt_hash: Option<String>,
    pub moderator_note: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub completed_at: Option<u64>,
    /// Deadline for the secondary high-risk approval; past it the sweep
    /// default-denies.
    pub risk_deadline: Option<u64>,
}

impl Trade {
    pub fn requester_value(&self) -> f64 {
        stacks_value(&self.requester_items)
    }

    pub fn target_value(&self) -> f64 {
        stacks_value(&self.target_items)
    }

    pub fn is_party(&self, actor_id: i64) -> bool {
        self.requester_id == actor_id || self.target_id == Some(actor_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Active,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Active => "active",
            AuctionStatus::Ended => "ended",
            AuctionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AuctionStatus::Active),
            "ended" => Some(AuctionStatus::Ended),
            "cancelled" => Some(AuctionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Time-boxed competitive-bid sibling of the trade. `current_bid == 0`
/// means no bid has landed yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub seller_id: i64,
    pub game: Game,
    pub item: ItemStack,
    pub starting_bid: u64,
    pub current_bid: u64,
    pub current_bidder: Option<i64>,
    pub status: AuctionStatus,
    pub ends_at: u64,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: u64,
    pub ts: u64,
}
