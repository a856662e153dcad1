#[derive(Clone)]
pub struct Config {
    pub sqlite_path: String,
    pub history_path: String,
    pub catalog_base: String,
    pub trades_per_minute: u32,
    pub trades_per_hour: u32,
    pub auctions_per_minute: u32,
    pub auctions_per_hour: u32,
    pub proposal_cooldown_secs: u64,
    pub risk_confirm_timeout_secs: u64,
    pub snipe_window_secs: u64,
    pub sweep_interval_secs: u64,
    pub catalog_refresh_secs: u64,
    pub fuzzy_max_distance: usize,
    pub suggest_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./broker.sqlite".to_string()),
            history_path: std::env::var("HISTORY_PATH").unwrap_or_else(|_| "./broker.history".to_string()),
            catalog_base: std::env::var("CATALOG_BASE").unwrap_or_else(|_| "https://api.gamevalues.example".to_string()),
            trades_per_minute: std::env::var("TRADES_PER_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(3),
            trades_per_hour: std::env::var("TRADES_PER_HOUR").ok().and_then(|v| v.parse().ok()).unwrap_or(20),
            auctions_per_minute: std::env::var("AUCTIONS_PER_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            auctions_per_hour: std::env::var("AUCTIONS_PER_HOUR").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
            proposal_cooldown_secs: std::env::var("PROPOSAL_COOLDOWN_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            risk_confirm_timeout_secs: std::env::var("RISK_CONFIRM_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(900),
            snipe_window_secs: std::env::var("SNIPE_WINDOW_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            sweep_interval_secs: std::env::var("SWEEP_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            catalog_refresh_secs: std::env::var("CATALOG_REFRESH_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(900),
            fuzzy_max_distance: std::env::var("FUZZY_MAX_DISTANCE").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            suggest_limit: std::env::var("SUGGEST_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(5),
        }
    }
}

pub fn now_ts() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
