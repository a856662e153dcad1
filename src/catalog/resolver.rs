//! Free-text item resolution over cached catalog snapshots.
//!
//! Ranking ladder: exact normalized match, then substring match, then edit
//! distance within a small threshold. A catalog outage is surfaced as an
//! external failure, never as "item not found"; a timeout is not a
//! validated absence.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::catalog::retry::{retry_async, RetryConfig};
use crate::catalog::CatalogSource;
use crate::error::{BrokerError, BrokerResult};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::{normalize_name, Game, Item};

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub refresh_secs: u64,
    pub fuzzy_max_distance: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 900,
            fuzzy_max_distance: 2,
        }
    }
}

struct CacheEntry {
    items: Vec<Item>,
    fetched_at: u64,
}

pub struct ItemResolver {
    source: Box<dyn CatalogSource>,
    cache: RwLock<HashMap<Game, CacheEntry>>,
    retry: RetryConfig,
    cfg: ResolverConfig,
}

impl ItemResolver {
    pub fn new(source: Box<dyn CatalogSource>, cfg: ResolverConfig) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            retry: RetryConfig::default(),
            cfg,
        }
    }

    /// Current snapshot for one game, refreshed past its TTL. A failed
    /// refresh falls back to the stale snapshot when one exists; with no
    /// snapshot at all the failure propagates.
    async fn items(&self, game: Game, now: u64) -> BrokerResult<Vec<Item>> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&game) {
                if now.saturating_sub(entry.fetched_at) < self.cfg.refresh_secs {
                    return Ok(entry.items.clone());
                }
            }
        }

        let fetched = retry_async(&self.retry, "catalog_fetch", || {
            self.source.fetch_all(game)
        })
        .await;

        match fetched {
            Ok(items) => {
                let mut cache = self.cache.write().await;
                cache.insert(game, CacheEntry { items: items.clone(), fetched_at: now });
                log(
                    Level::Debug,
                    Domain::Catalog,
                    "refresh",
                    obj(&[("game", v_str(game.as_str())), ("items", v_num(items.len() as f64))]),
                );
                Ok(items)
            }
            Err(err) => {
                let cache = self.cache.read().await;
                if let Some(entry) = cache.get(&game) {
                    log(
                        Level::Warn,
                        Domain::Catalog,
                        "refresh_failed_serving_stale",
                        obj(&[("game", v_str(game.as_str())), ("error", v_str(&err.to_string()))]),
                    );
                    return Ok(entry.items.clone());
                }
                Err(BrokerError::External(format!(
                    "catalog unavailable for {}: {}",
                    game.as_str(),
                    err
                )))
            }
        }
    }

    /// Best single match for a free-text query, if any.
    pub async fn resolve_item(&self, game: Game, query: &str, now: u64) -> BrokerResult<Option<Item>> {
        Ok(self.search_items(game, query, 1, now).await?.into_iter().next())
    }

    /// Ranked matches: exact first, then substring, then fuzzy by distance.
    pub async fn search_items(
        &self,
        game: Game,
        query: &str,
        limit: usize,
        now: u64,
    ) -> BrokerResult<Vec<Item>> {
        let needle = normalize_name(query);
        if needle.is_empty() {
            return Err(BrokerError::Validation("empty item query".to_string()));
        }
        let items = self.items(game, now).await?;
        let mut ranked: Vec<(u8, usize, Item)> = items
            .into_iter()
            .filter_map(|item| rank_match(&needle, &item, self.cfg.fuzzy_max_distance))
            .collect();
        ranked.sort_by(|a, b| (a.0, a.1, &a.2.normalized_name).cmp(&(b.0, b.1, &b.2.normalized_name)));
        Ok(ranked.into_iter().take(limit).map(|(_, _, item)| item).collect())
    }

    /// Near-miss suggestions for "did you mean", excluding exact hits.
    pub async fn suggest_items(
        &self,
        game: Game,
        query: &str,
        limit: usize,
        now: u64,
    ) -> BrokerResult<Vec<Item>> {
        let needle = normalize_name(query);
        if needle.is_empty() {
            return Err(BrokerError::Validation("empty item query".to_string()));
        }
        let items = self.items(game, now).await?;
        let mut near: Vec<(usize, Item)> = items
            .into_iter()
            .filter_map(|item| {
                let d = levenshtein(&needle, &item.normalized_name);
                if d > 0 && d <= self.cfg.fuzzy_max_distance + 1 {
                    Some((d, item))
                } else {
                    None
                }
            })
            .collect();
        near.sort_by(|a, b| (a.0, &a.1.normalized_name).cmp(&(b.0, &b.1.normalized_name)));
        Ok(near.into_iter().take(limit).map(|(_, item)| item).collect())
    }

    /// Sum of current known values for the given item ids. Unknown ids
    /// contribute nothing; unknown worth is zero, not an error.
    pub async fn trade_value(&self, game: Game, item_ids: &[String], now: u64) -> BrokerResult<f64> {
        let items = self.items(game, now).await?;
        let by_id: HashMap<&str, f64> =
            items.iter().map(|i| (i.item_id.as_str(), i.value)).collect();
        Ok(item_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .sum())
    }
}

fn rank_match(needle: &str, item: &Item, max_distance: usize) -> Option<(u8, usize, Item)> {
    let hay = &item.normalized_name;
    if hay == needle {
        return Some((0, 0, item.clone()));
    }
    if hay.contains(needle) || needle.contains(hay.as_str()) {
        return Some((1, hay.len().abs_diff(needle.len()), item.clone()));
    }
    let d = levenshtein(needle, hay);
    if d <= max_distance {
        return Some((2, d, item.clone()));
    }
    None
}

/// Classic two-row edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
