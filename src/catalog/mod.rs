//! External item-catalog boundary.
//!
//! The catalog owns item identity and valuation; the core only reads
//! snapshots. One `CatalogSource` capability covers the whole closed game
//! set, selected by `CatalogKind` at startup. The resolver layers caching
//! and fuzzy matching on top of whichever source is wired in.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Game, Item};

pub mod remote;
pub mod resolver;
pub mod retry;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Full item listing for one game. Read-only and idempotent, so the
    /// caller may retry freely.
    async fn fetch_all(&self, game: Game) -> Result<Vec<Item>>;
}

#[derive(Clone, Copy, Debug)]
pub enum CatalogKind {
    Remote,
    Null,
}

impl CatalogKind {
    pub fn from_env() -> Self {
        match std::env::var("CATALOG").unwrap_or_else(|_| "remote".to_string()).as_str() {
            "null" => CatalogKind::Null,
            _ => CatalogKind::Remote,
        }
    }

    pub fn build(self, base: &str) -> Box<dyn CatalogSource> {
        match self {
            CatalogKind::Remote => Box::new(remote::RemoteCatalog::new(base)),
            CatalogKind::Null => Box::new(NullCatalog),
        }
    }
}

/// Stub source for offline runs and tests: every game is an empty catalog.
pub struct NullCatalog;

#[async_trait]
impl CatalogSource for NullCatalog {
    async fn fetch_all(&self, _game: Game) -> Result<Vec<Item>> {
        Ok(vec![])
    }
}
