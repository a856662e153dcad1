use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::catalog::retry::is_retryable_http_error;
use crate::catalog::CatalogSource;
use crate::model::{normalize_name, Game, Item, Rarity};

/// HTTP catalog source: one published JSON listing per game.
pub struct RemoteCatalog {
    client: Client,
    base: String,
}

impl RemoteCatalog {
    pub fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ItemDto {
    id: String,
    name: String,
    #[serde(default)]
    rarity: Option<String>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default = "default_tradeable")]
    tradeable: bool,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_tradeable() -> bool {
    true
}

impl ItemDto {
    fn into_item(self, game: Game) -> Item {
        Item {
            game,
            normalized_name: normalize_name(&self.name),
            item_id: self.id,
            rarity: self.rarity.as_deref().map(Rarity::parse).unwrap_or(Rarity::Common),
            // unknown worth is 0, not an error; the risk assessor treats
            // zero-value sides separately
            value: self.value.unwrap_or(0.0),
            tradeable: self.tradeable,
            metadata: self.metadata,
            name: self.name,
        }
    }
}

#[async_trait]
impl CatalogSource for RemoteCatalog {
    async fn fetch_all(&self, game: Game) -> Result<Vec<Item>> {
        let url = format!("{}/v1/{}/items", self.base, game.as_str());
        let resp = self.client.get(&url).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            if is_retryable_http_error(status) {
                return Err(anyhow!("catalog {} transient status {}", game.as_str(), status));
            }
            return Err(anyhow!("catalog {} rejected listing: {}", game.as_str(), status));
        }
        let rows: Vec<ItemDto> = resp.json().await?;
        Ok(rows.into_iter().map(|dto| dto.into_item(game)).collect())
    }
}
