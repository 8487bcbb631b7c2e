// src/price.rs
//! Optional USD price enrichment from the CoinGecko simple-price API.
//! Prices are cached per symbol for the life of the process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub struct PriceClient {
    client: Client,
    base_url: String,
    cache: Mutex<HashMap<String, f64>>,
}

impl PriceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building price client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn cached(&self, symbol: &str) -> Option<f64> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .copied()
    }

    /// Best-effort lookup: empty symbol or any failure yields `None`.
    pub async fn price_usd(&self, symbol: &str) -> Option<f64> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return None;
        }
        if let Some(p) = self.cached(symbol) {
            return Some(p);
        }
        match self.fetch(symbol).await {
            Ok(price) => {
                self.cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(symbol.to_string(), price);
                Some(price)
            }
            Err(e) => {
                tracing::warn!(symbol, error = %format!("{e:#}"), "price lookup failed");
                None
            }
        }
    }

    async fn fetch(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/simple/price", self.base_url);
        let body = self
            .client
            .get(&url)
            .query(&[("ids", symbol), ("vs_currencies", "usd")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("price request")?
            .text()
            .await
            .context("price body")?;
        parse_price(&body, symbol)
    }
}

/// Extract `{"<symbol>": {"usd": <price>}}`.
pub fn parse_price(body: &str, symbol: &str) -> Result<f64> {
    let parsed: HashMap<String, HashMap<String, f64>> =
        serde_json::from_str(body).context("parsing price json")?;
    parsed
        .get(symbol)
        .and_then(|m| m.get("usd"))
        .copied()
        .with_context(|| format!("price for {symbol} not found"))
}
