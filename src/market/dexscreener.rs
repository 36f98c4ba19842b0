//! DexScreener market data source.
//!
//! Polls the public pairs endpoint for the tracked token set and keeps a
//! short per-token observation history so the 1-minute / 5-minute lookback
//! fields of a snapshot can be synthesized from successive polls.
//!
//! API docs: https://docs.dexscreener.com/api/reference
//! Base URL: https://api.dexscreener.com/latest/dex
//! Rate limit: 300 requests/minute per IP
//! Auth: none required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{MarketDataSource, Observation, TokenHistory};
use crate::types::{MarketSnapshot, Token};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://api.dexscreener.com/latest/dex";
const SOURCE_NAME: &str = "dexscreener";

/// The tokens endpoint accepts at most this many addresses per call.
const MAX_ADDRESSES_PER_CALL: usize = 30;

/// The pairs endpoint does not expose token decimals.
const DEFAULT_DECIMALS: u8 = 18;

const HTTP_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// API response types (DexScreener JSON → Rust)
// ---------------------------------------------------------------------------

/// Response from `/tokens/{addresses}`. We only deserialize the fields we
/// need; `pairs` is null for unknown addresses.
#[derive(Debug, Deserialize)]
struct TokensResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    #[serde(default)]
    chain_id: String,

    base_token: DexBaseToken,

    /// Current price in USD, as a decimal string. Absent for exotic quotes.
    #[serde(default)]
    price_usd: Option<String>,

    #[serde(default)]
    volume: DexVolume,

    #[serde(default)]
    liquidity: Option<DexLiquidity>,

    /// Fully diluted valuation in USD.
    #[serde(default)]
    fdv: Option<f64>,

    /// Pair creation timestamp (ms since epoch).
    #[serde(default)]
    pair_created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexBaseToken {
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DexVolume {
    /// Rolling 5-minute volume in USD.
    #[serde(default)]
    m5: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexLiquidity {
    #[serde(default)]
    usd: f64,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Live market data over the DexScreener pairs endpoint.
pub struct DexScreenerSource {
    http: Client,
    token_addresses: Vec<String>,
    history: HashMap<String, TokenHistory>,
}

impl DexScreenerSource {
    pub fn new(token_addresses: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build DexScreener HTTP client")?;
        Ok(Self {
            http,
            token_addresses,
            history: HashMap::new(),
        })
    }

    /// Fetch all pairs for the tracked addresses, chunked to the endpoint's
    /// address limit, with the chunks requested concurrently.
    async fn fetch_pairs(&self) -> Result<Vec<DexPair>> {
        let requests = self
            .token_addresses
            .chunks(MAX_ADDRESSES_PER_CALL)
            .map(|chunk| {
                let url = format!(
                    "{BASE_URL}/tokens/{}",
                    urlencoding::encode(&chunk.join(","))
                );
                let http = self.http.clone();
                async move {
                    http.get(&url)
                        .send()
                        .await
                        .and_then(|r| r.error_for_status())
                        .context("DexScreener request failed")?
                        .json::<TokensResponse>()
                        .await
                        .context("DexScreener response parse failed")
                }
            });

        let mut pairs = Vec::new();
        for response in join_all(requests).await {
            pairs.extend(response?.pairs.unwrap_or_default());
        }
        Ok(pairs)
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerSource {
    async fn fetch_snapshots(&mut self) -> Result<Vec<MarketSnapshot>> {
        let pairs = self.fetch_pairs().await?;
        let now = Utc::now();

        let mut snapshots = Vec::with_capacity(self.token_addresses.len());
        for address in &self.token_addresses {
            let Some(pair) = best_pair(&pairs, address) else {
                warn!(token = %address, "No tradable pair returned, skipping this tick");
                continue;
            };

            let Some(price) = pair.price_usd.as_deref().and_then(|p| p.parse::<f64>().ok())
            else {
                warn!(token = %address, chain = %pair.chain_id, "Pair has no USD price, skipping");
                continue;
            };

            let liquidity = pair.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
            let token = map_token(pair, price);
            let history = self.history.entry(address.to_lowercase()).or_default();
            snapshots.push(build_snapshot(
                history,
                token,
                price,
                liquidity,
                pair.volume.m5,
                now,
            ));
        }

        debug!(
            requested = self.token_addresses.len(),
            returned = snapshots.len(),
            "DexScreener snapshots built"
        );
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

/// Pick the deepest pair quoting a tracked base token. Tokens trade on
/// several pools; the deepest one carries the meaningful price.
fn best_pair<'a>(pairs: &'a [DexPair], address: &str) -> Option<&'a DexPair> {
    pairs
        .iter()
        .filter(|p| p.base_token.address.eq_ignore_ascii_case(address))
        .max_by(|a, b| {
            let la = a.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
            let lb = b.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0);
            la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn map_token(pair: &DexPair, price: f64) -> Token {
    // Supply is not exposed directly; derive it from FDV when available.
    let total_supply = match pair.fdv {
        Some(fdv) if price > 0.0 => fdv / price,
        _ => 0.0,
    };
    let created_at = pair
        .pair_created_at
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    Token {
        address: pair.base_token.address.clone(),
        symbol: pair.base_token.symbol.clone(),
        name: pair.base_token.name.clone(),
        decimals: DEFAULT_DECIMALS,
        total_supply,
        created_at,
    }
}

/// Synthesize one snapshot from the current poll and the token's history.
/// Lookbacks are read before the current observation is recorded.
fn build_snapshot(
    history: &mut TokenHistory,
    token: Token,
    price: f64,
    liquidity: f64,
    volume_5m: f64,
    now: DateTime<Utc>,
) -> MarketSnapshot {
    let snapshot = MarketSnapshot {
        token,
        price_usd: price,
        price_1m_ago: history.price_before(now, Duration::minutes(1), price),
        price_5m_ago: history.price_before(now, Duration::minutes(5), price),
        volume_1m: history.volume_1m_estimate(now, volume_5m),
        volume_5m,
        liquidity_usd: liquidity,
        prev_liquidity_usd: history.prev_liquidity(liquidity),
        captured_at: now,
    };
    history.push(Observation {
        at: now,
        price,
        liquidity,
        volume_5m,
    });
    snapshot
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
