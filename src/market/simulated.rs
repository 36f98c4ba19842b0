//! Simulated market data source.
//!
//! Seeded random-walk price, volume, and liquidity series over a fixed
//! token set. Deterministic given the seed, so dry runs and tests are
//! reproducible. Uses the same rolling-history synthesis as the live
//! source so snapshots have identical semantics.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use super::{MarketDataSource, Observation, TokenHistory};
use crate::types::{MarketSnapshot, Token};

const SOURCE_NAME: &str = "simulated";
const DEFAULT_SEED: u64 = 42;

/// Chance per tick of a pump/dump impulse on top of the base walk.
const IMPULSE_CHANCE: f64 = 0.05;

struct SimTokenState {
    price: f64,
    liquidity: f64,
    base_volume: f64,
    /// Recent per-tick volumes, for the rolling 5-minute sum.
    minute_volumes: VecDeque<(DateTime<Utc>, f64)>,
}

/// Deterministic random-walk source for dry runs and tests.
pub struct SimulatedSource {
    rng: StdRng,
    tokens: Vec<Token>,
    states: HashMap<String, SimTokenState>,
    history: HashMap<String, TokenHistory>,
}

impl SimulatedSource {
    pub fn new(token_addresses: &[String], seed: Option<u64>) -> Self {
        let mut rng = StdRng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED));
        let now = Utc::now();

        let mut tokens = Vec::with_capacity(token_addresses.len());
        let mut states = HashMap::new();
        for (i, address) in token_addresses.iter().enumerate() {
            tokens.push(Token {
                address: address.clone(),
                symbol: format!("SIM{i}"),
                name: format!("Simulated Token {i}"),
                decimals: 18,
                total_supply: 1_000_000_000.0,
                created_at: now - Duration::days(30),
            });
            states.insert(
                address.clone(),
                SimTokenState {
                    price: rng.gen_range(0.10..10.0),
                    liquidity: rng.gen_range(80_000.0..400_000.0),
                    base_volume: rng.gen_range(100.0..1_000.0),
                    minute_volumes: VecDeque::new(),
                },
            );
        }

        Self {
            rng,
            tokens,
            states,
            history: HashMap::new(),
        }
    }

    /// Advance one token's walk and return (price, liquidity, volume_1m).
    fn step(rng: &mut StdRng, state: &mut SimTokenState) -> (f64, f64, f64) {
        let mut pct: f64 = rng.gen_range(-0.02..0.02);
        if rng.gen::<f64>() < IMPULSE_CHANCE {
            let impulse = rng.gen_range(0.05..0.30);
            pct += if rng.gen_bool(0.5) { impulse } else { -impulse };
        }
        state.price = (state.price * (1.0 + pct)).max(1e-9);
        state.liquidity = (state.liquidity * (1.0 + rng.gen_range(-0.05..0.05))).max(1_000.0);
        let volume_1m = state.base_volume * rng.gen_range(0.2..3.0);
        (state.price, state.liquidity, volume_1m)
    }
}

#[async_trait]
impl MarketDataSource for SimulatedSource {
    async fn fetch_snapshots(&mut self) -> Result<Vec<MarketSnapshot>> {
        let now = Utc::now();
        let mut snapshots = Vec::with_capacity(self.tokens.len());

        for token in &self.tokens {
            let state = self
                .states
                .get_mut(&token.address)
                .expect("simulated state exists for every token");
            let (price, liquidity, volume_1m) = Self::step(&mut self.rng, state);

            // Rolling 5-minute volume from the generated per-tick series
            let cutoff = now - Duration::minutes(5);
            while state.minute_volumes.front().is_some_and(|(t, _)| *t < cutoff) {
                state.minute_volumes.pop_front();
            }
            state.minute_volumes.push_back((now, volume_1m));
            let volume_5m: f64 = state.minute_volumes.iter().map(|(_, v)| v).sum();

            let history = self.history.entry(token.address.clone()).or_default();
            snapshots.push(MarketSnapshot {
                token: token.clone(),
                price_usd: price,
                price_1m_ago: history.price_before(now, Duration::minutes(1), price),
                price_5m_ago: history.price_before(now, Duration::minutes(5), price),
                volume_1m,
                volume_5m,
                liquidity_usd: liquidity,
                prev_liquidity_usd: history.prev_liquidity(liquidity),
                captured_at: now,
            });
            history.push(Observation {
                at: now,
                price,
                liquidity,
                volume_5m,
            });
        }

        debug!(count = snapshots.len(), "Simulated snapshots generated");
        Ok(snapshots)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
