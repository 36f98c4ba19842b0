//! Market data acquisition.
//!
//! Defines the `MarketDataSource` seam the tick engine fetches through and
//! provides implementations for:
//! - DexScreener — live DEX pair data over HTTP
//! - Simulated — seeded random-walk generator for dry runs and tests

pub mod dexscreener;
pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::types::MarketSnapshot;

/// Abstraction over per-tick market snapshot providers.
///
/// Implementors must return a stable token set across calls so the
/// rolling-window signals stay meaningful. The fetch may be slow; the
/// engine never overlaps two fetches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch one fresh snapshot per tracked token.
    async fn fetch_snapshots(&mut self) -> Result<Vec<MarketSnapshot>>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Rolling observation history
// ---------------------------------------------------------------------------

/// Retention window for raw observations, in minutes. Lookbacks go at most
/// 5 minutes back; keep double that.
const RETENTION_MINUTES: i64 = 10;

/// One raw observation of a token, as polled from a source.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Observation {
    pub at: DateTime<Utc>,
    pub price: f64,
    pub liquidity: f64,
    /// Rolling 5-minute volume as reported at this instant.
    pub volume_5m: f64,
}

/// Per-token ring of recent observations, used to synthesize the 1m/5m
/// lookback fields of a snapshot from successive polls.
#[derive(Debug, Default)]
pub(crate) struct TokenHistory {
    samples: VecDeque<Observation>,
}

impl TokenHistory {
    pub fn push(&mut self, obs: Observation) {
        let cutoff = obs.at - Duration::minutes(RETENTION_MINUTES);
        while self.samples.front().is_some_and(|s| s.at < cutoff) {
            self.samples.pop_front();
        }
        self.samples.push_back(obs);
    }

    /// Most recent observation, if any.
    pub fn latest(&self) -> Option<&Observation> {
        self.samples.back()
    }

    /// Observation closest in time to `target`. None when empty.
    pub fn sample_at(&self, target: DateTime<Utc>) -> Option<&Observation> {
        self.samples.iter().min_by_key(|s| (s.at - target).num_milliseconds().abs())
    }

    /// Price closest to `lookback` before `now`, falling back to `current`
    /// when no history exists yet. A token with no history scores neutral.
    pub fn price_before(&self, now: DateTime<Utc>, lookback: Duration, current: f64) -> f64 {
        self.sample_at(now - lookback).map(|s| s.price).unwrap_or(current)
    }

    /// Previous-poll liquidity, falling back to `current` on first poll.
    pub fn prev_liquidity(&self, current: f64) -> f64 {
        self.latest().map(|s| s.liquidity).unwrap_or(current)
    }

    /// Estimate the last minute's volume from rolling 5-minute readings.
    ///
    /// Uses the m5 delta against the sample nearest one minute back; volume
    /// rolling out of the 5-minute window biases this low, which is
    /// acceptable for a spike signal. Falls back to an even split of the
    /// current window when history is too shallow.
    pub fn volume_1m_estimate(&self, now: DateTime<Utc>, current_volume_5m: f64) -> f64 {
        match self.sample_at(now - Duration::minutes(1)) {
            Some(past) if (now - past.at).num_seconds() >= 30 => {
                (current_volume_5m - past.volume_5m).max(0.0)
            }
            _ => current_volume_5m / 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(at: DateTime<Utc>, price: f64, liquidity: f64, volume_5m: f64) -> Observation {
        Observation {
            at,
            price,
            liquidity,
            volume_5m,
        }
    }

    #[test]
    fn test_empty_history_falls_back_to_current() {
        let history = TokenHistory::default();
        let now = Utc::now();
        assert_eq!(history.price_before(now, Duration::minutes(5), 42.0), 42.0);
        assert_eq!(history.prev_liquidity(1000.0), 1000.0);
        // No history: even split of the rolling window
        assert!((history.volume_1m_estimate(now, 500.0) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_price_before_picks_closest_sample() {
        let now = Utc::now();
        let mut history = TokenHistory::default();
        history.push(obs(now - Duration::minutes(6), 90.0, 1000.0, 100.0));
        history.push(obs(now - Duration::minutes(5), 95.0, 1000.0, 100.0));
        history.push(obs(now - Duration::minutes(1), 99.0, 1000.0, 100.0));

        assert_eq!(history.price_before(now, Duration::minutes(5), 100.0), 95.0);
        assert_eq!(history.price_before(now, Duration::minutes(1), 100.0), 99.0);
    }

    #[test]
    fn test_prev_liquidity_is_latest_sample() {
        let now = Utc::now();
        let mut history = TokenHistory::default();
        history.push(obs(now - Duration::minutes(2), 100.0, 180_000.0, 100.0));
        history.push(obs(now - Duration::minutes(1), 100.0, 190_000.0, 100.0));
        assert_eq!(history.prev_liquidity(200_000.0), 190_000.0);
    }

    #[test]
    fn test_volume_estimate_uses_window_delta() {
        let now = Utc::now();
        let mut history = TokenHistory::default();
        history.push(obs(now - Duration::minutes(1), 100.0, 1000.0, 400.0));
        // m5 rose from 400 to 700 over the last minute
        assert!((history.volume_1m_estimate(now, 700.0) - 300.0).abs() < 1e-12);
    }

    #[test]
    fn test_volume_estimate_clamps_negative_delta() {
        let now = Utc::now();
        let mut history = TokenHistory::default();
        history.push(obs(now - Duration::minutes(1), 100.0, 1000.0, 900.0));
        // Old volume rolled out of the window faster than new volume arrived
        assert_eq!(history.volume_1m_estimate(now, 600.0), 0.0);
    }

    #[test]
    fn test_retention_prunes_old_samples() {
        let now = Utc::now();
        let mut history = TokenHistory::default();
        history.push(obs(now - Duration::minutes(30), 10.0, 1000.0, 100.0));
        history.push(obs(now, 100.0, 1000.0, 100.0));
        // The 30-minute-old sample is gone; 5m lookback resolves to the
        // remaining sample rather than the stale one
        assert_eq!(history.price_before(now, Duration::minutes(5), 100.0), 100.0);
    }
}
