//! Momentum scoring.
//!
//! A pure, deterministic map from one market snapshot to one trade
//! decision: three raw signals, symmetric saturating normalization, a
//! fixed-weight composite, and threshold classification. The rationale
//! string enumerates every intermediate value; it is the system's
//! explainability contract, required for audit.

use tracing::debug;

use crate::config::MomentumConfig;
use crate::types::{Decision, MarketSnapshot, TradeAction};

/// Composite weights. Fixed design constants summing to 100; deliberately
/// not part of the runtime configuration.
const PRICE_WEIGHT: f64 = 40.0;
const VOLUME_WEIGHT: f64 = 30.0;
const LIQUIDITY_WEIGHT: f64 = 30.0;

/// Denominators below this magnitude are treated as zero.
const NEAR_ZERO: f64 = 1e-9;

/// Momentum scorer over rolling-window snapshots.
pub struct MomentumStrategy {
    config: MomentumConfig,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    /// Access the scorer configuration.
    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    /// Score one snapshot. Pure: identical input yields identical output.
    pub fn score(&self, snapshot: &MarketSnapshot) -> Decision {
        // Raw signals, with divide-by-near-zero guarded to a neutral value
        // instead of an error. A token with no history scores mid-range.
        let price_change_5m = guarded_delta(snapshot.price_usd, snapshot.price_5m_ago);
        let volume_spike_ratio = guarded_ratio(snapshot.volume_1m, snapshot.volume_5m);
        let liquidity_delta = guarded_delta(snapshot.liquidity_usd, snapshot.prev_liquidity_usd);

        let price_norm = normalize(price_change_5m, self.config.price_change_cap);
        let volume_norm = normalize(volume_spike_ratio - 1.0, self.config.volume_ratio_cap);
        let liquidity_norm = normalize(liquidity_delta, self.config.liquidity_delta_cap);

        let score = (price_norm * PRICE_WEIGHT
            + volume_norm * VOLUME_WEIGHT
            + liquidity_norm * LIQUIDITY_WEIGHT)
            .clamp(0.0, 100.0);

        let action = if score > self.config.buy_threshold {
            TradeAction::Buy
        } else if score < self.config.sell_threshold {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };

        let confidence = score / 100.0;
        let suggested_size = if action.is_actionable() {
            self.config.base_position_pct * confidence
        } else {
            0.0
        };

        let rationale = format!(
            "price 5m {:+.2}% (norm {:.2}), volume spike {:.2}x (norm {:.2}), \
             liquidity {:+.2}% (norm {:.2}) => score {:.1} -> {}",
            price_change_5m * 100.0,
            price_norm,
            volume_spike_ratio,
            volume_norm,
            liquidity_delta * 100.0,
            liquidity_norm,
            score,
            action,
        );

        debug!(
            token = %snapshot.token,
            score = format!("{score:.1}"),
            action = %action,
            price_change_5m = format!("{:.4}", price_change_5m),
            volume_spike_ratio = format!("{:.2}", volume_spike_ratio),
            liquidity_delta = format!("{:.4}", liquidity_delta),
            "Momentum scored"
        );

        Decision {
            token: snapshot.token.clone(),
            action,
            confidence,
            score,
            rationale,
            suggested_size,
        }
    }
}

/// Relative change `(current - previous) / previous`, with a near-zero
/// previous value yielding the neutral delta 0.
fn guarded_delta(current: f64, previous: f64) -> f64 {
    if previous.abs() < NEAR_ZERO {
        0.0
    } else {
        (current - previous) / previous
    }
}

/// Ratio `numerator / denominator`, with a near-zero denominator yielding
/// the neutral ratio 1.
fn guarded_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < NEAR_ZERO {
        1.0
    } else {
        numerator / denominator
    }
}

/// Symmetric saturating map to [0, 1]: `-cap` maps to 0, zero maps to 0.5,
/// `+cap` maps to 1, values beyond the cap clamp.
fn normalize(value: f64, cap: f64) -> f64 {
    if cap.abs() < NEAR_ZERO {
        return 0.5;
    }
    (0.5 + value / (2.0 * cap)).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
