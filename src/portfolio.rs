//! Portfolio state machine.
//!
//! The only mutable entity whose lifetime spans the whole process. Owned
//! and written exclusively by the tick engine; every other component holds
//! at most a shared reference for reads. Exposure is always recomputed from
//! the allocation map, never tracked incrementally.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::types::TradeAction;

/// Running portfolio totals, updated monotonically per successful trade.
///
/// Created once at process start with all fields empty; never reset except
/// by process restart. There is no rollback: a failed execution after a
/// successful one in the same tick does not undo the earlier mutation.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioState {
    /// Fraction of portfolio committed per token address.
    allocations: HashMap<String, f64>,
    /// Last successful trade per token address.
    last_trades: HashMap<String, DateTime<Utc>>,
    /// Sum of all allocations. Derived; see `recompute_exposure`.
    total_exposure: f64,
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self::new()
    }
}

impl PortfolioState {
    pub fn new() -> Self {
        Self {
            allocations: HashMap::new(),
            last_trades: HashMap::new(),
            total_exposure: 0.0,
        }
    }

    /// Total exposure as a fraction of the portfolio.
    pub fn total_exposure(&self) -> f64 {
        self.total_exposure
    }

    /// Current allocation for a token (0 if never traded).
    pub fn allocation(&self, token_address: &str) -> f64 {
        self.allocations.get(token_address).copied().unwrap_or(0.0)
    }

    /// Timestamp of the last successful trade for a token, if any.
    pub fn last_trade_at(&self, token_address: &str) -> Option<DateTime<Utc>> {
        self.last_trades.get(token_address).copied()
    }

    /// Number of tokens with a positive allocation.
    pub fn active_positions(&self) -> usize {
        self.allocations.values().filter(|a| **a > 0.0).count()
    }

    /// Snapshot of the allocation map for event payloads.
    pub fn allocations(&self) -> HashMap<String, f64> {
        self.allocations.clone()
    }

    /// Record a successful execution.
    ///
    /// BUY increases the token's allocation by `size`; SELL decreases it,
    /// clamped at zero. The last-trade timestamp is set regardless of
    /// direction. HOLD never reaches this method; it is a caller bug if it
    /// does, and the state is left untouched.
    pub fn apply_execution(
        &mut self,
        token_address: &str,
        action: TradeAction,
        size: f64,
        at: DateTime<Utc>,
    ) {
        match action {
            TradeAction::Buy => {
                let entry = self.allocations.entry(token_address.to_string()).or_insert(0.0);
                *entry += size;
            }
            TradeAction::Sell => {
                let entry = self.allocations.entry(token_address.to_string()).or_insert(0.0);
                *entry = (*entry - size).max(0.0);
            }
            TradeAction::Hold => {
                tracing::warn!(token = token_address, "HOLD passed to apply_execution, ignoring");
                return;
            }
        }
        self.last_trades.insert(token_address.to_string(), at);
        self.recompute_exposure();
    }

    /// Recompute the derived exposure from the allocation map. Summing the
    /// map on every mutation avoids incremental drift.
    fn recompute_exposure(&mut self) {
        self.total_exposure = self.allocations.values().sum();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_A: &str = "0xaaa";
    const TOKEN_B: &str = "0xbbb";

    #[test]
    fn test_new_state_is_empty() {
        let state = PortfolioState::new();
        assert_eq!(state.total_exposure(), 0.0);
        assert_eq!(state.allocation(TOKEN_A), 0.0);
        assert!(state.last_trade_at(TOKEN_A).is_none());
        assert_eq!(state.active_positions(), 0);
    }

    #[test]
    fn test_buy_increases_allocation_and_exposure() {
        let mut state = PortfolioState::new();
        state.apply_execution(TOKEN_A, TradeAction::Buy, 0.05, Utc::now());

        assert!((state.allocation(TOKEN_A) - 0.05).abs() < 1e-12);
        assert!((state.total_exposure() - 0.05).abs() < 1e-12);
        assert_eq!(state.active_positions(), 1);
        assert!(state.last_trade_at(TOKEN_A).is_some());
    }

    #[test]
    fn test_sell_decreases_allocation() {
        let mut state = PortfolioState::new();
        state.apply_execution(TOKEN_A, TradeAction::Buy, 0.10, Utc::now());
        state.apply_execution(TOKEN_A, TradeAction::Sell, 0.04, Utc::now());

        assert!((state.allocation(TOKEN_A) - 0.06).abs() < 1e-12);
        assert!((state.total_exposure() - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_sell_clamps_at_zero() {
        let mut state = PortfolioState::new();
        state.apply_execution(TOKEN_A, TradeAction::Buy, 0.03, Utc::now());
        state.apply_execution(TOKEN_A, TradeAction::Sell, 0.10, Utc::now());

        assert_eq!(state.allocation(TOKEN_A), 0.0);
        assert_eq!(state.total_exposure(), 0.0);
        assert_eq!(state.active_positions(), 0);
    }

    #[test]
    fn test_sell_on_flat_book_stays_zero_and_stamps_time() {
        let mut state = PortfolioState::new();
        let at = Utc::now();
        state.apply_execution(TOKEN_A, TradeAction::Sell, 0.05, at);

        assert_eq!(state.allocation(TOKEN_A), 0.0);
        // Timestamp is set regardless of direction
        assert_eq!(state.last_trade_at(TOKEN_A), Some(at));
    }

    #[test]
    fn test_exposure_equals_sum_of_allocations() {
        let mut state = PortfolioState::new();
        state.apply_execution(TOKEN_A, TradeAction::Buy, 0.05, Utc::now());
        state.apply_execution(TOKEN_B, TradeAction::Buy, 0.07, Utc::now());
        state.apply_execution(TOKEN_A, TradeAction::Buy, 0.02, Utc::now());

        let sum: f64 = state.allocations().values().sum();
        assert!((state.total_exposure() - sum).abs() < 1e-12);
        assert!((state.total_exposure() - 0.14).abs() < 1e-12);
        assert_eq!(state.active_positions(), 2);
    }

    #[test]
    fn test_hold_is_a_no_op() {
        let mut state = PortfolioState::new();
        state.apply_execution(TOKEN_A, TradeAction::Hold, 0.05, Utc::now());

        assert_eq!(state.total_exposure(), 0.0);
        assert!(state.last_trade_at(TOKEN_A).is_none());
    }

    #[test]
    fn test_last_trade_updates_on_each_execution() {
        let mut state = PortfolioState::new();
        let first = Utc::now();
        let second = first + chrono::Duration::minutes(10);

        state.apply_execution(TOKEN_A, TradeAction::Buy, 0.05, first);
        assert_eq!(state.last_trade_at(TOKEN_A), Some(first));

        state.apply_execution(TOKEN_A, TradeAction::Sell, 0.02, second);
        assert_eq!(state.last_trade_at(TOKEN_A), Some(second));
    }

    #[test]
    fn test_allocations_never_negative() {
        let mut state = PortfolioState::new();
        for _ in 0..5 {
            state.apply_execution(TOKEN_A, TradeAction::Sell, 0.10, Utc::now());
        }
        assert!(state.allocation(TOKEN_A) >= 0.0);
        assert!(state.total_exposure() >= 0.0);
    }
}
