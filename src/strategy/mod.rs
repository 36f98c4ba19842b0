//! Strategy engine — scoring strategies and the decision orchestrator.

pub mod momentum;
pub mod risk;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::portfolio::PortfolioState;
use crate::types::{Decision, MarketSnapshot};
use momentum::MomentumStrategy;
use risk::RiskGate;

// ---------------------------------------------------------------------------
// Strategy seam
// ---------------------------------------------------------------------------

/// A scoring strategy: one snapshot in, one decision out.
///
/// Implementations must be pure and deterministic given the snapshot. The
/// set of strategies is closed and registered explicitly at startup; no
/// runtime plugin loading.
pub trait Strategy: Send + Sync {
    fn score(&self, snapshot: &MarketSnapshot) -> Decision;

    /// Strategy name for logging and identification.
    fn name(&self) -> &str;
}

impl Strategy for MomentumStrategy {
    fn score(&self, snapshot: &MarketSnapshot) -> Decision {
        MomentumStrategy::score(self, snapshot)
    }

    fn name(&self) -> &str {
        "momentum"
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs every registered strategy over the tick's snapshot set and gates
/// each non-HOLD decision through the risk gate.
///
/// A blocked decision is replaced with a HOLD decision carrying the original
/// rationale plus the violation reason; the original is discarded, never
/// mutated in place. HOLD decisions bypass the gate entirely.
pub struct DecisionOrchestrator {
    strategies: Vec<Box<dyn Strategy>>,
    gate: RiskGate,
}

impl DecisionOrchestrator {
    pub fn new(strategies: Vec<Box<dyn Strategy>>, gate: RiskGate) -> Self {
        Self { strategies, gate }
    }

    /// Evaluate one tick: one decision per snapshot per strategy, in input
    /// order, with risk gating applied.
    pub fn evaluate(
        &self,
        snapshots: &[MarketSnapshot],
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> Vec<Decision> {
        let mut decisions = Vec::with_capacity(snapshots.len() * self.strategies.len());

        for strategy in &self.strategies {
            for snapshot in snapshots {
                let decision = strategy.score(snapshot);
                decisions.push(self.gate_decision(decision, snapshots, portfolio, now));
            }
        }

        let actionable = decisions.iter().filter(|d| d.is_actionable()).count();
        info!(
            snapshots = snapshots.len(),
            strategies = self.strategies.len(),
            decisions = decisions.len(),
            actionable,
            "Orchestration complete"
        );

        decisions
    }

    fn gate_decision(
        &self,
        decision: Decision,
        snapshots: &[MarketSnapshot],
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> Decision {
        if !decision.is_actionable() {
            return decision;
        }

        let snapshot = snapshots
            .iter()
            .find(|s| s.token.address == decision.token.address);

        let Some(snapshot) = snapshot else {
            // Defensive fallback: a decision whose token is absent from the
            // snapshot set passes through ungated. Should not happen when
            // strategies score only the given snapshots.
            warn!(
                token = %decision.token,
                action = %decision.action,
                "Data consistency warning: no snapshot for decision token, skipping risk gate"
            );
            return decision;
        };

        let outcome = self.gate.evaluate(snapshot, &decision, portfolio, now);
        match outcome.reason() {
            None => decision,
            Some(reason) => {
                warn!(
                    token = %decision.token,
                    action = %decision.action,
                    size = format!("{:.4}", decision.suggested_size),
                    reason = %reason,
                    "Decision blocked by risk gate"
                );
                decision.risk_blocked(&reason)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
