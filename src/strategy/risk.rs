//! Risk gate.
//!
//! Deterministic pass/fail check applied to every non-HOLD decision before
//! dispatch. Exactly four rules, evaluated in a fixed priority order; the
//! first failing rule short-circuits and names the outcome. HOLD decisions
//! never reach the gate.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::RiskConfig;
use crate::portfolio::PortfolioState;
use crate::types::{Decision, MarketSnapshot};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The first rule a proposed trade violated, with the raw values needed to
/// reconstruct the check.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskViolation {
    #[error("allocation cap: suggested size {suggested:.4} exceeds per-token cap {cap:.4}")]
    AllocationCap { suggested: f64, cap: f64 },

    #[error("exposure cap: projected exposure {projected:.4} exceeds cap {cap:.4}")]
    ExposureCap { projected: f64, cap: f64 },

    #[error("liquidity floor: liquidity ${liquidity:.0} below floor ${floor:.0}")]
    LiquidityFloor { liquidity: f64, floor: f64 },

    #[error("cooldown: {elapsed_secs}s since last trade, {required_secs}s required")]
    Cooldown { elapsed_secs: i64, required_secs: i64 },
}

/// Result of gating one decision. There is no partial-pass state; a blocked
/// outcome carries exactly the first violated rule, so the reason string
/// exists if and only if the gate failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskOutcome {
    Pass,
    Blocked(RiskViolation),
}

impl RiskOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, RiskOutcome::Pass)
    }

    /// Reason string for a blocked outcome, `None` on pass.
    pub fn reason(&self) -> Option<String> {
        match self {
            RiskOutcome::Pass => None,
            RiskOutcome::Blocked(violation) => Some(violation.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Deterministic portfolio-risk gate. Reads portfolio state, never writes.
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Access the gate configuration.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Gate one non-HOLD decision against the current portfolio.
    ///
    /// The evaluation instant is an explicit argument so the check stays a
    /// pure function of its inputs. Rules run in priority order:
    /// allocation cap, projected exposure cap, liquidity floor, cooldown.
    pub fn evaluate(
        &self,
        snapshot: &MarketSnapshot,
        decision: &Decision,
        portfolio: &PortfolioState,
        now: DateTime<Utc>,
    ) -> RiskOutcome {
        // Rule 1: per-token allocation cap
        if decision.suggested_size > self.config.max_allocation_per_token {
            return self.blocked(
                decision,
                RiskViolation::AllocationCap {
                    suggested: decision.suggested_size,
                    cap: self.config.max_allocation_per_token,
                },
            );
        }

        // Rule 2: total exposure cap, against the projected exposure
        let projected = portfolio.total_exposure() + decision.suggested_size;
        if projected > self.config.max_total_exposure {
            return self.blocked(
                decision,
                RiskViolation::ExposureCap {
                    projected,
                    cap: self.config.max_total_exposure,
                },
            );
        }

        // Rule 3: liquidity floor
        if snapshot.liquidity_usd < self.config.min_liquidity_usd {
            return self.blocked(
                decision,
                RiskViolation::LiquidityFloor {
                    liquidity: snapshot.liquidity_usd,
                    floor: self.config.min_liquidity_usd,
                },
            );
        }

        // Rule 4: per-token cooldown. No prior trade passes trivially.
        if let Some(last) = portfolio.last_trade_at(&decision.token.address) {
            let elapsed = now - last;
            let required = Duration::minutes(self.config.cooldown_minutes);
            if elapsed < required {
                return self.blocked(
                    decision,
                    RiskViolation::Cooldown {
                        elapsed_secs: elapsed.num_seconds(),
                        required_secs: required.num_seconds(),
                    },
                );
            }
        }

        RiskOutcome::Pass
    }

    fn blocked(&self, decision: &Decision, violation: RiskViolation) -> RiskOutcome {
        debug!(
            token = %decision.token,
            action = %decision.action,
            reason = %violation,
            "Risk gate blocked decision"
        );
        RiskOutcome::Blocked(violation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
