//! Shared types for the PULSE agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A tracked token. Immutable identity; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// On-chain address, the unique key for allocations and cooldowns.
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub total_supply: f64,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, short_address(&self.address))
    }
}

impl Token {
    /// Helper to build a test/sample token with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Token {
            address: "0xfeed000000000000000000000000000000000001".to_string(),
            symbol: "FEED".to_string(),
            name: "Feed Token".to_string(),
            decimals: 18,
            total_supply: 1_000_000_000.0,
            created_at: Utc::now() - chrono::Duration::days(90),
        }
    }
}

/// Abbreviate an address for log lines: first 6 and last 4 characters.
pub fn short_address(address: &str) -> String {
    if address.len() <= 12 {
        address.to_string()
    } else {
        format!("{}..{}", &address[..6], &address[address.len() - 4..])
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Rolling-window market observation for one token at one tick.
///
/// Produced fresh each tick by the data source; the pipeline treats it as
/// read-only input and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub token: Token,
    /// Current price in USD.
    pub price_usd: f64,
    /// Price one minute prior.
    pub price_1m_ago: f64,
    /// Price five minutes prior.
    pub price_5m_ago: f64,
    /// Traded volume over the last minute (USD).
    pub volume_1m: f64,
    /// Traded volume over the last five minutes (USD).
    pub volume_5m: f64,
    /// Current pool liquidity (USD).
    pub liquidity_usd: f64,
    /// Liquidity one tick prior (USD).
    pub prev_liquidity_usd: f64,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

impl fmt::Display for MarketSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.6} (5m ago ${:.6} | vol1m ${:.0} vol5m ${:.0} | liq ${:.0})",
            self.token, self.price_usd, self.price_5m_ago, self.volume_1m, self.volume_5m,
            self.liquidity_usd,
        )
    }
}

impl MarketSnapshot {
    /// Capture time as epoch milliseconds, the wire contract for audit rows.
    pub fn captured_at_millis(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }

    /// Helper to build a test/sample snapshot with known signal values.
    #[cfg(test)]
    pub fn sample() -> Self {
        MarketSnapshot {
            token: Token::sample(),
            price_usd: 100.0,
            price_1m_ago: 99.0,
            price_5m_ago: 90.0,
            volume_1m: 300.0,
            volume_5m: 100.0,
            liquidity_usd: 200_000.0,
            prev_liquidity_usd: 190_000.0,
            captured_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade action & decision
// ---------------------------------------------------------------------------

/// Trade direction. Closed three-way enum; the variants are mutually
/// exclusive and exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    /// Whether this action reaches the execution boundary.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, TradeAction::Hold)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// A fully scored trade decision for one token at one tick.
///
/// Immutable once produced. The risk gate never edits a decision in place;
/// a blocked decision is replaced via [`Decision::risk_blocked`] and the
/// original dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub token: Token,
    pub action: TradeAction,
    /// Scorer confidence (0–1). Equals score/100 for the momentum strategy.
    pub confidence: f64,
    /// Composite momentum score (0–100).
    pub score: f64,
    /// Human-readable explanation of every signal behind the decision.
    pub rationale: String,
    /// Suggested position size as a fraction of the portfolio (0–1).
    /// Always 0 for HOLD.
    pub suggested_size: f64,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | score={:.1} conf={:.0}% size={:.2}%",
            self.action,
            self.token,
            self.score,
            self.confidence * 100.0,
            self.suggested_size * 100.0,
        )
    }
}

impl Decision {
    /// Whether this decision should be dispatched to the execution boundary.
    pub fn is_actionable(&self) -> bool {
        self.action.is_actionable()
    }

    /// Derive the replacement decision for a risk-blocked trade: action
    /// forced to HOLD, size zeroed, reason appended to the rationale so the
    /// audit lineage survives.
    pub fn risk_blocked(&self, reason: &str) -> Decision {
        Decision {
            token: self.token.clone(),
            action: TradeAction::Hold,
            confidence: self.confidence,
            score: self.score,
            rationale: format!("{} | RISK BLOCKED: {}", self.rationale, reason),
            suggested_size: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Execution types
// ---------------------------------------------------------------------------

/// Outcome reported by the execution boundary for a single dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Opaque transaction reference from the venue, if any.
    pub tx_ref: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(tx_ref: impl Into<String>) -> Self {
        Self {
            success: true,
            tx_ref: Some(tx_ref.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_ref: None,
            error: Some(error.into()),
        }
    }
}

/// One record per dispatched (non-HOLD, risk-passed) decision.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub decision: Decision,
    pub executed_at: DateTime<Utc>,
    pub tx_ref: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "{} {} OK [{}]",
                self.decision.action,
                self.decision.token,
                self.tx_ref.as_deref().unwrap_or("-"),
            )
        } else {
            write!(
                f,
                "{} {} FAILED: {}",
                self.decision.action,
                self.decision.token,
                self.error.as_deref().unwrap_or("unknown"),
            )
        }
    }
}

impl ExecutionRecord {
    /// Build a record from a boundary result.
    pub fn from_result(decision: Decision, result: &ExecutionResult, at: DateTime<Utc>) -> Self {
        Self {
            decision,
            executed_at: at,
            tx_ref: result.tx_ref.clone(),
            success: result.success,
            error: result.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tick audit record
// ---------------------------------------------------------------------------

/// Write-once summary of a single tick, handed to the persistence sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickAudit {
    pub tick_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub tokens_evaluated: usize,
    pub decisions: Vec<Decision>,
    pub executions: Vec<ExecutionRecord>,
    /// Whether this tick ran without real settlement.
    pub dry_run: bool,
}

impl fmt::Display for TickAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tick {}: evaluated={} decisions={} executions={}{}",
            self.tick_id,
            self.tokens_evaluated,
            self.decisions.len(),
            self.executions.len(),
            if self.dry_run { " [dry-run]" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PULSE.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Market data error ({source_name}): {message}")]
    MarketData { source_name: String, message: String },

    #[error("Execution error ({venue}): {message}")]
    Execution { venue: String, message: String },

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Signing error: {0}")]
    Signing(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
