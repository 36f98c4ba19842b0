//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`
//! and populated by the event listener task; handlers only read.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::events::AgentEvent;

/// Entries kept per rolling log.
const LOG_CAP: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent_name: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub ticks: RwLock<u64>,
    pub last_tick_at: RwLock<Option<DateTime<Utc>>>,
    pub portfolio: RwLock<PortfolioView>,
    pub recent_decisions: RwLock<Vec<DecisionLogEntry>>,
    pub recent_trades: RwLock<Vec<TradeLogEntry>>,
}

impl DashboardState {
    pub fn new(agent_name: &str, dry_run: bool) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            dry_run,
            started_at: Utc::now(),
            ticks: RwLock::new(0),
            last_tick_at: RwLock::new(None),
            portfolio: RwLock::new(PortfolioView::default()),
            recent_decisions: RwLock::new(Vec::new()),
            recent_trades: RwLock::new(Vec::new()),
        }
    }

    /// Fold one broadcast event into the view.
    pub async fn apply_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::Decision { timestamp, decisions, .. } => {
                *self.ticks.write().await += 1;
                *self.last_tick_at.write().await = Some(*timestamp);

                let mut log = self.recent_decisions.write().await;
                for decision in decisions {
                    log.push(DecisionLogEntry {
                        timestamp: timestamp.to_rfc3339(),
                        symbol: decision.token.symbol.clone(),
                        address: decision.token.address.clone(),
                        action: decision.action.to_string(),
                        score: decision.score,
                        confidence: decision.confidence,
                        suggested_size: decision.suggested_size,
                        rationale: decision.rationale.clone(),
                    });
                }
                trim(&mut log);
            }
            AgentEvent::TradeExecuted { timestamp, record, .. } => {
                let mut log = self.recent_trades.write().await;
                log.push(TradeLogEntry {
                    timestamp: timestamp.to_rfc3339(),
                    symbol: record.decision.token.symbol.clone(),
                    action: record.decision.action.to_string(),
                    size: record.decision.suggested_size,
                    tx_ref: record.tx_ref.clone(),
                    success: record.success,
                });
                trim(&mut log);
            }
            AgentEvent::PortfolioUpdate {
                total_exposure,
                allocations,
                active_positions,
                ..
            } => {
                *self.portfolio.write().await = PortfolioView {
                    total_exposure: *total_exposure,
                    allocations: allocations.clone(),
                    active_positions: *active_positions,
                };
            }
        }
    }
}

fn trim<T>(log: &mut Vec<T>) {
    if log.len() > LOG_CAP {
        let excess = log.len() - LOG_CAP;
        log.drain(..excess);
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Default)]
pub struct PortfolioView {
    pub total_exposure: f64,
    pub allocations: HashMap<String, f64>,
    pub active_positions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub status: String,
    pub dry_run: bool,
    pub ticks: u64,
    pub uptime_secs: i64,
    pub last_tick_at: Option<String>,
    pub total_exposure: f64,
    pub active_positions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionLogEntry {
    pub timestamp: String,
    pub symbol: String,
    pub address: String,
    pub action: String,
    pub score: f64,
    pub confidence: f64,
    pub suggested_size: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeLogEntry {
    pub timestamp: String,
    pub symbol: String,
    pub action: String,
    pub size: f64,
    pub tx_ref: Option<String>,
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let portfolio = state.portfolio.read().await;
    let last_tick_at = state.last_tick_at.read().await;

    Json(StatusResponse {
        agent: state.agent_name.clone(),
        status: "RUNNING".to_string(),
        dry_run: state.dry_run,
        ticks: *state.ticks.read().await,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        last_tick_at: last_tick_at.map(|t| t.to_rfc3339()),
        total_exposure: portfolio.total_exposure,
        active_positions: portfolio.active_positions,
    })
}

/// GET /api/portfolio
pub async fn get_portfolio(State(state): State<AppState>) -> Json<PortfolioView> {
    Json(state.portfolio.read().await.clone())
}

/// GET /api/decisions
pub async fn get_decisions(State(state): State<AppState>) -> Json<Vec<DecisionLogEntry>> {
    Json(state.recent_decisions.read().await.clone())
}

/// GET /api/trades
pub async fn get_trades(State(state): State<AppState>) -> Json<Vec<TradeLogEntry>> {
    Json(state.recent_trades.read().await.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
