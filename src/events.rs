//! Typed event stream.
//!
//! The engine publishes one batch DECISION event, zero or more
//! TRADE_EXECUTED events, and one PORTFOLIO_UPDATE event per tick, in that
//! order. Delivery is best-effort over a broadcast channel: no subscribers
//! is not an error, and a lagging subscriber only loses its own backlog.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::types::{Decision, ExecutionRecord};

/// Default buffer depth per subscriber before lag kicks in.
pub const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// External event contract. The serialized `type` tags are the wire names
/// downstream consumers match on; they must not change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "DECISION")]
    Decision {
        tick_id: Uuid,
        timestamp: DateTime<Utc>,
        decisions: Vec<Decision>,
    },

    #[serde(rename = "TRADE_EXECUTED")]
    TradeExecuted {
        tick_id: Uuid,
        timestamp: DateTime<Utc>,
        record: ExecutionRecord,
    },

    #[serde(rename = "PORTFOLIO_UPDATE")]
    PortfolioUpdate {
        tick_id: Uuid,
        timestamp: DateTime<Utc>,
        total_exposure: f64,
        allocations: HashMap<String, f64>,
        active_positions: usize,
    },
}

impl AgentEvent {
    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Decision { .. } => "DECISION",
            AgentEvent::TradeExecuted { .. } => "TRADE_EXECUTED",
            AgentEvent::PortfolioUpdate { .. } => "PORTFOLIO_UPDATE",
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Best-effort fan-out of agent events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. At-most-once, no acknowledgment; send errors mean
    /// there are currently no subscribers, which is fine.
    pub fn publish(&self, event: AgentEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "Event published"),
            Err(_) => trace!(kind, "Event published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
