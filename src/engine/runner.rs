//! Tick engine.
//!
//! Runs one full pipeline pass per invocation: fetch snapshots, score and
//! gate, emit the decision batch, dispatch actionable decisions to the
//! venue one at a time, mutate the portfolio per successful execution, and
//! assemble the tick audit record. The engine owns the portfolio
//! exclusively; nothing else writes to it.
//!
//! Within a tick the event order is fixed: DECISION, then any
//! TRADE_EXECUTED, then PORTFOLIO_UPDATE. Ticks never overlap; the caller
//! awaits `run_tick` to completion before starting the next.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::executor::ExecutionVenue;
use crate::events::{AgentEvent, EventBus};
use crate::market::MarketDataSource;
use crate::portfolio::PortfolioState;
use crate::storage::StorageHandle;
use crate::strategy::DecisionOrchestrator;
use crate::types::{ExecutionRecord, ExecutionResult, TickAudit};

pub struct TickEngine {
    source: Box<dyn MarketDataSource>,
    orchestrator: DecisionOrchestrator,
    venue: Box<dyn ExecutionVenue>,
    events: EventBus,
    storage: StorageHandle,
    portfolio: PortfolioState,
    dry_run: bool,
    tick_number: u64,
}

impl TickEngine {
    pub fn new(
        source: Box<dyn MarketDataSource>,
        orchestrator: DecisionOrchestrator,
        venue: Box<dyn ExecutionVenue>,
        events: EventBus,
        storage: StorageHandle,
        dry_run: bool,
    ) -> Self {
        Self {
            source,
            orchestrator,
            venue,
            events,
            storage,
            portfolio: PortfolioState::new(),
            dry_run,
            tick_number: 0,
        }
    }

    /// Read access to the portfolio for status reporting and tests.
    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    /// Ticks completed or attempted so far.
    pub fn tick_number(&self) -> u64 {
        self.tick_number
    }

    /// Run one tick to completion.
    ///
    /// An error from the fetch (or anywhere before decisions exist)
    /// abandons the tick; the caller logs it and waits for the next
    /// interval. Per-decision execution failures never abandon the tick.
    pub async fn run_tick(&mut self) -> Result<TickAudit> {
        self.tick_number += 1;
        let tick_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(tick = self.tick_number, tick_id = %tick_id, "Starting tick");

        // 1. Fresh snapshot set. May be slow; nothing else runs meanwhile.
        let snapshots = self
            .source
            .fetch_snapshots()
            .await
            .with_context(|| format!("Snapshot fetch failed ({})", self.source.name()))?;
        info!(count = snapshots.len(), source = self.source.name(), "Snapshots fetched");

        // 2. Score and gate.
        let decisions = self.orchestrator.evaluate(&snapshots, &self.portfolio, started_at);

        // 3. One DECISION batch event per tick, then persist each decision.
        self.events.publish(AgentEvent::Decision {
            tick_id,
            timestamp: Utc::now(),
            decisions: decisions.clone(),
        });
        for decision in &decisions {
            self.storage.save_decision(tick_id, decision.clone());
        }

        // 4–5. Dispatch actionable decisions sequentially, in orchestrator
        // order. Portfolio mutations happen only on success and are never
        // rolled back by a later failure in the same tick.
        let mut executions = Vec::new();
        for decision in decisions.iter().filter(|d| d.is_actionable()) {
            let result = match self.venue.execute(decision).await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        token = %decision.token,
                        action = %decision.action,
                        error = %e,
                        "Execution boundary failed"
                    );
                    ExecutionResult::failed(e.to_string())
                }
            };

            let executed_at = Utc::now();
            let record = ExecutionRecord::from_result(decision.clone(), &result, executed_at);

            if record.success {
                self.portfolio.apply_execution(
                    &decision.token.address,
                    decision.action,
                    decision.suggested_size,
                    executed_at,
                );
                info!(
                    token = %decision.token,
                    action = %decision.action,
                    size = format!("{:.4}", decision.suggested_size),
                    exposure = format!("{:.4}", self.portfolio.total_exposure()),
                    tx_ref = record.tx_ref.as_deref().unwrap_or("-"),
                    "Trade executed"
                );
                self.events.publish(AgentEvent::TradeExecuted {
                    tick_id,
                    timestamp: executed_at,
                    record: record.clone(),
                });
            }

            self.storage.save_execution(tick_id, record.clone());
            executions.push(record);
        }

        // 6. Portfolio update event, exposure recomputed from the map.
        self.events.publish(AgentEvent::PortfolioUpdate {
            tick_id,
            timestamp: Utc::now(),
            total_exposure: self.portfolio.total_exposure(),
            allocations: self.portfolio.allocations(),
            active_positions: self.portfolio.active_positions(),
        });

        // 7. Tick audit record covering everything above.
        let audit = TickAudit {
            tick_id,
            timestamp: started_at,
            tokens_evaluated: snapshots.len(),
            decisions,
            executions,
            dry_run: self.dry_run,
        };
        self.storage.save_tick_audit(audit.clone());

        info!(
            tick = self.tick_number,
            evaluated = audit.tokens_evaluated,
            executions = audit.executions.len(),
            exposure = format!("{:.4}", self.portfolio.total_exposure()),
            "Tick complete"
        );
        Ok(audit)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MomentumConfig, RiskConfig};
    use crate::engine::executor::MockExecutionVenue;
    use crate::market::MockMarketDataSource;
    use crate::storage::AuditStore;
    use crate::strategy::momentum::MomentumStrategy;
    use crate::strategy::risk::RiskGate;
    use crate::types::{MarketSnapshot, Token, TradeAction};
    use std::sync::{Arc, Mutex};

    fn make_token(address: &str, symbol: &str) -> Token {
        Token {
            address: address.to_string(),
            symbol: symbol.to_string(),
            name: format!("{symbol} Token"),
            decimals: 18,
            total_supply: 1_000_000.0,
            created_at: Utc::now(),
        }
    }

    /// Snapshot scoring a saturated BUY under default momentum config.
    fn buy_snapshot(address: &str, symbol: &str) -> MarketSnapshot {
        MarketSnapshot {
            token: make_token(address, symbol),
            price_usd: 130.0,
            price_1m_ago: 125.0,
            price_5m_ago: 100.0,
            volume_1m: 500.0,
            volume_5m: 100.0,
            liquidity_usd: 200_000.0,
            prev_liquidity_usd: 160_000.0,
            captured_at: Utc::now(),
        }
    }

    /// Neutral snapshot scoring HOLD.
    fn hold_snapshot(address: &str, symbol: &str) -> MarketSnapshot {
        MarketSnapshot {
            token: make_token(address, symbol),
            price_usd: 100.0,
            price_1m_ago: 100.0,
            price_5m_ago: 100.0,
            volume_1m: 100.0,
            volume_5m: 500.0,
            liquidity_usd: 200_000.0,
            prev_liquidity_usd: 200_000.0,
            captured_at: Utc::now(),
        }
    }

    fn make_orchestrator() -> DecisionOrchestrator {
        DecisionOrchestrator::new(
            vec![Box::new(MomentumStrategy::new(MomentumConfig::default()))],
            RiskGate::new(RiskConfig::default()),
        )
    }

    async fn make_engine(
        source: MockMarketDataSource,
        venue: MockExecutionVenue,
    ) -> (TickEngine, EventBus) {
        let events = EventBus::default();
        let store = AuditStore::open_in_memory().await.unwrap();
        let (storage, _task) = StorageHandle::spawn(store);
        let engine = TickEngine::new(
            Box::new(source),
            make_orchestrator(),
            Box::new(venue),
            events.clone(),
            storage,
            true,
        );
        (engine, events)
    }

    fn mock_source(snapshots: Vec<MarketSnapshot>) -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_snapshots()
            .returning(move || Ok(snapshots.clone()));
        source.expect_name().return_const("mock".to_string());
        source
    }

    fn mock_venue_ok() -> MockExecutionVenue {
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_execute()
            .returning(|_| Ok(crate::types::ExecutionResult::ok("0xmock")));
        venue.expect_name().return_const("mock".to_string());
        venue
    }

    #[tokio::test]
    async fn test_successful_buy_mutates_portfolio() {
        let source = mock_source(vec![buy_snapshot("0xaaa", "AAA")]);
        let (mut engine, _events) = make_engine(source, mock_venue_ok()).await;

        let audit = engine.run_tick().await.unwrap();

        assert_eq!(audit.tokens_evaluated, 1);
        assert_eq!(audit.executions.len(), 1);
        assert!(audit.executions[0].success);
        assert!(engine.portfolio().total_exposure() > 0.0);
        assert!(engine.portfolio().last_trade_at("0xaaa").is_some());
    }

    #[tokio::test]
    async fn test_hold_decisions_are_not_dispatched() {
        let source = mock_source(vec![hold_snapshot("0xaaa", "AAA")]);
        let mut venue = MockExecutionVenue::new();
        venue.expect_execute().times(0);
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, _events) = make_engine(source, venue).await;

        let audit = engine.run_tick().await.unwrap();

        assert_eq!(audit.decisions.len(), 1);
        assert_eq!(audit.decisions[0].action, TradeAction::Hold);
        assert!(audit.executions.is_empty());
        assert_eq!(engine.portfolio().total_exposure(), 0.0);
    }

    #[tokio::test]
    async fn test_event_order_within_tick() {
        let source = mock_source(vec![buy_snapshot("0xaaa", "AAA")]);
        let (mut engine, events) = make_engine(source, mock_venue_ok()).await;
        let mut rx = events.subscribe();

        engine.run_tick().await.unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["DECISION", "TRADE_EXECUTED", "PORTFOLIO_UPDATE"]);
    }

    #[tokio::test]
    async fn test_no_trade_event_when_nothing_executes() {
        let source = mock_source(vec![hold_snapshot("0xaaa", "AAA")]);
        let mut venue = MockExecutionVenue::new();
        venue.expect_execute().times(0);
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, events) = make_engine(source, venue).await;
        let mut rx = events.subscribe();

        engine.run_tick().await.unwrap();

        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["DECISION", "PORTFOLIO_UPDATE"]);
    }

    #[tokio::test]
    async fn test_failed_execution_recorded_but_portfolio_untouched() {
        let source = mock_source(vec![buy_snapshot("0xaaa", "AAA")]);
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_execute()
            .returning(|_| Ok(crate::types::ExecutionResult::failed("venue rejected")));
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, events) = make_engine(source, venue).await;
        let mut rx = events.subscribe();

        let audit = engine.run_tick().await.unwrap();

        assert_eq!(audit.executions.len(), 1);
        assert!(!audit.executions[0].success);
        assert_eq!(audit.executions[0].error.as_deref(), Some("venue rejected"));
        assert_eq!(engine.portfolio().total_exposure(), 0.0);

        // No TRADE_EXECUTED event for a failed execution
        let kinds: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["DECISION", "PORTFOLIO_UPDATE"]);
    }

    #[tokio::test]
    async fn test_venue_error_becomes_failed_record() {
        let source = mock_source(vec![buy_snapshot("0xaaa", "AAA")]);
        let mut venue = MockExecutionVenue::new();
        venue
            .expect_execute()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, _events) = make_engine(source, venue).await;

        let audit = engine.run_tick().await.unwrap();

        assert_eq!(audit.executions.len(), 1);
        assert!(!audit.executions[0].success);
        assert!(audit.executions[0]
            .error
            .as_deref()
            .unwrap()
            .contains("connection reset"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_remaining_decisions() {
        let source = mock_source(vec![
            buy_snapshot("0xaaa", "AAA"),
            buy_snapshot("0xbbb", "BBB"),
        ]);
        let calls = Arc::new(Mutex::new(0usize));
        let calls_in_mock = calls.clone();
        let mut venue = MockExecutionVenue::new();
        venue.expect_execute().returning(move |_| {
            let mut n = calls_in_mock.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Ok(crate::types::ExecutionResult::failed("first fails"))
            } else {
                Ok(crate::types::ExecutionResult::ok("0xsecond"))
            }
        });
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, _events) = make_engine(source, venue).await;

        let audit = engine.run_tick().await.unwrap();

        assert_eq!(audit.executions.len(), 2);
        assert!(!audit.executions[0].success);
        assert!(audit.executions[1].success);
        // Only the second trade reached the portfolio
        assert_eq!(engine.portfolio().allocation("0xaaa"), 0.0);
        assert!(engine.portfolio().allocation("0xbbb") > 0.0);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_decisions_dispatched_in_order() {
        let source = mock_source(vec![
            buy_snapshot("0xaaa", "AAA"),
            buy_snapshot("0xbbb", "BBB"),
        ]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_mock = seen.clone();
        let mut venue = MockExecutionVenue::new();
        venue.expect_execute().returning(move |decision| {
            seen_in_mock.lock().unwrap().push(decision.token.address.clone());
            Ok(crate::types::ExecutionResult::ok("0xmock"))
        });
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, _events) = make_engine(source, venue).await;

        engine.run_tick().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["0xaaa", "0xbbb"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_abandons_tick() {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_snapshots()
            .returning(|| Err(anyhow::anyhow!("rate limited")));
        source.expect_name().return_const("mock".to_string());
        let (mut engine, _events) = make_engine(source, mock_venue_ok()).await;

        let result = engine.run_tick().await;
        assert!(result.is_err());
        assert_eq!(engine.portfolio().total_exposure(), 0.0);
        // The attempt still counts; the loop continues at the next interval
        assert_eq!(engine.tick_number(), 1);
    }

    #[tokio::test]
    async fn test_exposure_invariant_after_tick() {
        let source = mock_source(vec![
            buy_snapshot("0xaaa", "AAA"),
            buy_snapshot("0xbbb", "BBB"),
        ]);
        let (mut engine, _events) = make_engine(source, mock_venue_ok()).await;

        engine.run_tick().await.unwrap();

        let sum: f64 = engine.portfolio().allocations().values().sum();
        assert!((engine.portfolio().total_exposure() - sum).abs() < 1e-12);
        for allocation in engine.portfolio().allocations().values() {
            assert!(*allocation >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_audit_carries_dry_run_flag() {
        let source = mock_source(vec![hold_snapshot("0xaaa", "AAA")]);
        let mut venue = MockExecutionVenue::new();
        venue.expect_execute().times(0);
        venue.expect_name().return_const("mock".to_string());
        let (mut engine, _events) = make_engine(source, venue).await;

        let audit = engine.run_tick().await.unwrap();
        assert!(audit.dry_run);
    }
}
