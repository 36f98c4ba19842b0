//! Persistence sink.
//!
//! SQLite audit trail for decisions, executions, and tick records. The
//! engine never talks to the database directly: it sends fire-and-forget
//! requests through a `StorageHandle`, and a spawned writer task drains
//! them, so a slow sink cannot block the tick loop. Write failures are
//! logged here and never propagate as pipeline failures.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{Decision, ExecutionRecord, TickAudit};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed audit store. Clones share the same pool, so a clone kept
/// aside can read back what the writer task persisted.
#[derive(Clone)]
pub struct AuditStore {
    pool: SqlitePool,
}

impl AuditStore {
    /// Open (creating if missing) the audit database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Failed to parse in-memory SQLite options")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One connection: all writes funnel through the single writer task,
        // and SQLite prefers a single writer anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open audit database")?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick_id TEXT NOT NULL,
                token_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                confidence REAL NOT NULL,
                score REAL NOT NULL,
                suggested_size REAL NOT NULL,
                rationale TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create decisions table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tick_id TEXT NOT NULL,
                token_address TEXT NOT NULL,
                action TEXT NOT NULL,
                size REAL NOT NULL,
                success INTEGER NOT NULL,
                tx_ref TEXT,
                error TEXT,
                executed_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create executions table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ticks (
                tick_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                tokens_evaluated INTEGER NOT NULL,
                decision_count INTEGER NOT NULL,
                execution_count INTEGER NOT NULL,
                dry_run INTEGER NOT NULL,
                record TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create ticks table")?;

        Ok(())
    }

    pub async fn save_decision(&self, tick_id: Uuid, decision: &Decision) -> Result<()> {
        sqlx::query(
            "INSERT INTO decisions
             (tick_id, token_address, symbol, action, confidence, score,
              suggested_size, rationale, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tick_id.to_string())
        .bind(&decision.token.address)
        .bind(&decision.token.symbol)
        .bind(decision.action.to_string())
        .bind(decision.confidence)
        .bind(decision.score)
        .bind(decision.suggested_size)
        .bind(&decision.rationale)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert decision")?;
        Ok(())
    }

    pub async fn save_execution(&self, tick_id: Uuid, record: &ExecutionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO executions
             (tick_id, token_address, action, size, success, tx_ref, error, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tick_id.to_string())
        .bind(&record.decision.token.address)
        .bind(record.decision.action.to_string())
        .bind(record.decision.suggested_size)
        .bind(record.success)
        .bind(record.tx_ref.as_deref())
        .bind(record.error.as_deref())
        .bind(record.executed_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to insert execution")?;
        Ok(())
    }

    pub async fn save_tick_audit(&self, audit: &TickAudit) -> Result<()> {
        let record = serde_json::to_string(audit).context("Failed to serialize tick audit")?;
        sqlx::query(
            "INSERT INTO ticks
             (tick_id, started_at, tokens_evaluated, decision_count,
              execution_count, dry_run, record)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(audit.tick_id.to_string())
        .bind(audit.timestamp.to_rfc3339())
        .bind(audit.tokens_evaluated as i64)
        .bind(audit.decisions.len() as i64)
        .bind(audit.executions.len() as i64)
        .bind(audit.dry_run)
        .bind(record)
        .execute(&self.pool)
        .await
        .context("Failed to insert tick audit")?;
        Ok(())
    }

    pub async fn decision_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM decisions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn execution_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn tick_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ticks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Load one persisted tick audit back, for inspection and tests.
    pub async fn load_tick_audit(&self, tick_id: Uuid) -> Result<Option<TickAudit>> {
        let record: Option<String> =
            sqlx::query_scalar("SELECT record FROM ticks WHERE tick_id = ?")
                .bind(tick_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        match record {
            None => Ok(None),
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("Failed to parse stored tick audit")?,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Fire-and-forget handle
// ---------------------------------------------------------------------------

enum StorageRequest {
    Decision { tick_id: Uuid, decision: Decision },
    Execution { tick_id: Uuid, record: ExecutionRecord },
    TickAudit(Box<TickAudit>),
}

/// Cheap clonable handle the engine writes through. Dropping every handle
/// shuts the writer task down once the queue drains.
#[derive(Clone)]
pub struct StorageHandle {
    tx: mpsc::UnboundedSender<StorageRequest>,
}

impl StorageHandle {
    /// Spawn the writer task over `store`. The join handle completes after
    /// all senders are dropped and the backlog is flushed.
    pub fn spawn(store: AuditStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = match &request {
                    StorageRequest::Decision { tick_id, decision } => {
                        store.save_decision(*tick_id, decision).await
                    }
                    StorageRequest::Execution { tick_id, record } => {
                        store.save_execution(*tick_id, record).await
                    }
                    StorageRequest::TickAudit(audit) => store.save_tick_audit(audit).await,
                };
                if let Err(e) = result {
                    error!(error = %e, "Audit write failed");
                }
            }
            info!("Audit writer stopped");
        });
        (Self { tx }, task)
    }

    pub fn save_decision(&self, tick_id: Uuid, decision: Decision) {
        self.send(StorageRequest::Decision { tick_id, decision });
    }

    pub fn save_execution(&self, tick_id: Uuid, record: ExecutionRecord) {
        self.send(StorageRequest::Execution { tick_id, record });
    }

    pub fn save_tick_audit(&self, audit: TickAudit) {
        self.send(StorageRequest::TickAudit(Box::new(audit)));
    }

    fn send(&self, request: StorageRequest) {
        if self.tx.send(request).is_err() {
            debug!("Audit writer gone, dropping record");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionResult, Token, TradeAction};
    use chrono::Utc;

    fn make_decision(action: TradeAction) -> Decision {
        Decision {
            token: Token::sample(),
            action,
            confidence: 0.7,
            score: 70.0,
            rationale: "test rationale".to_string(),
            suggested_size: 0.035,
        }
    }

    #[tokio::test]
    async fn test_save_and_count_decisions() {
        let store = AuditStore::open_in_memory().await.unwrap();
        let tick_id = Uuid::new_v4();

        store.save_decision(tick_id, &make_decision(TradeAction::Buy)).await.unwrap();
        store.save_decision(tick_id, &make_decision(TradeAction::Hold)).await.unwrap();

        assert_eq!(store.decision_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_save_execution_with_error() {
        let store = AuditStore::open_in_memory().await.unwrap();
        let record = ExecutionRecord::from_result(
            make_decision(TradeAction::Sell),
            &ExecutionResult::failed("venue timeout"),
            Utc::now(),
        );
        store.save_execution(Uuid::new_v4(), &record).await.unwrap();
        assert_eq!(store.execution_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tick_audit_roundtrip() {
        let store = AuditStore::open_in_memory().await.unwrap();
        let audit = TickAudit {
            tick_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tokens_evaluated: 2,
            decisions: vec![make_decision(TradeAction::Buy)],
            executions: vec![ExecutionRecord::from_result(
                make_decision(TradeAction::Buy),
                &ExecutionResult::ok("0xabc"),
                Utc::now(),
            )],
            dry_run: true,
        };

        store.save_tick_audit(&audit).await.unwrap();
        assert_eq!(store.tick_count().await.unwrap(), 1);

        let loaded = store.load_tick_audit(audit.tick_id).await.unwrap().unwrap();
        assert_eq!(loaded.tick_id, audit.tick_id);
        assert_eq!(loaded.tokens_evaluated, 2);
        assert_eq!(loaded.decisions.len(), 1);
        assert_eq!(loaded.executions.len(), 1);
        assert!(loaded.dry_run);
    }

    #[tokio::test]
    async fn test_load_unknown_tick_is_none() {
        let store = AuditStore::open_in_memory().await.unwrap();
        assert!(store.load_tick_audit(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handle_writes_through_task() {
        let store = AuditStore::open_in_memory().await.unwrap();
        let (handle, task) = StorageHandle::spawn(store.clone());
        let tick_id = Uuid::new_v4();

        handle.save_decision(tick_id, make_decision(TradeAction::Buy));
        handle.save_execution(
            tick_id,
            ExecutionRecord::from_result(
                make_decision(TradeAction::Buy),
                &ExecutionResult::ok("0xabc"),
                Utc::now(),
            ),
        );

        // Dropping the last handle lets the writer drain and stop; joining
        // it guarantees the queue is flushed before we count rows.
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.decision_count().await.unwrap(), 1);
        assert_eq!(store.execution_count().await.unwrap(), 1);
    }
}
