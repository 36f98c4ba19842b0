//! Execution boundary.
//!
//! Defines the `ExecutionVenue` seam the tick engine dispatches through,
//! plus the simulated venue used for dry runs: signed synthetic orders,
//! configurable settlement latency, and seeded failure injection. The core
//! treats success and failure as terminal per decision; retries, if any,
//! belong to a venue implementation.

use anyhow::Result;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::signer::Signer;
use crate::types::{AgentError, Decision, ExecutionResult};

/// Abstraction over trade settlement venues.
///
/// A HOLD decision must never be passed here; the engine filters them out
/// and an implementation may treat one as a caller bug.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Settle one decision. `Ok` with `success == false` is a venue-side
    /// rejection; `Err` is a transport-level failure. Both are terminal.
    async fn execute(&self, decision: &Decision) -> Result<ExecutionResult>;

    /// Venue name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Simulated venue
// ---------------------------------------------------------------------------

const VENUE_NAME: &str = "simulated";

/// Stand-in for a real settlement venue. Orders are signed and assigned a
/// transaction reference; a configured fraction fail to exercise the
/// failure path end to end.
pub struct SimulatedVenue {
    signer: Signer,
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedVenue {
    pub fn new(signer: Signer, latency_ms: u64, failure_rate: f64, seed: Option<u64>) -> Self {
        Self {
            signer,
            latency: Duration::from_millis(latency_ms),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            }),
        }
    }
}

#[async_trait]
impl ExecutionVenue for SimulatedVenue {
    async fn execute(&self, decision: &Decision) -> Result<ExecutionResult> {
        if !decision.is_actionable() {
            return Err(AgentError::Execution {
                venue: VENUE_NAME.to_string(),
                message: format!("HOLD decision dispatched for {}", decision.token),
            }
            .into());
        }

        // Simulated settlement latency
        tokio::time::sleep(self.latency).await;

        let rejected = {
            let mut rng = self.rng.lock().expect("venue rng lock");
            rng.gen::<f64>() < self.failure_rate
        };
        if rejected {
            warn!(
                token = %decision.token,
                action = %decision.action,
                "Simulated venue rejected order"
            );
            return Ok(ExecutionResult::failed("simulated venue rejection"));
        }

        let order_id = Uuid::new_v4();
        let payload = format!(
            "{}:{}:{:.6}:{}",
            decision.action, decision.token.address, decision.suggested_size, order_id,
        );
        let tx_ref = self.signer.sign(&payload);

        info!(
            token = %decision.token,
            action = %decision.action,
            size = format!("{:.4}", decision.suggested_size),
            tx_ref = %tx_ref,
            signer = %self.signer.address(),
            "Order settled"
        );
        Ok(ExecutionResult::ok(tx_ref))
    }

    fn name(&self) -> &str {
        VENUE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
