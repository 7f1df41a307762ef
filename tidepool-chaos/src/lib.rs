//! Injectable fault-simulation strategies for tidepool.
//!
//! Consensus code is only trustworthy if it has been exercised against slow
//! and silent peers. This crate isolates that exercise behind a single trait,
//! [`FaultInjector`], which a node consults at the top of every inbound
//! protocol handler. Production wiring installs [`NoFaults`] (a no-op);
//! simulation and test wiring installs [`StallInjector`], which stalls a
//! handler for a fixed window with a fixed probability, driven by a seeded
//! RNG so that every run is reproducible from its seed.
//!
//! The stall window is deliberately the same duration callers use as their
//! per-call timeout: a stalled handler looks exactly like a crashed peer to
//! the caller, while the handler itself still completes afterwards. Late
//! completions are wasted work, not a safety hazard.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Decides, per inbound handler invocation, whether to simulate a fault.
///
/// Implementations must be cheap: the injector sits on the hot path of every
/// prepare/accept/learn handler.
#[async_trait]
pub trait FaultInjector: Send + Sync {
    /// Called by a handler before it does real work. `site` names the
    /// handler for logging ("prepare", "accept", "learn").
    ///
    /// An implementation may sleep here to simulate a slow or crashed peer;
    /// it must eventually return.
    async fn before_handler(&self, site: &'static str);
}

/// The production strategy: never inject anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

#[async_trait]
impl FaultInjector for NoFaults {
    async fn before_handler(&self, _site: &'static str) {}
}

/// Configuration for [`StallInjector`].
#[derive(Debug, Clone, Copy)]
pub struct FaultConfig {
    /// Probability that any single handler invocation stalls.
    pub stall_probability: f64,

    /// How long a stalled handler sleeps before proceeding.
    ///
    /// Callers are expected to use the same duration as their hard per-call
    /// timeout, so a stall is indistinguishable from a crash at the caller.
    pub stall: Duration,

    /// Seed for the decision RNG. Identical seeds replay identical fault
    /// schedules.
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            stall_probability: 0.4,
            stall: Duration::from_millis(600),
            seed: 0,
        }
    }
}

/// Simulates slow/crashed peers by stalling handlers probabilistically.
///
/// Each invocation independently rolls against `stall_probability`. The RNG
/// is a seeded [`ChaCha8Rng`], so a failing schedule can be replayed by
/// re-running with the same seed.
pub struct StallInjector {
    config: FaultConfig,
    rng: Mutex<ChaCha8Rng>,
}

impl StallInjector {
    /// Create an injector from the given configuration.
    pub fn new(config: FaultConfig) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed)),
            config,
        }
    }

    /// Create an injector with default probability/window and the given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(FaultConfig {
            seed,
            ..FaultConfig::default()
        })
    }

    fn roll(&self) -> bool {
        self.rng.lock().random::<f64>() < self.config.stall_probability
    }
}

#[async_trait]
impl FaultInjector for StallInjector {
    async fn before_handler(&self, site: &'static str) {
        if self.roll() {
            debug!(site, stall_ms = self.config.stall.as_millis() as u64, "injecting handler stall");
            tokio::time::sleep(self.config.stall).await;
        }
    }
}
