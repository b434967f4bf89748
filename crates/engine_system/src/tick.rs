//! Fixed-timestep tick driver.
//!
//! [`TickLoop`] calls [`Engine::tick`] at a fixed rate, either blocking the
//! current thread ([`TickLoop::run`]) or on a tokio interval
//! ([`TickLoop::run_async`]). Both stop after `max_ticks` (0 = never) and
//! return the first tick error.

use std::time::{Duration, Instant};

use anyhow::{Context as _, ensure};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::engine::Engine;

/// Configuration for the tick loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Duration of one tick.
    ///
    /// # Errors
    ///
    /// If `tick_rate` is not a positive, finite number.
    pub fn tick_duration(&self) -> anyhow::Result<Duration> {
        ensure!(
            self.tick_rate.is_finite() && self.tick_rate > 0.0,
            "tick_rate must be positive, got {}",
            self.tick_rate
        );
        Ok(Duration::from_secs_f64(1.0 / self.tick_rate))
    }

    fn is_done(&self, ticks: u64) -> bool {
        self.max_ticks > 0 && ticks >= self.max_ticks
    }
}

/// Drives an [`Engine`] at a fixed rate.
#[derive(Debug)]
pub struct TickLoop {
    config: TickConfig,
    ticks: u64,
}

impl TickLoop {
    /// Create a new tick loop with the given configuration.
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self { config, ticks: 0 }
    }

    /// Ticks run by this loop so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The loop configuration.
    #[must_use]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    fn step(&mut self, engine: &mut Engine, dt: f64) -> anyhow::Result<()> {
        engine
            .tick(dt)
            .with_context(|| format!("tick {} failed", engine.tick_id()))?;
        self.ticks += 1;
        Ok(())
    }

    /// Run on the current thread, sleeping between ticks.
    ///
    /// # Errors
    ///
    /// An invalid tick rate, or the first failing tick.
    pub fn run(&mut self, engine: &mut Engine) -> anyhow::Result<()> {
        let tick_duration = self.config.tick_duration()?;
        let dt = tick_duration.as_secs_f64();

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.step(engine, dt)?;

            if self.config.is_done(self.ticks) {
                info!(ticks = self.ticks, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = engine.tick_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }

    /// Run on a tokio interval. The engine is not `Send`, so this future must
    /// be driven by a current-thread runtime or a `LocalSet`.
    ///
    /// # Errors
    ///
    /// An invalid tick rate, or the first failing tick.
    pub async fn run_async(&mut self, engine: &mut Engine) -> anyhow::Result<()> {
        let tick_duration = self.config.tick_duration()?;
        let dt = tick_duration.as_secs_f64();
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting async tick loop"
        );

        loop {
            interval.tick().await;
            let start = Instant::now();
            self.step(engine, dt)?;

            if self.config.is_done(self.ticks) {
                info!(ticks = self.ticks, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed > tick_duration {
                warn!(
                    tick_id = engine.tick_id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
            // Let tasks awaiting resources observe this tick's publications.
            tokio::task::yield_now().await;
        }
    }
}
