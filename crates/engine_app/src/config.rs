//! Application configuration: an optional JSON file plus CLI overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use engine_system::{PoolConfig, PoolPolicy, TickConfig};
use serde::{Deserialize, Serialize};

/// Command-line arguments. Flags override values from `--config`.
#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Run the projectile demo on the simulation core")]
pub struct Args {
    /// JSON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Stop after this many ticks (0 = run forever).
    #[arg(long)]
    pub ticks: Option<u64>,
    /// Ticks per second.
    #[arg(long)]
    pub tick_rate: Option<f64>,
    /// Projectile pool capacity.
    #[arg(long)]
    pub pool_capacity: Option<usize>,
}

impl Args {
    /// Load the config file (or defaults) and apply flag overrides.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed.
    pub fn resolve(&self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(ticks) = self.ticks {
            config.tick.max_ticks = ticks;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick.tick_rate = tick_rate;
        }
        if let Some(capacity) = self.pool_capacity {
            config.projectiles.capacity = capacity;
        }
        Ok(config)
    }
}

/// Everything the demo is parameterized by.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tick: TickConfig,
    pub projectiles: PoolConfig,
    /// Spawn one projectile every this many ticks.
    pub spawn_every: u64,
    /// Seconds a projectile lives before returning to the pool.
    pub projectile_lifetime: f32,
    /// Units per second.
    pub projectile_speed: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig {
                tick_rate: 60.0,
                max_ticks: 600,
            },
            projectiles: PoolConfig::new("projectiles", 32).with_policy(PoolPolicy::RandDespawn),
            spawn_every: 4,
            projectile_lifetime: 1.5,
            projectile_speed: 12.0,
        }
    }
}

impl AppConfig {
    /// Read `path` as JSON, or return the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not valid JSON for this type.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
