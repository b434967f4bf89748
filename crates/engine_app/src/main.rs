//! # engine_app
//!
//! Drives the simulation core from a fixed-timestep loop with a small
//! projectile demo: pooled projectiles are spawned, integrated, expired and
//! recycled; a renderer resource comes up lazily once there is something to
//! draw; and every frame a network snapshot is built from the component
//! serializer hooks.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags and the optional JSON config.
//! 2. Register the demo schema, inits and systems.
//! 3. Enter the fixed-timestep tick loop until `max_ticks` (or forever).

mod config;
mod demo;

use anyhow::Result;
use clap::Parser;
use engine_system::{Engine, TickLoop};
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Args;

const DEFAULT_FILTER: &str = "engine_app=info,engine_system=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();

    let args = Args::parse();
    let config = args.resolve()?;
    info!(
        tick_rate = config.tick.tick_rate,
        max_ticks = config.tick.max_ticks,
        pool_capacity = config.projectiles.capacity,
        "engine starting"
    );

    let mut engine = Engine::new();
    let demo = demo::install(&mut engine, &config)?;
    let renderer_ready = engine.when_resources(&[demo.renderer.kind()]);

    // The engine is not `Send`; keep every task on this thread.
    let local = LocalSet::new();
    local
        .run_until(async move {
            let watcher = tokio::task::spawn_local(async move {
                if renderer_ready.await.is_ok() {
                    info!("renderer online");
                }
            });

            let mut tick_loop = TickLoop::new(config.tick.clone());
            let outcome = tick_loop.run_async(&mut engine).await;
            watcher.abort();
            demo::report(&engine, &demo);
            outcome
        })
        .await?;

    info!("engine shut down");
    Ok(())
}
