//! # engine_system
//!
//! Scheduler runtime for the simulation core.
//!
//! Systems are callbacks bound to a [`Phase`], a set of required components
//! and a set of required resources. Every tick the [`Scheduler`] settles
//! resource construction, then runs each phase in ascending order and each
//! system of a phase in registration order, handing it the entities its query
//! currently matches. [`EntityPool`] layers fixed-capacity spawn/despawn on
//! top of the world, and [`TickLoop`] drives an [`Engine`] at a fixed rate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_system::{Engine, Phase, SystemContext, SystemDescriptor};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut engine = Engine::new();
//!     let position = engine.define_component("position", |p: [f32; 3]| p)?;
//!     let velocity = engine.define_component("velocity", |v: [f32; 3]| v)?;
//!
//!     let (pos, vel) = (position.clone(), velocity.clone());
//!     engine.add_system(
//!         SystemDescriptor::new("integrate", Phase::GAME_WORLD)
//!             .with_components(&[position.kind(), velocity.kind()]),
//!         move |ctx: &mut SystemContext<'_>| {
//!             for &e in ctx.entities {
//!                 let v = *ctx.world.get_required(e, &vel)?;
//!                 if let Some(p) = ctx.world.get_mut(e, &pos) {
//!                     for axis in 0..3 {
//!                         p[axis] += v[axis] * ctx.dt as f32;
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         },
//!     )?;
//!
//!     engine.tick(1.0 / 60.0)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod phase;
pub mod pool;
pub mod scheduler;
pub mod tick;

pub use config::{InitDescriptor, SystemDescriptor};
pub use context::SystemContext;
pub use engine::Engine;
pub use phase::Phase;
pub use pool::{EntityPool, PoolConfig, PoolPolicy};
pub use scheduler::{InitFn, Scheduler, SchedulerState, SystemFn};
pub use tick::{TickConfig, TickLoop};
