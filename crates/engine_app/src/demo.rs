//! The projectile demo: a pooled stream of projectiles flying outward,
//! expiring, and being recycled, with a lazily created renderer and a
//! per-frame network snapshot built from the serializer hooks.

use engine_component::{ByteWriter, ComponentDef, ResourceDef};
use engine_math::{Transform3D, Vec3, register_transform};
use engine_system::{
    Engine, EntityPool, InitDescriptor, Phase, SystemContext, SystemDescriptor,
};
use tracing::{debug, info, trace};

use crate::config::AppConfig;

/// Simulation clock.
#[derive(Debug, Default)]
pub struct Time {
    pub elapsed: f64,
    pub ticks: u64,
}

/// The surface frames are drawn to.
#[derive(Debug, Clone)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// Stand-in for a render device bound to a canvas.
#[derive(Debug)]
pub struct Renderer {
    pub canvas: Canvas,
    pub frames: u64,
}

/// Per-frame counters.
#[derive(Debug, Default)]
pub struct FrameStats {
    pub drawn: usize,
    pub snapshot_bytes: usize,
    pub expired: u64,
}

/// Handles for everything the demo registered.
#[derive(Debug, Clone)]
pub struct Demo {
    pub position: ComponentDef<Transform3D, Vec3>,
    pub velocity: ComponentDef<Vec3, Vec3>,
    pub lifetime: ComponentDef<f32, f32>,
    pub projectile: ComponentDef<()>,
    pub time: ResourceDef<Time>,
    pub canvas: ResourceDef<Canvas>,
    pub renderer: ResourceDef<Renderer>,
    pub stats: ResourceDef<FrameStats>,
    pub pool: ResourceDef<EntityPool>,
}

/// Register the demo schema, resources, inits and systems on `engine`.
///
/// # Errors
///
/// Any registration error; all of them are programming errors.
pub fn install(engine: &mut Engine, config: &AppConfig) -> anyhow::Result<Demo> {
    let time = engine.define_resource::<Time>("time")?;
    let demo = Demo {
        position: engine.define_component("position", Transform3D::from_position)?,
        velocity: engine.define_component_with_update(
            "velocity",
            |v: Vec3| v,
            |current: &mut Vec3, v: Vec3| *current = v,
        )?,
        lifetime: engine.define_component_with_update(
            "lifetime",
            |seconds: f32| seconds,
            |left: &mut f32, seconds: f32| *left = left.max(seconds),
        )?,
        projectile: engine.define_component("projectile", |(): ()| ())?,
        // Counters start once the clock exists.
        stats: engine.define_constructed_resource("frame-stats", &[time.kind()], |_| {
            FrameStats::default()
        })?,
        time,
        canvas: engine.define_resource("canvas")?,
        renderer: engine.define_resource("renderer")?,
        pool: engine.define_resource("projectile-pool")?,
    };

    register_transform(engine.world_mut().registry_mut(), &demo.position)?;
    engine.register_serde(&demo.velocity)?;

    install_inits(engine, &demo)?;
    install_systems(engine, &demo, config)?;

    engine.add_resource(&demo.time, Time::default())?;
    engine.add_resource(&demo.pool, projectile_pool(&demo, config))?;
    info!(
        capacity = config.projectiles.capacity,
        policy = ?config.projectiles.policy,
        "demo installed"
    );
    Ok(demo)
}

fn projectile_pool(demo: &Demo, config: &AppConfig) -> EntityPool {
    let pool_config = config
        .projectiles
        .clone()
        .keep_on_despawn(&[demo.projectile.kind()]);

    let marker = demo.projectile.clone();
    let (position, velocity, lifetime) = (
        demo.position.clone(),
        demo.velocity.clone(),
        demo.lifetime.clone(),
    );
    let (speed, ttl) = (config.projectile_speed, config.projectile_lifetime);
    let mut launched = 0u32;

    EntityPool::new(pool_config, move |world| {
        let e = world.new_entity();
        world.attach_or_update(e, &marker, ())?;
        Ok(e)
    })
    .on_spawn(move |world, e| {
        let angle = launched as f32 * 0.7;
        launched = launched.wrapping_add(1);
        world.replace(e, &position, Vec3::ZERO)?;
        world.attach_or_update(e, &velocity, Vec3::new(angle.cos(), 0.0, angle.sin()) * speed)?;
        world.replace(e, &lifetime, ttl)?;
        Ok(())
    })
    .on_despawn(|_world, e| {
        trace!(%e, "projectile returned to pool");
        Ok(())
    })
}

fn install_inits(engine: &mut Engine, demo: &Demo) -> anyhow::Result<()> {
    let canvas = demo.canvas.clone();
    engine.add_eager_init(
        InitDescriptor::new("open-canvas").produces(&[demo.canvas.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            ctx.resources.add(
                &canvas,
                Canvas {
                    width: 1280,
                    height: 720,
                },
            )?;
            Ok(())
        },
    )?;

    // The renderer comes up only once there is something to draw.
    let (canvas, renderer) = (demo.canvas.clone(), demo.renderer.clone());
    engine.add_lazy_init(
        InitDescriptor::new("create-renderer")
            .with_components(&[demo.position.kind()])
            .depends_on(&[demo.canvas.kind()])
            .produces(&[demo.renderer.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            let canvas = ctx.resource(&canvas)?.clone();
            info!(width = canvas.width, height = canvas.height, "renderer created");
            ctx.resources.add(&renderer, Renderer { canvas, frames: 0 })?;
            Ok(())
        },
    )?;
    Ok(())
}

fn install_systems(engine: &mut Engine, demo: &Demo, config: &AppConfig) -> anyhow::Result<()> {
    let time = demo.time.clone();
    engine.add_system(
        SystemDescriptor::new("advance-time", Phase::PRE_GAME_WORLD).with_resources(&[time.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            let dt = ctx.dt;
            let clock = ctx.resource_mut(&time)?;
            clock.elapsed += dt;
            clock.ticks += 1;
            Ok(())
        },
    )?;

    let pool = demo.pool.clone();
    let every = config.spawn_every.max(1);
    engine.add_system(
        SystemDescriptor::new("spawn-projectiles", Phase::GAME_WORLD).with_resources(&[pool.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            if ctx.tick_id % every == 0 {
                let e = ctx.resources.require_mut(&pool)?.spawn(ctx.world)?;
                trace!(%e, tick_id = ctx.tick_id, "projectile spawned");
            }
            Ok(())
        },
    )?;

    let (position, velocity) = (demo.position.clone(), demo.velocity.clone());
    engine.add_system(
        SystemDescriptor::new("integrate", Phase::GAME_WORLD)
            .with_components(&[position.kind(), velocity.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            let dt = ctx.dt as f32;
            for &e in ctx.entities {
                let v = *ctx.world.get_required(e, &velocity)?;
                if let Some(transform) = ctx.world.get_mut(e, &position) {
                    transform.integrate(v, dt);
                }
            }
            Ok(())
        },
    )?;

    let (lifetime, pool, stats) = (demo.lifetime.clone(), demo.pool.clone(), demo.stats.clone());
    engine.add_system(
        SystemDescriptor::new("expire-projectiles", Phase::POST_GAME_WORLD)
            .with_components(&[lifetime.kind()])
            .with_resources(&[pool.kind(), stats.kind()])
            .allow_query_edit(),
        move |ctx: &mut SystemContext<'_>| {
            let dt = ctx.dt as f32;
            let mut expired = Vec::new();
            for &e in ctx.entities {
                if let Some(left) = ctx.world.get_mut(e, &lifetime) {
                    *left -= dt;
                    if *left <= 0.0 {
                        expired.push(e);
                    }
                }
            }
            for &e in &expired {
                ctx.resources.require_mut(&pool)?.despawn(ctx.world, e)?;
            }
            ctx.resource_mut(&stats)?.expired += expired.len() as u64;
            Ok(())
        },
    )?;

    let (position, stats) = (demo.position.clone(), demo.stats.clone());
    engine.add_system(
        SystemDescriptor::new("network-snapshot", Phase::PRE_RENDER)
            .with_components(&[position.kind()])
            .with_resources(&[stats.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            let mut writer = ByteWriter::new();
            writer.write_u32(ctx.entities.len() as u32);
            for &e in ctx.entities {
                writer.write_u64(e.id());
                ctx.world.serialize_component(e, position.kind(), &mut writer)?;
            }
            ctx.resource_mut(&stats)?.snapshot_bytes = writer.len();
            Ok(())
        },
    )?;

    let (renderer, stats, time) = (demo.renderer.clone(), demo.stats.clone(), demo.time.clone());
    engine.add_system(
        SystemDescriptor::new("render", Phase::RENDER)
            .with_components(&[demo.position.kind()])
            .with_resources(&[renderer.kind(), stats.kind(), time.kind()]),
        move |ctx: &mut SystemContext<'_>| {
            let drawn = ctx.entities.len();
            let elapsed = ctx.resource(&time)?.elapsed;
            let counters = ctx.resource_mut(&stats)?;
            counters.drawn = drawn;
            let snapshot_bytes = counters.snapshot_bytes;
            let frame = ctx.resource_mut(&renderer)?;
            frame.frames += 1;
            if frame.frames % 60 == 0 {
                info!(frame = frame.frames, elapsed, drawn, snapshot_bytes, "frame");
            } else {
                debug!(frame = frame.frames, drawn, "frame");
            }
            Ok(())
        },
    )?;
    Ok(())
}

/// Log a summary of the run.
pub fn report(engine: &Engine, demo: &Demo) {
    let resources = engine.resources();
    let live = resources.get(&demo.pool).map_or(0, EntityPool::live_count);
    let frames = resources.get(&demo.renderer).map_or(0, |renderer| renderer.frames);
    let expired = resources.get(&demo.stats).map_or(0, |stats| stats.expired);
    info!(
        ticks = engine.tick_id(),
        entities = engine.world().entity_count(),
        live_projectiles = live,
        expired,
        frames,
        "run summary"
    );
}

#[cfg(test)]
mod tests {
    use engine_system::{TickConfig, TickLoop};

    use super::*;

    fn run(ticks: u64) -> (Engine, Demo) {
        let config = AppConfig {
            tick: TickConfig {
                tick_rate: 1000.0,
                max_ticks: ticks,
            },
            ..AppConfig::default()
        };
        let mut engine = Engine::new();
        let demo = install(&mut engine, &config).unwrap();
        for _ in 0..ticks {
            engine.tick(1.0 / 60.0).unwrap();
        }
        (engine, demo)
    }

    #[test]
    fn test_renderer_waits_for_first_projectile() {
        let (engine, demo) = run(3);
        assert!(engine.resources().get(&demo.canvas).is_some());
        assert!(engine.resources().get(&demo.renderer).is_none());

        let (engine, demo) = run(6);
        assert!(engine.resources().get(&demo.renderer).is_some());
    }

    #[test]
    fn test_projectiles_expire_and_recycle() {
        let (engine, demo) = run(240);
        let pool = engine.resources().get(&demo.pool).unwrap();
        let stats = engine.resources().get(&demo.stats).unwrap();
        assert!(stats.expired > 0);
        assert!(pool.live_count() <= pool.capacity());
        assert!(engine.world().entity_count() <= pool.capacity());
        for e in pool.live_entities() {
            assert!(engine.world().has(e, demo.lifetime.kind()));
        }
    }

    #[test]
    fn test_snapshot_decodes() {
        let (mut engine, demo) = run(8);
        let world = engine.world_mut();
        let e = world.query_list(&[demo.position.kind()])[0];
        let mut writer = ByteWriter::new();
        world.serialize_component(e, demo.position.kind(), &mut writer).unwrap();
        let expected = *world.get(e, &demo.position).unwrap();

        let copy = world.new_entity();
        world
            .deserialize_component(
                copy,
                demo.position.kind(),
                &mut engine_component::ByteReader::new(writer.as_bytes()),
            )
            .unwrap();
        assert_eq!(world.get(copy, &demo.position), Some(&expected));
    }

    #[test]
    fn test_tick_loop_drives_demo() {
        let config = AppConfig {
            tick: TickConfig {
                tick_rate: 1000.0,
                max_ticks: 12,
            },
            ..AppConfig::default()
        };
        let mut engine = Engine::new();
        let demo = install(&mut engine, &config).unwrap();
        TickLoop::new(config.tick.clone()).run(&mut engine).unwrap();
        assert_eq!(engine.resources().get(&demo.time).unwrap().ticks, 12);
    }
}
