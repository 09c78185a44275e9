//! # Frame Demo
//!
//! Drives the ECS through a fixed number of frames: a bouncing-particle
//! world with a movement system, a wall system ordered after it, and an
//! expiry system that destroys particles once their lifetime runs out.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=ember_core=debug cargo run --features demo --bin frame_demo -- --config ember.toml --frames 300 --entities 5000 --fps 60
//! ```

use std::process::ExitCode;

use bytemuck::{Pod, Zeroable};
use ember_core::{
    Component, ComponentInit, ComponentKind, Ecs, EcsResult, EngineConfig, FrameClock,
    OrderChain, Position, SystemDescriptor, Velocity,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Half-width of the square arena.
const ARENA: f32 = 100.0;

/// Remaining frames before a particle expires.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Lifetime {
    frames: u32,
}

impl Component for Lifetime {}

struct Options {
    config: Option<String>,
    frames: u64,
    entities: usize,
    fps: f64,
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        config: None,
        frames: 300,
        entities: 1_000,
        fps: 0.0,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    options.config = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--frames" | "-f" => {
                if i + 1 < args.len() {
                    options.frames = args[i + 1].parse().unwrap_or(300);
                    i += 1;
                }
            }
            "--entities" | "-e" => {
                if i + 1 < args.len() {
                    options.entities = args[i + 1].parse().unwrap_or(1_000);
                    i += 1;
                }
            }
            "--fps" => {
                if i + 1 < args.len() {
                    options.fps = args[i + 1].parse().unwrap_or(0.0);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: frame_demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>      TOML engine config (default: built-in)");
                println!("  -f, --frames <N>         Frames to run (default: 300)");
                println!("  -e, --entities <N>       Particles to spawn (default: 1000)");
                println!("      --fps <RATE>         Hold the loop to RATE frames/s (default: off)");
                println!("  -h, --help               Show this help");
                return None;
            }
            _ => {}
        }
        i += 1;
    }
    Some(options)
}

#[derive(Clone, Copy)]
struct Kinds {
    position: ComponentKind,
    velocity: ComponentKind,
    lifetime: ComponentKind,
}

fn systems(kinds: &Kinds) -> Vec<SystemDescriptor> {
    let Kinds {
        position,
        velocity,
        lifetime,
    } = *kinds;
    let position_order = OrderChain::new("position");

    let movement = SystemDescriptor::new("movement", move |view, id| {
        let v: Velocity = view.previous(velocity, id);
        let p: Position = view.previous(position, id);
        view.set_component(position, id, Position::new(p.x + v.x, p.y + v.y));
    })
    .requires(&[position, velocity])
    .writes(&[position])
    .ordered_by(&position_order, 0);

    let walls = SystemDescriptor::new("walls", move |view, id| {
        view.update_component(position, id, |p: &mut Position| {
            p.x = p.x.clamp(-ARENA, ARENA);
            p.y = p.y.clamp(-ARENA, ARENA);
        });
    })
    .requires(&[position])
    .writes(&[position])
    .ordered_by(&position_order, 1);

    let expiry = SystemDescriptor::new("expiry", move |view, id| {
        let left = view.update_component(lifetime, id, |life: &mut Lifetime| {
            life.frames = life.frames.saturating_sub(1);
            life.frames
        });
        if left == 0 {
            view.destroy_entity(id);
        }
    })
    .requires(&[lifetime])
    .writes(&[lifetime]);

    vec![movement, walls, expiry]
}

fn spawn(ecs: &Ecs, kinds: &Kinds, count: usize) -> EcsResult<()> {
    for i in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let angle = i as f32 * 0.618_034 * std::f32::consts::TAU;
        let p = Position::new(0.0, 0.0);
        let v = Velocity::new(angle.cos(), angle.sin());
        #[allow(clippy::cast_possible_truncation)]
        let life = Lifetime {
            frames: 60 + (i % 240) as u32,
        };
        ecs.add_entity(&[
            ComponentInit::of(kinds.position, &p),
            ComponentInit::of(kinds.velocity, &v),
            ComponentInit::of(kinds.lifetime, &life),
        ])?;
    }
    Ok(())
}

fn run(options: &Options) -> EcsResult<()> {
    let config = match &options.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    tracing::info!(
        "Engine config: {} workers, extension {}",
        config.worker_count(),
        config.list_extension
    );

    let mut ecs = Ecs::new(config)?;
    let kinds = Kinds {
        position: ecs.register_component::<Position>()?,
        velocity: ecs.register_component::<Velocity>()?,
        lifetime: ecs.register_component::<Lifetime>()?,
    };
    ecs.add_systems(systems(&kinds))?;
    spawn(&ecs, &kinds, options.entities)?;
    tracing::info!("Spawned {} particles", ecs.entity_count());

    let mut clock = FrameClock::new();
    let mut deleted = 0;
    for frame in 0..options.frames {
        clock.start();
        ecs.run_systems()?;
        ecs.copy_state()?;
        ecs.wait_copy()?;

        let stats = ecs.stats();
        deleted += stats.deleted_in_copy;
        if options.fps > 0.0 {
            clock.tick_framerate(options.fps);
        } else {
            clock.tick();
        }

        if frame % 60 == 0 {
            tracing::info!(
                "Frame {}: {} live, {} visits, {} expired",
                stats.frame,
                ecs.entity_count(),
                stats.entities_visited,
                stats.deleted_in_copy
            );
        }
        if ecs.entity_count() == 0 {
            tracing::info!("Every particle expired after {} frames", stats.frame);
            break;
        }
    }

    if let Some(average) = clock.average() {
        tracing::info!(
            "Average frame {:.3} ms over {} frames, {} particles expired",
            average * 1000.0,
            clock.iterations(),
            deleted
        );
    }
    ecs.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(options) = parse_args() else {
        return ExitCode::SUCCESS;
    };

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Frame demo failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
