//! # ECS Frame Benchmark
//!
//! Measures the frame pipeline end to end:
//! - Entity creation with growth by extension
//! - One full frame (systems + state copy) over many entities
//! - The bare current -> previous copy with its deletion sweep
//!
//! Run with: `cargo bench --package ember_core --bench ecs_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_core::ecs::WorldState;
use ember_core::{ComponentInit, Ecs, EngineConfig, Position, SystemDescriptor, Velocity};

/// Entity counts per benchmark group.
const COUNTS: [usize; 3] = [1_000, 10_000, 100_000];

fn populated(count: usize) -> Ecs {
    let mut ecs = Ecs::new(EngineConfig {
        list_extension: 1024,
        ..EngineConfig::default()
    })
    .expect("ecs");
    let pos = ecs.register_component::<Position>().expect("position");
    let vel = ecs.register_component::<Velocity>().expect("velocity");

    let movement = SystemDescriptor::new("movement", move |view, id| {
        let v: Velocity = view.previous(vel, id);
        view.update_component(pos, id, |p: &mut Position| {
            p.x += v.x;
            p.y += v.y;
        });
    })
    .requires(&[pos, vel])
    .writes(&[pos]);
    ecs.add_systems(vec![movement]).expect("systems");

    for i in 0..count {
        #[allow(clippy::cast_precision_loss)]
        let f = i as f32;
        let p = Position::new(f, f);
        let v = Velocity::new(0.1, 0.2);
        ecs.add_entity(&[ComponentInit::of(pos, &p), ComponentInit::of(vel, &v)])
            .expect("entity");
    }
    ecs
}

/// Benchmark: Add entities one at a time.
fn bench_add_entities(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_entities");

    for count in COUNTS {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut world = WorldState::new(5, 5);
                let pos = world.register::<Position>().expect("kind");
                let p = Position::default();
                for _ in 0..count {
                    black_box(world.add_entity(&[ComponentInit::of(pos, &p)]).expect("entity"));
                }
                world.entities().len()
            });
        });
    }

    group.finish();
}

/// Benchmark: Bulk copy of current into previous.
fn bench_copy_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_state");

    for count in COUNTS {
        let mut world = WorldState::new(count, 1024);
        let pos = world.register::<Position>().expect("position");
        let vel = world.register::<Velocity>().expect("velocity");
        for _ in 0..count {
            world
                .add_entity(&[
                    ComponentInit::of(pos, &Position::default()),
                    ComponentInit::of(vel, &Velocity::default()),
                ])
                .expect("entity");
        }
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(world.copy_state()));
        });
    }

    group.finish();
}

/// Benchmark: One full frame.
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");

    for count in COUNTS {
        let ecs = populated(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(ecs.step().expect("frame")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add_entities, bench_frame, bench_copy_state);
criterion_main!(benches);
