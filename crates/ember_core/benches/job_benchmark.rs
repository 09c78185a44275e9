//! # Job Pool Benchmark
//!
//! Throughput of queue + drain for batches of tiny jobs, and the cost of
//! waiting on an idle channel.
//!
//! Run with: `cargo bench --package ember_core --bench job_benchmark`

#![allow(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_core::{EngineConfig, JobScheduler, FIRST_USER_CHANNEL};

fn bench_queue_and_drain(c: &mut Criterion) {
    let jobs = JobScheduler::new(&EngineConfig::default()).expect("pool");
    let counter = Arc::new(AtomicU64::new(0));
    let mut group = c.benchmark_group("queue_and_drain");

    for batch in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                jobs.reserve(batch);
                for _ in 0..batch {
                    let counter = Arc::clone(&counter);
                    jobs.queue(FIRST_USER_CHANNEL, move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                    .expect("queue");
                }
                jobs.wait_channel(FIRST_USER_CHANNEL).expect("wait");
            });
        });
    }

    group.finish();
    black_box(counter.load(Ordering::Relaxed));
}

fn bench_idle_wait(c: &mut Criterion) {
    let jobs = JobScheduler::new(&EngineConfig::default()).expect("pool");
    c.bench_function("wait_idle_channel", |b| {
        b.iter(|| jobs.wait_channel(black_box(FIRST_USER_CHANNEL)).expect("wait"));
    });
}

criterion_group!(benches, bench_queue_and_drain, bench_idle_wait);
criterion_main!(benches);
