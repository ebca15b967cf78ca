// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Criterion benchmark suite for the spell engine.
//!
//! Benchmarks cover the hot paths of trigger delivery:
//!
//! - Key prefix classification and write checks
//! - Trigger configuration validation
//! - Mailbox history queries
//! - Timer heap pops with many armed spells
//! - Block routing and delivery through the registry
//!
//! Run with: `cargo bench --bench spellbook_benchmark`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use spellbook_core::{
    config::EngineConfig,
    mailbox::TriggerMailbox,
    permission::{check_write, KeyScope, Role},
    registry::SpellRegistry,
    runner::NoopRunner,
    scheduler::Scheduler,
    trigger::{ClockConfig, TriggerConfig, TriggerConfigInput},
    types::{SpellId, TimerTrigger, TriggerPayload},
};

const NOW_SEC: u64 = 1_700_000_000;

// ---------------------------------------------------------------------------
// Permission benchmark
// ---------------------------------------------------------------------------

fn permission_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("permission");
    let keys = ["counter", "w_state", "h_peer", "hw_shared", "wh_not_a_prefix"];

    group.bench_function("classify_keys", |bencher| {
        bencher.iter(|| {
            for key in &keys {
                black_box(KeyScope::classify(black_box(key)));
            }
        });
    });

    group.bench_function("check_write_as_worker", |bencher| {
        bencher.iter(|| {
            for key in &keys {
                let _ = black_box(check_write(Some(Role::Worker), black_box(key)));
            }
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Validation benchmark
// ---------------------------------------------------------------------------

fn validation_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("validation");
    let valid = TriggerConfigInput::periodic(NOW_SEC as i64, 60)
        .with_end(NOW_SEC as i64 + 3_600)
        .on_connect();
    let rejected = TriggerConfigInput::periodic(NOW_SEC as i64, 60).with_end(NOW_SEC as i64 - 1);

    group.bench_function("accept", |bencher| {
        bencher.iter(|| black_box(TriggerConfig::validate(black_box(&valid), NOW_SEC)));
    });
    group.bench_function("reject", |bencher| {
        bencher.iter(|| black_box(TriggerConfig::validate(black_box(&rejected), NOW_SEC)));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Mailbox benchmark
// ---------------------------------------------------------------------------

fn mailbox_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("mailbox");

    let mut mailbox = TriggerMailbox::new();
    for n in 0..1_000_u64 {
        let payload = TriggerPayload::Timer(TimerTrigger { timestamp: NOW_SEC + n });
        mailbox.append(payload, NOW_SEC * 1_000 + n * 1_000);
    }

    group.bench_function("all_since_full_history", |bencher| {
        bencher.iter(|| black_box(mailbox.all_since(black_box(0))));
    });
    group.bench_function("all_since_last_ten", |bencher| {
        let since = NOW_SEC * 1_000 + 990 * 1_000;
        bencher.iter(|| black_box(mailbox.all_since(black_box(since))));
    });
    group.bench_function("latest", |bencher| {
        bencher.iter(|| black_box(mailbox.latest()));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Scheduler benchmark
// ---------------------------------------------------------------------------

/// Pop every due timer out of a heap holding `size` periodic spells.
fn scheduler_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("scheduler_pop_due");

    for size in [100_usize, 1_000, 10_000] {
        let clock = ClockConfig {
            start_sec: NOW_SEC,
            end_sec: 0,
            period_sec: 5,
        };
        let ids: Vec<SpellId> = (0..size).map(|n| SpellId::new(format!("spell-{n:05}"))).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, _| {
            bencher.iter_batched(
                || {
                    let mut scheduler = Scheduler::new();
                    for id in &ids {
                        scheduler.arm(id, &clock, NOW_SEC);
                    }
                    scheduler
                },
                |mut scheduler| black_box(scheduler.pop_due(NOW_SEC)),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Registry dispatch benchmark
// ---------------------------------------------------------------------------

fn dispatch_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("dispatch_block");

    for size in [10_usize, 100] {
        let registry = SpellRegistry::in_memory(EngineConfig::default(), Arc::new(NoopRunner));
        for _ in 0..size {
            registry
                .install("worker", "(null)", &TriggerConfigInput::blocks(1, 0), &[])
                .expect("install");
        }

        let mut height = 0_u64;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, _| {
            bencher.iter(|| {
                height += 1;
                black_box(registry.dispatch_block(black_box(height)))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    permission_benchmark,
    validation_benchmark,
    mailbox_benchmark,
    scheduler_benchmark,
    dispatch_benchmark,
);
criterion_main!(benches);
