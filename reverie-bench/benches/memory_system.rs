//! Reverie Benchmark Suite
//!
//! Hot paths of one persona tick:
//!   store_insert_event ................ one event with keywords and vector
//!   weighted_retrieval_top30_from_500 . one focal point, every strategy
//!   trigger_evaluation ................ importance and composite triggers
//!   state_snapshot_500 ................ get_state + from_state

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::{Duration, NaiveDate};
use reverie_core::config::{ScoringStrategyKind, TriggerConfig};
use reverie_core::embedding::StubEmbeddingProvider;
use reverie_core::memory::{MemoryStore, NewRecord};
use reverie_core::reflection::ReflectionCounters;
use reverie_core::retrieval::Retriever;
use reverie_core::retrieval::scoring::ScoringContext;
use reverie_core::types::{Embedding, SimTime, Triple};

const KEYWORDS: [&str; 8] = ["cafe", "party", "library", "park", "research", "piano", "garden", "market"];

fn t0() -> SimTime {
    NaiveDate::from_ymd_opt(2023, 2, 13)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn make_event(i: u32) -> NewRecord {
    let keyword = KEYWORDS[i as usize % KEYWORDS.len()];
    let text = format!("Klaus is doing thing {i} at the {keyword}");
    let angle = f32::from(u16::try_from(i).unwrap_or(u16::MAX)) / 50.0;
    NewRecord::new(
        t0() + Duration::minutes(i64::from(i)),
        Triple::new("Klaus Mueller", "is", keyword),
        text.clone(),
    )
    .keywords(["klaus mueller", keyword])
    .poignancy(u8::try_from(i % 10 + 1).unwrap_or(1))
    .embedding(text, Some(Embedding(vec![angle.sin(), angle.cos(), 0.5])))
}

fn populated_store(n: u32) -> MemoryStore {
    let mut store = MemoryStore::new();
    for i in 0..n {
        let _ = store.add_event(make_event(i));
    }
    store
}

fn bench_store_insert(c: &mut Criterion) {
    c.bench_function("store_insert_event", |b| {
        b.iter_batched(
            || populated_store(200),
            |mut store| {
                let _ = store.add_event(black_box(make_event(201)));
                store
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_weighted_retrieval(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighted_retrieval_top30_from_500");
    let embedder = StubEmbeddingProvider::new(3);
    let focal = vec!["What is Klaus working on?".to_string()];
    for kind in [
        ScoringStrategyKind::Linear,
        ScoringStrategyKind::Attention,
        ScoringStrategyKind::HybridRelevanceRecency,
    ] {
        let retriever = Retriever::new(kind.build(1.0), ScoringContext::default());
        group.bench_with_input(BenchmarkId::from_parameter(retriever.strategy_name()), &retriever, |b, r| {
            b.iter_batched(
                || populated_store(500),
                |mut store| {
                    let hits = r.retrieve_by_focal_points(&focal, &mut store, &embedder, t0() + Duration::days(1), 30);
                    black_box(hits);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_trigger_evaluation(c: &mut Criterion) {
    let store = populated_store(200);
    let mut counters = ReflectionCounters::new(150);
    for _ in 0..40 {
        counters.record_event(3);
    }
    let ctx = counters.context(&store, t0() + Duration::hours(5));
    let importance = TriggerConfig::ImportanceThreshold.build();
    let composite = TriggerConfig::Composite {
        triggers: vec![
            TriggerConfig::ImportanceThreshold,
            TriggerConfig::EventCount {
                event_threshold: 50,
                thought_threshold: 20,
            },
            TriggerConfig::Timed { interval_minutes: 180 },
        ],
        require_all: false,
    }
    .build();

    c.bench_function("trigger_evaluation_importance", |b| {
        b.iter(|| black_box(importance.check(black_box(&ctx))));
    });
    c.bench_function("trigger_evaluation_composite", |b| {
        b.iter(|| black_box(composite.check(black_box(&ctx))));
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let store = populated_store(500);
    c.bench_function("state_snapshot_500", |b| {
        b.iter(|| {
            let state = black_box(&store).get_state();
            black_box(MemoryStore::from_state(state).map(|s| s.len()))
        });
    });
}

criterion_group!(
    benches,
    bench_store_insert,
    bench_weighted_retrieval,
    bench_trigger_evaluation,
    bench_snapshot,
);
criterion_main!(benches);
