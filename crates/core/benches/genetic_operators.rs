// Genetic Operator Benchmarks
// Hot path: every generation mutates and crosses over the survivors, then
// scores the whole population against one telemetry window.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geneva_core::config::EngineConfig;
use geneva_core::evolution::{
    crossover, evaluate, mutate, Chromosome, EvolutionEngine, FitnessWeights, GeneBounds,
    TelemetryWindow,
};
use geneva_core::EventBus;
use geneva_shared::PerformanceRecord;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn sample_chromosome(category: &str) -> Chromosome {
    Chromosome::seed(category)
        .with_role("planner", &[("depth", 0.6), ("breadth", 0.4)])
        .with_role("executor", &[("parallelism", 0.7)])
        .with_role("critic", &[("strictness", 0.5), ("recall", 0.3)])
}

fn sample_window() -> TelemetryWindow {
    let records: Vec<_> = (0..10)
        .map(|i| {
            let q = 0.5 + f64::from(i) * 0.03;
            PerformanceRecord::scores(q, 0.7, 0.6, 0.9)
                .with_outcome(i % 4 != 0, 150.0, u32::from(i % 3 == 0))
                .sanitize()
                .0
        })
        .collect();
    TelemetryWindow::from_records(&records)
}

fn mutation_benchmark(c: &mut Criterion) {
    let parent = sample_chromosome("bench");
    let bounds = GeneBounds::default();
    let mut rng = StdRng::seed_from_u64(42);

    let mut group = c.benchmark_group("mutate");
    for rate in &[0.15, 0.5, 1.0] {
        group.bench_with_input(BenchmarkId::from_parameter(rate), rate, |b, &rate| {
            b.iter(|| mutate(black_box(&parent), rate, &bounds, false, &mut rng));
        });
    }
    group.finish();
}

fn crossover_benchmark(c: &mut Criterion) {
    let a = sample_chromosome("bench");
    let b = sample_chromosome("bench").with_role("scout", &[("range", 0.8)]);
    let mut rng = StdRng::seed_from_u64(42);

    c.bench_function("crossover_cautious", |bench| {
        bench.iter(|| crossover(black_box(&a), black_box(&b), false, &mut rng));
    });
    c.bench_function("crossover_experimental", |bench| {
        bench.iter(|| crossover(black_box(&a), black_box(&b), true, &mut rng));
    });
}

fn fitness_benchmark(c: &mut Criterion) {
    let chromosome = sample_chromosome("bench");
    let window = sample_window();
    let weights = FitnessWeights::default();

    c.bench_function("evaluate_fitness", |b| {
        b.iter(|| evaluate(black_box(&chromosome), black_box(&window), &weights));
    });
}

fn generation_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("generation_transition");

    for size in &[8usize, 32, 128] {
        let engine = runtime.block_on(async {
            let config = EngineConfig {
                rng_seed: Some(7),
                ..EngineConfig::default()
            };
            let engine = EvolutionEngine::new(config, Arc::new(EventBus::new(1024))).unwrap();
            engine
                .initialize("bench", &sample_chromosome("bench"), *size)
                .unwrap();
            engine
        });
        let window = sample_window();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&runtime)
                .iter(|| async { engine.evolve("bench", window.clone()).await.unwrap() });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    mutation_benchmark,
    crossover_benchmark,
    fitness_benchmark,
    generation_benchmark
);
criterion_main!(benches);
