//! Integration tests for the telemetry-driven adapter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use geneva_core::adapter::{AdapterDecision, ConfigurationSource, Evolver, IntegrationAdapter};
use geneva_core::config::{AdapterConfig, EngineConfig};
use geneva_core::evolution::{Chromosome, EvolutionEngine, EvolutionOutcome, TelemetryWindow};
use geneva_core::{EventBus, EvolutionEventData, GenevaResult, PerformanceRecord};

/// Counts calls and hands back a committed seed with fixed fitness.
struct CountingEvolver {
    calls: AtomicUsize,
    fitness: f64,
}

impl CountingEvolver {
    fn new(fitness: f64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fitness,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evolver for CountingEvolver {
    async fn evolve(&self, category: &str, _window: TelemetryWindow) -> GenevaResult<EvolutionOutcome> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        let mut best = Chromosome::seed(category);
        best.fitness = self.fitness;
        Ok(EvolutionOutcome::Committed {
            best: Box::new(best),
            generation: n + 2,
            mean_fitness: self.fitness,
        })
    }
}

fn record(quality: f64) -> PerformanceRecord {
    PerformanceRecord::scores(quality, 0.7, 0.8, 0.9).with_outcome(true, 200.0, 0)
}

fn trigger_config(min_executions: usize, evolution_frequency: u64) -> AdapterConfig {
    AdapterConfig {
        min_executions,
        evolution_frequency,
        ..AdapterConfig::default()
    }
}

#[tokio::test]
async fn test_trigger_waits_for_minimum_and_frequency() {
    let evolver = CountingEvolver::new(0.8);
    let adapter = IntegrationAdapter::new(
        "routing",
        trigger_config(2, 3),
        evolver.clone(),
        Arc::new(EventBus::new(64)),
    )
    .unwrap();

    for _ in 0..2 {
        assert!(adapter.record(record(0.8)).await.unwrap().is_none());
    }
    assert_eq!(evolver.calls(), 0);

    let third = adapter.record(record(0.8)).await.unwrap();
    assert!(matches!(third, Some(AdapterDecision::Adopted { execution: 3, .. })));

    for _ in 0..2 {
        assert!(adapter.record(record(0.8)).await.unwrap().is_none());
    }
    assert_eq!(evolver.calls(), 1);

    adapter.record(record(0.8)).await.unwrap();
    assert_eq!(evolver.calls(), 2);
    assert_eq!(adapter.status().await.last_evolution_index, 6);
}

#[tokio::test]
async fn test_rejected_candidate_keeps_previous_best() {
    let events = Arc::new(EventBus::new(64));
    let mut rx = events.subscribe();
    let good = CountingEvolver::new(0.85);
    let adapter = IntegrationAdapter::new("routing", trigger_config(1, 1), good, events.clone()).unwrap();
    adapter.record(record(0.8)).await.unwrap();
    let adopted = adapter.current_best().await.unwrap();

    let poor = CountingEvolver::new(0.1);
    let second = IntegrationAdapter::new("routing", trigger_config(1, 1), poor, events).unwrap();
    assert!(matches!(
        second.record(record(0.9)).await.unwrap(),
        Some(AdapterDecision::Rejected { .. })
    ));
    assert_eq!(
        second.current_configuration().await.source,
        ConfigurationSource::Default
    );
    assert_eq!(adapter.current_best().await.unwrap().id, adopted.id);

    let mut saw_rejection = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event.data, EvolutionEventData::CandidateRejected { .. }) {
            saw_rejection = true;
        }
    }
    assert!(saw_rejection);
}

#[tokio::test]
async fn test_adapter_drives_real_engine() {
    let events = Arc::new(EventBus::new(256));
    let engine = Arc::new(
        EvolutionEngine::new(
            EngineConfig {
                rng_seed: Some(5),
                ..EngineConfig::default()
            },
            events.clone(),
        )
        .unwrap(),
    );
    engine
        .initialize("routing", &Chromosome::seed("routing"), 4)
        .unwrap();

    let adapter = IntegrationAdapter::new(
        "routing",
        AdapterConfig {
            min_executions: 3,
            evolution_frequency: 3,
            evaluation_window: 3,
            ..AdapterConfig::default()
        },
        engine.clone(),
        events,
    )
    .unwrap();

    for _ in 0..9 {
        adapter.record(record(0.6)).await.unwrap();
    }

    let status = adapter.status().await;
    assert_eq!(status.evolutions, 3);
    assert_eq!(engine.status("routing").unwrap().generation, 4);
    let config = adapter.current_configuration().await;
    if status.adopted > 0 {
        assert_eq!(config.source, ConfigurationSource::Evolved);
        assert!(config.generation >= 2);
    }
    engine.shutdown().await;
}

#[tokio::test]
async fn test_aborted_engine_outcome_is_unchanged() {
    let events = Arc::new(EventBus::new(64));
    let engine = Arc::new(EvolutionEngine::new(EngineConfig::default(), events.clone()).unwrap());
    engine
        .initialize("routing", &Chromosome::seed("routing"), 3)
        .unwrap();
    engine.set_baseline("routing", 0.9).await.unwrap();

    let adapter = IntegrationAdapter::new("routing", trigger_config(1, 1), engine.clone(), events).unwrap();
    let failing = PerformanceRecord::scores(0.0, 0.0, 0.0, 0.0).with_outcome(false, 9000.0, 10);
    let decision = adapter.record(failing).await.unwrap();

    assert!(matches!(decision, Some(AdapterDecision::Unchanged { .. })));
    assert!(adapter.current_best().await.is_none());
    engine.shutdown().await;
}
