//! Integration adapter: the live system's view of one evolving category.
//!
//! The host feeds execution records in and reads a recommended configuration
//! out. The adapter decides when a transition is due and whether its result
//! is good enough to adopt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geneva_shared::{GenevaError, GenevaId, GenevaResult, PerformanceRecord, SanitizedRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::events::{EventBus, EvolutionEventData};
use crate::evolution::{
    Chromosome, CommunicationPattern, ConsensusMechanism, CoordinationStyle, EvolutionOutcome,
    TelemetryWindow,
};
use crate::monitor::{AdapterStatus, StatusSource};

/// Anything that can run a generation transition for a category.
#[async_trait]
pub trait Evolver: Send + Sync {
    async fn evolve(&self, category: &str, window: TelemetryWindow) -> GenevaResult<EvolutionOutcome>;
}

// ══════════════════════════════════════════════════════════════
// Configuration Record
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSource {
    /// No evolution has been adopted yet.
    Default,
    Evolved,
}

/// Recommended configuration the host applies to its agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub category: String,
    pub source: ConfigurationSource,
    pub chromosome_id: Option<GenevaId>,
    pub generation: u64,
    pub fitness: f64,
    pub roles: Vec<String>,
    pub coordination: CoordinationStyle,
    pub communication: CommunicationPattern,
    pub consensus: ConsensusMechanism,
    /// Scalar genes by name and role genes as `role.gene`.
    pub parameters: BTreeMap<String, f64>,
    pub experimental: bool,
    pub updated_at: DateTime<Utc>,
}

impl ConfigurationRecord {
    /// Static default served before any candidate has been adopted.
    #[must_use]
    pub fn default_for(category: &str) -> Self {
        let defaults = Chromosome::seed(category);
        Self {
            source: ConfigurationSource::Default,
            chromosome_id: None,
            ..Self::from_chromosome(&defaults)
        }
    }

    #[must_use]
    pub fn from_chromosome(c: &Chromosome) -> Self {
        Self {
            category: c.category.clone(),
            source: ConfigurationSource::Evolved,
            chromosome_id: Some(c.id),
            generation: c.generation,
            fitness: c.fitness,
            roles: c.roles.clone(),
            coordination: c.coordination,
            communication: c.communication,
            consensus: c.consensus,
            parameters: c.gene_map(),
            experimental: c.experimental,
            updated_at: Utc::now(),
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Adapter State
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct AdapterState {
    executions: u64,
    last_evolution_index: u64,
    buffer: VecDeque<SanitizedRecord>,
    current_best: Option<Chromosome>,
    /// Engine generation `current_best` was committed at.
    adopted_generation: u64,
    baseline_fitness: Option<f64>,
    evolutions: u64,
    adopted: u64,
    rejected: u64,
    substituted_fields: u64,
}

/// What a triggered transition led to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdapterDecision {
    Adopted {
        chromosome_id: GenevaId,
        improvement: f64,
        execution: u64,
    },
    Rejected {
        chromosome_id: GenevaId,
        improvement: f64,
    },
    /// The engine returned no new candidate (inactive, observed, rolled back
    /// or aborted).
    Unchanged { outcome: String },
}

pub struct IntegrationAdapter {
    category: String,
    config: AdapterConfig,
    evolver: Arc<dyn Evolver>,
    events: Arc<EventBus>,
    state: RwLock<AdapterState>,
}

impl IntegrationAdapter {
    pub fn new(
        category: &str,
        config: AdapterConfig,
        evolver: Arc<dyn Evolver>,
        events: Arc<EventBus>,
    ) -> GenevaResult<Self> {
        config.validate()?;
        let buffer = VecDeque::with_capacity(config.buffer_capacity);
        Ok(Self {
            category: category.to_string(),
            config,
            evolver,
            events,
            state: RwLock::new(AdapterState {
                executions: 0,
                last_evolution_index: 0,
                buffer,
                current_best: None,
                adopted_generation: 0,
                baseline_fitness: None,
                evolutions: 0,
                adopted: 0,
                rejected: 0,
                substituted_fields: 0,
            }),
        })
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Buffer one execution record and run a transition when one is due.
    ///
    /// Returns `None` when no transition was triggered; in that case the call
    /// never waits on the engine.
    pub async fn record(&self, record: PerformanceRecord) -> GenevaResult<Option<AdapterDecision>> {
        let (clean, substituted) = record.sanitize();
        if !substituted.is_empty() {
            let err = GenevaError::Telemetry(format!(
                "missing or malformed {}, neutral values substituted",
                substituted.join(", ")
            ));
            warn!(category = %self.category, "⚠️ {}", err);
        }

        let trigger = {
            let mut state = self.state.write().await;
            state.substituted_fields += substituted.len() as u64;
            state.buffer.push_back(clean);
            while state.buffer.len() > self.config.buffer_capacity {
                state.buffer.pop_front();
            }
            state.executions += 1;

            let due = state.buffer.len() >= self.config.min_executions
                && state.executions - state.last_evolution_index >= self.config.evolution_frequency;
            if due {
                state.last_evolution_index = state.executions;
                state.evolutions += 1;
                let skip = state.buffer.len().saturating_sub(self.config.evaluation_window);
                let recent: Vec<SanitizedRecord> = state.buffer.iter().skip(skip).cloned().collect();
                Some((state.executions, TelemetryWindow::from_records(&recent)))
            } else {
                None
            }
        };

        let Some((execution, window)) = trigger else {
            return Ok(None);
        };

        debug!(
            category = %self.category,
            execution = execution,
            samples = window.sample_count,
            "Evolution triggered by telemetry"
        );
        let outcome = self.evolver.evolve(&self.category, window.clone()).await?;
        Ok(Some(self.apply(outcome, &window, execution).await))
    }

    async fn apply(
        &self,
        outcome: EvolutionOutcome,
        window: &TelemetryWindow,
        execution: u64,
    ) -> AdapterDecision {
        let (Some(candidate), Some(generation)) = (outcome.candidate(), outcome.committed_generation())
        else {
            debug!(category = %self.category, outcome = outcome.label(), "No candidate to adopt");
            return AdapterDecision::Unchanged {
                outcome: outcome.label().to_string(),
            };
        };

        let improvement = candidate.fitness - window.quality;
        if improvement < -self.config.degradation_tolerance {
            warn!(
                category = %self.category,
                chromosome = %candidate.id,
                improvement = improvement,
                "⏪ Candidate rejected, keeping previous configuration"
            );
            self.state.write().await.rejected += 1;
            self.events
                .publish(EvolutionEventData::CandidateRejected {
                    category: self.category.clone(),
                    chromosome_id: candidate.id,
                    improvement,
                })
                .await;
            return AdapterDecision::Rejected {
                chromosome_id: candidate.id,
                improvement,
            };
        }

        {
            let mut state = self.state.write().await;
            // concurrent triggers can finish out of order; never go back
            if generation <= state.adopted_generation {
                debug!(
                    category = %self.category,
                    generation = generation,
                    adopted_generation = state.adopted_generation,
                    "Candidate superseded by a newer adoption"
                );
                return AdapterDecision::Unchanged {
                    outcome: "superseded".to_string(),
                };
            }
            state.current_best = Some(candidate.clone());
            state.adopted_generation = generation;
            state.baseline_fitness = Some(candidate.fitness);
            state.adopted += 1;
        }
        info!(
            category = %self.category,
            chromosome = %candidate.id,
            fitness = candidate.fitness,
            improvement = improvement,
            "✅ Evolved configuration adopted"
        );
        self.events
            .publish(EvolutionEventData::CandidateAdopted {
                category: self.category.clone(),
                chromosome_id: candidate.id,
                improvement,
                execution,
            })
            .await;
        AdapterDecision::Adopted {
            chromosome_id: candidate.id,
            improvement,
            execution,
        }
    }

    /// Configuration derived from the adopted chromosome, or the static
    /// default before anything was adopted.
    pub async fn current_configuration(&self) -> ConfigurationRecord {
        match &self.state.read().await.current_best {
            Some(best) => ConfigurationRecord::from_chromosome(best),
            None => ConfigurationRecord::default_for(&self.category),
        }
    }

    pub async fn current_best(&self) -> Option<Chromosome> {
        self.state.read().await.current_best.clone()
    }

    pub async fn status(&self) -> AdapterStatus {
        let state = self.state.read().await;
        AdapterStatus {
            category: self.category.clone(),
            executions: state.executions,
            last_evolution_index: state.last_evolution_index,
            buffered: state.buffer.len(),
            evolutions: state.evolutions,
            adopted: state.adopted,
            rejected: state.rejected,
            substituted_fields: state.substituted_fields,
            current_best: state.current_best.as_ref().map(|c| c.id),
            baseline_fitness: state.baseline_fitness,
        }
    }
}

#[async_trait]
impl StatusSource for IntegrationAdapter {
    async fn adapter_statuses(&self) -> Vec<AdapterStatus> {
        vec![self.status().await]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a committed candidate with a fixed fitness.
    struct FixedEvolver {
        fitness: f64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Evolver for FixedEvolver {
        async fn evolve(
            &self,
            category: &str,
            _window: TelemetryWindow,
        ) -> GenevaResult<EvolutionOutcome> {
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

    fn adapter(fitness: f64, config: AdapterConfig) -> (IntegrationAdapter, Arc<FixedEvolver>) {
        let evolver = Arc::new(FixedEvolver {
            fitness,
            calls: AtomicUsize::new(0),
        });
        let adapter = IntegrationAdapter::new(
            "routing",
            config,
            evolver.clone(),
            Arc::new(EventBus::new(16)),
        )
        .unwrap();
        (adapter, evolver)
    }

    fn quick() -> AdapterConfig {
        AdapterConfig {
            min_executions: 1,
            evolution_frequency: 1,
            ..AdapterConfig::default()
        }
    }

    fn record(q: f64) -> PerformanceRecord {
        PerformanceRecord::scores(q, q, q, q).with_outcome(true, 50.0, 0)
    }

    #[tokio::test]
    async fn test_default_configuration_before_evolution() {
        let (adapter, _) = adapter(0.9, AdapterConfig::default());
        let config = adapter.current_configuration().await;
        assert_eq!(config.source, ConfigurationSource::Default);
        assert!(config.chromosome_id.is_none());
        assert!(config.parameters.contains_key("risk_tolerance"));
    }

    #[tokio::test]
    async fn test_candidate_adopted_when_not_worse() {
        let (adapter, _) = adapter(0.75, quick());
        let decision = adapter.record(record(0.8)).await.unwrap();
        assert!(matches!(decision, Some(AdapterDecision::Adopted { .. })));
        let config = adapter.current_configuration().await;
        assert_eq!(config.source, ConfigurationSource::Evolved);
        assert!((config.fitness - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_candidate_rejected_when_much_worse() {
        let (adapter, _) = adapter(0.2, quick());
        let decision = adapter.record(record(0.9)).await.unwrap();
        assert!(matches!(decision, Some(AdapterDecision::Rejected { .. })));
        assert!(adapter.current_best().await.is_none());
        assert_eq!(adapter.status().await.rejected, 1);
    }

    #[tokio::test]
    async fn test_buffer_is_bounded() {
        let config = AdapterConfig {
            min_executions: 5,
            evolution_frequency: 1000,
            buffer_capacity: 5,
            evaluation_window: 5,
            ..AdapterConfig::default()
        };
        let (adapter, evolver) = adapter(0.5, config);
        for _ in 0..12 {
            adapter.record(record(0.5)).await.unwrap();
        }
        let status = adapter.status().await;
        assert_eq!(status.buffered, 5);
        assert_eq!(status.executions, 12);
        assert_eq!(evolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_record_counts_substitutions() {
        let (adapter, _) = adapter(0.5, AdapterConfig::default());
        let mut bad = record(0.5);
        bad.quality = Some(f64::NAN);
        bad.speed = None;
        adapter.record(bad).await.unwrap();
        assert_eq!(adapter.status().await.substituted_fields, 2);
    }

    fn committed(fitness: f64, generation: u64) -> EvolutionOutcome {
        let mut best = Chromosome::seed("routing");
        best.fitness = fitness;
        EvolutionOutcome::Committed {
            best: Box::new(best),
            generation,
            mean_fitness: fitness,
        }
    }

    #[tokio::test]
    async fn test_older_candidate_never_replaces_newer() {
        let (adapter, _) = adapter(0.8, quick());
        let (clean, _) = record(0.8).sanitize();
        let window = TelemetryWindow::from_record(&clean);

        let newer = committed(0.8, 5);
        let newer_id = newer.candidate().unwrap().id;
        assert!(matches!(
            adapter.apply(newer, &window, 6).await,
            AdapterDecision::Adopted { .. }
        ));

        let late = adapter.apply(committed(0.85, 4), &window, 5).await;
        assert_eq!(
            late,
            AdapterDecision::Unchanged {
                outcome: "superseded".into()
            }
        );
        assert_eq!(adapter.current_best().await.unwrap().id, newer_id);
        assert_eq!(adapter.status().await.adopted, 1);
    }
}
