use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use geneva_shared::{GenevaError, GenevaResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::chromosome::Chromosome;
use super::fitness::TelemetryWindow;
use super::mode::{ensure_mode_allowed, Acknowledgment, ActivationMode};
use super::operators::GeneBounds;
use super::population::Population;
use super::safety::SafetyBaseline;
use super::transition::{self, evaluate_members, TransitionContext, Verdict};
use super::types::{
    CategoryStatus, EvolutionOutcome, RollbackReason, SafetyViolationRecord,
};
use crate::adapter::Evolver;
use crate::config::{EngineConfig, STATUS_SUMMARY_DEPTH};
use crate::events::{EventBus, EvolutionEventData};
use crate::monitor::StatusSource;

/// Rollback records carried in each published status.
const STATUS_ROLLBACK_DEPTH: usize = 5;

// ══════════════════════════════════════════════════════════════
// Worker Commands
// ══════════════════════════════════════════════════════════════

enum Command {
    Evolve {
        window: TelemetryWindow,
        reply: oneshot::Sender<EvolutionOutcome>,
    },
    /// Scheduled transition against the most recent telemetry window.
    Tick,
    SetMode {
        mode: ActivationMode,
        reply: oneshot::Sender<ActivationMode>,
    },
    SetBaseline {
        value: f64,
        reply: oneshot::Sender<()>,
    },
    Members {
        reply: oneshot::Sender<Vec<Chromosome>>,
    },
    Shutdown,
}

struct CategoryHandle {
    tx: mpsc::Sender<Command>,
    status: watch::Receiver<CategoryStatus>,
    task: JoinHandle<()>,
}

// ══════════════════════════════════════════════════════════════
// Category Worker
// ══════════════════════════════════════════════════════════════

/// Owns one category's population. All commits and rollbacks happen here.
struct CategoryWorker {
    population: Population,
    baseline: SafetyBaseline,
    mode: ActivationMode,
    config: Arc<EngineConfig>,
    bounds: GeneBounds,
    rng: StdRng,
    last_window: Option<TelemetryWindow>,
}

impl CategoryWorker {
    fn category(&self) -> &str {
        self.population.category()
    }

    fn best(&self) -> Option<Box<Chromosome>> {
        self.population.best().map(|c| Box::new(Chromosome::clone(c)))
    }

    fn status(&self) -> CategoryStatus {
        let pop = &self.population;
        let summaries = pop.summaries();
        let skip = summaries.len().saturating_sub(STATUS_SUMMARY_DEPTH);
        let rollbacks = pop.rollbacks();
        let rollback_skip = rollbacks.len().saturating_sub(STATUS_ROLLBACK_DEPTH);
        let best = pop.best();
        let best_evaluation = best.and_then(|b| {
            pop.fitness_history()
                .iter()
                .rev()
                .find(|e| e.chromosome_id == b.id)
                .cloned()
        });
        CategoryStatus {
            category: pop.category().to_string(),
            mode: self.mode,
            active: pop.is_active(),
            generation: pop.generation(),
            population_size: pop.size(),
            best: best.map(|c| Chromosome::clone(c)),
            best_fitness: best.map_or(0.0, |c| c.fitness),
            best_evaluation,
            mean_fitness: pop.mean_fitness(),
            mean_risk: pop.mean_risk(),
            baseline: self.baseline.baseline(),
            rollback_count: pop.rollback_count(),
            breakthrough_count: pop.breakthroughs().len(),
            pattern_count: pop.patterns().len(),
            recent_generations: summaries.iter().skip(skip).cloned().collect(),
            recent_rollbacks: rollbacks.iter().skip(rollback_skip).cloned().collect(),
            violation_times: self.baseline.violations().iter().map(|v| v.at).collect(),
            last_evolved_at: pop.last_evolved_at(),
        }
    }

    fn set_mode(&mut self, mode: ActivationMode) -> (ActivationMode, Vec<EvolutionEventData>) {
        let previous = self.mode;
        self.mode = mode;
        self.population.set_active(mode != ActivationMode::Disabled);
        if previous == mode {
            return (previous, Vec::new());
        }
        info!(category = %self.category(), from = %previous, to = %mode, "🔀 Evolution mode changed");
        let event = EvolutionEventData::ModeChanged {
            category: self.category().to_string(),
            from: previous,
            to: mode,
        };
        (previous, vec![event])
    }

    /// One generation transition, applied atomically to the owned population.
    fn evolve(&mut self, window: TelemetryWindow) -> (EvolutionOutcome, Vec<EvolutionEventData>) {
        let mut events = Vec::new();

        if self.mode == ActivationMode::Disabled || !self.population.is_active() {
            debug!(category = %self.category(), mode = %self.mode, "Evolution skipped, category inactive");
            return (EvolutionOutcome::Inactive { mode: self.mode }, events);
        }

        self.last_window = Some(window.clone());

        if !self.mode.runs_operators() {
            let (_, evaluations) = evaluate_members(self.population.members(), &window, &self.config);
            self.population.record_evaluations(evaluations);
            let outcome = match self.best() {
                Some(best) => EvolutionOutcome::Observed { best },
                None => EvolutionOutcome::Inactive { mode: self.mode },
            };
            return (outcome, events);
        }

        let ctx = TransitionContext {
            mode: self.mode,
            config: &self.config,
            baseline: &self.baseline,
            bounds: self.bounds,
        };
        let t = transition::run(&self.population, &window, &ctx, &mut self.rng);
        let category = self.population.category().to_string();
        self.population.record_evaluations(t.evaluations);

        let reason = match t.verdict {
            Verdict::Commit(proposal) => {
                self.population.record_breakthroughs(t.breakthroughs.iter().cloned());
                self.population.record_patterns(t.patterns.iter().cloned());
                let summary = self.population.commit(
                    proposal.members,
                    proposal.created,
                    t.evaluated_mean,
                );
                if self.baseline.raise(t.evaluated_mean) {
                    debug!(category = %category, baseline = t.evaluated_mean, "Baseline raised");
                }

                info!(
                    category = %category,
                    generation = summary.generation,
                    mean_fitness = summary.mean_fitness,
                    best_fitness = summary.best_fitness,
                    offspring = proposal.offspring,
                    mutated = proposal.mutated,
                    "📈 New evolution generation"
                );
                events.push(EvolutionEventData::GenerationCommitted {
                    category: category.clone(),
                    generation: summary.generation,
                    mean_fitness: summary.mean_fitness,
                    best_fitness: summary.best_fitness,
                    offspring: proposal.offspring,
                });
                for b in &t.breakthroughs {
                    info!(category = %category, chromosome = %b.chromosome_id, fitness = b.fitness, "🚀 Breakthrough detected");
                    events.push(EvolutionEventData::Breakthrough {
                        category: category.clone(),
                        chromosome_id: b.chromosome_id,
                        fitness: b.fitness,
                        experimental: b.experimental,
                    });
                }
                if !t.patterns.is_empty() {
                    events.push(EvolutionEventData::PatternDetected {
                        category: category.clone(),
                        generation: summary.generation,
                        genes: t.patterns.iter().map(|p| p.gene.clone()).collect(),
                    });
                }

                let outcome = match self.best() {
                    Some(best) => EvolutionOutcome::Committed {
                        best,
                        generation: summary.generation,
                        mean_fitness: t.evaluated_mean,
                    },
                    None => EvolutionOutcome::Inactive { mode: self.mode },
                };
                return (outcome, events);
            }
            Verdict::Degraded {
                baseline,
                observed,
                tolerance,
            } => {
                let violation = GenevaError::SafetyViolation {
                    category: category.clone(),
                    baseline,
                    observed,
                    threshold: tolerance,
                };
                warn!(category = %category, "🛡️ {}", violation);
                self.baseline.record_violation(SafetyViolationRecord {
                    category: category.clone(),
                    baseline,
                    observed,
                    threshold: tolerance,
                    generation: self.population.generation(),
                    at: chrono::Utc::now(),
                });
                events.push(EvolutionEventData::SafetyViolation {
                    category: category.clone(),
                    baseline,
                    observed,
                    threshold: tolerance,
                });
                RollbackReason::Degradation { baseline, observed }
            }
            Verdict::Invalid(msg) => {
                warn!(category = %category, reason = %msg, "🚫 Proposed population failed validation");
                events.push(EvolutionEventData::ValidationFailed {
                    category: category.clone(),
                    reason: msg.clone(),
                });
                RollbackReason::Validation(msg)
            }
        };

        let outcome = match self.population.rollback(reason.clone()) {
            Some(record) => {
                warn!(
                    category = %category,
                    generation = record.generation,
                    restored = record.restored_generation,
                    rollbacks = record.rollback_count,
                    "⏪ Rolled back to previous snapshot"
                );
                events.push(EvolutionEventData::RolledBack {
                    category: category.clone(),
                    generation: record.generation,
                    restored_generation: record.restored_generation,
                    reason: reason.to_string(),
                });
                match self.best() {
                    Some(best) => EvolutionOutcome::RolledBack { best, reason },
                    None => EvolutionOutcome::Aborted { reason },
                }
            }
            None => {
                warn!(category = %category, "No snapshot available, transition aborted without changes");
                EvolutionOutcome::Aborted { reason }
            }
        };
        (outcome, events)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Command>,
        status_tx: watch::Sender<CategoryStatus>,
        events: Arc<EventBus>,
    ) {
        while let Some(cmd) = rx.recv().await {
            let (emitted, reply) = match cmd {
                Command::Evolve { window, reply } => {
                    let (outcome, emitted) = self.evolve(window);
                    (emitted, Some(Reply::Outcome(reply, outcome)))
                }
                Command::Tick => match self.last_window.clone() {
                    Some(window) => (self.evolve(window).1, None),
                    None => {
                        debug!(category = %self.category(), "Scheduled tick without telemetry, skipping");
                        (Vec::new(), None)
                    }
                },
                Command::SetMode { mode, reply } => {
                    let (previous, emitted) = self.set_mode(mode);
                    (emitted, Some(Reply::Mode(reply, previous)))
                }
                Command::SetBaseline { value, reply } => {
                    self.baseline.set(value);
                    info!(category = %self.category(), baseline = value, "Baseline restored");
                    (Vec::new(), Some(Reply::Done(reply)))
                }
                Command::Members { reply } => {
                    let members = self
                        .population
                        .members()
                        .iter()
                        .map(|c| Chromosome::clone(c))
                        .collect();
                    (Vec::new(), Some(Reply::Members(reply, members)))
                }
                Command::Shutdown => break,
            };

            // Status and events go out before the reply so a caller that
            // awaited the command observes its effects.
            status_tx.send_replace(self.status());
            for data in emitted {
                events.publish(data).await;
            }
            if let Some(reply) = reply {
                reply.send();
            }
        }
        info!(category = %self.category(), "Category worker stopped");
    }
}

enum Reply {
    Outcome(oneshot::Sender<EvolutionOutcome>, EvolutionOutcome),
    Mode(oneshot::Sender<ActivationMode>, ActivationMode),
    Done(oneshot::Sender<()>),
    Members(oneshot::Sender<Vec<Chromosome>>, Vec<Chromosome>),
}

impl Reply {
    fn send(self) {
        // a dropped receiver means the caller gave up; nothing to do
        let delivered = match self {
            Self::Outcome(tx, v) => tx.send(v).is_ok(),
            Self::Mode(tx, v) => tx.send(v).is_ok(),
            Self::Done(tx) => tx.send(()).is_ok(),
            Self::Members(tx, v) => tx.send(v).is_ok(),
        };
        if !delivered {
            debug!("Command reply dropped by caller");
        }
    }
}

fn current_status(handle: &CategoryHandle) -> CategoryStatus {
    handle.status.borrow().clone()
}

/// Per-category RNG stream. With a fixed seed, each category still gets its
/// own reproducible sequence.
fn category_rng(seed: Option<u64>, category: &str) -> StdRng {
    match seed {
        Some(seed) => {
            let mixed = category
                .bytes()
                .fold(seed ^ 0xcbf2_9ce4_8422_2325, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            StdRng::seed_from_u64(mixed)
        }
        None => StdRng::from_entropy(),
    }
}

// ══════════════════════════════════════════════════════════════
// Evolution Engine
// ══════════════════════════════════════════════════════════════

/// Routes commands to one worker task per category.
///
/// Operations on different categories never contend; operations on the same
/// category are serialized by its mailbox.
pub struct EvolutionEngine {
    config: Arc<EngineConfig>,
    workers: DashMap<String, CategoryHandle>,
    acknowledgment: RwLock<Acknowledgment>,
    events: Arc<EventBus>,
}

impl EvolutionEngine {
    pub fn new(config: EngineConfig, events: Arc<EventBus>) -> GenevaResult<Self> {
        config.validate()?;
        let acknowledgment = config.acknowledgment();
        Ok(Self {
            config: Arc::new(config),
            workers: DashMap::new(),
            acknowledgment: RwLock::new(acknowledgment),
            events,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn contains(&self, category: &str) -> bool {
        self.workers.contains_key(category)
    }

    /// Create a category's population from `seed` and start its worker.
    ///
    /// Returns `Ok(false)` without side effects when the default mode is
    /// Disabled or the category already exists.
    pub fn initialize(&self, category: &str, seed: &Chromosome, size: usize) -> GenevaResult<bool> {
        if category.trim().is_empty() {
            return Err(GenevaError::Validation("category name must not be empty".into()));
        }
        if size == 0 {
            return Err(GenevaError::Validation(format!(
                "population size for '{}' must be > 0",
                category
            )));
        }
        let mode = self.config.default_mode;
        if mode == ActivationMode::Disabled {
            info!(category = %category, "Evolution disabled, population not created");
            return Ok(false);
        }

        match self.workers.entry(category.to_string()) {
            Entry::Occupied(_) => {
                warn!(category = %category, "Category already initialized");
                Ok(false)
            }
            Entry::Vacant(slot) => {
                let mut rng = category_rng(self.config.rng_seed, category);
                let population = Population::seeded(
                    category,
                    seed,
                    size,
                    self.config.rollback_window,
                    self.config.mutation_rate,
                    &mut rng,
                );
                let worker = CategoryWorker {
                    population,
                    baseline: SafetyBaseline::new(self.config.degradation_threshold),
                    mode,
                    config: self.config.clone(),
                    bounds: GeneBounds::default(),
                    rng,
                    last_window: None,
                };
                let (status_tx, status_rx) = watch::channel(worker.status());
                let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);
                let task = tokio::spawn(worker.run(rx, status_tx, self.events.clone()));
                slot.insert(CategoryHandle {
                    tx,
                    status: status_rx,
                    task,
                });
                info!(category = %category, size = size, mode = %mode, "🌱 Population initialized");
                Ok(true)
            }
        }
    }

    fn sender(&self, category: &str) -> GenevaResult<mpsc::Sender<Command>> {
        self.workers
            .get(category)
            .map(|h| h.tx.clone())
            .ok_or_else(|| GenevaError::UnknownCategory(category.to_string()))
    }

    async fn ask<T>(
        &self,
        category: &str,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> GenevaResult<T> {
        let tx = self.sender(category)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let stopped = || GenevaError::Shutdown(category.to_string());
        tx.send(make(reply_tx)).await.map_err(|_| stopped())?;
        reply_rx.await.map_err(|_| stopped())
    }

    /// Run one generation transition for `category` against `window`.
    pub async fn evolve(
        &self,
        category: &str,
        window: TelemetryWindow,
    ) -> GenevaResult<EvolutionOutcome> {
        self.ask(category, |reply| Command::Evolve { window, reply }).await
    }

    /// Change a category's mode. Experimental modes need the acknowledgment.
    ///
    /// The acknowledgment stays read-locked until the worker has applied the
    /// mode, so a concurrent revocation either sees the new mode and
    /// downgrades it or refuses the request.
    pub async fn set_mode(&self, category: &str, mode: ActivationMode) -> GenevaResult<ActivationMode> {
        let ack = self.acknowledgment.read().await;
        ensure_mode_allowed(mode, &ack)?;
        let previous = self.ask(category, |reply| Command::SetMode { mode, reply }).await;
        drop(ack);
        previous
    }

    pub async fn acknowledgment(&self) -> Acknowledgment {
        *self.acknowledgment.read().await
    }

    /// Grant or revoke the experimental acknowledgment. Revoking moves every
    /// category in an experimental mode back to Cautious; the downgraded
    /// categories are returned.
    pub async fn acknowledge_experimental(&self, granted: bool) -> GenevaResult<Vec<String>> {
        // held until every downgrade is applied
        let mut ack = self.acknowledgment.write().await;
        *ack = Acknowledgment::from_flag(granted);
        if granted {
            warn!("⚠️ Experimental evolution modes acknowledged");
            return Ok(Vec::new());
        }

        let mut downgraded = Vec::new();
        for status in self.statuses() {
            if status.mode.requires_acknowledgment() {
                self.ask(&status.category, |reply| Command::SetMode {
                    mode: ActivationMode::Cautious,
                    reply,
                })
                .await?;
                downgraded.push(status.category);
            }
        }
        if !downgraded.is_empty() {
            warn!(categories = ?downgraded, "Acknowledgment revoked, experimental categories downgraded to cautious");
        }
        Ok(downgraded)
    }

    /// Re-seed the degradation baseline, e.g. after restoring persisted state.
    pub async fn set_baseline(&self, category: &str, value: f64) -> GenevaResult<()> {
        if !value.is_finite() {
            return Err(GenevaError::Validation(format!(
                "baseline for '{}' must be finite",
                category
            )));
        }
        self.ask(category, |reply| Command::SetBaseline { value, reply }).await
    }

    /// Exact copy of the committed members, in population order.
    pub async fn members(&self, category: &str) -> GenevaResult<Vec<Chromosome>> {
        self.ask(category, |reply| Command::Members { reply }).await
    }

    /// Latest published status. May trail an in-flight command.
    pub fn status(&self, category: &str) -> GenevaResult<CategoryStatus> {
        self.workers
            .get(category)
            .map(|h| current_status(h.value()))
            .ok_or_else(|| GenevaError::UnknownCategory(category.to_string()))
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<CategoryStatus> {
        let mut all: Vec<CategoryStatus> = self
            .workers
            .iter()
            .map(|h| current_status(h.value()))
            .collect();
        all.sort_by(|a, b| a.category.cmp(&b.category));
        all
    }

    /// Queue a scheduled transition on every category. Full mailboxes are
    /// skipped so the scheduler never waits on a busy worker.
    pub fn tick_all(&self) {
        for handle in self.workers.iter() {
            if let Err(e) = handle.tx.try_send(Command::Tick) {
                debug!(category = %handle.key(), "Scheduled tick skipped: {}", e);
            }
        }
    }

    /// Spawn the periodic background transition.
    pub fn spawn_scheduler(self: Arc<Self>, shutdown: Arc<Notify>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.evolution_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            info!("Evolution scheduler started (interval: {}s)", period.as_secs());
            loop {
                tokio::select! {
                    () = shutdown.notified() => {
                        info!("Evolution scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => self.tick_all(),
                }
            }
        })
    }

    /// Stop every worker, letting an in-flight command finish first.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, mpsc::Sender<Command>)> = self
            .workers
            .iter()
            .map(|h| (h.key().clone(), h.tx.clone()))
            .collect();
        for (category, tx) in handles {
            if tx.send(Command::Shutdown).await.is_err() {
                debug!(category = %category, "Worker already stopped");
            }
        }
        let tasks: Vec<JoinHandle<()>> = {
            let keys = self.categories();
            keys.into_iter()
                .filter_map(|k| self.workers.remove(&k).map(|(_, h)| h.task))
                .collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!("Category worker ended abnormally: {}", e);
            }
        }
    }
}

#[async_trait]
impl Evolver for EvolutionEngine {
    async fn evolve(&self, category: &str, window: TelemetryWindow) -> GenevaResult<EvolutionOutcome> {
        EvolutionEngine::evolve(self, category, window).await
    }
}

#[async_trait]
impl StatusSource for EvolutionEngine {
    async fn category_statuses(&self) -> Vec<CategoryStatus> {
        self.statuses()
    }
}
