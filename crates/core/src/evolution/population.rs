use chrono::{DateTime, Utc};
use geneva_shared::GenevaId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::chromosome::Chromosome;
use super::fitness::FitnessEvaluation;
use super::operators::{mutate, GeneBounds};
use super::safety::mean_risk;
use super::types::{
    BreakthroughEvent, ConvergencePattern, GenerationSummary, RollbackReason, RollbackRecord,
};

/// Maximum entries kept in the fitness history to prevent unbounded growth.
const MAX_FITNESS_HISTORY_ENTRIES: usize = 10_000;

/// Maximum generation summaries retained.
const MAX_SUMMARY_ENTRIES: usize = 1_000;

/// Maximum entries kept in the rollback history.
const MAX_ROLLBACK_HISTORY_ENTRIES: usize = 100;

/// Maximum breakthrough and pattern entries retained per category.
const MAX_DISCOVERY_ENTRIES: usize = 1_000;

/// Pre-transition copy of the committed members.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub members: Vec<Arc<Chromosome>>,
    pub taken_at: DateTime<Utc>,
}

/// Population state for one category. Owned by exactly one worker.
#[derive(Debug)]
pub struct Population {
    category: String,
    members: Vec<Arc<Chromosome>>,
    generation: u64,
    active: bool,
    snapshots: VecDeque<Snapshot>,
    rollback_window: usize,
    rollback_count: u32,
    lineage: HashSet<GenevaId>,
    fitness_history: VecDeque<FitnessEvaluation>,
    summaries: VecDeque<GenerationSummary>,
    rollbacks: VecDeque<RollbackRecord>,
    breakthroughs: VecDeque<BreakthroughEvent>,
    patterns: VecDeque<ConvergencePattern>,
    last_evolved_at: Option<DateTime<Utc>>,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}

impl Population {
    /// Build a population of `size` from a host-supplied seed.
    ///
    /// The seed is re-homed into `category` and kept as the first member; the
    /// rest are mutated variants of it so the first generation has spread.
    pub fn seeded<R: Rng + ?Sized>(
        category: &str,
        seed: &Chromosome,
        size: usize,
        rollback_window: usize,
        mutation_rate: f64,
        rng: &mut R,
    ) -> Self {
        let bounds = GeneBounds::default();
        let mut base = seed.rehome(category, 0);
        // The host may hand in an out-of-range seed; clamp rather than refuse.
        bounds.clamp_chromosome(&mut base);
        let size = size.max(1);
        let variant_rate = mutation_rate.max(0.5);

        let mut members = Vec::with_capacity(size);
        members.push(Arc::new(base.clone()));
        while members.len() < size {
            members.push(Arc::new(mutate(&base, variant_rate, &bounds, false, rng)));
        }

        let lineage = members.iter().map(|c| c.id).collect();
        Self {
            category: category.to_string(),
            members,
            generation: 1,
            active: true,
            snapshots: VecDeque::with_capacity(rollback_window),
            rollback_window: rollback_window.max(1),
            rollback_count: 0,
            lineage,
            fitness_history: VecDeque::new(),
            summaries: VecDeque::new(),
            rollbacks: VecDeque::new(),
            breakthroughs: VecDeque::new(),
            patterns: VecDeque::new(),
            last_evolved_at: None,
        }
    }

    // ── Accessors ──

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn members(&self) -> &[Arc<Chromosome>] {
        &self.members
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    #[must_use]
    pub fn lineage(&self) -> &HashSet<GenevaId> {
        &self.lineage
    }

    #[must_use]
    pub fn rollback_count(&self) -> u32 {
        self.rollback_count
    }

    #[must_use]
    pub fn snapshots(&self) -> &VecDeque<Snapshot> {
        &self.snapshots
    }

    #[must_use]
    pub fn fitness_history(&self) -> &VecDeque<FitnessEvaluation> {
        &self.fitness_history
    }

    #[must_use]
    pub fn summaries(&self) -> &VecDeque<GenerationSummary> {
        &self.summaries
    }

    #[must_use]
    pub fn rollbacks(&self) -> &VecDeque<RollbackRecord> {
        &self.rollbacks
    }

    #[must_use]
    pub fn breakthroughs(&self) -> &VecDeque<BreakthroughEvent> {
        &self.breakthroughs
    }

    #[must_use]
    pub fn patterns(&self) -> &VecDeque<ConvergencePattern> {
        &self.patterns
    }

    #[must_use]
    pub fn last_evolved_at(&self) -> Option<DateTime<Utc>> {
        self.last_evolved_at
    }

    /// Highest-fitness member; ties resolve to the earliest.
    #[must_use]
    pub fn best(&self) -> Option<&Arc<Chromosome>> {
        self.members.iter().reduce(|best, c| {
            if c.fitness > best.fitness {
                c
            } else {
                best
            }
        })
    }

    #[must_use]
    pub fn mean_fitness(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(|c| c.fitness).sum::<f64>() / self.members.len() as f64
    }

    #[must_use]
    pub fn mean_risk(&self) -> f64 {
        mean_risk(&self.members)
    }

    // ── Mutation (worker only) ──

    /// Append evaluations to the capped fitness history.
    pub fn record_evaluations(&mut self, evaluations: impl IntoIterator<Item = FitnessEvaluation>) {
        for eval in evaluations {
            push_bounded(&mut self.fitness_history, eval, MAX_FITNESS_HISTORY_ENTRIES);
        }
    }

    /// Replace the members with `next`, snapshotting the current ones first.
    /// The generation counter advances by exactly one.
    pub fn commit(
        &mut self,
        next: Vec<Arc<Chromosome>>,
        created: impl IntoIterator<Item = GenevaId>,
        summary_mean: f64,
    ) -> GenerationSummary {
        let previous = std::mem::replace(&mut self.members, next);
        push_bounded(
            &mut self.snapshots,
            Snapshot {
                generation: self.generation,
                members: previous,
                taken_at: Utc::now(),
            },
            self.rollback_window,
        );
        self.lineage.extend(created);
        self.prune_lineage();
        self.generation += 1;

        let now = Utc::now();
        self.last_evolved_at = Some(now);
        let summary = GenerationSummary {
            generation: self.generation,
            mean_fitness: summary_mean,
            best_fitness: self.best().map_or(0.0, |c| c.fitness),
            mean_risk: self.mean_risk(),
            population_size: self.members.len(),
            committed_at: now,
        };
        push_bounded(&mut self.summaries, summary.clone(), MAX_SUMMARY_ENTRIES);
        summary
    }

    /// Restore the most recent snapshot. The snapshot stays in the ring so a
    /// repeated failure restores the same state; the generation is unchanged.
    ///
    /// Returns `None`, leaving everything untouched, when no snapshot exists.
    pub fn rollback(&mut self, reason: RollbackReason) -> Option<RollbackRecord> {
        let snapshot = self.snapshots.back()?;
        self.members = snapshot.members.clone();
        self.rollback_count += 1;
        self.last_evolved_at = Some(Utc::now());

        let record = RollbackRecord {
            timestamp: Utc::now(),
            generation: self.generation,
            restored_generation: snapshot.generation,
            reason,
            rollback_count: self.rollback_count,
        };
        push_bounded(&mut self.rollbacks, record.clone(), MAX_ROLLBACK_HISTORY_ENTRIES);
        Some(record)
    }

    /// Keep only ids that a later validation can still ask about: live
    /// members, snapshot members and their parents.
    fn prune_lineage(&mut self) {
        let reachable: HashSet<GenevaId> = self
            .members
            .iter()
            .chain(self.snapshots.iter().flat_map(|s| s.members.iter()))
            .flat_map(|c| std::iter::once(c.id).chain(c.parents.iter().copied()))
            .collect();
        self.lineage.retain(|id| reachable.contains(id));
    }

    pub fn record_breakthroughs(&mut self, found: impl IntoIterator<Item = BreakthroughEvent>) {
        for b in found {
            push_bounded(&mut self.breakthroughs, b, MAX_DISCOVERY_ENTRIES);
        }
    }

    pub fn record_patterns(&mut self, found: impl IntoIterator<Item = ConvergencePattern>) {
        for p in found {
            push_bounded(&mut self.patterns, p, MAX_DISCOVERY_ENTRIES);
        }
    }
}
