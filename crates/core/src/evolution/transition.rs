//! One generation transition, computed without touching the live population.
//!
//! Everything here works on a copy of the committed members; the worker that
//! owns the [`Population`] applies the returned [`Transition`] in one step.

use geneva_shared::GenevaId;
use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

use super::chromosome::Chromosome;
use super::fitness::{evaluate, FitnessEvaluation, TelemetryWindow};
use super::mode::ActivationMode;
use super::operators::{crossover, mutate, GeneBounds};
use super::patterns::{detect_breakthroughs, detect_convergence};
use super::population::Population;
use super::safety::{validate_population, SafetyBaseline};
use super::types::{BreakthroughEvent, ConvergencePattern};
use crate::config::EngineConfig;

/// Inputs that stay fixed for one transition.
pub struct TransitionContext<'a> {
    pub mode: ActivationMode,
    pub config: &'a EngineConfig,
    pub baseline: &'a SafetyBaseline,
    pub bounds: GeneBounds,
}

/// A population ready to commit.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub members: Vec<Arc<Chromosome>>,
    /// Every chromosome id created during the transition.
    pub created: Vec<GenevaId>,
    pub elites: usize,
    pub survivors: usize,
    pub offspring: usize,
    pub mutated: usize,
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Commit(Proposal),
    /// Mean fitness fell more than `tolerance` below `baseline`.
    Degraded {
        baseline: f64,
        observed: f64,
        tolerance: f64,
    },
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub evaluations: Vec<FitnessEvaluation>,
    /// Members with this generation's fitness written.
    pub evaluated: Vec<Arc<Chromosome>>,
    pub evaluated_mean: f64,
    pub breakthroughs: Vec<BreakthroughEvent>,
    pub patterns: Vec<ConvergencePattern>,
    pub verdict: Verdict,
}

/// Score every member against `window`, writing fitness copy-on-write.
pub fn evaluate_members(
    members: &[Arc<Chromosome>],
    window: &TelemetryWindow,
    config: &EngineConfig,
) -> (Vec<Arc<Chromosome>>, Vec<FitnessEvaluation>) {
    let mut working = members.to_vec();
    let evaluations = working
        .iter_mut()
        .map(|member| {
            let eval = evaluate(member, window, &config.weights);
            Arc::make_mut(member).fitness = eval.overall;
            eval
        })
        .collect();
    (working, evaluations)
}

fn mean_overall(evaluations: &[FitnessEvaluation]) -> f64 {
    if evaluations.is_empty() {
        return 0.0;
    }
    evaluations.iter().map(|e| e.overall).sum::<f64>() / evaluations.len() as f64
}

/// Per-chromosome mutation probability: the configured rate, raised by half
/// for chromosomes that are already experimental, capped at 1.
fn mutation_probability(c: &Chromosome, rate: f64) -> f64 {
    let p = if c.experimental { rate * 1.5 } else { rate };
    p.clamp(0.0, 1.0)
}

/// Elite and survivor counts for a population of `n`.
#[must_use]
pub fn selection_sizes(n: usize, elite_fraction: f64, selection_fraction: f64) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let elites = ((elite_fraction * n as f64).floor() as usize).clamp(1, n);
    let survivors = ((selection_fraction * n as f64).floor() as usize)
        .max(2)
        .min(n)
        .max(elites);
    (elites, survivors)
}

/// Run steps 1 through 7 of a generation transition against `pop`.
pub fn run<R: Rng + ?Sized>(
    pop: &Population,
    window: &TelemetryWindow,
    ctx: &TransitionContext<'_>,
    rng: &mut R,
) -> Transition {
    let config = ctx.config;
    let experimental = ctx.mode.is_experimental();
    let category = pop.category();

    // ── 1. Evaluate ──
    let (mut ranked, evaluations) = evaluate_members(pop.members(), window, config);
    let evaluated = ranked.clone();
    let evaluated_mean = mean_overall(&evaluations);

    // ── 2. Safety check ──
    if ctx.baseline.is_degraded(evaluated_mean, ctx.mode) {
        return Transition {
            evaluations,
            evaluated,
            evaluated_mean,
            breakthroughs: Vec::new(),
            patterns: Vec::new(),
            verdict: Verdict::Degraded {
                baseline: ctx.baseline.baseline().unwrap_or(0.0),
                observed: evaluated_mean,
                tolerance: ctx.baseline.tolerance(ctx.mode),
            },
        };
    }

    // ── 3. Selection ──
    let n = ranked.len();
    ranked.sort_by(|a, b| b.fitness.partial_cmp(&a.fitness).unwrap_or(Ordering::Equal));
    let (elite_n, survivor_n) =
        selection_sizes(n, config.elite_fraction, config.selection_fraction);
    let mut survivors: Vec<Arc<Chromosome>> = ranked[..survivor_n].to_vec();
    let rest = &ranked[survivor_n..];
    if ctx.mode == ActivationMode::Aggressive && !rest.is_empty() && survivor_n > elite_n {
        let pick = rng.gen_range(0..rest.len());
        survivors[survivor_n - 1] = Arc::clone(&rest[pick]);
    }

    // ── 4. Patterns ──
    let generation = pop.generation();
    let breakthroughs =
        detect_breakthroughs(category, &survivors, config.breakthrough_threshold, generation);
    let patterns = detect_convergence(category, &survivors, generation);

    // ── 5. Crossover ──
    let limit = config.max_offspring_per_generation * ctx.mode.offspring_factor();
    let mut created = Vec::new();
    let mut offspring: Vec<Chromosome> = Vec::new();
    for pair in survivors.chunks_exact(2) {
        if offspring.len() >= limit {
            break;
        }
        let (first, second) = crossover(&pair[0], &pair[1], experimental, rng);
        offspring.push(first);
        if offspring.len() < limit {
            offspring.push(second);
        }
    }
    created.extend(offspring.iter().map(|c| c.id));
    let offspring_n = offspring.len();

    // ── 6. Mutation ──
    let mut mutated = 0;
    let mut maybe_mutate = |c: Arc<Chromosome>, rng: &mut R| -> Arc<Chromosome> {
        let p = mutation_probability(&c, config.mutation_rate);
        if p > 0.0 && rng.gen_bool(p) {
            let child = mutate(&c, p, &ctx.bounds, experimental, rng);
            created.push(child.id);
            mutated += 1;
            Arc::new(child)
        } else {
            c
        }
    };

    let mut next: Vec<Arc<Chromosome>> = Vec::with_capacity(n + offspring_n);
    next.extend(survivors[..elite_n].iter().cloned());
    for survivor in survivors[elite_n..].iter().cloned() {
        let m = maybe_mutate(survivor, rng);
        next.push(m);
    }
    for child in offspring {
        let m = maybe_mutate(Arc::new(child), rng);
        next.push(m);
    }

    // ── 8 (shape). Truncate/pad to the original size ──
    next.truncate(n);
    let best_elite = Arc::clone(&survivors[0]);
    while next.len() < n {
        let p = mutation_probability(&best_elite, config.mutation_rate).max(f64::EPSILON);
        let copy = mutate(&best_elite, p, &ctx.bounds, experimental, rng);
        created.push(copy.id);
        next.push(Arc::new(copy));
    }

    // ── 7. Validate ──
    let mut lineage = pop.lineage().clone();
    lineage.extend(created.iter().copied());
    let verdict = match validate_population(&next, category, ctx.mode, &ctx.bounds, &lineage) {
        Ok(()) => Verdict::Commit(Proposal {
            members: next,
            created,
            elites: elite_n,
            survivors: survivor_n,
            offspring: offspring_n,
            mutated,
        }),
        Err(e) => Verdict::Invalid(e.to_string()),
    };

    Transition {
        evaluations,
        evaluated,
        evaluated_mean,
        breakthroughs,
        patterns,
        verdict,
    }
}
