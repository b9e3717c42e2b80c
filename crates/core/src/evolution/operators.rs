//! Bounded genetic operators.
//!
//! Both operators are pure apart from the supplied RNG and never emit a gene
//! outside its declared interval. Callers still validate the result.

use chrono::Utc;
use geneva_shared::GenevaId;
use rand::Rng;

use super::chromosome::{Chromosome, MAX_RISK_TOLERANCE};

/// Valid intervals for numeric genes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneBounds {
    /// Interval for every scalar, role and experimental gene.
    pub scalar: (f64, f64),
    /// Interval for `risk_tolerance`.
    pub risk: (f64, f64),
}

impl Default for GeneBounds {
    fn default() -> Self {
        Self {
            scalar: (0.0, 1.0),
            risk: (0.0, MAX_RISK_TOLERANCE),
        }
    }
}

impl GeneBounds {
    #[must_use]
    pub fn for_gene(&self, name: &str) -> (f64, f64) {
        if name == "risk_tolerance" {
            self.risk
        } else {
            self.scalar
        }
    }

    #[must_use]
    pub fn clamp(&self, name: &str, value: f64) -> f64 {
        let (lo, hi) = self.for_gene(name);
        if value.is_finite() {
            value.clamp(lo, hi)
        } else {
            lo
        }
    }

    /// Pull every numeric gene of `c` into its interval; non-finite values
    /// land on the lower bound.
    pub fn clamp_chromosome(&self, c: &mut Chromosome) {
        for (name, value) in c.genes.values_mut() {
            *value = self.clamp(name, *value);
        }
        for value in c.role_genes.values_mut().flat_map(|g| g.values_mut()) {
            *value = self.clamp("", *value);
        }
        for (name, value) in c.experimental_genes.values_mut() {
            *value = self.clamp(name, *value);
        }
    }
}

/// Mutate a chromosome into a fresh child.
///
/// Each scalar gene is perturbed with probability `rate` by a factor drawn
/// from [0.9,1.1] ([0.8,1.2] when `experimental`); role genes use half the
/// rate. Experimental genes receive additive noise only when `experimental`.
pub fn mutate<R: Rng + ?Sized>(
    c: &Chromosome,
    rate: f64,
    bounds: &GeneBounds,
    experimental: bool,
    rng: &mut R,
) -> Chromosome {
    let rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
    let spread = if experimental { 0.2 } else { 0.1 };
    let mut child = c.clone();

    for (name, value) in child.genes.values_mut() {
        if rng.gen_bool(rate) {
            let factor = rng.gen_range(1.0 - spread..=1.0 + spread);
            *value = bounds.clamp(name, *value * factor);
        }
    }

    let role_rate = rate * 0.5;
    for genes in child.role_genes.values_mut() {
        for value in genes.values_mut() {
            if rng.gen_bool(role_rate) {
                let factor = rng.gen_range(1.0 - spread..=1.0 + spread);
                *value = bounds.clamp("", *value * factor);
            }
        }
    }

    if experimental {
        let x = &mut child.experimental_genes;
        x.emergence_factor = bounds.clamp("", x.emergence_factor + rng.gen_range(-0.2..=0.2));
        x.cooperation_bias = bounds.clamp("", x.cooperation_bias + rng.gen_range(-0.1..=0.1));
        x.exploration_drive = bounds.clamp("", x.exploration_drive + rng.gen_range(-0.2..=0.2));
    }

    child.id = GenevaId::new();
    child.generation = c.generation + 1;
    child.parents = vec![c.id];
    child.experimental = c.experimental || experimental;
    child.mutations = c.mutations + 1;
    child.fitness = 0.0;
    child.created_at = Utc::now();
    child
}

/// Blend two parents into two children.
///
/// Shared role genes are blended with a single weight w in [0.3,0.7]
/// ([0.1,0.9] when `experimental`); genes only one parent carries stay with
/// that parent's child. Categorical, scalar and experimental genes are
/// swapped independently with probability 0.5.
pub fn crossover<R: Rng + ?Sized>(
    a: &Chromosome,
    b: &Chromosome,
    experimental: bool,
    rng: &mut R,
) -> (Chromosome, Chromosome) {
    let bounds = GeneBounds::default();
    let w = if experimental {
        rng.gen_range(0.1..=0.9)
    } else {
        rng.gen_range(0.3..=0.7)
    };

    let mut first = a.clone();
    let mut second = b.clone();

    for (role, genes_a) in &a.role_genes {
        let Some(genes_b) = b.role_genes.get(role) else {
            continue;
        };
        for (name, va) in genes_a {
            let Some(vb) = genes_b.get(name) else {
                continue;
            };
            if let Some(v) = first.role_genes.get_mut(role).and_then(|g| g.get_mut(name)) {
                *v = bounds.clamp(name, w * va + (1.0 - w) * vb);
            }
            if let Some(v) = second.role_genes.get_mut(role).and_then(|g| g.get_mut(name)) {
                *v = bounds.clamp(name, w * vb + (1.0 - w) * va);
            }
        }
    }

    if rng.gen_bool(0.5) {
        std::mem::swap(&mut first.coordination, &mut second.coordination);
    }
    if rng.gen_bool(0.5) {
        std::mem::swap(&mut first.communication, &mut second.communication);
    }
    if rng.gen_bool(0.5) {
        std::mem::swap(&mut first.consensus, &mut second.consensus);
    }

    for ((_, x), (_, y)) in first
        .genes
        .values_mut()
        .into_iter()
        .zip(second.genes.values_mut())
    {
        if rng.gen_bool(0.5) {
            std::mem::swap(x, y);
        }
    }

    let (xa, xb) = (&mut first.experimental_genes, &mut second.experimental_genes);
    if rng.gen_bool(0.5) {
        std::mem::swap(&mut xa.emergence_factor, &mut xb.emergence_factor);
    }
    if rng.gen_bool(0.5) {
        std::mem::swap(&mut xa.cooperation_bias, &mut xb.cooperation_bias);
    }
    if rng.gen_bool(0.5) {
        std::mem::swap(&mut xa.exploration_drive, &mut xb.exploration_drive);
    }

    let generation = a.generation.max(b.generation) + 1;
    let is_experimental = a.experimental || b.experimental;
    let now = Utc::now();
    for child in [&mut first, &mut second] {
        child.id = GenevaId::new();
        child.generation = generation;
        child.parents = vec![a.id, b.id];
        child.experimental = is_experimental;
        child.fitness = 0.0;
        child.mutations = 0;
        child.created_at = now;
    }

    (first, second)
}

/// True when every numeric gene of `c` is finite and inside `bounds`.
#[must_use]
pub fn within_bounds(c: &Chromosome, bounds: &GeneBounds) -> bool {
    let in_range = |name: &str, v: f64| {
        let (lo, hi) = bounds.for_gene(name);
        v.is_finite() && v >= lo && v <= hi
    };
    c.genes.values().iter().all(|&(name, v)| in_range(name, v))
        && c.role_genes
            .values()
            .flat_map(|g| g.values())
            .all(|v| in_range("", *v))
        && c.experimental_genes
            .values()
            .iter()
            .all(|&(name, v)| in_range(name, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::chromosome::{ExperimentalGenes, ScalarGenes};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn edge_chromosome() -> Chromosome {
        Chromosome::seed("routing")
            .with_genes(ScalarGenes {
                quality_threshold: 1.0,
                speed_preference: 0.99,
                risk_tolerance: 0.8,
                learning_rate: 0.0,
                memory_utilization: 0.95,
                pattern_sensitivity: 1.0,
            })
            .with_role("planner", &[("depth", 1.0), ("breadth", 0.98)])
            .with_experimental(ExperimentalGenes {
                emergence_factor: 0.95,
                cooperation_bias: 0.02,
                exploration_drive: 1.0,
            })
    }

    #[test]
    fn test_clamp_chromosome_covers_every_gene() {
        let bounds = GeneBounds::default();
        let mut c = Chromosome::seed("routing")
            .with_role("planner", &[("depth", 0.5), ("breadth", f64::NAN)])
            .with_experimental(ExperimentalGenes {
                emergence_factor: -0.3,
                cooperation_bias: f64::INFINITY,
                exploration_drive: 0.4,
            })
            .with_risk_tolerance(0.95);
        // role genes are public, so a host can bypass the builder
        c.role_genes
            .get_mut("planner")
            .unwrap()
            .insert("depth".into(), 1.5);
        assert!(!within_bounds(&c, &bounds));

        bounds.clamp_chromosome(&mut c);
        assert!(within_bounds(&c, &bounds));
        assert_eq!(c.role_genes["planner"]["depth"], 1.0);
        assert_eq!(c.role_genes["planner"]["breadth"], 0.0);
        assert_eq!(c.experimental_genes.emergence_factor, 0.0);
        assert_eq!(c.experimental_genes.cooperation_bias, 0.0);
        assert!((c.genes.risk_tolerance - MAX_RISK_TOLERANCE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mutate_never_leaves_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = GeneBounds::default();
        let mut current = edge_chromosome();
        for i in 0..500 {
            current = mutate(&current, 1.0, &bounds, i % 2 == 0, &mut rng);
            assert!(within_bounds(&current, &bounds), "out of bounds at step {}", i);
            assert!(current.genes.risk_tolerance <= MAX_RISK_TOLERANCE);
        }
    }

    #[test]
    fn test_mutate_lineage() {
        let mut rng = StdRng::seed_from_u64(1);
        let parent = Chromosome::seed("routing");
        let child = mutate(&parent, 0.5, &GeneBounds::default(), false, &mut rng);
        assert_ne!(child.id, parent.id);
        assert_eq!(child.generation, parent.generation + 1);
        assert_eq!(child.parents, vec![parent.id]);
        assert_eq!(child.mutations, 1);
        assert!(!child.experimental);
    }

    #[test]
    fn test_mutate_zero_rate_keeps_genes() {
        let mut rng = StdRng::seed_from_u64(3);
        let parent = edge_chromosome();
        let child = mutate(&parent, 0.0, &GeneBounds::default(), false, &mut rng);
        assert_eq!(child.genes, parent.genes);
        assert_eq!(child.role_genes, parent.role_genes);
        assert_eq!(child.experimental_genes, parent.experimental_genes);
    }

    #[test]
    fn test_experimental_noise_only_when_flagged() {
        let mut rng = StdRng::seed_from_u64(11);
        let parent = Chromosome::seed("routing");
        let quiet = mutate(&parent, 0.0, &GeneBounds::default(), false, &mut rng);
        assert_eq!(quiet.experimental_genes, parent.experimental_genes);

        let loud = mutate(&parent, 0.0, &GeneBounds::default(), true, &mut rng);
        assert!(loud.experimental);
        let delta = (loud.experimental_genes.cooperation_bias
            - parent.experimental_genes.cooperation_bias)
            .abs();
        assert!(delta <= 0.1 + 1e-12);
    }

    #[test]
    fn test_crossover_generation_and_parents() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut a = Chromosome::seed("routing");
        a.generation = 4;
        let mut b = Chromosome::seed("routing");
        b.generation = 9;
        let (c1, c2) = crossover(&a, &b, false, &mut rng);
        for child in [&c1, &c2] {
            assert_eq!(child.generation, 10);
            assert_eq!(child.parents, vec![a.id, b.id]);
            assert!(within_bounds(child, &GeneBounds::default()));
        }
        assert_ne!(c1.id, c2.id);
    }

    #[test]
    fn test_crossover_blends_shared_role_genes() {
        let mut rng = StdRng::seed_from_u64(9);
        let a = Chromosome::seed("routing").with_role("planner", &[("depth", 0.0)]);
        let b = Chromosome::seed("routing").with_role("planner", &[("depth", 1.0)]);
        let (c1, c2) = crossover(&a, &b, false, &mut rng);
        let d1 = c1.role_genes["planner"]["depth"];
        let d2 = c2.role_genes["planner"]["depth"];
        // child1 = w*0 + (1-w)*1, child2 = w*1 + (1-w)*0
        assert!((0.3..=0.7).contains(&d1));
        assert!((d1 + d2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_crossover_disjoint_role_genes() {
        let mut rng = StdRng::seed_from_u64(13);
        let a = Chromosome::seed("routing").with_role("planner", &[("depth", 0.2)]);
        let b = Chromosome::seed("routing").with_role("critic", &[("strictness", 0.9)]);
        let (c1, c2) = crossover(&a, &b, true, &mut rng);
        assert_eq!(c1.role_genes, a.role_genes);
        assert_eq!(c2.role_genes, b.role_genes);
        assert_eq!(c1.roles, a.roles);
        assert_eq!(c2.roles, b.roles);
    }

    #[test]
    fn test_crossover_experimental_flag_is_or() {
        let mut rng = StdRng::seed_from_u64(17);
        let a = Chromosome::seed("routing").with_experimental(ExperimentalGenes::default());
        let b = Chromosome::seed("routing");
        let (c1, c2) = crossover(&a, &b, false, &mut rng);
        assert!(c1.experimental && c2.experimental);
    }

    #[test]
    fn test_within_bounds_rejects_nan_and_risk() {
        let bounds = GeneBounds::default();
        let risky = Chromosome::seed("routing").with_risk_tolerance(0.85);
        assert!(!within_bounds(&risky, &bounds));
        let mut nan = Chromosome::seed("routing");
        nan.genes.learning_rate = f64::NAN;
        assert!(!within_bounds(&nan, &bounds));
    }
}
