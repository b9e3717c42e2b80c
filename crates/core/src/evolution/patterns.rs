use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::chromosome::Chromosome;
use super::types::{BreakthroughEvent, ConvergencePattern};

/// Relative distance from the mean that still counts as converged.
const CONVERGENCE_TOLERANCE: f64 = 0.1;

/// Minimum fraction of survivors that must be near the mean.
const CONVERGENCE_CONSISTENCY: f64 = 0.8;

/// Chromosomes at or above `threshold`.
#[must_use]
pub fn detect_breakthroughs(
    category: &str,
    survivors: &[Arc<Chromosome>],
    threshold: f64,
    generation: u64,
) -> Vec<BreakthroughEvent> {
    let now = Utc::now();
    survivors
        .iter()
        .filter(|c| c.fitness >= threshold)
        .map(|c| BreakthroughEvent {
            category: category.to_string(),
            chromosome_id: c.id,
            fitness: c.fitness,
            generation,
            experimental: c.experimental,
            detected_at: now,
        })
        .collect()
}

/// Gene keys whose survivor values cluster within 10% of their mean.
///
/// Keys are scalar gene names and `role.gene`; a key only present in some
/// survivors is judged over those that carry it, and needs at least two.
#[must_use]
pub fn detect_convergence(
    category: &str,
    survivors: &[Arc<Chromosome>],
    generation: u64,
) -> Vec<ConvergencePattern> {
    let mut by_gene: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for c in survivors {
        for (gene, value) in c.gene_map() {
            by_gene.entry(gene).or_default().push(value);
        }
    }

    let now = Utc::now();
    by_gene
        .into_iter()
        .filter(|(_, values)| values.len() >= 2)
        .filter_map(|(gene, values)| {
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let band = CONVERGENCE_TOLERANCE * mean.abs();
            let near = values.iter().filter(|v| (*v - mean).abs() <= band).count();
            let consistency = near as f64 / n;
            (consistency >= CONVERGENCE_CONSISTENCY).then(|| ConvergencePattern {
                category: category.to_string(),
                gene,
                mean,
                consistency,
                generation,
                detected_at: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_fitness(c: Chromosome, fitness: f64) -> Arc<Chromosome> {
        Arc::new(Chromosome { fitness, ..c })
    }

    #[test]
    fn test_breakthrough_threshold_is_inclusive() {
        let survivors = vec![
            with_fitness(Chromosome::seed("routing"), 0.85),
            with_fitness(Chromosome::seed("routing"), 0.84),
            with_fitness(Chromosome::seed("routing"), 0.97),
        ];
        let found = detect_breakthroughs("routing", &survivors, 0.85, 4);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|b| b.generation == 4 && b.category == "routing"));
    }

    #[test]
    fn test_identical_survivors_converge_on_every_gene() {
        let base = Chromosome::seed("routing").with_role("planner", &[("depth", 0.5)]);
        let survivors = vec![
            Arc::new(base.clone()),
            Arc::new(base.clone()),
            Arc::new(base),
        ];
        let patterns = detect_convergence("routing", &survivors, 2);
        let genes: Vec<_> = patterns.iter().map(|p| p.gene.as_str()).collect();
        assert!(genes.contains(&"planner.depth"));
        assert!(genes.contains(&"quality_threshold"));
        assert!(patterns.iter().all(|p| (p.consistency - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_spread_gene_does_not_converge() {
        let survivors: Vec<_> = [0.1, 0.5, 0.9, 0.3, 0.7]
            .into_iter()
            .map(|lr| {
                let mut c = Chromosome::seed("routing");
                c.genes.learning_rate = lr;
                Arc::new(c)
            })
            .collect();
        let patterns = detect_convergence("routing", &survivors, 1);
        assert!(!patterns.iter().any(|p| p.gene == "learning_rate"));
        assert!(patterns.iter().any(|p| p.gene == "speed_preference"));
    }

    #[test]
    fn test_single_survivor_has_no_patterns() {
        let survivors = vec![Arc::new(Chromosome::seed("routing"))];
        assert!(detect_convergence("routing", &survivors, 1).is_empty());
    }
}
