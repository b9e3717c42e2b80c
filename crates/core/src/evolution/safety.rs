//! Chromosome/population validation and the degradation baseline.

use chrono::{DateTime, Duration, Utc};
use geneva_shared::{GenevaError, GenevaId, GenevaResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::chromosome::Chromosome;
use super::mode::ActivationMode;
use super::operators::{within_bounds, GeneBounds};
use super::types::SafetyViolationRecord;

/// Maximum entries kept in a category's violation log.
const MAX_VIOLATION_LOG_ENTRIES: usize = 256;

// ══════════════════════════════════════════════════════════════
// Validation
// ══════════════════════════════════════════════════════════════

/// Check one chromosome against gene bounds and lineage.
///
/// `lineage` holds every id created in the chromosome's category so far,
/// including ids created by the transition under validation.
pub fn validate_chromosome(
    c: &Chromosome,
    category: &str,
    bounds: &GeneBounds,
    lineage: &HashSet<GenevaId>,
) -> GenevaResult<()> {
    if c.category != category {
        return Err(GenevaError::Validation(format!(
            "chromosome {} belongs to '{}', not '{}'",
            c.id.short(),
            c.category,
            category
        )));
    }
    if !within_bounds(c, bounds) {
        return Err(GenevaError::Validation(format!(
            "chromosome {} has a gene outside its bounds",
            c.id.short()
        )));
    }
    if c.parents.len() > 2 {
        return Err(GenevaError::Validation(format!(
            "chromosome {} lists {} parents",
            c.id.short(),
            c.parents.len()
        )));
    }
    if let Some(unknown) = c.parents.iter().find(|p| !lineage.contains(*p)) {
        return Err(GenevaError::Validation(format!(
            "chromosome {} references parent {} outside category '{}'",
            c.id.short(),
            unknown.short(),
            category
        )));
    }
    Ok(())
}

/// Mean risk tolerance over `members`, 0 when empty.
#[must_use]
pub fn mean_risk(members: &[Arc<Chromosome>]) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    members.iter().map(|c| c.genes.risk_tolerance).sum::<f64>() / members.len() as f64
}

/// Check every member and the mode's population risk ceiling.
pub fn validate_population(
    members: &[Arc<Chromosome>],
    category: &str,
    mode: ActivationMode,
    bounds: &GeneBounds,
    lineage: &HashSet<GenevaId>,
) -> GenevaResult<()> {
    if members.is_empty() {
        return Err(GenevaError::Validation(format!(
            "proposed population for '{}' is empty",
            category
        )));
    }
    for c in members {
        validate_chromosome(c, category, bounds, lineage)?;
    }
    let risk = mean_risk(members);
    let ceiling = mode.population_risk_ceiling();
    if risk >= ceiling {
        return Err(GenevaError::Validation(format!(
            "mean risk tolerance {:.3} is not below the {} ceiling {:.2}",
            risk, mode, ceiling
        )));
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════
// Baseline
// ══════════════════════════════════════════════════════════════

/// Rolling fitness baseline for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyBaseline {
    baseline: Option<f64>,
    threshold: f64,
    violations: VecDeque<SafetyViolationRecord>,
}

impl SafetyBaseline {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            baseline: None,
            threshold,
            violations: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Overwrite the baseline, e.g. when restoring persisted state.
    pub fn set(&mut self, value: f64) {
        self.baseline = Some(value.clamp(0.0, 1.0));
    }

    /// Effective tolerance under `mode`.
    #[must_use]
    pub fn tolerance(&self, mode: ActivationMode) -> f64 {
        self.threshold * mode.degradation_factor()
    }

    /// True when `observed` dropped more than the tolerance below the baseline.
    /// With no baseline yet, nothing can degrade.
    #[must_use]
    pub fn is_degraded(&self, observed: f64, mode: ActivationMode) -> bool {
        match self.baseline {
            Some(base) => base - observed > self.tolerance(mode),
            None => false,
        }
    }

    /// Raise the baseline if `mean` exceeds it; the first call establishes it.
    /// Returns true when the baseline moved.
    pub fn raise(&mut self, mean: f64) -> bool {
        match self.baseline {
            Some(base) if mean <= base => false,
            _ => {
                self.baseline = Some(mean.clamp(0.0, 1.0));
                true
            }
        }
    }

    pub fn record_violation(&mut self, record: SafetyViolationRecord) {
        self.violations.push_back(record);
        while self.violations.len() > MAX_VIOLATION_LOG_ENTRIES {
            self.violations.pop_front();
        }
    }

    #[must_use]
    pub fn violations(&self) -> &VecDeque<SafetyViolationRecord> {
        &self.violations
    }

    /// Number of violations recorded at or after `now - window`.
    #[must_use]
    pub fn violations_since(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.violations.iter().filter(|v| v.at >= cutoff).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage_of(members: &[Arc<Chromosome>]) -> HashSet<GenevaId> {
        members.iter().map(|c| c.id).collect()
    }

    fn violation(at: DateTime<Utc>) -> SafetyViolationRecord {
        SafetyViolationRecord {
            category: "routing".into(),
            baseline: 0.9,
            observed: 0.1,
            threshold: 0.1,
            generation: 3,
            at,
        }
    }

    #[test]
    fn test_validate_rejects_foreign_parent() {
        let parent = Chromosome::seed("routing");
        let mut child = Chromosome::seed("routing");
        child.parents = vec![parent.id];
        let lineage = HashSet::new();
        let err = validate_chromosome(&child, "routing", &GeneBounds::default(), &lineage)
            .unwrap_err();
        assert!(matches!(err, GenevaError::Validation(_)));

        let lineage: HashSet<_> = [parent.id].into_iter().collect();
        validate_chromosome(&child, "routing", &GeneBounds::default(), &lineage).unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_category() {
        let c = Chromosome::seed("planning");
        assert!(
            validate_chromosome(&c, "routing", &GeneBounds::default(), &HashSet::new()).is_err()
        );
    }

    #[test]
    fn test_population_risk_ceiling_depends_on_mode() {
        let members: Vec<_> = (0..4)
            .map(|_| Arc::new(Chromosome::seed("routing").with_risk_tolerance(0.8)))
            .collect();
        let lineage = lineage_of(&members);
        let bounds = GeneBounds::default();
        assert!(validate_population(&members, "routing", ActivationMode::Cautious, &bounds, &lineage)
            .is_err());
        validate_population(&members, "routing", ActivationMode::Aggressive, &bounds, &lineage)
            .unwrap();
    }

    #[test]
    fn test_population_rejects_empty() {
        assert!(validate_population(
            &[],
            "routing",
            ActivationMode::Cautious,
            &GeneBounds::default(),
            &HashSet::new()
        )
        .is_err());
    }

    #[test]
    fn test_baseline_degradation_and_aggressive_tolerance() {
        let mut baseline = SafetyBaseline::new(0.1);
        assert!(!baseline.is_degraded(0.0, ActivationMode::Cautious));
        baseline.set(0.9);
        assert!(baseline.is_degraded(0.75, ActivationMode::Cautious));
        assert!(!baseline.is_degraded(0.75, ActivationMode::Aggressive));
        assert!(!baseline.is_degraded(0.85, ActivationMode::Cautious));
    }

    #[test]
    fn test_baseline_only_rises() {
        let mut baseline = SafetyBaseline::new(0.1);
        assert!(baseline.raise(0.4));
        assert!(!baseline.raise(0.3));
        assert!(baseline.raise(0.6));
        assert_eq!(baseline.baseline(), Some(0.6));
    }

    #[test]
    fn test_violation_window() {
        let mut baseline = SafetyBaseline::new(0.1);
        let now = Utc::now();
        baseline.record_violation(violation(now - Duration::hours(2)));
        baseline.record_violation(violation(now - Duration::minutes(10)));
        baseline.record_violation(violation(now));
        assert_eq!(baseline.violations_since(now, Duration::hours(1)), 2);
    }

    #[test]
    fn test_violation_log_is_bounded() {
        let mut baseline = SafetyBaseline::new(0.1);
        for _ in 0..(MAX_VIOLATION_LOG_ENTRIES + 10) {
            baseline.record_violation(violation(Utc::now()));
        }
        assert_eq!(baseline.violations().len(), MAX_VIOLATION_LOG_ENTRIES);
    }
}
