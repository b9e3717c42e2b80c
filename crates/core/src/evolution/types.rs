use chrono::{DateTime, Utc};
use geneva_shared::GenevaId;
use serde::{Deserialize, Serialize};

use super::chromosome::Chromosome;
use super::fitness::FitnessEvaluation;
use super::mode::ActivationMode;

// ══════════════════════════════════════════════════════════════
// Records
// ══════════════════════════════════════════════════════════════

/// Aggregate of one committed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u64,
    pub mean_fitness: f64,
    pub best_fitness: f64,
    pub mean_risk: f64,
    pub population_size: usize,
    pub committed_at: DateTime<Utc>,
}

/// A chromosome that reached the breakthrough threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakthroughEvent {
    pub category: String,
    pub chromosome_id: GenevaId,
    pub fitness: f64,
    pub generation: u64,
    pub experimental: bool,
    pub detected_at: DateTime<Utc>,
}

/// A gene whose survivor values cluster around their mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePattern {
    pub category: String,
    /// Scalar gene name or `role.gene`.
    pub gene: String,
    pub mean: f64,
    /// Fraction of survivors within 10% of `mean`.
    pub consistency: f64,
    pub generation: u64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum RollbackReason {
    /// Evaluated mean fitness fell too far below the baseline.
    Degradation { baseline: f64, observed: f64 },
    /// The proposed population broke an invariant.
    Validation(String),
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Degradation { baseline, observed } => write!(
                f,
                "mean fitness {:.3} degraded from baseline {:.3}",
                observed, baseline
            ),
            Self::Validation(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

/// Rollback history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub timestamp: DateTime<Utc>,
    pub generation: u64,
    /// Generation the restored snapshot was taken at.
    pub restored_generation: u64,
    pub reason: RollbackReason,
    pub rollback_count: u32,
}

/// Entry in a category's safety violation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyViolationRecord {
    pub category: String,
    pub baseline: f64,
    pub observed: f64,
    pub threshold: f64,
    pub generation: u64,
    pub at: DateTime<Utc>,
}

// ══════════════════════════════════════════════════════════════
// Outcomes & Status
// ══════════════════════════════════════════════════════════════

/// Result of one `evolve` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvolutionOutcome {
    /// Disabled or deactivated; nothing ran.
    Inactive { mode: ActivationMode },
    /// ObserveOnly: telemetry recorded, population untouched.
    Observed { best: Box<Chromosome> },
    Committed {
        best: Box<Chromosome>,
        generation: u64,
        mean_fitness: f64,
    },
    /// A failed check restored the most recent snapshot.
    RolledBack {
        best: Box<Chromosome>,
        reason: RollbackReason,
    },
    /// A failed check with no snapshot to restore. State is unchanged.
    Aborted { reason: RollbackReason },
}

impl EvolutionOutcome {
    /// Best chromosome, when the outcome carries one.
    #[must_use]
    pub fn best(&self) -> Option<&Chromosome> {
        match self {
            Self::Observed { best } | Self::Committed { best, .. } | Self::RolledBack { best, .. } => {
                Some(&**best)
            }
            Self::Inactive { .. } | Self::Aborted { .. } => None,
        }
    }

    /// Chromosome a caller may consider adopting. Only committed outcomes
    /// propose a new configuration.
    #[must_use]
    pub fn candidate(&self) -> Option<&Chromosome> {
        match self {
            Self::Committed { best, .. } => Some(&**best),
            _ => None,
        }
    }

    /// Population generation a committed outcome produced.
    #[must_use]
    pub fn committed_generation(&self) -> Option<u64> {
        match self {
            Self::Committed { generation, .. } => Some(*generation),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inactive { .. } => "inactive",
            Self::Observed { .. } => "observed",
            Self::Committed { .. } => "committed",
            Self::RolledBack { .. } => "rolled_back",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Best-effort view of one category, published after every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatus {
    pub category: String,
    pub mode: ActivationMode,
    pub active: bool,
    pub generation: u64,
    pub population_size: usize,
    pub best: Option<Chromosome>,
    pub best_fitness: f64,
    /// Most recent scoring of `best`, with its component breakdown.
    pub best_evaluation: Option<FitnessEvaluation>,
    pub mean_fitness: f64,
    pub mean_risk: f64,
    pub baseline: Option<f64>,
    pub rollback_count: u32,
    pub breakthrough_count: usize,
    pub pattern_count: usize,
    /// Most recent generation summaries, oldest first.
    pub recent_generations: Vec<GenerationSummary>,
    /// Most recent rollbacks, oldest first.
    pub recent_rollbacks: Vec<RollbackRecord>,
    /// Timestamps of safety violations, oldest first.
    pub violation_times: Vec<DateTime<Utc>>,
    pub last_evolved_at: Option<DateTime<Utc>>,
}
