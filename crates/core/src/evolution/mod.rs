pub mod chromosome;
pub mod engine;
pub mod fitness;
pub mod mode;
pub mod operators;
pub mod patterns;
pub mod population;
pub mod safety;
pub mod transition;
pub mod types;

pub use chromosome::{
    Chromosome, CommunicationPattern, ConsensusMechanism, CoordinationStyle, ExperimentalGenes,
    ScalarGenes, MAX_RISK_TOLERANCE,
};
pub use engine::EvolutionEngine;
pub use fitness::{
    evaluate, ExperimentalComponents, FitnessComponents, FitnessEvaluation, FitnessWeights,
    TelemetryWindow,
};
pub use mode::{ensure_mode_allowed, Acknowledgment, ActivationMode};
pub use operators::{crossover, mutate, within_bounds, GeneBounds};
pub use population::Population;
pub use safety::SafetyBaseline;
pub use types::{
    BreakthroughEvent, CategoryStatus, ConvergencePattern, EvolutionOutcome, GenerationSummary,
    RollbackReason, RollbackRecord, SafetyViolationRecord,
};
