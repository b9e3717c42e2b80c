use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod telemetry;

pub use telemetry::{PerformanceRecord, SanitizedRecord};

/// Crate version reported by status records.
pub const GENEVA_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Unique identifier for chromosomes, alerts and trace ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenevaId(Uuid);

impl std::fmt::Display for GenevaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default generates a random UUID v4.
impl Default for GenevaId {
    fn default() -> Self {
        Self::new()
    }
}

impl GenevaId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short 8-char prefix for log lines and tables.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl std::str::FromStr for GenevaId {
    type Err = GenevaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| GenevaError::Validation(format!("invalid id '{}': {}", s, e)))
    }
}

/// Error taxonomy for the evolution subsystem.
///
/// Only `UnknownCategory` is a hard failure for callers. The remaining
/// variants describe conditions that the engine absorbs (inactive result,
/// rollback, neutral substitution) and surfaces through outcomes and alerts.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum GenevaError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Activation error: {0}")]
    Activation(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Safety violation in '{category}': mean fitness {observed:.3} fell more than {threshold:.3} below baseline {baseline:.3}")]
    SafetyViolation {
        category: String,
        baseline: f64,
        observed: f64,
        threshold: f64,
    },
    #[error("Telemetry error: {0}")]
    Telemetry(String),
    #[error("Category not initialized: {0}")]
    UnknownCategory(String),
    #[error("Worker for '{0}' has shut down")]
    Shutdown(String),
}

pub type GenevaResult<T> = std::result::Result<T, GenevaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_roundtrip() {
        let id = GenevaId::new();
        let parsed: GenevaId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.short().len(), 8);
    }

    #[test]
    fn test_id_parse_rejects_garbage() {
        let err = "not-a-uuid".parse::<GenevaId>().unwrap_err();
        assert!(matches!(err, GenevaError::Validation(_)));
    }

    #[test]
    fn test_error_serializes_tagged() {
        let err = GenevaError::UnknownCategory("routing".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "UnknownCategory");
        assert_eq!(json["detail"], "routing");
    }
}
