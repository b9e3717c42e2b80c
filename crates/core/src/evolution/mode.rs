use chrono::{DateTime, Utc};
use geneva_shared::{GenevaError, GenevaResult};
use serde::{Deserialize, Serialize};

/// Activation state of a category's evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Nothing proceeds; initialize/evolve report an inactive result.
    Disabled,
    /// Telemetry is recorded but no genetic operators run.
    ObserveOnly,
    Cautious,
    /// Operators run with widened perturbation ranges.
    Experimental,
    /// Experimental operators, doubled degradation tolerance and a random
    /// diversity survivor each generation.
    Aggressive,
}

impl ActivationMode {
    /// Modes that must be unlocked by an explicit acknowledgment.
    #[must_use]
    pub fn requires_acknowledgment(&self) -> bool {
        matches!(self, Self::Experimental | Self::Aggressive)
    }

    /// Whether the full generation transition runs.
    #[must_use]
    pub fn runs_operators(&self) -> bool {
        matches!(self, Self::Cautious | Self::Experimental | Self::Aggressive)
    }

    /// Whether operators run with experimental ranges.
    #[must_use]
    pub fn is_experimental(&self) -> bool {
        self.requires_acknowledgment()
    }

    /// Multiplier applied to the degradation threshold.
    #[must_use]
    pub fn degradation_factor(&self) -> f64 {
        if *self == Self::Aggressive {
            2.0
        } else {
            1.0
        }
    }

    /// Ceiling the population's mean risk tolerance must stay below.
    #[must_use]
    pub fn population_risk_ceiling(&self) -> f64 {
        if *self == Self::Aggressive {
            0.9
        } else {
            0.8
        }
    }

    /// Multiplier on the per-generation offspring limit.
    #[must_use]
    pub fn offspring_factor(&self) -> usize {
        if self.is_experimental() {
            2
        } else {
            1
        }
    }
}

impl std::fmt::Display for ActivationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::ObserveOnly => write!(f, "observe_only"),
            Self::Cautious => write!(f, "cautious"),
            Self::Experimental => write!(f, "experimental"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl std::str::FromStr for ActivationMode {
    type Err = GenevaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "off" => Ok(Self::Disabled),
            "observe_only" | "observe" => Ok(Self::ObserveOnly),
            "cautious" => Ok(Self::Cautious),
            "experimental" => Ok(Self::Experimental),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(GenevaError::Configuration(format!(
                "unknown activation mode '{}': expected disabled, observe_only, cautious, experimental or aggressive",
                other
            ))),
        }
    }
}

/// Operator opt-in to the experimental modes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Acknowledgment {
    #[default]
    Withheld,
    Granted { at: DateTime<Utc> },
}

impl Acknowledgment {
    #[must_use]
    pub fn granted() -> Self {
        Self::Granted { at: Utc::now() }
    }

    #[must_use]
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            Self::granted()
        } else {
            Self::Withheld
        }
    }

    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

/// Guard every mode request passes through.
///
/// Experimental and Aggressive are refused with a configuration error until
/// the experimental acknowledgment has been granted.
pub fn ensure_mode_allowed(mode: ActivationMode, ack: &Acknowledgment) -> GenevaResult<()> {
    if mode.requires_acknowledgment() && !ack.is_granted() {
        return Err(GenevaError::Configuration(format!(
            "{} mode requires explicit experimental acknowledgment (acknowledge_experimental must be set first)",
            mode
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggressive_refused_without_acknowledgment() {
        let err = ensure_mode_allowed(ActivationMode::Aggressive, &Acknowledgment::Withheld)
            .unwrap_err();
        match err {
            GenevaError::Configuration(msg) => assert!(msg.contains("acknowledgment")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_acknowledged_modes_pass() {
        let ack = Acknowledgment::granted();
        for mode in [
            ActivationMode::Disabled,
            ActivationMode::ObserveOnly,
            ActivationMode::Cautious,
            ActivationMode::Experimental,
            ActivationMode::Aggressive,
        ] {
            ensure_mode_allowed(mode, &ack).unwrap();
        }
    }

    #[test]
    fn test_safe_modes_need_no_acknowledgment() {
        for mode in [
            ActivationMode::Disabled,
            ActivationMode::ObserveOnly,
            ActivationMode::Cautious,
        ] {
            ensure_mode_allowed(mode, &Acknowledgment::Withheld).unwrap();
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("observe-only".parse::<ActivationMode>().unwrap(), ActivationMode::ObserveOnly);
        assert_eq!("AGGRESSIVE".parse::<ActivationMode>().unwrap(), ActivationMode::Aggressive);
        assert!("yolo".parse::<ActivationMode>().is_err());
    }

    #[test]
    fn test_mode_parameters() {
        assert!((ActivationMode::Aggressive.degradation_factor() - 2.0).abs() < f64::EPSILON);
        assert!((ActivationMode::Cautious.population_risk_ceiling() - 0.8).abs() < f64::EPSILON);
        assert!((ActivationMode::Aggressive.population_risk_ceiling() - 0.9).abs() < f64::EPSILON);
        assert_eq!(ActivationMode::Experimental.offspring_factor(), 2);
        assert!(!ActivationMode::ObserveOnly.runs_operators());
    }
}
