use chrono::{DateTime, Utc};
use geneva_shared::{GenevaError, GenevaId, GenevaResult, SanitizedRecord};
use serde::{Deserialize, Serialize};

use super::chromosome::Chromosome;

/// Share of the overall score taken by experimental components when active.
const EXPERIMENTAL_SHARE: f64 = 0.1;

/// Sample count at which an evaluation reaches full confidence.
const FULL_CONFIDENCE_SAMPLES: f64 = 10.0;

// ══════════════════════════════════════════════════════════════
// Telemetry Window
// ══════════════════════════════════════════════════════════════

/// Averaged telemetry that every chromosome is scored against in one
/// transition. Scores lie in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryWindow {
    pub quality: f64,
    pub speed: f64,
    pub efficiency: f64,
    pub reliability: f64,
    pub success_rate: f64,
    /// Errors per execution, clamped to 1.
    pub error_rate: f64,
    pub avg_latency_ms: Option<f64>,
    pub sample_count: usize,
}

impl Default for TelemetryWindow {
    /// Neutral window used when no telemetry is available.
    fn default() -> Self {
        Self {
            quality: 0.5,
            speed: 0.5,
            efficiency: 0.5,
            reliability: 0.5,
            success_rate: 0.5,
            error_rate: 0.0,
            avg_latency_ms: None,
            sample_count: 0,
        }
    }
}

impl TelemetryWindow {
    /// Average a slice of sanitized records. Empty input yields the neutral window.
    #[must_use]
    pub fn from_records(records: &[SanitizedRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let n = records.len() as f64;
        let mean = |f: fn(&SanitizedRecord) -> f64| records.iter().map(f).sum::<f64>() / n;
        let latencies: Vec<f64> = records.iter().filter_map(|r| r.latency_ms).collect();
        let avg_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        };

        Self {
            quality: mean(|r| r.quality),
            speed: mean(|r| r.speed),
            efficiency: mean(|r| r.efficiency),
            reliability: mean(|r| r.reliability),
            success_rate: mean(|r| r.success),
            error_rate: mean(|r| f64::from(r.error_count)).clamp(0.0, 1.0),
            avg_latency_ms,
            sample_count: records.len(),
        }
    }

    /// Single-record window.
    #[must_use]
    pub fn from_record(record: &SanitizedRecord) -> Self {
        Self::from_records(std::slice::from_ref(record))
    }
}

// ══════════════════════════════════════════════════════════════
// Fitness Components & Weights
// ══════════════════════════════════════════════════════════════

/// The eleven named fitness components, each in [0,1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessComponents {
    pub quality: f64,
    pub speed: f64,
    pub efficiency: f64,
    pub reliability: f64,
    pub collaboration: f64,
    pub adaptability: f64,
    pub innovation: f64,
    pub stability: f64,
    pub risk: f64,
    pub memory_utilization: f64,
    pub pattern_recognition: f64,
}

impl FitnessComponents {
    #[must_use]
    pub fn as_array(&self) -> [(&'static str, f64); 11] {
        [
            ("quality", self.quality),
            ("speed", self.speed),
            ("efficiency", self.efficiency),
            ("reliability", self.reliability),
            ("collaboration", self.collaboration),
            ("adaptability", self.adaptability),
            ("innovation", self.innovation),
            ("stability", self.stability),
            ("risk", self.risk),
            ("memory_utilization", self.memory_utilization),
            ("pattern_recognition", self.pattern_recognition),
        ]
    }
}

/// Components only scored for experimental chromosomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalComponents {
    pub emergence: f64,
    pub cooperation: f64,
    pub exploration: f64,
}

impl ExperimentalComponents {
    #[must_use]
    pub fn mean(&self) -> f64 {
        (self.emergence + self.cooperation + self.exploration) / 3.0
    }
}

/// Per-component weights for the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessWeights {
    pub quality: f64,
    pub speed: f64,
    pub efficiency: f64,
    pub reliability: f64,
    pub collaboration: f64,
    pub adaptability: f64,
    pub innovation: f64,
    pub stability: f64,
    pub risk: f64,
    pub memory_utilization: f64,
    pub pattern_recognition: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            quality: 0.20,
            speed: 0.12,
            efficiency: 0.12,
            reliability: 0.15,
            collaboration: 0.08,
            adaptability: 0.07,
            innovation: 0.05,
            stability: 0.08,
            risk: 0.05,
            memory_utilization: 0.04,
            pattern_recognition: 0.04,
        }
    }
}

impl FitnessWeights {
    fn as_array(&self) -> [(&'static str, f64); 11] {
        [
            ("quality", self.quality),
            ("speed", self.speed),
            ("efficiency", self.efficiency),
            ("reliability", self.reliability),
            ("collaboration", self.collaboration),
            ("adaptability", self.adaptability),
            ("innovation", self.innovation),
            ("stability", self.stability),
            ("risk", self.risk),
            ("memory_utilization", self.memory_utilization),
            ("pattern_recognition", self.pattern_recognition),
        ]
    }

    pub fn validate(&self) -> GenevaResult<()> {
        let fields = self.as_array();
        for (name, val) in fields {
            if !val.is_finite() || val < 0.0 {
                return Err(GenevaError::Configuration(format!(
                    "{} weight must be >= 0 and finite, got {}",
                    name, val
                )));
            }
        }
        let sum: f64 = fields.iter().map(|(_, v)| v).sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(GenevaError::Configuration(format!(
                "fitness weights must sum to ~1.0, got {:.4}",
                sum
            )));
        }
        Ok(())
    }
}

/// One scored chromosome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessEvaluation {
    pub chromosome_id: GenevaId,
    pub components: FitnessComponents,
    pub experimental: Option<ExperimentalComponents>,
    pub overall: f64,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

// ══════════════════════════════════════════════════════════════
// Evaluation
// ══════════════════════════════════════════════════════════════

fn unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Score `c` against the telemetry window `t`.
#[must_use]
pub fn evaluate(c: &Chromosome, t: &TelemetryWindow, weights: &FitnessWeights) -> FitnessEvaluation {
    let g = &c.genes;

    let categorical =
        (c.coordination.synergy() + c.communication.synergy() + c.consensus.synergy()) / 3.0;
    let role_mean = c.mean_role_gene().unwrap_or(0.5);

    let components = FitnessComponents {
        quality: unit(t.quality * (0.8 + 0.2 * g.quality_threshold)),
        speed: unit(t.speed * (0.8 + 0.2 * g.speed_preference)),
        efficiency: unit(t.efficiency * (1.0 - 0.2 * (g.memory_utilization - 0.6).abs())),
        reliability: unit(
            (0.7 * t.reliability + 0.3 * t.success_rate) * (1.0 - 0.5 * t.error_rate),
        ),
        collaboration: unit(0.4 * categorical + 0.6 * role_mean),
        adaptability: unit((1.0 - (g.learning_rate - 0.3).abs()) * (0.5 + 0.5 * t.success_rate)),
        innovation: unit(
            (0.6 * g.pattern_sensitivity + 0.4 * g.risk_tolerance) * (0.5 + 0.5 * t.quality),
        ),
        stability: unit((1.0 - 0.5 * g.risk_tolerance) * (1.0 - t.error_rate)),
        risk: unit(1.0 - g.risk_tolerance),
        memory_utilization: unit(1.0 - (g.memory_utilization - 0.7).abs() / 0.7),
        pattern_recognition: unit(g.pattern_sensitivity * (0.5 + 0.5 * t.quality)),
    };

    let weighted: f64 = components
        .as_array()
        .iter()
        .zip(weights.as_array())
        .map(|((_, score), (_, weight))| score * weight)
        .sum();

    let experimental = c.experimental.then(|| {
        let x = &c.experimental_genes;
        ExperimentalComponents {
            emergence: unit(x.emergence_factor * t.quality),
            cooperation: unit(x.cooperation_bias * components.collaboration),
            exploration: unit(x.exploration_drive * (1.0 - t.error_rate)),
        }
    });

    let overall = match &experimental {
        Some(x) => (1.0 - EXPERIMENTAL_SHARE) * weighted + EXPERIMENTAL_SHARE * x.mean(),
        None => weighted,
    };

    FitnessEvaluation {
        chromosome_id: c.id,
        components,
        experimental,
        overall: unit(overall),
        confidence: (t.sample_count as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::chromosome::ExperimentalGenes;
    use geneva_shared::PerformanceRecord;

    fn window(q: f64, s: f64, e: f64, r: f64) -> TelemetryWindow {
        let (record, _) = PerformanceRecord::scores(q, s, e, r)
            .with_outcome(true, 120.0, 0)
            .sanitize();
        TelemetryWindow::from_record(&record)
    }

    #[test]
    fn test_default_weights_are_valid() {
        FitnessWeights::default().validate().unwrap();
    }

    #[test]
    fn test_weights_reject_bad_sum() {
        let weights = FitnessWeights {
            quality: 0.9,
            ..FitnessWeights::default()
        };
        assert!(matches!(weights.validate(), Err(GenevaError::Configuration(_))));
    }

    #[test]
    fn test_weights_reject_negative() {
        let weights = FitnessWeights {
            risk: -0.05,
            quality: 0.30,
            ..FitnessWeights::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_components_in_unit_interval() {
        let c = Chromosome::seed("routing").with_role("planner", &[("depth", 0.9)]);
        let eval = evaluate(&c, &window(1.0, 1.0, 1.0, 1.0), &FitnessWeights::default());
        for (name, v) in eval.components.as_array() {
            assert!((0.0..=1.0).contains(&v), "{} = {}", name, v);
        }
        assert!(eval.overall > 0.0 && eval.overall <= 1.0);
        assert!(eval.experimental.is_none());
    }

    #[test]
    fn test_better_telemetry_scores_higher() {
        let c = Chromosome::seed("routing");
        let weights = FitnessWeights::default();
        let good = evaluate(&c, &window(0.9, 0.9, 0.9, 0.9), &weights);
        let bad = evaluate(&c, &window(0.1, 0.1, 0.1, 0.1), &weights);
        assert!(good.overall > bad.overall + 0.3);
    }

    #[test]
    fn test_zero_telemetry_scores_low() {
        let c = Chromosome::seed("routing");
        let (record, _) = PerformanceRecord::scores(0.0, 0.0, 0.0, 0.0)
            .with_outcome(false, 5000.0, 3)
            .sanitize();
        let eval = evaluate(&c, &TelemetryWindow::from_record(&record), &FitnessWeights::default());
        assert!(eval.overall < 0.25, "overall = {}", eval.overall);
    }

    #[test]
    fn test_experimental_components_only_when_flagged() {
        let weights = FitnessWeights::default();
        let t = window(0.8, 0.8, 0.8, 0.8);
        let plain = Chromosome::seed("routing");
        let flagged = plain.clone().with_experimental(ExperimentalGenes::default());
        assert!(evaluate(&plain, &t, &weights).experimental.is_none());
        let eval = evaluate(&flagged, &t, &weights);
        let x = eval.experimental.unwrap();
        assert!((x.emergence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_scales_with_samples() {
        let c = Chromosome::seed("routing");
        let weights = FitnessWeights::default();
        let mut t = window(0.5, 0.5, 0.5, 0.5);
        assert!((evaluate(&c, &t, &weights).confidence - 0.1).abs() < 1e-9);
        t.sample_count = 40;
        assert!((evaluate(&c, &t, &weights).confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_averages_and_error_rate() {
        let (a, _) = PerformanceRecord::scores(1.0, 0.0, 0.5, 0.5)
            .with_outcome(true, 100.0, 0)
            .sanitize();
        let (b, _) = PerformanceRecord::scores(0.0, 1.0, 0.5, 0.5)
            .with_outcome(false, 300.0, 4)
            .sanitize();
        let w = TelemetryWindow::from_records(&[a, b]);
        assert!((w.quality - 0.5).abs() < 1e-9);
        assert!((w.success_rate - 0.5).abs() < 1e-9);
        assert!((w.error_rate - 1.0).abs() < 1e-9);
        assert_eq!(w.avg_latency_ms, Some(200.0));
        assert_eq!(w.sample_count, 2);
    }
}
