use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Neutral value substituted for missing or malformed telemetry fields.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// One execution-performance measurement as reported by the host system.
///
/// Every field is optional: hosts report what they measure. Missing or
/// non-finite scores are replaced by [`NEUTRAL_SCORE`] during sanitization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub quality: Option<f64>,
    pub speed: Option<f64>,
    pub efficiency: Option<f64>,
    pub reliability: Option<f64>,
    pub success: Option<bool>,
    pub latency_ms: Option<f64>,
    pub error_count: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PerformanceRecord {
    /// Record carrying only the four score fields.
    #[must_use]
    pub fn scores(quality: f64, speed: f64, efficiency: f64, reliability: f64) -> Self {
        Self {
            quality: Some(quality),
            speed: Some(speed),
            efficiency: Some(efficiency),
            reliability: Some(reliability),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_outcome(mut self, success: bool, latency_ms: f64, error_count: u32) -> Self {
        self.success = Some(success);
        self.latency_ms = Some(latency_ms);
        self.error_count = Some(error_count);
        self
    }

    /// Replace missing or malformed fields with neutral values.
    ///
    /// Returns the sanitized record together with the names of substituted
    /// fields. Finite scores outside [0,1] are clamped, not substituted.
    #[must_use]
    pub fn sanitize(&self) -> (SanitizedRecord, Vec<&'static str>) {
        let mut substituted = Vec::new();
        let mut score = |name: &'static str, value: Option<f64>| match value {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => {
                substituted.push(name);
                NEUTRAL_SCORE
            }
        };

        let quality = score("quality", self.quality);
        let speed = score("speed", self.speed);
        let efficiency = score("efficiency", self.efficiency);
        let reliability = score("reliability", self.reliability);

        // success is a bool; missing means "unknown", scored neutral
        let success = match self.success {
            Some(true) => 1.0,
            Some(false) => 0.0,
            None => {
                substituted.push("success");
                NEUTRAL_SCORE
            }
        };

        let latency_ms = match self.latency_ms {
            Some(v) if v.is_finite() && v >= 0.0 => Some(v),
            Some(_) => {
                substituted.push("latency_ms");
                None
            }
            None => None,
        };

        let record = SanitizedRecord {
            quality,
            speed,
            efficiency,
            reliability,
            success,
            latency_ms,
            error_count: self.error_count.unwrap_or(0),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        (record, substituted)
    }
}

/// Telemetry after neutral substitution. All scores lie in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedRecord {
    pub quality: f64,
    pub speed: f64,
    pub efficiency: f64,
    pub reliability: f64,
    /// 1.0 success, 0.0 failure, 0.5 unknown.
    pub success: f64,
    pub latency_ms: Option<f64>,
    pub error_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_substitutes_missing_fields() {
        let record = PerformanceRecord::scores(0.8, 0.7, 0.8, 0.9);
        let (clean, substituted) = record.sanitize();
        assert!((clean.quality - 0.8).abs() < f64::EPSILON);
        assert!((clean.success - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert_eq!(substituted, vec!["success"]);
        assert_eq!(clean.error_count, 0);
        assert!(clean.latency_ms.is_none());
    }

    #[test]
    fn test_sanitize_handles_nan_and_out_of_range() {
        let record = PerformanceRecord {
            quality: Some(f64::NAN),
            speed: Some(1.7),
            efficiency: Some(-0.3),
            reliability: None,
            success: Some(false),
            latency_ms: Some(f64::INFINITY),
            error_count: Some(2),
            timestamp: None,
        };
        let (clean, substituted) = record.sanitize();
        assert!((clean.quality - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!((clean.speed - 1.0).abs() < f64::EPSILON);
        assert!(clean.efficiency.abs() < f64::EPSILON);
        assert!((clean.reliability - NEUTRAL_SCORE).abs() < f64::EPSILON);
        assert!(clean.success.abs() < f64::EPSILON);
        assert!(clean.latency_ms.is_none());
        assert!(substituted.contains(&"quality"));
        assert!(substituted.contains(&"reliability"));
        assert!(substituted.contains(&"latency_ms"));
        assert!(!substituted.contains(&"speed"));
    }
}
