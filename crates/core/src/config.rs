use anyhow::Context;
use geneva_shared::{GenevaError, GenevaResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::evolution::{ensure_mode_allowed, Acknowledgment, ActivationMode, FitnessWeights};

/// Longest auto-resolve delay accepted: thirty days.
pub const MAX_AUTO_RESOLVE_SECS: u64 = 30 * 24 * 3600;

/// Upper bound for the rollback snapshot ring.
pub const MAX_ROLLBACK_WINDOW: usize = 16;

/// Generation summaries carried in each published category status. The
/// monitor's stagnation rule can only look back this far.
pub const STATUS_SUMMARY_DEPTH: usize = 20;

// ══════════════════════════════════════════════════════════════
// Engine
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Mode newly initialized categories start in.
    pub default_mode: ActivationMode,
    pub acknowledge_experimental: bool,
    pub mutation_rate: f64,
    pub elite_fraction: f64,
    pub selection_fraction: f64,
    pub max_offspring_per_generation: usize,
    pub degradation_threshold: f64,
    /// Depth of the per-category snapshot ring (1..=16).
    pub rollback_window: usize,
    pub breakthrough_threshold: f64,
    /// Period of the background transition driven by the scheduler.
    pub evolution_interval_secs: u64,
    /// Fixed seed for reproducible runs; each category derives its own stream.
    pub rng_seed: Option<u64>,
    pub weights: FitnessWeights,
    pub mailbox_capacity: usize,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_mode: ActivationMode::Cautious,
            acknowledge_experimental: false,
            mutation_rate: 0.15,
            elite_fraction: 0.2,
            selection_fraction: 0.5,
            max_offspring_per_generation: 4,
            degradation_threshold: 0.1,
            rollback_window: 5,
            breakthrough_threshold: 0.85,
            evolution_interval_secs: 300,
            rng_seed: None,
            weights: FitnessWeights::default(),
            mailbox_capacity: 64,
            event_capacity: 1024,
        }
    }
}

fn unit_interval(name: &str, value: f64) -> GenevaResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(GenevaError::Configuration(format!(
            "{} must be in [0.0, 1.0] and finite, got {}",
            name, value
        )));
    }
    Ok(())
}

fn open_fraction(name: &str, value: f64) -> GenevaResult<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(GenevaError::Configuration(format!(
            "{} must be in (0.0, 1.0], got {}",
            name, value
        )));
    }
    Ok(())
}

fn non_zero(name: &str, value: usize) -> GenevaResult<()> {
    if value == 0 {
        return Err(GenevaError::Configuration(format!("{} must be > 0", name)));
    }
    Ok(())
}

impl EngineConfig {
    #[must_use]
    pub fn acknowledgment(&self) -> Acknowledgment {
        Acknowledgment::from_flag(self.acknowledge_experimental)
    }

    pub fn validate(&self) -> GenevaResult<()> {
        ensure_mode_allowed(self.default_mode, &self.acknowledgment())?;
        unit_interval("mutation_rate", self.mutation_rate)?;
        unit_interval("degradation_threshold", self.degradation_threshold)?;
        unit_interval("breakthrough_threshold", self.breakthrough_threshold)?;
        open_fraction("elite_fraction", self.elite_fraction)?;
        open_fraction("selection_fraction", self.selection_fraction)?;
        if self.elite_fraction > self.selection_fraction {
            return Err(GenevaError::Configuration(format!(
                "elite_fraction ({}) must not exceed selection_fraction ({})",
                self.elite_fraction, self.selection_fraction
            )));
        }
        non_zero("max_offspring_per_generation", self.max_offspring_per_generation)?;
        if self.rollback_window == 0 || self.rollback_window > MAX_ROLLBACK_WINDOW {
            return Err(GenevaError::Configuration(format!(
                "rollback_window must be between 1 and {} (got {})",
                MAX_ROLLBACK_WINDOW, self.rollback_window
            )));
        }
        if self.evolution_interval_secs == 0 {
            return Err(GenevaError::Configuration(
                "evolution_interval_secs must be > 0".into(),
            ));
        }
        non_zero("mailbox_capacity", self.mailbox_capacity)?;
        non_zero("event_capacity", self.event_capacity)?;
        self.weights.validate()
    }
}

// ══════════════════════════════════════════════════════════════
// Adapter
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Records buffered before the first transition may run.
    pub min_executions: usize,
    /// Executions between two triggered transitions.
    pub evolution_frequency: u64,
    pub buffer_capacity: usize,
    /// Most recent records averaged into one telemetry window.
    pub evaluation_window: usize,
    /// Largest fitness drop versus recent quality a candidate may show and
    /// still be adopted.
    pub degradation_tolerance: f64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            min_executions: 10,
            evolution_frequency: 20,
            buffer_capacity: 100,
            evaluation_window: 10,
            degradation_tolerance: 0.1,
        }
    }
}

impl AdapterConfig {
    pub fn validate(&self) -> GenevaResult<()> {
        non_zero("min_executions", self.min_executions)?;
        if self.evolution_frequency == 0 {
            return Err(GenevaError::Configuration(
                "evolution_frequency must be > 0".into(),
            ));
        }
        non_zero("buffer_capacity", self.buffer_capacity)?;
        non_zero("evaluation_window", self.evaluation_window)?;
        if self.evaluation_window > self.buffer_capacity {
            return Err(GenevaError::Configuration(format!(
                "evaluation_window ({}) must not exceed buffer_capacity ({})",
                self.evaluation_window, self.buffer_capacity
            )));
        }
        if self.min_executions > self.buffer_capacity {
            return Err(GenevaError::Configuration(format!(
                "min_executions ({}) must not exceed buffer_capacity ({})",
                self.min_executions, self.buffer_capacity
            )));
        }
        unit_interval("degradation_tolerance", self.degradation_tolerance)
    }
}

// ══════════════════════════════════════════════════════════════
// Monitor
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    /// Alert when the short-window trend falls below this (negative) value.
    pub trend_threshold: f64,
    /// Alert when more violations than this occurred in the last hour.
    pub max_violations_per_hour: usize,
    pub risk_threshold: f64,
    /// Alert when the spread of recent best fitness is below this.
    pub stagnation_epsilon: f64,
    /// Generations considered for the stagnation rule.
    pub stagnation_window: usize,
    /// Open non-critical alerts resolve after this long without re-triggering.
    pub auto_resolve_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            trend_threshold: -0.05,
            max_violations_per_hour: 3,
            risk_threshold: 0.6,
            stagnation_epsilon: 0.001,
            stagnation_window: 10,
            auto_resolve_secs: 3600,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> GenevaResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(GenevaError::Configuration(
                "poll_interval_secs must be > 0".into(),
            ));
        }
        if !self.trend_threshold.is_finite() || !(-1.0..=0.0).contains(&self.trend_threshold) {
            return Err(GenevaError::Configuration(format!(
                "trend_threshold must be in [-1.0, 0.0], got {}",
                self.trend_threshold
            )));
        }
        unit_interval("risk_threshold", self.risk_threshold)?;
        unit_interval("stagnation_epsilon", self.stagnation_epsilon)?;
        if self.stagnation_window < 2 || self.stagnation_window > STATUS_SUMMARY_DEPTH {
            return Err(GenevaError::Configuration(format!(
                "stagnation_window must be between 2 and {} (got {})",
                STATUS_SUMMARY_DEPTH, self.stagnation_window
            )));
        }
        if self.auto_resolve_secs == 0 || self.auto_resolve_secs > MAX_AUTO_RESOLVE_SECS {
            return Err(GenevaError::Configuration(format!(
                "auto_resolve_secs must be in 1..={} (got {})",
                MAX_AUTO_RESOLVE_SECS, self.auto_resolve_secs
            )));
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════
// Runtime
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub adapter: AdapterConfig,
    pub monitor: MonitorConfig,
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", name)),
        Err(_) => Ok(default),
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> GenevaResult<()> {
        self.engine.validate()?;
        self.adapter.validate()?;
        self.monitor.validate()
    }

    /// Build the configuration from `GENEVA_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let engine = EngineConfig {
            default_mode: env_or("GENEVA_MODE", defaults.engine.default_mode)?,
            acknowledge_experimental: env_or(
                "GENEVA_ACKNOWLEDGE_EXPERIMENTAL",
                defaults.engine.acknowledge_experimental,
            )?,
            mutation_rate: env_or("GENEVA_MUTATION_RATE", defaults.engine.mutation_rate)?,
            elite_fraction: env_or("GENEVA_ELITE_FRACTION", defaults.engine.elite_fraction)?,
            selection_fraction: env_or(
                "GENEVA_SELECTION_FRACTION",
                defaults.engine.selection_fraction,
            )?,
            max_offspring_per_generation: env_or(
                "GENEVA_MAX_OFFSPRING",
                defaults.engine.max_offspring_per_generation,
            )?,
            degradation_threshold: env_or(
                "GENEVA_DEGRADATION_THRESHOLD",
                defaults.engine.degradation_threshold,
            )?,
            rollback_window: env_or("GENEVA_ROLLBACK_WINDOW", defaults.engine.rollback_window)?,
            breakthrough_threshold: env_or(
                "GENEVA_BREAKTHROUGH_THRESHOLD",
                defaults.engine.breakthrough_threshold,
            )?,
            evolution_interval_secs: env_or(
                "GENEVA_EVOLUTION_INTERVAL_SECS",
                defaults.engine.evolution_interval_secs,
            )?,
            rng_seed: match env::var("GENEVA_RNG_SEED") {
                Ok(raw) => Some(
                    raw.trim()
                        .parse::<u64>()
                        .context("Failed to parse GENEVA_RNG_SEED")?,
                ),
                Err(_) => None,
            },
            ..defaults.engine
        };

        let adapter = AdapterConfig {
            min_executions: env_or("GENEVA_MIN_EXECUTIONS", defaults.adapter.min_executions)?,
            evolution_frequency: env_or(
                "GENEVA_EVOLUTION_FREQUENCY",
                defaults.adapter.evolution_frequency,
            )?,
            buffer_capacity: env_or("GENEVA_TELEMETRY_BUFFER", defaults.adapter.buffer_capacity)?,
            ..defaults.adapter
        };

        let monitor = MonitorConfig {
            poll_interval_secs: env_or(
                "GENEVA_MONITOR_INTERVAL_SECS",
                defaults.monitor.poll_interval_secs,
            )?,
            ..defaults.monitor
        };

        if engine.acknowledge_experimental {
            tracing::warn!("Experimental evolution modes acknowledged via GENEVA_ACKNOWLEDGE_EXPERIMENTAL");
        }

        let config = Self {
            engine,
            adapter,
            monitor,
        };
        config.validate()?;
        Ok(config)
    }
}
