//! Read-only watcher over engines and adapters.
//!
//! Each poll drains the event stream, pulls status from every registered
//! source, derives per-category metrics and raises or resolves alerts. The
//! monitor never mutates an engine.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use geneva_shared::GenevaId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{MonitorConfig, MAX_AUTO_RESOLVE_SECS};
use crate::events::{EventBus, EvolutionEvent, EvolutionEventData};
use crate::evolution::{ActivationMode, CategoryStatus};

/// Resolved alerts kept for inspection before the oldest are dropped.
const MAX_ALERT_HISTORY: usize = 1000;
/// Generations on each side of the trend comparison.
const TREND_WINDOW: usize = 5;

/// Anything the monitor can poll. Both methods default to "nothing to report".
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn category_statuses(&self) -> Vec<CategoryStatus> {
        Vec::new()
    }

    async fn adapter_statuses(&self) -> Vec<AdapterStatus> {
        Vec::new()
    }
}

/// Counters published by an integration adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterStatus {
    pub category: String,
    pub executions: u64,
    pub last_evolution_index: u64,
    pub buffered: usize,
    pub evolutions: u64,
    pub adopted: u64,
    pub rejected: u64,
    pub substituted_fields: u64,
    pub current_best: Option<GenevaId>,
    pub baseline_fitness: Option<f64>,
}

// ══════════════════════════════════════════════════════════════
// Alerts
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Safety,
    Performance,
    Configuration,
    Experimental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: GenevaId,
    pub category: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub last_triggered_at: DateTime<Utc>,
    /// How many times the rule fired while this alert stayed open.
    pub occurrences: u32,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Health across every open alert.
#[must_use]
pub fn aggregate_health(alerts: &[Alert]) -> HealthStatus {
    let open: Vec<&Alert> = alerts.iter().filter(|a| a.is_open()).collect();
    if open.iter().any(|a| a.severity == AlertSeverity::Critical) {
        return HealthStatus::Critical;
    }
    let high = open
        .iter()
        .filter(|a| a.severity == AlertSeverity::High)
        .count();
    if high > 2 {
        HealthStatus::Degraded
    } else if high > 0 || open.len() > 5 {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

// ══════════════════════════════════════════════════════════════
// Metrics
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub category: String,
    pub mode: ActivationMode,
    pub generation: u64,
    pub average_fitness: f64,
    pub best_fitness: f64,
    /// Standard deviation of the recent generation means.
    pub fitness_std_dev: f64,
    /// Mean of the last five generation means minus the five before them.
    pub trend: f64,
    pub mean_risk: f64,
    pub violations_last_hour: usize,
    pub rollback_count: u32,
    pub breakthrough_count: usize,
}

impl CategoryMetrics {
    #[must_use]
    pub fn from_status(status: &CategoryStatus, now: DateTime<Utc>) -> Self {
        let means: Vec<f64> = status
            .recent_generations
            .iter()
            .map(|s| s.mean_fitness)
            .collect();
        let average_fitness = means.last().copied().unwrap_or(status.mean_fitness);
        let hour_ago = now - Duration::hours(1);

        Self {
            category: status.category.clone(),
            mode: status.mode,
            generation: status.generation,
            average_fitness,
            best_fitness: status.best_fitness,
            fitness_std_dev: std_dev(&means),
            trend: trend(&means),
            mean_risk: status.mean_risk,
            violations_last_hour: status
                .violation_times
                .iter()
                .filter(|t| **t >= hour_ago)
                .count(),
            rollback_count: status.rollback_count,
            breakthrough_count: status.breakthrough_count,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn trend(values: &[f64]) -> f64 {
    if values.len() <= TREND_WINDOW {
        return 0.0;
    }
    let split = values.len() - TREND_WINDOW;
    let previous_start = split.saturating_sub(TREND_WINDOW);
    mean(&values[split..]) - mean(&values[previous_start..split])
}

// ══════════════════════════════════════════════════════════════
// Dashboard
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub health: HealthStatus,
    pub categories: Vec<CategoryMetrics>,
    pub adapters: Vec<AdapterStatus>,
    pub open_alerts: Vec<Alert>,
}

// ══════════════════════════════════════════════════════════════
// Monitor
// ══════════════════════════════════════════════════════════════

pub struct Monitor {
    config: MonitorConfig,
    sources: RwLock<Vec<Arc<dyn StatusSource>>>,
    alerts: RwLock<Vec<Alert>>,
    /// Held for a whole pass so concurrent polls do not interleave.
    events_rx: Mutex<broadcast::Receiver<Arc<EvolutionEvent>>>,
}

impl Monitor {
    #[must_use]
    pub fn new(config: MonitorConfig, events: &EventBus) -> Self {
        Self {
            config,
            sources: RwLock::new(Vec::new()),
            alerts: RwLock::new(Vec::new()),
            events_rx: Mutex::new(events.subscribe()),
        }
    }

    /// Register a source before the monitor is shared.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn StatusSource>) -> Self {
        self.sources.get_mut().push(source);
        self
    }

    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub async fn register(&self, source: Arc<dyn StatusSource>) {
        self.sources.write().await.push(source);
    }

    pub async fn poll_once(&self) -> DashboardSnapshot {
        self.evaluate_at(Utc::now()).await
    }

    /// One full monitoring pass as of `now`.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        let mut rx = self.events_rx.lock().await;

        let mut drained = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "⚠️ Monitor lagged behind the event stream");
                }
            }
        }
        for event in &drained {
            self.handle_event(event, now).await;
        }

        let sources = self.sources.read().await.clone();
        let mut statuses = Vec::new();
        let mut adapters = Vec::new();
        for source in &sources {
            statuses.extend(source.category_statuses().await);
            adapters.extend(source.adapter_statuses().await);
        }

        let mut categories = Vec::with_capacity(statuses.len());
        for status in &statuses {
            let metrics = CategoryMetrics::from_status(status, now);
            self.check_rules(status, &metrics, now).await;
            categories.push(metrics);
        }

        self.auto_resolve(now).await;

        let alerts = self.alerts.read().await;
        let snapshot = DashboardSnapshot {
            generated_at: now,
            health: aggregate_health(&alerts),
            categories,
            adapters,
            open_alerts: alerts.iter().filter(|a| a.is_open()).cloned().collect(),
        };
        drop(alerts);

        debug!(
            health = %snapshot.health,
            categories = snapshot.categories.len(),
            open_alerts = snapshot.open_alerts.len(),
            "Monitor pass complete"
        );
        snapshot
    }

    async fn handle_event(&self, event: &EvolutionEvent, now: DateTime<Utc>) {
        match &event.data {
            EvolutionEventData::SafetyViolation {
                category,
                baseline,
                observed,
                threshold,
            } => {
                let message = format!(
                    "Mean fitness {:.3} fell more than {:.3} below baseline {:.3}",
                    observed, threshold, baseline
                );
                self.raise(category, AlertKind::Safety, AlertSeverity::High, message, now)
                    .await;
            }
            EvolutionEventData::ValidationFailed { category, reason } => {
                let message = format!("Proposed population rejected: {}", reason);
                self.raise(
                    category,
                    AlertKind::Configuration,
                    AlertSeverity::Medium,
                    message,
                    now,
                )
                .await;
            }
            EvolutionEventData::CandidateRejected {
                category,
                chromosome_id,
                improvement,
            } => {
                let message = format!(
                    "Candidate {} rejected with improvement {:.3}",
                    chromosome_id.short(),
                    improvement
                );
                self.raise(
                    category,
                    AlertKind::Performance,
                    AlertSeverity::Low,
                    message,
                    now,
                )
                .await;
            }
            EvolutionEventData::Breakthrough {
                category,
                chromosome_id,
                fitness,
                experimental: true,
            } => {
                let message = format!(
                    "Experimental breakthrough {} reached fitness {:.3}",
                    chromosome_id.short(),
                    fitness
                );
                self.raise(
                    category,
                    AlertKind::Experimental,
                    AlertSeverity::Low,
                    message,
                    now,
                )
                .await;
            }
            _ => {}
        }
    }

    async fn check_rules(&self, status: &CategoryStatus, metrics: &CategoryMetrics, now: DateTime<Utc>) {
        let category = &status.category;

        if metrics.trend < self.config.trend_threshold {
            let message = format!(
                "Fitness trend {:.3} below threshold {:.3}",
                metrics.trend, self.config.trend_threshold
            );
            self.raise(category, AlertKind::Performance, AlertSeverity::Medium, message, now)
                .await;
        }

        let max = self.config.max_violations_per_hour;
        if metrics.violations_last_hour > max {
            let severity = if metrics.violations_last_hour > max * 2 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::High
            };
            let message = format!(
                "{} safety violations in the last hour (max {})",
                metrics.violations_last_hour, max
            );
            self.raise(category, AlertKind::Safety, severity, message, now).await;
        }

        if metrics.mean_risk > self.config.risk_threshold {
            let message = format!(
                "Mean risk tolerance {:.3} above {:.3}",
                metrics.mean_risk, self.config.risk_threshold
            );
            self.raise(
                category,
                AlertKind::Configuration,
                AlertSeverity::Medium,
                message,
                now,
            )
            .await;
        }

        let window = self.config.stagnation_window;
        if window > 0 && status.recent_generations.len() >= window {
            let recent = &status.recent_generations[status.recent_generations.len() - window..];
            let (lo, hi) = recent.iter().fold((f64::MAX, f64::MIN), |(lo, hi), s| {
                (lo.min(s.best_fitness), hi.max(s.best_fitness))
            });
            let spread = hi - lo;
            if spread < self.config.stagnation_epsilon {
                let message = format!(
                    "Best fitness stagnant over {} generations (spread {:.5})",
                    window, spread
                );
                self.raise(category, AlertKind::Performance, AlertSeverity::Low, message, now)
                    .await;
            }
        }
    }

    /// Open a new alert or merge into the open one with the same kind and category.
    async fn raise(
        &self,
        category: &str,
        kind: AlertKind,
        severity: AlertSeverity,
        message: String,
        now: DateTime<Utc>,
    ) {
        let mut alerts = self.alerts.write().await;
        if let Some(existing) = alerts
            .iter_mut()
            .find(|a| a.is_open() && a.kind == kind && a.category == category)
        {
            existing.severity = existing.severity.max(severity);
            existing.occurrences += 1;
            existing.message = message;
            existing.last_triggered_at = now;
            return;
        }

        warn!(
            category = %category,
            kind = ?kind,
            severity = ?severity,
            "🚨 {}",
            message
        );
        alerts.push(Alert {
            id: GenevaId::new(),
            category: category.to_string(),
            kind,
            severity,
            message,
            created_at: now,
            last_triggered_at: now,
            occurrences: 1,
            resolved: false,
            resolved_at: None,
        });

        if alerts.len() > MAX_ALERT_HISTORY {
            match alerts.iter().position(|a| !a.is_open()) {
                Some(idx) => {
                    alerts.remove(idx);
                }
                None => {
                    alerts.remove(0);
                }
            }
        }
    }

    async fn auto_resolve(&self, now: DateTime<Utc>) {
        let secs = self.config.auto_resolve_secs.min(MAX_AUTO_RESOLVE_SECS);
        let after = Duration::seconds(i64::try_from(secs).unwrap_or(0));
        let mut alerts = self.alerts.write().await;
        for alert in alerts.iter_mut().filter(|a| a.is_open()) {
            if alert.severity != AlertSeverity::Critical && now - alert.last_triggered_at >= after {
                alert.resolved = true;
                alert.resolved_at = Some(now);
                debug!(alert_id = %alert.id, category = %alert.category, "Alert auto-resolved");
            }
        }
    }

    pub async fn list_open_alerts(&self, category: Option<&str>) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| a.is_open() && category.map_or(true, |c| a.category == c))
            .cloned()
            .collect()
    }

    /// Returns false when no open alert has this id.
    pub async fn resolve_alert(&self, id: GenevaId) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == id && a.is_open()) {
            Some(alert) => {
                alert.resolved = true;
                alert.resolved_at = Some(Utc::now());
                info!(alert_id = %id, category = %alert.category, "✅ Alert resolved");
                true
            }
            None => false,
        }
    }

    /// Poll every `poll_interval_secs` until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, shutdown: Arc<Notify>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(self.config.poll_interval_secs));
            loop {
                tokio::select! {
                    () = shutdown.notified() => {
                        info!("Evolution monitor shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                }
            }
        })
    }
}
