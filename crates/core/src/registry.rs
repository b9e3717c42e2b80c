//! Host-owned registry tying engine, adapters and monitor together.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use geneva_shared::{GenevaError, GenevaId, GenevaResult, PerformanceRecord, GENEVA_VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterDecision, ConfigurationRecord, Evolver, IntegrationAdapter};
use crate::config::RuntimeConfig;
use crate::events::{EventBus, EvolutionEvent};
use crate::evolution::{Acknowledgment, ActivationMode, CategoryStatus, Chromosome, EvolutionEngine};
use crate::monitor::{AdapterStatus, Alert, DashboardSnapshot, Monitor};

/// How long background loops get to observe shutdown before being aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Engine and adapter state for one category, or for all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub acknowledgment: Acknowledgment,
    pub categories: Vec<CategoryStatus>,
    pub adapters: Vec<AdapterStatus>,
}

pub struct EvolutionRuntime {
    config: RuntimeConfig,
    events: Arc<EventBus>,
    engine: Arc<EvolutionEngine>,
    monitor: Arc<Monitor>,
    adapters: DashMap<String, Arc<IntegrationAdapter>>,
    shutdown: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EvolutionRuntime {
    pub fn new(config: RuntimeConfig) -> GenevaResult<Self> {
        config.validate()?;
        let events = Arc::new(EventBus::new(config.engine.event_capacity));
        let engine = Arc::new(EvolutionEngine::new(config.engine.clone(), events.clone())?);
        let monitor = Monitor::new(config.monitor.clone(), &events).with_source(engine.clone());

        info!(
            mode = %config.engine.default_mode,
            acknowledged = config.engine.acknowledge_experimental,
            "🧬 Evolution runtime created"
        );
        Ok(Self {
            config,
            events,
            engine,
            monitor: Arc::new(monitor),
            adapters: DashMap::new(),
            shutdown: Arc::new(Notify::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> Arc<EvolutionEngine> {
        self.engine.clone()
    }

    #[must_use]
    pub fn monitor(&self) -> Arc<Monitor> {
        self.monitor.clone()
    }

    pub fn adapter(&self, category: &str) -> GenevaResult<Arc<IntegrationAdapter>> {
        self.adapters
            .get(category)
            .map(|a| a.value().clone())
            .ok_or_else(|| GenevaError::UnknownCategory(category.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EvolutionEvent>> {
        self.events.subscribe()
    }

    /// Up to `limit` of the most recent events, newest last.
    pub async fn recent_events(&self, limit: usize) -> Vec<Arc<EvolutionEvent>> {
        self.events.recent(limit).await
    }

    // ── Category Lifecycle ──

    /// Create the category's population and its adapter.
    ///
    /// `Ok(false)` means nothing was created: evolution is disabled or the
    /// category already exists.
    pub async fn initialize(&self, category: &str, seed: &Chromosome, size: usize) -> GenevaResult<bool> {
        if !self.engine.initialize(category, seed, size)? {
            return Ok(false);
        }
        let evolver: Arc<dyn Evolver> = self.engine.clone();
        let adapter = Arc::new(IntegrationAdapter::new(
            category,
            self.config.adapter.clone(),
            evolver,
            self.events.clone(),
        )?);
        self.monitor.register(adapter.clone()).await;
        self.adapters.insert(category.to_string(), adapter);
        Ok(true)
    }

    /// Feed one execution record to the category's adapter.
    pub async fn record_telemetry(&self, category: &str, record: PerformanceRecord) -> GenevaResult<()> {
        let adapter = self.adapter(category)?;
        match adapter.record(record).await? {
            Some(AdapterDecision::Adopted { chromosome_id, .. }) => {
                debug!(category = %category, chromosome = %chromosome_id.short(), "Telemetry led to adoption");
            }
            Some(_) | None => {}
        }
        Ok(())
    }

    pub async fn current_configuration(&self, category: &str) -> GenevaResult<ConfigurationRecord> {
        Ok(self.adapter(category)?.current_configuration().await)
    }

    pub async fn status(&self, category: Option<&str>) -> GenevaResult<StatusReport> {
        let (categories, adapters) = match category {
            Some(name) => {
                let status = self.engine.status(name)?;
                let adapters = match self.adapters.get(name).map(|a| a.value().clone()) {
                    Some(adapter) => vec![adapter.status().await],
                    None => Vec::new(),
                };
                (vec![status], adapters)
            }
            None => {
                let all: Vec<Arc<IntegrationAdapter>> =
                    self.adapters.iter().map(|a| a.value().clone()).collect();
                let mut adapters = Vec::with_capacity(all.len());
                for adapter in all {
                    adapters.push(adapter.status().await);
                }
                adapters.sort_by(|a, b| a.category.cmp(&b.category));
                (self.engine.statuses(), adapters)
            }
        };
        Ok(StatusReport {
            version: GENEVA_VERSION.to_string(),
            generated_at: Utc::now(),
            acknowledgment: self.engine.acknowledgment().await,
            categories,
            adapters,
        })
    }

    // ── Mode Control ──

    /// Returns the mode the category was in before.
    pub async fn set_mode(&self, category: &str, mode: ActivationMode) -> GenevaResult<ActivationMode> {
        self.engine.set_mode(category, mode).await
    }

    pub async fn acknowledge_experimental(&self, granted: bool) -> GenevaResult<Vec<String>> {
        self.engine.acknowledge_experimental(granted).await
    }

    pub async fn set_baseline(&self, category: &str, value: f64) -> GenevaResult<()> {
        self.engine.set_baseline(category, value).await
    }

    // ── Alerts ──

    pub async fn list_open_alerts(&self, category: Option<&str>) -> Vec<Alert> {
        self.monitor.list_open_alerts(category).await
    }

    pub async fn resolve_alert(&self, id: GenevaId) -> bool {
        self.monitor.resolve_alert(id).await
    }

    /// Fresh monitoring pass.
    pub async fn dashboard(&self) -> DashboardSnapshot {
        self.monitor.poll_once().await
    }

    // ── Background Tasks ──

    /// Start the evolution scheduler and the monitor loop. A second call is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Evolution runtime already started");
            return;
        }
        tasks.push(self.engine.clone().spawn_scheduler(self.shutdown.clone()));
        tasks.push(self.monitor.clone().spawn(self.shutdown.clone()));
        info!("🚀 Evolution background tasks started");
    }

    /// Stop background loops, then every category worker.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        for mut task in tasks {
            loop {
                // a loop busy between selects misses notify_waiters, so repeat it
                self.shutdown.notify_waiters();
                match tokio::time::timeout(SHUTDOWN_POLL, &mut task).await {
                    Ok(_) => break,
                    Err(_) if tokio::time::Instant::now() < deadline => continue,
                    Err(_) => {
                        warn!("Background task did not stop in time, aborting");
                        task.abort();
                        break;
                    }
                }
            }
        }
        self.engine.shutdown().await;
        info!("🛑 Evolution runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> EvolutionRuntime {
        let mut config = RuntimeConfig::default();
        config.engine.rng_seed = Some(7);
        config.adapter.min_executions = 2;
        config.adapter.evolution_frequency = 2;
        config.adapter.evaluation_window = 2;
        EvolutionRuntime::new(config).unwrap()
    }

    fn good_record() -> PerformanceRecord {
        PerformanceRecord::scores(0.8, 0.7, 0.8, 0.9).with_outcome(true, 120.0, 0)
    }

    #[tokio::test]
    async fn test_unknown_category_is_the_hard_failure() {
        let rt = runtime();
        assert!(matches!(
            rt.record_telemetry("missing", good_record()).await,
            Err(GenevaError::UnknownCategory(_))
        ));
        assert!(matches!(
            rt.current_configuration("missing").await,
            Err(GenevaError::UnknownCategory(_))
        ));
        assert!(matches!(
            rt.status(Some("missing")).await,
            Err(GenevaError::UnknownCategory(_))
        ));
    }

    #[tokio::test]
    async fn test_initialize_creates_adapter_once() {
        let rt = runtime();
        let seed = Chromosome::seed("routing");
        assert!(rt.initialize("routing", &seed, 4).await.unwrap());
        assert!(!rt.initialize("routing", &seed, 4).await.unwrap());
        assert!(rt.adapter("routing").is_ok());

        let report = rt.status(None).await.unwrap();
        assert_eq!(report.categories.len(), 1);
        assert_eq!(report.adapters.len(), 1);
        rt.shutdown().await;
    }

    #[tokio::test]
    async fn test_default_configuration_before_evolution() {
        let rt = runtime();
        rt.initialize("routing", &Chromosome::seed("routing"), 4)
            .await
            .unwrap();
        let record = rt.current_configuration("routing").await.unwrap();
        assert_eq!(record.source, crate::adapter::ConfigurationSource::Default);
        assert!(record.chromosome_id.is_none());
        rt.shutdown().await;
    }

    #[tokio::test]
    async fn test_telemetry_drives_generation() {
        let rt = runtime();
        rt.initialize("routing", &Chromosome::seed("routing"), 4)
            .await
            .unwrap();
        rt.record_telemetry("routing", good_record()).await.unwrap();
        rt.record_telemetry("routing", good_record()).await.unwrap();

        let status = rt.status(Some("routing")).await.unwrap();
        assert_eq!(status.version, GENEVA_VERSION);
        assert_eq!(status.categories[0].generation, 2);
        assert_eq!(status.adapters[0].evolutions, 1);
        assert!(status.categories[0].best_evaluation.is_some());

        let events = rt.recent_events(16).await;
        assert!(events.iter().any(|e| matches!(
            e.data,
            crate::events::EvolutionEventData::GenerationCommitted { generation: 2, .. }
        )));
        rt.shutdown().await;
    }

    #[tokio::test]
    async fn test_aggressive_mode_requires_acknowledgment() {
        let rt = runtime();
        rt.initialize("routing", &Chromosome::seed("routing"), 4)
            .await
            .unwrap();
        assert!(matches!(
            rt.set_mode("routing", ActivationMode::Aggressive).await,
            Err(GenevaError::Configuration(_))
        ));

        rt.acknowledge_experimental(true).await.unwrap();
        let previous = rt
            .set_mode("routing", ActivationMode::Aggressive)
            .await
            .unwrap();
        assert_eq!(previous, ActivationMode::Cautious);

        let downgraded = rt.acknowledge_experimental(false).await.unwrap();
        assert_eq!(downgraded, vec!["routing".to_string()]);
        let report = rt.status(Some("routing")).await.unwrap();
        assert_eq!(report.categories[0].mode, ActivationMode::Cautious);
        rt.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let rt = runtime();
        rt.initialize("routing", &Chromosome::seed("routing"), 2)
            .await
            .unwrap();
        rt.start().await;
        rt.start().await;
        assert_eq!(rt.tasks.lock().await.len(), 2);
        rt.shutdown().await;
        assert!(rt.tasks.lock().await.is_empty());
        assert!(rt.engine().categories().is_empty());
    }
}
