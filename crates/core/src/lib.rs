//! Genetic optimizer for the configuration of a live multi-agent system.
//!
//! The host builds one [`EvolutionRuntime`], initializes a category per agent
//! group, feeds execution records in and reads recommended configurations
//! out. Everything else runs on background tasks owned by the runtime.

pub mod adapter;
pub mod config;
pub mod events;
pub mod evolution;
pub mod monitor;
pub mod registry;

pub use adapter::{
    AdapterDecision, ConfigurationRecord, ConfigurationSource, Evolver, IntegrationAdapter,
};
pub use config::{AdapterConfig, EngineConfig, MonitorConfig, RuntimeConfig};
pub use events::{EventBus, EvolutionEvent, EvolutionEventData};
pub use evolution::{
    ensure_mode_allowed, Acknowledgment, ActivationMode, CategoryStatus, Chromosome,
    EvolutionEngine, EvolutionOutcome, TelemetryWindow,
};
pub use monitor::{
    AdapterStatus, Alert, AlertKind, AlertSeverity, CategoryMetrics, DashboardSnapshot,
    HealthStatus, Monitor, StatusSource,
};
pub use registry::{EvolutionRuntime, StatusReport};

pub use geneva_shared::{GenevaError, GenevaId, GenevaResult, PerformanceRecord};
