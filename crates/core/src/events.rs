use chrono::{DateTime, Utc};
use geneva_shared::GenevaId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::evolution::ActivationMode;

/// Something observable that happened in an engine or adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEvent {
    pub id: GenevaId,
    pub timestamp: DateTime<Utc>,
    pub data: EvolutionEventData,
}

impl EvolutionEvent {
    #[must_use]
    pub fn new(data: EvolutionEventData) -> Self {
        Self {
            id: GenevaId::new(),
            timestamp: Utc::now(),
            data,
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        self.data.category()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum EvolutionEventData {
    GenerationCommitted {
        category: String,
        generation: u64,
        mean_fitness: f64,
        best_fitness: f64,
        offspring: usize,
    },
    RolledBack {
        category: String,
        generation: u64,
        restored_generation: u64,
        reason: String,
    },
    SafetyViolation {
        category: String,
        baseline: f64,
        observed: f64,
        threshold: f64,
    },
    ValidationFailed {
        category: String,
        reason: String,
    },
    Breakthrough {
        category: String,
        chromosome_id: GenevaId,
        fitness: f64,
        experimental: bool,
    },
    PatternDetected {
        category: String,
        generation: u64,
        genes: Vec<String>,
    },
    ModeChanged {
        category: String,
        from: ActivationMode,
        to: ActivationMode,
    },
    CandidateAdopted {
        category: String,
        chromosome_id: GenevaId,
        improvement: f64,
        execution: u64,
    },
    CandidateRejected {
        category: String,
        chromosome_id: GenevaId,
        improvement: f64,
    },
}

impl EvolutionEventData {
    /// Snake-case name of the variant, as used in logs and tables.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerationCommitted { .. } => "generation_committed",
            Self::RolledBack { .. } => "rolled_back",
            Self::SafetyViolation { .. } => "safety_violation",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::Breakthrough { .. } => "breakthrough",
            Self::PatternDetected { .. } => "pattern_detected",
            Self::ModeChanged { .. } => "mode_changed",
            Self::CandidateAdopted { .. } => "candidate_adopted",
            Self::CandidateRejected { .. } => "candidate_rejected",
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::GenerationCommitted { category, .. }
            | Self::RolledBack { category, .. }
            | Self::SafetyViolation { category, .. }
            | Self::ValidationFailed { category, .. }
            | Self::Breakthrough { category, .. }
            | Self::PatternDetected { category, .. }
            | Self::ModeChanged { category, .. }
            | Self::CandidateAdopted { category, .. }
            | Self::CandidateRejected { category, .. } => category,
        }
    }
}

/// Broadcast fan-out plus a bounded replay history.
pub struct EventBus {
    tx: broadcast::Sender<Arc<EvolutionEvent>>,
    history: RwLock<VecDeque<Arc<EvolutionEvent>>>,
    max_history_size: usize,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            max_history_size: capacity,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EvolutionEvent>> {
        self.tx.subscribe()
    }

    /// Publish to every subscriber. Having none is not an error.
    pub async fn publish(&self, data: EvolutionEventData) {
        let event = Arc::new(EvolutionEvent::new(data));
        {
            let mut history = self.history.write().await;
            history.push_back(event.clone());
            while history.len() > self.max_history_size {
                history.pop_front();
            }
        }
        if self.tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    /// Most recent events, newest last.
    pub async fn recent(&self, limit: usize) -> Vec<Arc<EvolutionEvent>> {
        let history = self.history.read().await;
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}
