use chrono::{DateTime, Utc};
use geneva_shared::GenevaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hard ceiling on any individual chromosome's risk tolerance.
pub const MAX_RISK_TOLERANCE: f64 = 0.8;

// ══════════════════════════════════════════════════════════════
// Categorical Genes
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStyle {
    Hierarchical,
    Collaborative,
    Autonomous,
    Hybrid,
}

impl CoordinationStyle {
    pub const ALL: [Self; 4] = [
        Self::Hierarchical,
        Self::Collaborative,
        Self::Autonomous,
        Self::Hybrid,
    ];

    /// How strongly this style favours agent-to-agent collaboration, in [0,1].
    #[must_use]
    pub fn synergy(&self) -> f64 {
        match self {
            Self::Hierarchical => 0.5,
            Self::Collaborative => 0.9,
            Self::Autonomous => 0.3,
            Self::Hybrid => 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationPattern {
    Broadcast,
    PeerToPeer,
    HubAndSpoke,
    Pipeline,
}

impl CommunicationPattern {
    pub const ALL: [Self; 4] = [
        Self::Broadcast,
        Self::PeerToPeer,
        Self::HubAndSpoke,
        Self::Pipeline,
    ];

    #[must_use]
    pub fn synergy(&self) -> f64 {
        match self {
            Self::Broadcast => 0.6,
            Self::PeerToPeer => 0.8,
            Self::HubAndSpoke => 0.5,
            Self::Pipeline => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMechanism {
    Majority,
    Weighted,
    Unanimous,
    LeaderDecides,
}

impl ConsensusMechanism {
    pub const ALL: [Self; 4] = [
        Self::Majority,
        Self::Weighted,
        Self::Unanimous,
        Self::LeaderDecides,
    ];

    #[must_use]
    pub fn synergy(&self) -> f64 {
        match self {
            Self::Majority => 0.6,
            Self::Weighted => 0.8,
            Self::Unanimous => 0.7,
            Self::LeaderDecides => 0.3,
        }
    }
}

macro_rules! impl_snake_names {
    ($ty:ty { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_snake_names!(CoordinationStyle {
    Hierarchical => "hierarchical",
    Collaborative => "collaborative",
    Autonomous => "autonomous",
    Hybrid => "hybrid",
});
impl_snake_names!(CommunicationPattern {
    Broadcast => "broadcast",
    PeerToPeer => "peer_to_peer",
    HubAndSpoke => "hub_and_spoke",
    Pipeline => "pipeline",
});
impl_snake_names!(ConsensusMechanism {
    Majority => "majority",
    Weighted => "weighted",
    Unanimous => "unanimous",
    LeaderDecides => "leader_decides",
});

// ══════════════════════════════════════════════════════════════
// Scalar Genes
// ══════════════════════════════════════════════════════════════

/// Top-level tunable parameters. Every value lies in [0,1];
/// `risk_tolerance` is further capped at [`MAX_RISK_TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarGenes {
    pub quality_threshold: f64,
    pub speed_preference: f64,
    pub risk_tolerance: f64,
    pub learning_rate: f64,
    pub memory_utilization: f64,
    pub pattern_sensitivity: f64,
}

impl Default for ScalarGenes {
    fn default() -> Self {
        Self {
            quality_threshold: 0.7,
            speed_preference: 0.5,
            risk_tolerance: 0.3,
            learning_rate: 0.3,
            memory_utilization: 0.6,
            pattern_sensitivity: 0.5,
        }
    }
}

impl ScalarGenes {
    pub const NAMES: [&'static str; 6] = [
        "quality_threshold",
        "speed_preference",
        "risk_tolerance",
        "learning_rate",
        "memory_utilization",
        "pattern_sensitivity",
    ];

    #[must_use]
    pub fn values(&self) -> [(&'static str, f64); 6] {
        [
            ("quality_threshold", self.quality_threshold),
            ("speed_preference", self.speed_preference),
            ("risk_tolerance", self.risk_tolerance),
            ("learning_rate", self.learning_rate),
            ("memory_utilization", self.memory_utilization),
            ("pattern_sensitivity", self.pattern_sensitivity),
        ]
    }

    pub fn values_mut(&mut self) -> [(&'static str, &mut f64); 6] {
        [
            ("quality_threshold", &mut self.quality_threshold),
            ("speed_preference", &mut self.speed_preference),
            ("risk_tolerance", &mut self.risk_tolerance),
            ("learning_rate", &mut self.learning_rate),
            ("memory_utilization", &mut self.memory_utilization),
            ("pattern_sensitivity", &mut self.pattern_sensitivity),
        ]
    }
}

/// Genes that only influence fitness when the chromosome is experimental.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalGenes {
    pub emergence_factor: f64,
    pub cooperation_bias: f64,
    pub exploration_drive: f64,
}

impl Default for ExperimentalGenes {
    fn default() -> Self {
        Self {
            emergence_factor: 0.5,
            cooperation_bias: 0.5,
            exploration_drive: 0.5,
        }
    }
}

impl ExperimentalGenes {
    #[must_use]
    pub fn values(&self) -> [(&'static str, f64); 3] {
        [
            ("emergence_factor", self.emergence_factor),
            ("cooperation_bias", self.cooperation_bias),
            ("exploration_drive", self.exploration_drive),
        ]
    }

    pub fn values_mut(&mut self) -> [(&'static str, &mut f64); 3] {
        [
            ("emergence_factor", &mut self.emergence_factor),
            ("cooperation_bias", &mut self.cooperation_bias),
            ("exploration_drive", &mut self.exploration_drive),
        ]
    }
}

// ══════════════════════════════════════════════════════════════
// Chromosome
// ══════════════════════════════════════════════════════════════

/// One candidate configuration for a tunable category.
///
/// Created by `initialize` or by a genetic operator and immutable afterwards,
/// except for `fitness` and `mutations`, which the engine writes once per
/// generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chromosome {
    pub id: GenevaId,
    pub category: String,
    pub generation: u64,
    pub roles: Vec<String>,
    /// role -> gene name -> value in [0,1]
    pub role_genes: BTreeMap<String, BTreeMap<String, f64>>,
    pub coordination: CoordinationStyle,
    pub communication: CommunicationPattern,
    pub consensus: ConsensusMechanism,
    pub genes: ScalarGenes,
    pub experimental: bool,
    pub experimental_genes: ExperimentalGenes,
    pub fitness: f64,
    pub parents: Vec<GenevaId>,
    pub created_at: DateTime<Utc>,
    pub mutations: u32,
}

impl Chromosome {
    /// Generation-zero seed with default genes and no roles.
    #[must_use]
    pub fn seed(category: &str) -> Self {
        Self {
            id: GenevaId::new(),
            category: category.to_string(),
            generation: 0,
            roles: Vec::new(),
            role_genes: BTreeMap::new(),
            coordination: CoordinationStyle::Hybrid,
            communication: CommunicationPattern::PeerToPeer,
            consensus: ConsensusMechanism::Weighted,
            genes: ScalarGenes::default(),
            experimental: false,
            experimental_genes: ExperimentalGenes::default(),
            fitness: 0.0,
            parents: Vec::new(),
            created_at: Utc::now(),
            mutations: 0,
        }
    }

    /// Add a role with its numeric genes. Values are clamped to [0,1].
    #[must_use]
    pub fn with_role(mut self, role: &str, genes: &[(&str, f64)]) -> Self {
        if !self.roles.iter().any(|r| r == role) {
            self.roles.push(role.to_string());
        }
        let entry = self.role_genes.entry(role.to_string()).or_default();
        for (name, value) in genes {
            entry.insert((*name).to_string(), value.clamp(0.0, 1.0));
        }
        self
    }

    #[must_use]
    pub fn with_genes(mut self, genes: ScalarGenes) -> Self {
        self.genes = genes;
        self
    }

    #[must_use]
    pub fn with_risk_tolerance(mut self, risk: f64) -> Self {
        self.genes.risk_tolerance = risk;
        self
    }

    #[must_use]
    pub fn with_experimental(mut self, genes: ExperimentalGenes) -> Self {
        self.experimental = true;
        self.experimental_genes = genes;
        self
    }

    /// Copy of this chromosome re-homed into `category` at `generation`.
    /// Used by `initialize` to adopt a host-supplied seed.
    #[must_use]
    pub fn rehome(&self, category: &str, generation: u64) -> Self {
        Self {
            id: GenevaId::new(),
            category: category.to_string(),
            generation,
            parents: Vec::new(),
            created_at: Utc::now(),
            fitness: 0.0,
            mutations: 0,
            ..self.clone()
        }
    }

    /// Mean of all per-role gene values, `None` when there are none.
    #[must_use]
    pub fn mean_role_gene(&self) -> Option<f64> {
        let (sum, count) = self
            .role_genes
            .values()
            .flat_map(|genes| genes.values())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Flattened numeric gene map: scalar genes by name and role genes as
    /// `role.gene`. Experimental genes are included only when active.
    #[must_use]
    pub fn gene_map(&self) -> BTreeMap<String, f64> {
        let mut map: BTreeMap<String, f64> = self
            .genes
            .values()
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect();
        for (role, genes) in &self.role_genes {
            for (name, value) in genes {
                map.insert(format!("{}.{}", role, name), *value);
            }
        }
        if self.experimental {
            for (name, value) in self.experimental_genes.values() {
                map.insert(name.to_string(), value);
            }
        }
        map
    }
}
