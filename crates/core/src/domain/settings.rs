use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::priority::PriorityLevel;
use crate::domain::team::{CapacityHint, Team, TeamId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMatrixEntry {
    pub urgency_label: String,
    pub impact_label: String,
    pub sla_minutes: u32,
}

impl PriorityMatrixEntry {
    pub fn new(urgency: &str, impact: &str, sla_minutes: u32) -> Self {
        Self {
            urgency_label: urgency.to_string(),
            impact_label: impact.to_string(),
            sla_minutes: sla_minutes.max(1),
        }
    }
}

/// Urgency x impact x SLA for every canonical level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<PriorityLevel, PriorityMatrixEntry>",
    into = "BTreeMap<PriorityLevel, PriorityMatrixEntry>"
)]
pub struct PriorityMatrix {
    entries: BTreeMap<PriorityLevel, PriorityMatrixEntry>,
}

impl Default for PriorityMatrix {
    fn default() -> Self {
        let entries = BTreeMap::from([
            (PriorityLevel::Low, PriorityMatrixEntry::new("Baixa", "Baixo", 1440)),
            (PriorityLevel::Medium, PriorityMatrixEntry::new("Média", "Médio", 480)),
            (PriorityLevel::High, PriorityMatrixEntry::new("Alta", "Alto", 240)),
            (PriorityLevel::Immediate, PriorityMatrixEntry::new("Muito alta", "Alto", 60)),
            (PriorityLevel::Crisis, PriorityMatrixEntry::new("Crítica", "Crítico", 15)),
        ]);
        Self { entries }
    }
}

impl PriorityMatrix {
    /// Builds a matrix from stored entries, filling absent levels and zero SLAs
    /// from the built-in defaults so every level is always defined.
    pub fn from_partial(stored: BTreeMap<PriorityLevel, PriorityMatrixEntry>) -> Self {
        let mut matrix = Self::default();
        for (level, entry) in stored {
            if entry.sla_minutes == 0 {
                continue;
            }
            matrix.entries.insert(level, entry);
        }
        matrix
    }

    pub fn entry(&self, level: PriorityLevel) -> &PriorityMatrixEntry {
        // from_partial/default guarantee all five keys
        &self.entries[&level]
    }

    pub fn iter(&self) -> impl Iterator<Item = (PriorityLevel, &PriorityMatrixEntry)> {
        self.entries.iter().map(|(level, entry)| (*level, entry))
    }
}

impl From<BTreeMap<PriorityLevel, PriorityMatrixEntry>> for PriorityMatrix {
    fn from(stored: BTreeMap<PriorityLevel, PriorityMatrixEntry>) -> Self {
        Self::from_partial(stored)
    }
}

impl From<PriorityMatrix> for BTreeMap<PriorityLevel, PriorityMatrixEntry> {
    fn from(matrix: PriorityMatrix) -> Self {
        matrix.entries
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { model_name: "gpt-4o-mini".to_string(), temperature: 0.2, max_tokens: 400 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvancedSettings {
    pub priority_matrix: PriorityMatrix,
    pub emergency_keywords: Vec<String>,
    pub load_balancing_enabled: bool,
    pub team_load_weights: HashMap<TeamId, f64>,
    pub model_settings: ModelSettings,
    pub triage_team_id: Option<TeamId>,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            priority_matrix: PriorityMatrix::default(),
            emergency_keywords: Vec::new(),
            load_balancing_enabled: false,
            team_load_weights: HashMap::new(),
            model_settings: ModelSettings::default(),
            triage_team_id: None,
        }
    }
}

impl AdvancedSettings {
    pub fn effective_load_weight(&self, team: &Team) -> f64 {
        self.team_load_weights.get(&team.id).copied().unwrap_or(team.load_weight).max(0.0)
    }

    pub fn capacity_hint(&self, team: &Team) -> Option<CapacityHint> {
        if !self.load_balancing_enabled {
            return None;
        }
        CapacityHint::from_weight(self.effective_load_weight(team))
    }

    /// Emergency keywords present in `text`, compared case-insensitively, in
    /// configured order.
    pub fn matched_emergency_keywords(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.emergency_keywords
            .iter()
            .map(|keyword| keyword.trim())
            .filter(|keyword| !keyword.is_empty() && haystack.contains(&keyword.to_lowercase()))
            .map(str::to_string)
            .collect()
    }
}

/// Immutable per-request view of settings plus the active team roster.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SettingsSnapshot {
    pub settings: AdvancedSettings,
    pub teams: Vec<Team>,
}

impl SettingsSnapshot {
    pub fn new(settings: AdvancedSettings, teams: Vec<Team>) -> Self {
        Self { settings, teams }
    }

    pub fn find_team(&self, id: &TeamId) -> Option<&Team> {
        self.teams.iter().find(|team| &team.id == id)
    }

    /// Configured triage team if active, else a team named triage/triagem,
    /// else the first active team.
    pub fn triage_team(&self) -> Option<&Team> {
        self.settings
            .triage_team_id
            .as_ref()
            .and_then(|id| self.find_team(id))
            .or_else(|| self.teams.iter().find(|team| team.is_triage()))
            .or_else(|| self.teams.first())
    }
}
