use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub specialty_description: String,
    /// Relative share of new tickets this team should absorb; 1.0 is neutral.
    pub load_weight: f64,
}

impl Team {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TeamId(id.into()),
            name: name.into(),
            specialty_description: String::new(),
            load_weight: 1.0,
        }
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty_description = specialty.into();
        self
    }

    pub fn with_load_weight(mut self, load_weight: f64) -> Self {
        self.load_weight = load_weight.max(0.0);
        self
    }

    pub fn is_triage(&self) -> bool {
        matches!(self.name.trim().to_lowercase().as_str(), "triage" | "triagem")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityHint {
    Prioritize,
    Avoid,
}

impl CapacityHint {
    pub fn from_weight(weight: f64) -> Option<Self> {
        if weight > 1.0 {
            Some(Self::Prioritize)
        } else if weight < 1.0 {
            Some(Self::Avoid)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prioritize => "prioritize",
            Self::Avoid => "avoid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CapacityHint, Team};

    #[test]
    fn triage_team_is_detected_by_name() {
        assert!(Team::new("t-0", "Triagem").is_triage());
        assert!(Team::new("t-0", " triage ").is_triage());
        assert!(!Team::new("t-1", "Infraestrutura").is_triage());
    }

    #[test]
    fn capacity_hint_follows_weight_around_neutral() {
        assert_eq!(CapacityHint::from_weight(1.5), Some(CapacityHint::Prioritize));
        assert_eq!(CapacityHint::from_weight(0.4), Some(CapacityHint::Avoid));
        assert_eq!(CapacityHint::from_weight(1.0), None);
    }

    #[test]
    fn negative_load_weight_is_clamped() {
        assert_eq!(Team::new("t-2", "Redes").with_load_weight(-3.0).load_weight, 0.0);
    }
}
