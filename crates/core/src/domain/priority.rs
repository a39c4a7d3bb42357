use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Immediate,
    Crisis,
}

impl PriorityLevel {
    pub const ALL: [PriorityLevel; 5] =
        [Self::Low, Self::Medium, Self::High, Self::Immediate, Self::Crisis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Immediate => "immediate",
            Self::Crisis => "crisis",
        }
    }

    pub fn is_escalated(&self) -> bool {
        matches!(self, Self::Immediate | Self::Crisis)
    }
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of mapping a free-form label onto the canonical set.
///
/// `recognized == false` means the label fell through to the safe default and
/// should be surfaced to observability by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizedPriority {
    pub level: PriorityLevel,
    pub recognized: bool,
}

/// Checked in order; first exact (case-insensitive) match wins.
const LABEL_TABLE: &[(&str, PriorityLevel)] = &[
    ("urgent", PriorityLevel::Immediate),
    ("high", PriorityLevel::High),
    ("medium", PriorityLevel::Medium),
    ("low", PriorityLevel::Low),
    ("can-wait", PriorityLevel::Low),
    ("standard-24h", PriorityLevel::Low),
    ("today", PriorityLevel::Medium),
    ("today-by-6pm", PriorityLevel::Medium),
    ("within-1h", PriorityLevel::High),
    ("immediate", PriorityLevel::Immediate),
    ("crisis", PriorityLevel::Crisis),
];

pub const DEFAULT_PRIORITY: PriorityLevel = PriorityLevel::Low;

pub fn normalize_priority_label(label: &str) -> NormalizedPriority {
    let normalized = label.trim().to_ascii_lowercase();
    LABEL_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == normalized)
        .map(|(_, level)| NormalizedPriority { level: *level, recognized: true })
        .unwrap_or(NormalizedPriority { level: DEFAULT_PRIORITY, recognized: false })
}

pub fn normalize_priority(label: &str) -> PriorityLevel {
    normalize_priority_label(label).level
}

#[cfg(test)]
mod tests {
    use super::{normalize_priority, normalize_priority_label, PriorityLevel};

    #[test]
    fn legacy_labels_map_onto_canonical_levels() {
        assert_eq!(normalize_priority("urgent"), PriorityLevel::Immediate);
        assert_eq!(normalize_priority("can-wait"), PriorityLevel::Low);
        assert_eq!(normalize_priority("standard-24h"), PriorityLevel::Low);
        assert_eq!(normalize_priority("today"), PriorityLevel::Medium);
        assert_eq!(normalize_priority("today-by-6pm"), PriorityLevel::Medium);
        assert_eq!(normalize_priority("within-1h"), PriorityLevel::High);
    }

    #[test]
    fn matching_ignores_case_and_surrounding_whitespace() {
        assert_eq!(normalize_priority("  HIGH "), PriorityLevel::High);
        assert_eq!(normalize_priority("Immediate"), PriorityLevel::Immediate);
        assert_eq!(normalize_priority("CRISIS"), PriorityLevel::Crisis);
    }

    #[test]
    fn unknown_labels_fall_back_to_low_and_are_flagged() {
        let outcome = normalize_priority_label("super-mega-urgent!!");
        assert_eq!(outcome.level, PriorityLevel::Low);
        assert!(!outcome.recognized);

        let empty = normalize_priority_label("");
        assert_eq!(empty.level, PriorityLevel::Low);
        assert!(!empty.recognized);
    }

    #[test]
    fn normalization_is_idempotent_for_every_output() {
        let inputs = [
            "urgent",
            "high",
            "Today",
            "within-1h",
            "crisis",
            "medium",
            "nonsense",
            "",
            "🔥",
            "standard-24h",
        ];
        for input in inputs {
            let once = normalize_priority(input);
            let twice = normalize_priority(once.as_str());
            assert_eq!(once, twice, "normalize should be idempotent for `{input}`");
            assert!(PriorityLevel::ALL.contains(&once));
        }
    }

    #[test]
    fn canonical_literals_are_fixed_points() {
        for level in PriorityLevel::ALL {
            let outcome = normalize_priority_label(level.as_str());
            assert_eq!(outcome.level, level);
            assert!(outcome.recognized);
        }
    }
}
