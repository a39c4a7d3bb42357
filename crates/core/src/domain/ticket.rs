use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::priority::PriorityLevel;
use crate::domain::team::TeamId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Adapter view of a ticket row; the engine only fills the classification
/// columns and appends replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub contact_id: Option<String>,
    pub description: String,
    pub title: Option<String>,
    pub priority: Option<PriorityLevel>,
    pub team_id: Option<TeamId>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: TicketId(id.into()),
            contact_id: None,
            description: description.into(),
            title: None,
            priority: None,
            team_id: None,
            created_at: Utc::now(),
        }
    }

    /// What the ticket already knows, as a classification request.
    pub fn classification_request(&self) -> ClassificationRequest {
        ClassificationRequest {
            message_text: self.description.clone(),
            known_priority: self.priority,
            known_team_id: self.team_id.clone(),
            known_title: self.title.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketReply {
    pub ticket_id: TicketId,
    /// Identifier assigned by the messaging channel; the natural dedup key.
    pub channel_message_id: String,
    pub contact_id: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub message_text: String,
    #[serde(default)]
    pub known_priority: Option<PriorityLevel>,
    #[serde(default)]
    pub known_team_id: Option<TeamId>,
    #[serde(default)]
    pub known_title: Option<String>,
}

impl ClassificationRequest {
    pub fn new(message_text: impl Into<String>) -> Self {
        Self { message_text: message_text.into(), ..Self::default() }
    }

    pub fn with_priority(mut self, priority: PriorityLevel) -> Self {
        self.known_priority = Some(priority);
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.known_team_id = Some(TeamId(team_id.into()));
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.known_title = Some(title.into());
        self
    }

    pub fn mode(&self) -> ClassificationMode {
        match (&self.known_priority, &self.known_team_id) {
            (None, None) => ClassificationMode::Full,
            (Some(_), None) => ClassificationMode::TeamOnly,
            (None, Some(_)) => ClassificationMode::PriorityOnly,
            (Some(_), Some(_)) => ClassificationMode::Skip,
        }
    }
}

/// Which fields the model is asked to decide. A title alone never justifies
/// a model call; it falls back to the lexicon instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    Full,
    TeamOnly,
    PriorityOnly,
    Skip,
}

impl ClassificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::TeamOnly => "team_only",
            Self::PriorityOnly => "priority_only",
            Self::Skip => "skip",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" | "alta" => Some(Self::High),
            "medium" | "média" | "media" => Some(Self::Medium),
            "low" | "baixa" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub title: String,
    pub priority: PriorityLevel,
    pub team_id: Option<TeamId>,
    pub rationale: String,
    pub confidence: Confidence,
    pub mode: ClassificationMode,
    /// True when a provider or decode failure forced the fallback values.
    pub degraded: bool,
}
