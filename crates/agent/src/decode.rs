//! Decoding of structured model output.
//!
//! Models wrap JSON in prose or code fences often enough that every decoder
//! first isolates the outermost JSON value, then deserializes it strictly.

use serde::Deserialize;
use thiserror::Error;

use deskpilot_core::domain::knowledge::DocumentId;
use deskpilot_core::domain::priority::{normalize_priority_label, NormalizedPriority};
use deskpilot_core::domain::team::TeamId;
use deskpilot_core::domain::ticket::{ClassificationMode, Confidence};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("model output contained no JSON value")]
    NoJson,
    #[error("model output was not valid JSON: {0}")]
    Malformed(String),
    #[error("model output is missing `{0}`")]
    MissingField(&'static str),
}

/// What the model decided, before team resolution and title cleanup.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelClassification {
    pub title: Option<String>,
    pub priority: Option<NormalizedPriority>,
    pub raw_priority: Option<String>,
    pub team_id: Option<TeamId>,
    pub rationale: String,
    /// Absent or unrecognized confidence is treated as low.
    pub confidence: Confidence,
}

#[derive(Deserialize)]
struct RawClassification {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    team_id: Option<serde_json::Value>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelevanceScore {
    pub id: DocumentId,
    pub score: u8,
}

#[derive(Deserialize)]
struct RawScore {
    id: serde_json::Value,
    score: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScores {
    List(Vec<RawScore>),
    Wrapped { scores: Vec<RawScore> },
}

/// Slice of `raw` holding the outermost JSON object or array.
pub fn extract_json(raw: &str) -> Result<&str, DecodeError> {
    let start = raw.find(['{', '[']).ok_or(DecodeError::NoJson)?;
    let closing = if raw[start..].starts_with('{') { '}' } else { ']' };
    let end = raw.rfind(closing).ok_or(DecodeError::NoJson)?;
    if end < start {
        return Err(DecodeError::NoJson);
    }
    Ok(&raw[start..=end])
}

pub fn decode_classification(
    raw: &str,
    mode: ClassificationMode,
) -> Result<ModelClassification, DecodeError> {
    let json = extract_json(raw)?;
    let parsed: RawClassification =
        serde_json::from_str(json).map_err(|error| DecodeError::Malformed(error.to_string()))?;

    let raw_priority = non_blank(parsed.priority);
    let needs_priority = matches!(mode, ClassificationMode::Full | ClassificationMode::PriorityOnly);
    if needs_priority && raw_priority.is_none() {
        return Err(DecodeError::MissingField("priority"));
    }

    let team_id = parsed.team_id.and_then(|value| match value {
        serde_json::Value::String(id) => non_blank(Some(id)),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    });

    Ok(ModelClassification {
        title: non_blank(parsed.title),
        priority: raw_priority.as_deref().map(normalize_priority_label),
        raw_priority,
        team_id: team_id.map(TeamId),
        rationale: non_blank(parsed.rationale).unwrap_or_default(),
        confidence: parsed
            .confidence
            .as_deref()
            .and_then(Confidence::parse)
            .unwrap_or(Confidence::Low),
    })
}

/// Relevance scores clamped to 0..=100. An empty list is a decode failure so
/// the caller falls back to similarity ordering.
pub fn decode_relevance_scores(raw: &str) -> Result<Vec<RelevanceScore>, DecodeError> {
    let json = extract_json(raw)?;
    let parsed: RawScores =
        serde_json::from_str(json).map_err(|error| DecodeError::Malformed(error.to_string()))?;
    let scores = match parsed {
        RawScores::List(scores) | RawScores::Wrapped { scores } => scores,
    };

    let decoded: Vec<RelevanceScore> = scores
        .into_iter()
        .filter_map(|entry| {
            let id = match entry.id {
                serde_json::Value::String(id) => id,
                serde_json::Value::Number(id) => id.to_string(),
                _ => return None,
            };
            if !entry.score.is_finite() {
                return None;
            }
            Some(RelevanceScore { id: DocumentId(id), score: entry.score.round().clamp(0.0, 100.0) as u8 })
        })
        .collect();

    if decoded.is_empty() {
        return Err(DecodeError::MissingField("scores"));
    }
    Ok(decoded)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
