use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use deskpilot_core::conversation::{
    ContactKey, ConversationState, ConversationTurn, MessageDirection,
};
use deskpilot_core::domain::knowledge::{Document, DocumentId, HybridQuery, RetrievalCandidate};
use deskpilot_core::domain::settings::AdvancedSettings;
use deskpilot_core::domain::team::Team;
use deskpilot_core::domain::ticket::{ClassificationResult, Ticket, TicketId, TicketReply};

pub mod conversation;
pub mod document;
pub mod memory;
pub mod message_log;
pub mod settings;
pub mod team;
pub mod ticket;

pub use conversation::SqlConversationStateRepository;
pub use document::SqlDocumentRepository;
pub use memory::{
    InMemoryConversationStateRepository, InMemoryDocumentRepository,
    InMemoryMessageLogRepository, InMemorySettingsRepository, InMemoryTeamRepository,
    InMemoryTicketRepository,
};
pub use message_log::SqlMessageLogRepository;
pub use settings::SqlSettingsRepository;
pub use team::SqlTeamRepository;
pub use ticket::SqlTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// What the message log knew about an inbound channel message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundRecord {
    /// First delivery; the message was logged now.
    New,
    /// Logged by an earlier delivery that never finished routing.
    Retry,
    /// Routed to completion before.
    Processed,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// The single active row, or `None` when nothing has been configured.
    async fn load_active(&self) -> Result<Option<AdvancedSettings>, RepositoryError>;
    /// Replaces the active row, deactivating any previous one.
    async fn save_active(&self, settings: AdvancedSettings) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Active teams in a stable order (name, then id).
    async fn list_active(&self) -> Result<Vec<Team>, RepositoryError>;
    async fn save(&self, team: Team) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError>;
    async fn apply_classification(
        &self,
        id: &TicketId,
        result: &ClassificationResult,
    ) -> Result<(), RepositoryError>;
    /// Appends a captured reply. Returns `false` if this channel message id was
    /// already stored.
    async fn append_reply(&self, reply: TicketReply) -> Result<bool, RepositoryError>;
    async fn find_reply(
        &self,
        channel_message_id: &str,
    ) -> Result<Option<TicketReply>, RepositoryError>;
    async fn list_replies(&self, id: &TicketId) -> Result<Vec<TicketReply>, RepositoryError>;
}

#[async_trait]
pub trait ConversationStateRepository: Send + Sync {
    async fn load(&self, key: &ContactKey) -> Result<Option<ConversationState>, RepositoryError>;

    async fn set_awaiting(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Clears the awaiting phase only if it still points at `ticket_id` and has
    /// not expired at `now`. Returns whether this caller won the row.
    async fn clear_awaiting_if_current(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Clears the awaiting phase only if it points at `ticket_id` and expired
    /// strictly before `now`.
    async fn clear_awaiting_if_expired(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn touch(
        &self,
        key: &ContactKey,
        direction: MessageDirection,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageLogRepository: Send + Sync {
    /// Logs an inbound message as pending. A known channel message id is not
    /// logged twice; the result says whether its routing already finished.
    async fn record_inbound(
        &self,
        key: &ContactKey,
        channel_message_id: &str,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<InboundRecord, RepositoryError>;

    /// Flags an inbound message as fully routed so redeliveries are dropped.
    async fn mark_processed(&self, channel_message_id: &str) -> Result<(), RepositoryError>;

    async fn record_outbound(
        &self,
        key: &ContactKey,
        channel_message_id: Option<&str>,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Most recent `limit` turns, oldest first.
    async fn recent_turns(
        &self,
        key: &ContactKey,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn hybrid_search(
        &self,
        query: &HybridQuery<'_>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError>;
    async fn list(&self, only_missing_embedding: bool) -> Result<Vec<Document>, RepositoryError>;
    async fn save(&self, document: Document) -> Result<(), RepositoryError>;
    async fn update_embedding(
        &self,
        id: &DocumentId,
        embedding: &[f32],
    ) -> Result<(), RepositoryError>;
}

/// RFC 3339 with fixed millisecond precision so stored values compare
/// correctly as strings.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}

pub(crate) fn parse_direction(value: &str) -> Result<MessageDirection, RepositoryError> {
    MessageDirection::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid direction: {value}")))
}
