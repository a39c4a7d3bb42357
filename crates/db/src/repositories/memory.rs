use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use deskpilot_core::conversation::{
    ContactKey, ConversationPhase, ConversationState, ConversationTurn, MessageDirection,
};
use deskpilot_core::domain::knowledge::{
    rank_hybrid, Document, DocumentId, HybridQuery, RetrievalCandidate,
};
use deskpilot_core::domain::settings::AdvancedSettings;
use deskpilot_core::domain::team::Team;
use deskpilot_core::domain::ticket::{ClassificationResult, Ticket, TicketId, TicketReply};

use super::{
    ConversationStateRepository, DocumentRepository, InboundRecord, MessageLogRepository,
    RepositoryError, SettingsRepository, TeamRepository, TicketRepository,
};

#[derive(Default)]
pub struct InMemorySettingsRepository {
    active: RwLock<Option<AdvancedSettings>>,
}

#[async_trait::async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn load_active(&self) -> Result<Option<AdvancedSettings>, RepositoryError> {
        Ok(self.active.read().await.clone())
    }

    async fn save_active(&self, settings: AdvancedSettings) -> Result<(), RepositoryError> {
        *self.active.write().await = Some(settings);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTeamRepository {
    teams: RwLock<HashMap<String, Team>>,
}

#[async_trait::async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn list_active(&self) -> Result<Vec<Team>, RepositoryError> {
        let teams = self.teams.read().await;
        let mut active: Vec<Team> = teams.values().cloned().collect();
        active.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn save(&self, team: Team) -> Result<(), RepositoryError> {
        let mut teams = self.teams.write().await;
        teams.insert(team.id.0.clone(), team);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
    replies: RwLock<Vec<TicketReply>>,
    classifications: RwLock<HashMap<String, ClassificationResult>>,
}

impl InMemoryTicketRepository {
    pub async fn classification(&self, id: &TicketId) -> Option<ClassificationResult> {
        self.classifications.read().await.get(&id.0).cloned()
    }
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        Ok(self.tickets.read().await.get(&id.0).cloned())
    }

    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        self.tickets.write().await.insert(ticket.id.0.clone(), ticket);
        Ok(())
    }

    async fn apply_classification(
        &self,
        id: &TicketId,
        result: &ClassificationResult,
    ) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("ticket {}", id.0)))?;
        ticket.title = Some(result.title.clone());
        ticket.priority = Some(result.priority);
        ticket.team_id = result.team_id.clone();
        self.classifications.write().await.insert(id.0.clone(), result.clone());
        Ok(())
    }

    async fn append_reply(&self, reply: TicketReply) -> Result<bool, RepositoryError> {
        let mut replies = self.replies.write().await;
        if replies.iter().any(|existing| existing.channel_message_id == reply.channel_message_id) {
            return Ok(false);
        }
        replies.push(reply);
        Ok(true)
    }

    async fn find_reply(
        &self,
        channel_message_id: &str,
    ) -> Result<Option<TicketReply>, RepositoryError> {
        let replies = self.replies.read().await;
        Ok(replies.iter().find(|reply| reply.channel_message_id == channel_message_id).cloned())
    }

    async fn list_replies(&self, id: &TicketId) -> Result<Vec<TicketReply>, RepositoryError> {
        let replies = self.replies.read().await;
        Ok(replies.iter().filter(|reply| &reply.ticket_id == id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryConversationStateRepository {
    states: RwLock<HashMap<ContactKey, ConversationState>>,
}

#[async_trait::async_trait]
impl ConversationStateRepository for InMemoryConversationStateRepository {
    async fn load(&self, key: &ContactKey) -> Result<Option<ConversationState>, RepositoryError> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn set_awaiting(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if expires_at <= now {
            return Err(RepositoryError::InvalidInput(
                "awaiting expiry must be in the future".to_string(),
            ));
        }
        let mut states = self.states.write().await;
        let state =
            states.entry(key.clone()).or_insert_with(|| ConversationState::idle(key.clone()));
        state.phase =
            ConversationPhase::AwaitingTicketReply { ticket_id: ticket_id.clone(), expires_at };
        Ok(())
    }

    async fn clear_awaiting_if_current(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(key) else {
            return Ok(false);
        };
        let matches = matches!(
            &state.phase,
            ConversationPhase::AwaitingTicketReply { ticket_id: current, expires_at }
                if current == ticket_id && *expires_at >= now
        );
        if matches {
            state.phase = ConversationPhase::Idle;
        }
        Ok(matches)
    }

    async fn clear_awaiting_if_expired(
        &self,
        key: &ContactKey,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(key) else {
            return Ok(false);
        };
        let matches = matches!(
            &state.phase,
            ConversationPhase::AwaitingTicketReply { ticket_id: current, expires_at }
                if current == ticket_id && *expires_at < now
        );
        if matches {
            state.phase = ConversationPhase::Idle;
        }
        Ok(matches)
    }

    async fn touch(
        &self,
        key: &ContactKey,
        direction: MessageDirection,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states
            .entry(key.clone())
            .or_insert_with(|| ConversationState::idle(key.clone()))
            .record(direction, at);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageLogRepository {
    messages: RwLock<Vec<(ContactKey, Option<String>, ConversationTurn)>>,
    /// Inbound channel message id to whether its routing finished.
    inbound: RwLock<HashMap<String, bool>>,
}

impl InMemoryMessageLogRepository {
    pub async fn outbound_texts(&self, key: &ContactKey) -> Vec<String> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|(owner, _, turn)| owner == key && turn.direction == MessageDirection::Outbound)
            .map(|(_, _, turn)| turn.text.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl MessageLogRepository for InMemoryMessageLogRepository {
    async fn record_inbound(
        &self,
        key: &ContactKey,
        channel_message_id: &str,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<InboundRecord, RepositoryError> {
        let mut inbound = self.inbound.write().await;
        match inbound.get(channel_message_id) {
            Some(true) => return Ok(InboundRecord::Processed),
            Some(false) => return Ok(InboundRecord::Retry),
            None => {}
        }
        inbound.insert(channel_message_id.to_string(), false);
        self.messages.write().await.push((
            key.clone(),
            Some(channel_message_id.to_string()),
            ConversationTurn { direction: MessageDirection::Inbound, text: body.to_string(), at },
        ));
        Ok(InboundRecord::New)
    }

    async fn mark_processed(&self, channel_message_id: &str) -> Result<(), RepositoryError> {
        if let Some(processed) = self.inbound.write().await.get_mut(channel_message_id) {
            *processed = true;
        }
        Ok(())
    }

    async fn record_outbound(
        &self,
        key: &ContactKey,
        channel_message_id: Option<&str>,
        body: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.messages.write().await.push((
            key.clone(),
            channel_message_id.map(str::to_string),
            ConversationTurn { direction: MessageDirection::Outbound, text: body.to_string(), at },
        ));
        Ok(())
    }

    async fn recent_turns(
        &self,
        key: &ContactKey,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let messages = self.messages.read().await;
        let owned: Vec<ConversationTurn> = messages
            .iter()
            .filter(|(owner, _, _)| owner == key)
            .map(|(_, _, turn)| turn.clone())
            .collect();
        let skip = owned.len().saturating_sub(limit);
        Ok(owned.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentRepository {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(
                documents.into_iter().map(|document| (document.id.0.clone(), document)).collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn hybrid_search(
        &self,
        query: &HybridQuery<'_>,
    ) -> Result<Vec<RetrievalCandidate>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(rank_hybrid(query, documents.values().cloned()))
    }

    async fn list(&self, only_missing_embedding: bool) -> Result<Vec<Document>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut listed: Vec<Document> = documents
            .values()
            .filter(|document| !only_missing_embedding || document.needs_embedding())
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn save(&self, document: Document) -> Result<(), RepositoryError> {
        self.documents.write().await.insert(document.id.0.clone(), document);
        Ok(())
    }

    async fn update_embedding(
        &self,
        id: &DocumentId,
        embedding: &[f32],
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("document {}", id.0)))?;
        document.embedding = embedding.to_vec();
        Ok(())
    }
}
