use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use deskpilot_agent::retrieval::AnswerEngine;
use deskpilot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use deskpilot_core::config::AppConfig;
use deskpilot_core::conversation::{
    ContactKey, ConversationEvent, ConversationMachine, ConversationPhase,
    ConversationTransitionError, ConversationTurn, InboundRoute, MessageDirection,
};
use deskpilot_core::domain::ticket::{TicketId, TicketReply};
use deskpilot_db::repositories::{
    ConversationStateRepository, InboundRecord, MessageLogRepository, RepositoryError,
    TicketRepository,
};

use crate::events::{DropReason, InboundEvent, InboundFilter};
use crate::messages::{reply_prompt, OutboundMessage};
use crate::sender::MessageSender;

const ACTOR: &str = "inbound-router";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    Dropped { reason: DropReason },
    Duplicate,
    ReplyCaptured { ticket_id: TicketId, confirmation_sent: bool },
    Answered { expired_ticket_id: Option<TicketId>, delivered: bool },
    NoAnswer { expired_ticket_id: Option<TicketId> },
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] ConversationTransitionError),
    #[error("ticket {0} does not exist")]
    UnknownTicket(TicketId),
    #[error("reply request for ticket {0} did not enter the awaiting phase")]
    NotAwaiting(TicketId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterSettings {
    pub confirmation_text: String,
    pub reply_ttl_secs: i64,
    pub history_turns: usize,
}

impl RouterSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            confirmation_text: config.conversation.confirmation_text.clone(),
            reply_ttl_secs: config.conversation.reply_ttl_secs,
            history_turns: config.retrieval.history_turns,
        }
    }
}

/// Persistence the router reads and writes per contact.
#[derive(Clone)]
pub struct ConversationStores {
    pub states: Arc<dyn ConversationStateRepository>,
    pub messages: Arc<dyn MessageLogRepository>,
    pub tickets: Arc<dyn TicketRepository>,
}

/// Takes one inbound event from filter to reply. The state decision happens
/// before any model work. An inbound message counts as processed only once
/// routing finishes, so a redelivery after a failed attempt is routed again;
/// the reply table's unique channel message id keeps a reply stored once.
pub struct InboundRouter {
    filter: InboundFilter,
    machine: ConversationMachine,
    stores: ConversationStores,
    answers: Arc<dyn AnswerEngine>,
    sender: Arc<dyn MessageSender>,
    audit: Arc<dyn AuditSink>,
    settings: RouterSettings,
}

impl InboundRouter {
    pub fn new(
        stores: ConversationStores,
        answers: Arc<dyn AnswerEngine>,
        sender: Arc<dyn MessageSender>,
        audit: Arc<dyn AuditSink>,
        settings: RouterSettings,
    ) -> Self {
        let filter = InboundFilter::default().with_phrase(&settings.confirmation_text);
        Self {
            filter,
            machine: ConversationMachine::new(),
            stores,
            answers,
            sender,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub async fn route(&self, event: &InboundEvent) -> Result<RouteOutcome, RouteError> {
        self.route_at(event, Utc::now()).await
    }

    pub async fn route_at(
        &self,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome, RouteError> {
        if let Err(reason) = self.filter.check(event) {
            debug!(
                event_name = "ingress.dropped",
                correlation_id = %event.message_id,
                contact_id = %event.contact_id,
                reason = reason.as_str(),
                "inbound event dropped"
            );
            return Ok(RouteOutcome::Dropped { reason });
        }
        let Some(body) = event.body() else {
            return Ok(RouteOutcome::Dropped { reason: DropReason::Empty });
        };
        let key = event.key();

        let record = self.stores.messages.record_inbound(&key, &event.message_id, body, now).await?;
        if record == InboundRecord::Processed {
            info!(
                event_name = "ingress.duplicate",
                correlation_id = %event.message_id,
                contact_id = %event.contact_id,
                "inbound message already processed"
            );
            return Ok(RouteOutcome::Duplicate);
        }

        let outcome = self.dispatch(event, &key, body, record, now).await?;
        self.stores.messages.mark_processed(&event.message_id).await?;
        Ok(outcome)
    }

    async fn dispatch(
        &self,
        event: &InboundEvent,
        key: &ContactKey,
        body: &str,
        record: InboundRecord,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome, RouteError> {
        if record == InboundRecord::Retry {
            if let Some(stored) = self.stores.tickets.find_reply(&event.message_id).await? {
                info!(
                    event_name = "conversation.reply_resumed",
                    correlation_id = %event.message_id,
                    ticket_id = %stored.ticket_id,
                    "reply stored by an earlier attempt; finishing capture"
                );
                let context = AuditContext::new(
                    Some(stored.ticket_id.clone()),
                    Some(event.contact_id.clone()),
                    event.message_id.clone(),
                    ACTOR,
                );
                return self.finish_capture(event, key, stored.ticket_id, now, &context).await;
            }
        }

        self.stores.states.touch(key, MessageDirection::Inbound, now).await?;

        let phase = self
            .stores
            .states
            .load(key)
            .await?
            .map(|state| state.phase)
            .unwrap_or(ConversationPhase::Idle);
        let context = AuditContext::new(
            phase.awaiting_ticket().cloned(),
            Some(event.contact_id.clone()),
            event.message_id.clone(),
            ACTOR,
        );
        let outcome = self.machine.apply_with_audit(
            &phase,
            &ConversationEvent::InboundMessage,
            now,
            self.audit.as_ref(),
            &context,
        )?;

        match outcome.route {
            Some(InboundRoute::TicketReply { ticket_id }) => {
                self.capture_reply(event, key, body, ticket_id, now, &context).await
            }
            Some(InboundRoute::Retrieval { expired_ticket_id }) => {
                if let Some(ticket_id) = &expired_ticket_id {
                    self.stores.states.clear_awaiting_if_expired(key, ticket_id, now).await?;
                }
                self.answer(key, body, expired_ticket_id, now, &context).await
            }
            None => Ok(RouteOutcome::NoAnswer { expired_ticket_id: None }),
        }
    }

    /// Puts the contact in the awaiting phase for `ticket_id` and sends the
    /// prompt. `ttl_secs` defaults to the configured reply window.
    pub async fn request_reply(
        &self,
        ticket_id: &TicketId,
        key: &ContactKey,
        prompt_text: &str,
        ttl_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, RouteError> {
        if self.stores.tickets.find_by_id(ticket_id).await?.is_none() {
            return Err(RouteError::UnknownTicket(ticket_id.clone()));
        }

        let phase = self
            .stores
            .states
            .load(key)
            .await?
            .map(|state| state.phase)
            .unwrap_or(ConversationPhase::Idle);
        let context = AuditContext::new(
            Some(ticket_id.clone()),
            Some(key.contact_id.clone()),
            format!("reply-request-{ticket_id}"),
            "operator",
        );
        let outcome = self.machine.apply_with_audit(
            &phase,
            &ConversationEvent::ReplyRequested {
                ticket_id: ticket_id.clone(),
                ttl_secs: ttl_secs.unwrap_or(self.settings.reply_ttl_secs),
            },
            now,
            self.audit.as_ref(),
            &context,
        )?;
        let ConversationPhase::AwaitingTicketReply { expires_at, .. } = outcome.to else {
            return Err(RouteError::NotAwaiting(ticket_id.clone()));
        };

        self.stores.states.set_awaiting(key, ticket_id, expires_at, now).await?;
        self.deliver(key, &reply_prompt(ticket_id, prompt_text), now, &context).await?;
        info!(
            event_name = "conversation.reply_requested",
            correlation_id = %context.correlation_id,
            ticket_id = %ticket_id,
            contact_id = %key.contact_id,
            expires_at = %expires_at,
            "awaiting ticket reply"
        );
        Ok(expires_at)
    }

    /// The awaiting phase is released only after the reply is stored.
    async fn capture_reply(
        &self,
        event: &InboundEvent,
        key: &ContactKey,
        body: &str,
        ticket_id: TicketId,
        now: DateTime<Utc>,
        context: &AuditContext,
    ) -> Result<RouteOutcome, RouteError> {
        let appended = self
            .stores
            .tickets
            .append_reply(TicketReply {
                ticket_id: ticket_id.clone(),
                channel_message_id: event.message_id.clone(),
                contact_id: event.contact_id.clone(),
                body: body.to_string(),
                received_at: now,
            })
            .await?;
        if !appended {
            // A concurrent delivery of the same message stored it and confirms.
            info!(
                event_name = "conversation.reply_duplicate",
                correlation_id = %event.message_id,
                ticket_id = %ticket_id,
                "reply already stored for this channel message"
            );
            return Ok(RouteOutcome::Duplicate);
        }

        self.finish_capture(event, key, ticket_id, now, context).await
    }

    async fn finish_capture(
        &self,
        event: &InboundEvent,
        key: &ContactKey,
        ticket_id: TicketId,
        now: DateTime<Utc>,
        context: &AuditContext,
    ) -> Result<RouteOutcome, RouteError> {
        if !self.stores.states.clear_awaiting_if_current(key, &ticket_id, now).await? {
            warn!(
                event_name = "conversation.reply_claim_lost",
                correlation_id = %event.message_id,
                ticket_id = %ticket_id,
                "awaiting phase already moved on; reply kept on the ticket"
            );
        }

        let confirmation_sent =
            self.deliver(key, &self.settings.confirmation_text, now, context).await?;
        Ok(RouteOutcome::ReplyCaptured { ticket_id, confirmation_sent })
    }

    async fn answer(
        &self,
        key: &ContactKey,
        body: &str,
        expired_ticket_id: Option<TicketId>,
        now: DateTime<Utc>,
        context: &AuditContext,
    ) -> Result<RouteOutcome, RouteError> {
        let history = self.history(key, body).await?;
        match self.answers.answer(body, &history, context).await {
            Some(answer) => {
                let delivered = self.deliver(key, &answer, now, context).await?;
                Ok(RouteOutcome::Answered { expired_ticket_id, delivered })
            }
            None => Ok(RouteOutcome::NoAnswer { expired_ticket_id }),
        }
    }

    /// Prior turns, without the inbound message being answered.
    async fn history(
        &self,
        key: &ContactKey,
        body: &str,
    ) -> Result<Vec<ConversationTurn>, RouteError> {
        let limit = self.settings.history_turns;
        let mut turns = self.stores.messages.recent_turns(key, limit + 1).await?;
        if let Some(position) = turns
            .iter()
            .rposition(|turn| turn.direction == MessageDirection::Inbound && turn.text == body)
        {
            turns.remove(position);
        }
        let excess = turns.len().saturating_sub(limit);
        turns.drain(..excess);
        Ok(turns)
    }

    /// Sends `text` and logs it as an outbound turn. A send failure is logged
    /// and reported as `false`; only store failures are errors.
    async fn deliver(
        &self,
        key: &ContactKey,
        text: &str,
        now: DateTime<Utc>,
        context: &AuditContext,
    ) -> Result<bool, RouteError> {
        match self.sender.send(&OutboundMessage::text(key, text)).await {
            Ok(channel_message_id) => {
                self.stores
                    .messages
                    .record_outbound(key, channel_message_id.as_deref(), text, now)
                    .await?;
                self.stores.states.touch(key, MessageDirection::Outbound, now).await?;
                Ok(true)
            }
            Err(error) => {
                warn!(
                    event_name = "gateway.send_failed",
                    correlation_id = %context.correlation_id,
                    contact_id = %key.contact_id,
                    error = %error,
                    "outbound message not delivered"
                );
                self.audit.emit(
                    AuditEvent::new(
                        context,
                        "gateway.send_failed",
                        AuditCategory::Ingress,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::Mutex;

    use deskpilot_agent::retrieval::AnswerEngine;
    use deskpilot_core::audit::{AuditContext, InMemoryAuditSink};
    use deskpilot_core::conversation::{
        ContactKey, ConversationPhase, ConversationState, ConversationTransitionError,
        ConversationTurn, MessageDirection,
    };
    use deskpilot_core::domain::ticket::{ClassificationResult, Ticket, TicketId, TicketReply};
    use deskpilot_db::repositories::{
        ConversationStateRepository, InMemoryConversationStateRepository,
        InMemoryMessageLogRepository, InMemoryTicketRepository, MessageLogRepository,
        RepositoryError, TicketRepository,
    };

    use super::{ConversationStores, InboundRouter, RouteError, RouteOutcome, RouterSettings};
    use crate::events::{DropReason, InboundEvent};
    use crate::sender::{InMemoryMessageSender, SendError};

    #[derive(Default)]
    struct FakeAnswers {
        reply: Option<String>,
        calls: Mutex<Vec<(String, Vec<ConversationTurn>)>>,
    }

    impl FakeAnswers {
        fn replying(text: &str) -> Self {
            Self { reply: Some(text.to_string()), calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl AnswerEngine for FakeAnswers {
        async fn answer(
            &self,
            query: &str,
            history: &[ConversationTurn],
            _audit: &AuditContext,
        ) -> Option<String> {
            self.calls.lock().await.push((query.to_string(), history.to_vec()));
            self.reply.clone()
        }
    }

    /// Delegates to the in-memory store but fails the first call to one
    /// operation, like a dropped connection.
    struct FailOnce<T> {
        inner: Arc<T>,
        armed: AtomicBool,
    }

    impl<T> FailOnce<T> {
        fn new(inner: Arc<T>) -> Arc<Self> {
            Arc::new(Self { inner, armed: AtomicBool::new(true) })
        }

        fn trip(&self) -> Result<(), RepositoryError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Decode("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ConversationStateRepository for FailOnce<InMemoryConversationStateRepository> {
        async fn load(
            &self,
            key: &ContactKey,
        ) -> Result<Option<ConversationState>, RepositoryError> {
            self.inner.load(key).await
        }

        async fn set_awaiting(
            &self,
            key: &ContactKey,
            ticket_id: &TicketId,
            expires_at: DateTime<Utc>,
            now: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            self.inner.set_awaiting(key, ticket_id, expires_at, now).await
        }

        async fn clear_awaiting_if_current(
            &self,
            key: &ContactKey,
            ticket_id: &TicketId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.trip()?;
            self.inner.clear_awaiting_if_current(key, ticket_id, now).await
        }

        async fn clear_awaiting_if_expired(
            &self,
            key: &ContactKey,
            ticket_id: &TicketId,
            now: DateTime<Utc>,
        ) -> Result<bool, RepositoryError> {
            self.inner.clear_awaiting_if_expired(key, ticket_id, now).await
        }

        async fn touch(
            &self,
            key: &ContactKey,
            direction: MessageDirection,
            at: DateTime<Utc>,
        ) -> Result<(), RepositoryError> {
            self.inner.touch(key, direction, at).await
        }
    }

    #[async_trait]
    impl TicketRepository for FailOnce<InMemoryTicketRepository> {
        async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
            self.inner.save(ticket).await
        }

        async fn apply_classification(
            &self,
            id: &TicketId,
            result: &ClassificationResult,
        ) -> Result<(), RepositoryError> {
            self.inner.apply_classification(id, result).await
        }

        async fn append_reply(&self, reply: TicketReply) -> Result<bool, RepositoryError> {
            self.trip()?;
            self.inner.append_reply(reply).await
        }

        async fn find_reply(
            &self,
            channel_message_id: &str,
        ) -> Result<Option<TicketReply>, RepositoryError> {
            self.inner.find_reply(channel_message_id).await
        }

        async fn list_replies(&self, id: &TicketId) -> Result<Vec<TicketReply>, RepositoryError> {
            self.inner.list_replies(id).await
        }
    }

    struct Harness {
        router: InboundRouter,
        states: Arc<InMemoryConversationStateRepository>,
        messages: Arc<InMemoryMessageLogRepository>,
        tickets: Arc<InMemoryTicketRepository>,
        answers: Arc<FakeAnswers>,
        sender: Arc<InMemoryMessageSender>,
        audit: Arc<InMemoryAuditSink>,
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Flaky {
        Nothing,
        ClearAwaiting,
        AppendReply,
    }

    fn harness(answers: FakeAnswers, sender: InMemoryMessageSender) -> Harness {
        harness_with(answers, sender, Flaky::Nothing)
    }

    fn harness_with(answers: FakeAnswers, sender: InMemoryMessageSender, flaky: Flaky) -> Harness {
        let states = Arc::new(InMemoryConversationStateRepository::default());
        let messages = Arc::new(InMemoryMessageLogRepository::default());
        let tickets = Arc::new(InMemoryTicketRepository::default());
        let answers = Arc::new(answers);
        let sender = Arc::new(sender);
        let audit = Arc::new(InMemoryAuditSink::default());
        let routed_states: Arc<dyn ConversationStateRepository> = match flaky {
            Flaky::ClearAwaiting => FailOnce::new(states.clone()),
            _ => states.clone(),
        };
        let routed_tickets: Arc<dyn TicketRepository> = match flaky {
            Flaky::AppendReply => FailOnce::new(tickets.clone()),
            _ => tickets.clone(),
        };
        let router = InboundRouter::new(
            ConversationStores {
                states: routed_states,
                messages: messages.clone(),
                tickets: routed_tickets,
            },
            answers.clone(),
            sender.clone(),
            audit.clone(),
            RouterSettings {
                confirmation_text: "Obrigado! Sua resposta foi anexada ao chamado.".into(),
                reply_ttl_secs: 3_600,
                history_turns: 5,
            },
        );
        Harness { router, states, messages, tickets, answers, sender, audit }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).single().expect("valid timestamp")
    }

    fn key() -> ContactKey {
        ContactKey::new("5511977776666", "inst-1")
    }

    fn inbound(message_id: &str, text: &str) -> InboundEvent {
        InboundEvent {
            message_id: message_id.into(),
            contact_id: "5511977776666".into(),
            channel_instance_id: "inst-1".into(),
            is_group: false,
            from_self: false,
            text: Some(text.into()),
            button_id: None,
            timestamp: now(),
        }
    }

    async fn with_ticket(h: &Harness, id: &str) -> TicketId {
        h.tickets.save(Ticket::new(id, "impressora não liga")).await.expect("save ticket");
        TicketId(id.into())
    }

    #[tokio::test]
    async fn reply_within_ttl_is_captured_and_confirmed() {
        let h = harness(FakeAnswers::replying("nunca usado"), InMemoryMessageSender::default());
        let ticket = with_ticket(&h, "TCK-1").await;
        h.router
            .request_reply(&ticket, &key(), "Qual o modelo da impressora?", None, now())
            .await
            .expect("request reply");

        let outcome = h
            .router
            .route_at(&inbound("m-1", "HP LaserJet 1020"), now() + Duration::minutes(10))
            .await
            .expect("route");

        assert_eq!(
            outcome,
            RouteOutcome::ReplyCaptured { ticket_id: ticket.clone(), confirmation_sent: true }
        );
        let replies = h.tickets.list_replies(&ticket).await.expect("replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].body, "HP LaserJet 1020");
        let state = h.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.phase, ConversationPhase::Idle);
        assert!(h.answers.calls.lock().await.is_empty());

        let sent = h.sender.sent().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.starts_with("[Chamado TCK-1]"));
        assert_eq!(sent[1].text, "Obrigado! Sua resposta foi anexada ao chamado.");
        assert!(h.audit.event_types().contains(&"conversation.reply_captured".to_string()));
    }

    #[tokio::test]
    async fn expired_awaiting_routes_to_retrieval_and_clears() {
        let h = harness(FakeAnswers::replying("Reinicie o roteador."), InMemoryMessageSender::default());
        let ticket = with_ticket(&h, "TCK-2").await;
        h.router
            .request_reply(&ticket, &key(), "Pode detalhar?", Some(60), now())
            .await
            .expect("request reply");

        let outcome = h
            .router
            .route_at(&inbound("m-2", "como reinicio o roteador?"), now() + Duration::minutes(5))
            .await
            .expect("route");

        assert_eq!(
            outcome,
            RouteOutcome::Answered { expired_ticket_id: Some(ticket.clone()), delivered: true }
        );
        assert!(h.tickets.list_replies(&ticket).await.expect("replies").is_empty());
        let state = h.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.phase, ConversationPhase::Idle);
        assert_eq!(h.answers.calls.lock().await[0].0, "como reinicio o roteador?");
    }

    #[tokio::test]
    async fn duplicate_delivery_is_processed_once() {
        let h = harness(FakeAnswers::replying("Resposta."), InMemoryMessageSender::default());

        let first = h.router.route_at(&inbound("m-3", "qual o horário?"), now()).await;
        let second = h.router.route_at(&inbound("m-3", "qual o horário?"), now()).await;

        assert!(matches!(first, Ok(RouteOutcome::Answered { .. })));
        assert!(matches!(second, Ok(RouteOutcome::Duplicate)));
        assert_eq!(h.answers.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn filtered_events_never_reach_the_log() {
        let h = harness(FakeAnswers::default(), InMemoryMessageSender::default());
        let mut own = inbound("m-4", "oi");
        own.from_self = true;

        let outcome = h.router.route_at(&own, now()).await.expect("route");
        let echo = h
            .router
            .route_at(&inbound("m-5", "Obrigado! Sua resposta foi anexada ao chamado."), now())
            .await
            .expect("route");

        assert_eq!(outcome, RouteOutcome::Dropped { reason: DropReason::FromSelf });
        assert_eq!(echo, RouteOutcome::Dropped { reason: DropReason::SystemTemplate });
        assert!(h.messages.recent_turns(&key(), 10).await.expect("turns").is_empty());
    }

    #[tokio::test]
    async fn history_excludes_current_question() {
        let h = harness(FakeAnswers::replying("Veja o artigo."), InMemoryMessageSender::default());
        h.router.route_at(&inbound("m-6", "primeira dúvida"), now()).await.expect("first");
        h.router
            .route_at(&inbound("m-7", "segunda dúvida"), now() + Duration::seconds(30))
            .await
            .expect("second");

        let calls = h.answers.calls.lock().await;
        let (query, history) = &calls[1];
        assert_eq!(query, "segunda dúvida");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].direction, MessageDirection::Inbound);
        assert_eq!(history[0].text, "primeira dúvida");
        assert_eq!(history[1].direction, MessageDirection::Outbound);
    }

    #[tokio::test]
    async fn declined_answer_stays_silent() {
        let h = harness(FakeAnswers::default(), InMemoryMessageSender::default());
        let outcome = h.router.route_at(&inbound("m-8", "??"), now()).await.expect("route");

        assert_eq!(outcome, RouteOutcome::NoAnswer { expired_ticket_id: None });
        assert!(h.sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn send_failure_does_not_fail_routing() {
        let h = harness(
            FakeAnswers::replying("Resposta."),
            InMemoryMessageSender::failing(SendError::Http { status: 503 }),
        );
        let outcome = h.router.route_at(&inbound("m-9", "dúvida"), now()).await.expect("route");

        assert_eq!(outcome, RouteOutcome::Answered { expired_ticket_id: None, delivered: false });
        assert!(h.audit.event_types().contains(&"gateway.send_failed".to_string()));
    }

    #[tokio::test]
    async fn reply_request_for_unknown_ticket_is_rejected() {
        let h = harness(FakeAnswers::default(), InMemoryMessageSender::default());
        let error = h
            .router
            .request_reply(&TicketId("TCK-404".into()), &key(), "?", None, now())
            .await
            .expect_err("unknown ticket");

        assert!(matches!(error, RouteError::UnknownTicket(id) if id.0 == "TCK-404"));
        assert!(h.states.load(&key()).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn reply_is_captured_on_redelivery_after_clear_fails() {
        let h = harness_with(
            FakeAnswers::replying("nunca usado"),
            InMemoryMessageSender::default(),
            Flaky::ClearAwaiting,
        );
        let ticket = with_ticket(&h, "TCK-5").await;
        h.router
            .request_reply(&ticket, &key(), "Qual o número de série?", None, now())
            .await
            .expect("request reply");

        let first = h
            .router
            .route_at(&inbound("m-1", "SN 4471-B"), now() + Duration::minutes(10))
            .await;
        let redelivery = h
            .router
            .route_at(&inbound("m-1", "SN 4471-B"), now() + Duration::minutes(11))
            .await
            .expect("redelivery");
        let late_copy = h
            .router
            .route_at(&inbound("m-1", "SN 4471-B"), now() + Duration::minutes(12))
            .await
            .expect("late copy");

        assert!(matches!(first, Err(RouteError::Repository(_))));
        assert_eq!(
            redelivery,
            RouteOutcome::ReplyCaptured { ticket_id: ticket.clone(), confirmation_sent: true }
        );
        assert_eq!(late_copy, RouteOutcome::Duplicate);
        let replies = h.tickets.list_replies(&ticket).await.expect("replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].body, "SN 4471-B");
        assert!(h.answers.calls.lock().await.is_empty());
        let confirmations = h
            .sender
            .sent()
            .await
            .iter()
            .filter(|message| message.text == "Obrigado! Sua resposta foi anexada ao chamado.")
            .count();
        assert_eq!(confirmations, 1);
    }

    #[tokio::test]
    async fn failed_append_keeps_the_ticket_question_open() {
        let h = harness_with(
            FakeAnswers::replying("nunca usado"),
            InMemoryMessageSender::default(),
            Flaky::AppendReply,
        );
        let ticket = with_ticket(&h, "TCK-6").await;
        h.router
            .request_reply(&ticket, &key(), "Qual o ramal?", None, now())
            .await
            .expect("request reply");

        let first =
            h.router.route_at(&inbound("m-1", "ramal 2040"), now() + Duration::minutes(5)).await;
        assert!(matches!(first, Err(RouteError::Repository(_))));
        let state = h.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.phase.awaiting_ticket(), Some(&ticket));

        let redelivery = h
            .router
            .route_at(&inbound("m-1", "ramal 2040"), now() + Duration::minutes(6))
            .await
            .expect("redelivery");

        assert_eq!(
            redelivery,
            RouteOutcome::ReplyCaptured { ticket_id: ticket.clone(), confirmation_sent: true }
        );
        assert_eq!(h.tickets.list_replies(&ticket).await.expect("replies").len(), 1);
        let state = h.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.phase, ConversationPhase::Idle);
    }

    #[tokio::test]
    async fn reply_request_with_unrepresentable_ttl_is_rejected() {
        let h = harness(FakeAnswers::default(), InMemoryMessageSender::default());
        let ticket = with_ticket(&h, "TCK-7").await;

        let error = h
            .router
            .request_reply(&ticket, &key(), "?", Some(i64::MAX), now())
            .await
            .expect_err("ttl out of range");

        assert!(matches!(
            error,
            RouteError::Transition(ConversationTransitionError::InvalidTtl { ttl_secs: i64::MAX })
        ));
        assert!(h.states.load(&key()).await.expect("load").is_none());
        assert!(h.sender.sent().await.is_empty());
    }
}
