use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::conversation::states::{
    ConversationAction, ConversationEvent, ConversationPhase, InboundRoute, TransitionOutcome,
};

/// Longest reply window a ticket question may stay open.
pub const MAX_REPLY_TTL_SECS: i64 = 30 * 86_400;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationTransitionError {
    #[error("reply ttl of {ttl_secs}s is out of range")]
    InvalidTtl { ttl_secs: i64 },
}

/// Decides, per contact, whether an inbound message answers a pending ticket
/// question or is a new question for retrieval. Pure; persistence applies the
/// outcome with a conditional update.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConversationMachine;

impl ConversationMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_phase(&self) -> ConversationPhase {
        ConversationPhase::Idle
    }

    pub fn apply(
        &self,
        current: &ConversationPhase,
        event: &ConversationEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ConversationTransitionError> {
        transition(current, event, now)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ConversationPhase,
        event: &ConversationEvent,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, ConversationTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, now);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        audit_event_type(outcome),
                        AuditCategory::Conversation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.name())
                    .with_metadata("to", outcome.to.name())
                    .with_metadata("event", outcome.event.name()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "conversation.transition_rejected",
                        AuditCategory::Conversation,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn audit_event_type(outcome: &TransitionOutcome) -> &'static str {
    match &outcome.route {
        Some(InboundRoute::TicketReply { .. }) => "conversation.reply_captured",
        Some(InboundRoute::Retrieval { expired_ticket_id: Some(_) }) => {
            "conversation.awaiting_expired"
        }
        Some(InboundRoute::Retrieval { expired_ticket_id: None }) => "conversation.retrieval_routed",
        None => match outcome.event {
            ConversationEvent::ReplyRequested { .. } => "conversation.reply_requested",
            _ => "conversation.transition_applied",
        },
    }
}

fn transition(
    current: &ConversationPhase,
    event: &ConversationEvent,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, ConversationTransitionError> {
    use ConversationAction::{
        CaptureTicketReply, ClearAwaiting, InvokeRetrieval, SendConfirmation, SendReplyPrompt,
    };
    use ConversationPhase::{AwaitingTicketReply, Idle};

    let (to, route, actions) = match (current, event) {
        (_, ConversationEvent::ReplyRequested { ticket_id, ttl_secs }) => {
            let invalid = || ConversationTransitionError::InvalidTtl { ttl_secs: *ttl_secs };
            if *ttl_secs <= 0 || *ttl_secs > MAX_REPLY_TTL_SECS {
                return Err(invalid());
            }
            let expires_at = Duration::try_seconds(*ttl_secs)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(invalid)?;
            let to = AwaitingTicketReply { ticket_id: ticket_id.clone(), expires_at };
            (to, None, vec![SendReplyPrompt])
        }
        (Idle, ConversationEvent::InboundMessage) => {
            (Idle, Some(InboundRoute::Retrieval { expired_ticket_id: None }), vec![InvokeRetrieval])
        }
        (AwaitingTicketReply { ticket_id, expires_at }, ConversationEvent::InboundMessage) => {
            if now <= *expires_at {
                (
                    Idle,
                    Some(InboundRoute::TicketReply { ticket_id: ticket_id.clone() }),
                    vec![CaptureTicketReply, ClearAwaiting, SendConfirmation],
                )
            } else {
                (
                    Idle,
                    Some(InboundRoute::Retrieval { expired_ticket_id: Some(ticket_id.clone()) }),
                    vec![ClearAwaiting, InvokeRetrieval],
                )
            }
        }
        (phase, ConversationEvent::OutboundMessage) => (phase.clone(), None, Vec::new()),
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), route, actions })
}
