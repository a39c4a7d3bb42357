use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ticket::TicketId;

/// One conversation per contact per channel instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactKey {
    pub contact_id: String,
    pub channel_instance_id: String,
}

impl ContactKey {
    pub fn new(contact_id: impl Into<String>, channel_instance_id: impl Into<String>) -> Self {
        Self { contact_id: contact_id.into(), channel_instance_id: channel_instance_id.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// Message log entry used as retrieval history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub direction: MessageDirection,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    AwaitingTicketReply { ticket_id: TicketId, expires_at: DateTime<Utc> },
}

impl ConversationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingTicketReply { .. } => "awaiting_ticket_reply",
        }
    }

    pub fn awaiting_ticket(&self) -> Option<&TicketId> {
        match self {
            Self::Idle => None,
            Self::AwaitingTicketReply { ticket_id, .. } => Some(ticket_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub key: ContactKey,
    pub phase: ConversationPhase,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_direction: Option<MessageDirection>,
}

impl ConversationState {
    pub fn idle(key: ContactKey) -> Self {
        Self { key, phase: ConversationPhase::Idle, last_message_at: None, last_direction: None }
    }

    pub fn record(&mut self, direction: MessageDirection, at: DateTime<Utc>) {
        self.last_message_at = Some(at);
        self.last_direction = Some(direction);
    }

    pub fn apply_outcome(&mut self, outcome: &TransitionOutcome) {
        self.phase = outcome.to.clone();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationEvent {
    ReplyRequested { ticket_id: TicketId, ttl_secs: i64 },
    InboundMessage,
    OutboundMessage,
}

impl ConversationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReplyRequested { .. } => "reply_requested",
            Self::InboundMessage => "inbound_message",
            Self::OutboundMessage => "outbound_message",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationAction {
    SendReplyPrompt,
    CaptureTicketReply,
    ClearAwaiting,
    SendConfirmation,
    InvokeRetrieval,
}

/// Where an inbound message goes after the state decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundRoute {
    TicketReply { ticket_id: TicketId },
    Retrieval { expired_ticket_id: Option<TicketId> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ConversationPhase,
    pub to: ConversationPhase,
    pub event: ConversationEvent,
    pub route: Option<InboundRoute>,
    pub actions: Vec<ConversationAction>,
}
