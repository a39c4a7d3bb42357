use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ticket::TicketId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Ingress,
    Conversation,
    Classification,
    Retrieval,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Degraded,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub ticket_id: Option<TicketId>,
    pub contact_id: Option<String>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        ticket_id: Option<TicketId>,
        contact_id: Option<String>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { ticket_id, contact_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }

    pub fn system(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self::new(None, None, correlation_id, actor)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub ticket_id: Option<TicketId>,
    pub contact_id: Option<String>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            ticket_id: context.ticket_id.clone(),
            contact_id: context.contact_id.clone(),
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: context.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Writes audit events into the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                ticket_id = event.ticket_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
                contact_id = event.contact_id.as_deref().unwrap_or("unknown"),
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Degraded | AuditOutcome::Rejected | AuditOutcome::Failed => {
                tracing::warn!(
                    event_name = %event.event_type,
                    category = ?event.category,
                    outcome = ?event.outcome,
                    correlation_id = %event.correlation_id,
                    ticket_id =
                        event.ticket_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
                    contact_id = event.contact_id.as_deref().unwrap_or("unknown"),
                    actor = %event.actor,
                    metadata = %metadata,
                    "audit event"
                )
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{
            AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
        },
        domain::ticket::TicketId,
    };

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(
            Some(TicketId("TCK-0042".to_owned())),
            Some("5511999990000".to_owned()),
            "req-123",
            "inbound-router",
        );
        sink.emit(
            AuditEvent::new(
                &context,
                "conversation.reply_captured",
                AuditCategory::Conversation,
                AuditOutcome::Success,
            )
            .with_metadata("from", "awaiting_ticket_reply")
            .with_metadata("to", "idle"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].contact_id.as_deref(), Some("5511999990000"));
        assert_eq!(events[0].ticket_id.as_ref().map(|id| id.0.as_str()), Some("TCK-0042"));
        assert!(events[0].metadata.contains_key("from"));
        assert_eq!(sink.event_types(), vec!["conversation.reply_captured".to_string()]);
    }
}
