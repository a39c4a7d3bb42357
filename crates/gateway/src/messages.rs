use serde::Serialize;

use deskpilot_core::conversation::ContactKey;
use deskpilot_core::domain::ticket::TicketId;

/// Plain-text message addressed to one contact on one channel instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub instance_id: String,
    pub to: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn text(key: &ContactKey, text: impl Into<String>) -> Self {
        Self {
            instance_id: key.channel_instance_id.clone(),
            to: key.contact_id.clone(),
            text: text.into(),
        }
    }
}

/// Operator prompt asking the contact to reply about a ticket.
pub fn reply_prompt(ticket_id: &TicketId, prompt_text: &str) -> String {
    format!(
        "[Chamado {ticket_id}] {}\n\nResponda esta mensagem para adicionar sua resposta ao chamado.",
        prompt_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use deskpilot_core::conversation::ContactKey;
    use deskpilot_core::domain::ticket::TicketId;

    use super::{reply_prompt, OutboundMessage};

    #[test]
    fn message_serializes_for_gateway_api() {
        let message = OutboundMessage::text(&ContactKey::new("5511900001111", "inst-1"), "Olá");
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["instance_id"], "inst-1");
        assert_eq!(json["to"], "5511900001111");
        assert_eq!(json["text"], "Olá");
    }

    #[test]
    fn reply_prompt_references_ticket() {
        let text = reply_prompt(&TicketId("TCK-42".into()), "  Pode enviar o print do erro? ");
        assert!(text.starts_with("[Chamado TCK-42] Pode enviar o print do erro?"));
        assert!(text.contains("Responda esta mensagem"));
    }
}
