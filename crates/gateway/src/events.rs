use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use deskpilot_agent::text::fold;
use deskpilot_core::conversation::ContactKey;

/// Message delivered by the messaging gateway. `button_id` stands in for the
/// text when a contact taps a quick-reply button.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message_id: String,
    pub contact_id: String,
    pub channel_instance_id: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub from_self: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub button_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    pub fn key(&self) -> ContactKey {
        ContactKey::new(self.contact_id.clone(), self.channel_instance_id.clone())
    }

    /// Trimmed text, else the button id, else nothing.
    pub fn body(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .or_else(|| self.button_id.as_deref().map(str::trim).filter(|id| !id.is_empty()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    FromSelf,
    Group,
    Empty,
    SystemTemplate,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FromSelf => "from_self",
            Self::Group => "group",
            Self::Empty => "empty",
            Self::SystemTemplate => "system_template",
        }
    }
}

/// Banners the helpdesk itself sends: SLA notices, ticket-created notices and
/// reply confirmations. Compared after folding.
const SYSTEM_TEMPLATE_PHRASES: &[&str] = &[
    "aviso de sla",
    "prazo de sla",
    "sla de atendimento",
    "seu chamado foi aberto",
    "seu chamado foi criado",
    "chamado aberto com sucesso",
    "novo chamado criado",
    "resposta registrada",
    "responda esta mensagem para adicionar",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundFilter {
    deny_list: Vec<String>,
}

impl Default for InboundFilter {
    fn default() -> Self {
        Self { deny_list: SYSTEM_TEMPLATE_PHRASES.iter().map(|p| (*p).to_string()).collect() }
    }
}

impl InboundFilter {
    /// Adds a phrase, typically the configured confirmation text, so echoes
    /// of our own messages never loop back in.
    pub fn with_phrase(mut self, phrase: &str) -> Self {
        let folded = fold(phrase);
        if !folded.is_empty() && !self.deny_list.contains(&folded) {
            self.deny_list.push(folded);
        }
        self
    }

    pub fn check(&self, event: &InboundEvent) -> Result<(), DropReason> {
        if event.from_self {
            return Err(DropReason::FromSelf);
        }
        if event.is_group {
            return Err(DropReason::Group);
        }
        let Some(body) = event.body() else {
            return Err(DropReason::Empty);
        };
        let folded = fold(body);
        if self.deny_list.iter().any(|phrase| folded.contains(phrase.as_str())) {
            return Err(DropReason::SystemTemplate);
        }
        Ok(())
    }
}
