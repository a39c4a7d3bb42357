//! Usefulness gate for generated answers.
//!
//! Silence beats a non-answer: replies that admit missing information, or
//! that are empty, are withheld instead of being sent to the contact.

use crate::text::fold;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, matched: Option<String> },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

const INSUFFICIENT_INFORMATION_PHRASES: &[&str] = &[
    "nao tenho informacoes suficientes",
    "nao tenho informacao suficiente",
    "nao tenho informacoes sobre",
    "nao possuo informacoes",
    "nao ha informacoes suficientes",
    "nao encontrei informacoes",
    "informacoes insuficientes",
    "nao sei responder",
    "nao consigo responder",
    "o contexto fornecido nao",
    "o contexto nao contem",
    "insufficient information",
    "not enough information",
    "don't have enough information",
    "do not have enough information",
    "i don't know",
    "i do not know",
    "cannot answer",
    "can't answer",
    "the context does not",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsefulnessGate {
    phrases: Vec<String>,
}

impl Default for UsefulnessGate {
    fn default() -> Self {
        Self { phrases: INSUFFICIENT_INFORMATION_PHRASES.iter().map(|p| (*p).to_string()).collect() }
    }
}

impl UsefulnessGate {
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self { phrases: phrases.into_iter().map(|p| fold(p.as_ref())).collect() }
    }

    pub fn evaluate(&self, answer: &str) -> GuardrailDecision {
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            return GuardrailDecision::Deny { reason_code: "empty_answer", matched: None };
        }

        let folded = fold(trimmed);
        match self.phrases.iter().find(|phrase| folded.contains(phrase.as_str())) {
            Some(phrase) => GuardrailDecision::Deny {
                reason_code: "insufficient_information",
                matched: Some(phrase.clone()),
            },
            None => GuardrailDecision::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardrailDecision, UsefulnessGate};

    #[test]
    fn grounded_answer_is_allowed() {
        let gate = UsefulnessGate::default();
        assert_eq!(
            gate.evaluate("Para redefinir a senha, acesse o portal e clique em Esqueci a senha."),
            GuardrailDecision::Allow
        );
    }

    #[test]
    fn portuguese_admission_is_denied_regardless_of_accents_and_case() {
        let gate = UsefulnessGate::default();
        let decision = gate.evaluate("Desculpe, NÃO tenho   informações suficientes para responder.");

        let reason = match decision {
            GuardrailDecision::Deny { reason_code, .. } => reason_code,
            GuardrailDecision::Allow => "",
        };
        assert_eq!(reason, "insufficient_information");
    }

    #[test]
    fn english_admission_and_empty_output_are_denied() {
        let gate = UsefulnessGate::default();
        assert!(!gate.evaluate("I don\u{2019}t know based on the provided context.").is_allowed());
        assert!(!gate.evaluate("There is not enough information here.").is_allowed());
        assert_eq!(
            gate.evaluate("   \n"),
            GuardrailDecision::Deny { reason_code: "empty_answer", matched: None }
        );
    }

    #[test]
    fn custom_phrases_are_folded() {
        let gate = UsefulnessGate::with_phrases(["Sem Informação"]);
        assert!(!gate.evaluate("sem informacao disponível").is_allowed());
        assert!(gate.evaluate("não tenho informações suficientes").is_allowed());
    }
}
