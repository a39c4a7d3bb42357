pub mod engine;
pub mod states;

pub use engine::{ConversationMachine, ConversationTransitionError, MAX_REPLY_TTL_SECS};
pub use states::{
    ContactKey, ConversationAction, ConversationEvent, ConversationPhase, ConversationState,
    ConversationTurn, InboundRoute, MessageDirection, TransitionOutcome,
};
