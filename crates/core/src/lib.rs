pub mod audit;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use conversation::{
    ContactKey, ConversationMachine, ConversationPhase, ConversationState, InboundRoute,
    MessageDirection,
};
pub use domain::knowledge::{Document, DocumentId, RetrievalCandidate};
pub use domain::priority::{normalize_priority, PriorityLevel};
pub use domain::settings::{AdvancedSettings, SettingsSnapshot};
pub use domain::team::{Team, TeamId};
pub use domain::ticket::{
    ClassificationMode, ClassificationRequest, ClassificationResult, Confidence, TicketId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError, InterfaceErrorKind};
