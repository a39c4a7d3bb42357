//! Messaging gateway edge: inbound events in, plain-text messages out.
//!
//! - `events`: inbound event shape and the drop filter
//! - `router`: per-contact routing between ticket-reply capture and retrieval
//! - `messages` / `sender`: outbound message shape and delivery
//!
//! ```text
//! webhook → InboundFilter → InboundRouter → ConversationMachine
//!                                            ↓                  ↓
//!                                   MessageSender ← reply capture | AnswerEngine
//! ```

pub mod events;
pub mod messages;
pub mod router;
pub mod sender;

pub use events::{DropReason, InboundEvent, InboundFilter};
pub use messages::OutboundMessage;
pub use router::{ConversationStores, InboundRouter, RouteError, RouteOutcome, RouterSettings};
pub use sender::{sender_from_config, MessageSender, SendError};
