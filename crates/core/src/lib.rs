pub mod audit;
pub mod chunker;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod messages;
pub mod session;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use chunker::{Chunker, ChunkerOptions, SourceDocument};
pub use domain::conversation::{ConversationState, SessionId, Utterance, UtteranceContext};
pub use domain::intent::Intent;
pub use domain::language::Language;
pub use domain::passage::{Category, Passage, RetrievalResult};
pub use domain::payload::{SidePayload, TurnResponse};
pub use errors::{ApplicationError, CollaboratorError, DomainError, InterfaceError, TurnError};
pub use messages::{localize, MessageKey};
pub use session::{InMemorySessionStore, SessionStore, TurnRecord};
