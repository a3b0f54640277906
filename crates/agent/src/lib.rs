//! Conversational runtime for the tellr banking assistant.
//!
//! One utterance goes through a fixed pipeline owned by [`supervisor::Supervisor`]:
//! 1. **Input safety** (`guardrails`) - rate limits, injection, topic, gibberish, toxicity, PII
//! 2. **Routing** (`router`) - deterministic phrase rules first, model classification last
//! 3. **Dispatch** (`agents`) - one capability agent per intent
//! 4. **Output safety** (`guardrails`) - PII redaction and language consistency
//!
//! Knowledge answers are grounded through `retrieval`; with no passages the assistant refuses
//! instead of asking the model to improvise. The payment dialogue runs on the deterministic
//! state machine in `tellr_core::flows`; the model never moves money or decides a transition.

pub mod agents;
pub mod collaborators;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod retrieval;
pub mod retry;
pub mod router;
pub mod slots;
pub mod supervisor;

pub use agents::{AgentOutcome, AgentRegistry, CapabilityAgent, ReplySource, TurnContext};
pub use collaborators::{LedgerService, SecretVerifier};
pub use guardrails::SafetyFilter;
pub use llm::{ChatMessage, LanguageModel, OpenAiCompatibleModel, SamplingParams};
pub use retrieval::{Embedder, Retriever, VectorIndex};
pub use router::IntentRouter;
pub use supervisor::Supervisor;
