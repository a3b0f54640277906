//! Capability agents. Each intent maps to exactly one agent; agents receive the conversation
//! state by value and hand back the updated copy, so a failed turn never leaks half-applied
//! changes into the session.

pub mod account;
pub mod knowledge;
pub mod payment;
pub mod smalltalk;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tellr_core::audit::{AuditContext, AuditSink};
use tellr_core::config::FlowConfig;
use tellr_core::domain::{ConversationState, Intent, SidePayload, Utterance};
use tellr_core::errors::TurnError;
use tellr_core::session::SessionStore;

use crate::collaborators::{LedgerService, SecretVerifier};
use crate::llm::LanguageModel;
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;

pub use self::account::AccountAgent;
pub use self::knowledge::{KnowledgeAgent, SpecialistAgent};
pub use self::payment::PaymentAgent;
pub use self::smalltalk::{FallbackAgent, FeedbackAgent, GreetingAgent};

/// Everything an agent may read during one turn.
pub struct TurnContext<'a> {
    pub utterance: &'a Utterance,
    /// Secret code from the client's secure input, if any.
    pub secret: Option<&'a SecretString>,
    pub audit: &'a AuditContext,
    pub audit_sink: &'a dyn AuditSink,
    /// Used to checkpoint state before irreversible collaborator calls.
    pub store: &'a dyn SessionStore,
}

/// Where a reply's wording came from; decides how much output screening it gets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplySource {
    /// A localized message template, possibly with ledger data filled in.
    #[default]
    Template,
    /// Free text from the language model.
    Generated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentOutcome {
    pub reply: String,
    pub source: ReplySource,
    pub payload: Option<SidePayload>,
    pub state: ConversationState,
}

impl AgentOutcome {
    pub fn reply(reply: impl Into<String>, state: ConversationState) -> Self {
        Self { reply: reply.into(), source: ReplySource::Template, payload: None, state }
    }

    pub fn generated(reply: impl Into<String>, state: ConversationState) -> Self {
        Self { source: ReplySource::Generated, ..Self::reply(reply, state) }
    }

    pub fn with_payload(mut self, payload: SidePayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[async_trait]
pub trait CapabilityAgent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError>;
}

/// Collaborators shared by the standard agent set.
#[derive(Clone)]
pub struct AgentDependencies {
    pub ledger: Arc<dyn LedgerService>,
    pub verifier: Arc<dyn SecretVerifier>,
    pub model: Arc<dyn LanguageModel>,
    pub retriever: Arc<Retriever>,
    pub flow: FlowConfig,
    pub retry: RetryPolicy,
}

/// One agent per intent, resolved with an exhaustive match.
pub struct AgentRegistry {
    greeting: Arc<dyn CapabilityAgent>,
    account: Arc<dyn CapabilityAgent>,
    payment: Arc<dyn CapabilityAgent>,
    knowledge: Arc<dyn CapabilityAgent>,
    feedback: Arc<dyn CapabilityAgent>,
    fallback: Arc<dyn CapabilityAgent>,
}

impl AgentRegistry {
    pub fn new(dependencies: AgentDependencies) -> Self {
        let AgentDependencies { ledger, verifier, model, retriever, flow, retry } = dependencies;
        Self {
            greeting: Arc::new(GreetingAgent),
            account: Arc::new(AccountAgent::new(ledger.clone(), retry)),
            payment: Arc::new(PaymentAgent::new(ledger, verifier, &flow, retry)),
            knowledge: Arc::new(KnowledgeAgent::new(retriever, model, retry)),
            feedback: Arc::new(FeedbackAgent),
            fallback: Arc::new(FallbackAgent),
        }
    }

    pub fn for_intent(&self, intent: Intent) -> &dyn CapabilityAgent {
        match intent {
            Intent::Greeting => self.greeting.as_ref(),
            Intent::AccountOperation => self.account.as_ref(),
            Intent::GuidedPayment => self.payment.as_ref(),
            Intent::KnowledgeQuery => self.knowledge.as_ref(),
            Intent::Feedback => self.feedback.as_ref(),
            Intent::Other => self.fallback.as_ref(),
        }
    }
}
