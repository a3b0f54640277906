use std::sync::Arc;
use std::time::Duration;

use tellr_core::domain::{Category, ConversationState, Intent, Language, Utterance};
use tellr_core::errors::CollaboratorError;
use tellr_core::flows::FlowType;
use tracing::debug;

use crate::llm::LanguageModel;
use crate::prompts;
use crate::retrieval::TtlCache;
use crate::retry::{with_retries, RetryPolicy};
use crate::slots::{contains_phrase, is_cancellation, normalize_text};

const MEMO_CAPACITY: usize = 4096;

struct PhraseRule {
    intent: Intent,
    phrase: &'static str,
    /// Bare payment verbs only count when the client is in payment mode.
    needs_payment_mode: bool,
}

const fn rule(intent: Intent, phrase: &'static str) -> PhraseRule {
    PhraseRule { intent, phrase, needs_payment_mode: false }
}

const fn verb(phrase: &'static str) -> PhraseRule {
    PhraseRule { intent: Intent::GuidedPayment, phrase, needs_payment_mode: true }
}

const PHRASE_RULES: &[PhraseRule] = &[
    rule(Intent::Greeting, "hi"),
    rule(Intent::Greeting, "hello"),
    rule(Intent::Greeting, "hey"),
    rule(Intent::Greeting, "good morning"),
    rule(Intent::Greeting, "good afternoon"),
    rule(Intent::Greeting, "good evening"),
    rule(Intent::Greeting, "namaste"),
    rule(Intent::Greeting, "नमस्ते"),
    rule(Intent::Greeting, "नमस्कार"),
    rule(Intent::Greeting, "हेलो"),
    rule(Intent::AccountOperation, "balance"),
    rule(Intent::AccountOperation, "account balance"),
    rule(Intent::AccountOperation, "statement"),
    rule(Intent::AccountOperation, "mini statement"),
    rule(Intent::AccountOperation, "transactions"),
    rule(Intent::AccountOperation, "last transactions"),
    rule(Intent::AccountOperation, "recent transactions"),
    rule(Intent::AccountOperation, "transaction history"),
    rule(Intent::AccountOperation, "बैलेंस"),
    rule(Intent::AccountOperation, "शेष राशि"),
    rule(Intent::AccountOperation, "लेनदेन"),
    rule(Intent::AccountOperation, "स्टेटमेंट"),
    rule(Intent::GuidedPayment, "send money"),
    rule(Intent::GuidedPayment, "transfer money"),
    rule(Intent::GuidedPayment, "pay to"),
    rule(Intent::GuidedPayment, "make a payment"),
    rule(Intent::GuidedPayment, "पैसे भेजो"),
    rule(Intent::GuidedPayment, "पैसे भेजने"),
    rule(Intent::GuidedPayment, "paise bhejo"),
    verb("pay"),
    verb("transfer"),
    verb("send"),
    verb("भेजो"),
    verb("भुगतान"),
    rule(Intent::KnowledgeQuery, "interest rate"),
    rule(Intent::KnowledgeQuery, "loan"),
    rule(Intent::KnowledgeQuery, "eligibility"),
    rule(Intent::KnowledgeQuery, "scheme"),
    rule(Intent::KnowledgeQuery, "documents required"),
    rule(Intent::KnowledgeQuery, "emi"),
    rule(Intent::KnowledgeQuery, "ब्याज दर"),
    rule(Intent::KnowledgeQuery, "ऋण"),
    rule(Intent::KnowledgeQuery, "लोन"),
    rule(Intent::KnowledgeQuery, "योजना"),
    rule(Intent::KnowledgeQuery, "पात्रता"),
    rule(Intent::Feedback, "feedback"),
    rule(Intent::Feedback, "complaint"),
    rule(Intent::Feedback, "thank you"),
    rule(Intent::Feedback, "thanks"),
    rule(Intent::Feedback, "धन्यवाद"),
    rule(Intent::Feedback, "शिकायत"),
    rule(Intent::Feedback, "सुझाव"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteSource {
    ActiveFlow,
    Cancellation,
    PhraseRule,
    Model,
    Memo,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActiveFlow => "active_flow",
            Self::Cancellation => "cancellation",
            Self::PhraseRule => "phrase_rule",
            Self::Model => "model",
            Self::Memo => "memo",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteDecision {
    pub intent: Intent,
    pub source: RouteSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MemoKey {
    text: String,
    language: Language,
    payment_mode: bool,
    flow: Option<FlowType>,
}

/// Classifies one utterance. Active flows and deterministic phrase rules win over the model;
/// model answers are memoized so repeated classification is stable. A full memo evicts its
/// least recently used answer, never the whole table.
pub struct IntentRouter {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
    memo: TtlCache<MemoKey, Intent>,
}

impl IntentRouter {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self::with_memo_capacity(model, retry, MEMO_CAPACITY)
    }

    pub fn with_memo_capacity(model: Arc<dyn LanguageModel>, retry: RetryPolicy, capacity: usize) -> Self {
        // memoized labels never expire; only capacity evicts them
        Self { model, retry, memo: TtlCache::new(capacity, Duration::MAX) }
    }

    pub async fn classify(
        &self,
        utterance: &Utterance,
        state: &ConversationState,
    ) -> Result<Intent, CollaboratorError> {
        self.route(utterance, state).await.map(|decision| decision.intent)
    }

    pub async fn route(
        &self,
        utterance: &Utterance,
        state: &ConversationState,
    ) -> Result<RouteDecision, CollaboratorError> {
        let decision = self.decide(utterance, state).await?;
        debug!(
            event_name = "router.classified",
            session_id = %utterance.session_id,
            intent = decision.intent.as_label(),
            source = decision.source.as_str(),
            "utterance classified"
        );
        Ok(decision)
    }

    async fn decide(
        &self,
        utterance: &Utterance,
        state: &ConversationState,
    ) -> Result<RouteDecision, CollaboratorError> {
        if state.has_active_flow() {
            return Ok(if is_cancellation(&utterance.text) {
                RouteDecision { intent: Intent::Other, source: RouteSource::Cancellation }
            } else {
                RouteDecision { intent: Intent::GuidedPayment, source: RouteSource::ActiveFlow }
            });
        }

        // a bare secret-code submission outside a flow has nothing to classify
        if utterance.text.trim().is_empty() {
            return Ok(RouteDecision { intent: Intent::Other, source: RouteSource::PhraseRule });
        }

        if let Some(intent) = match_rules(&utterance.text, utterance.context.payment_mode) {
            return Ok(RouteDecision { intent, source: RouteSource::PhraseRule });
        }

        let key = MemoKey {
            text: normalize_text(&utterance.text),
            language: utterance.language,
            payment_mode: utterance.context.payment_mode,
            flow: state.flow.as_ref().map(|flow| flow.flow_type()),
        };
        let prompt = prompts::classification_prompt(&utterance.text);
        let (intent, memoized) = self
            .memo
            .get_or_try_insert_with(key, || async {
                let label =
                    with_retries(self.retry, "router.classify", || self.model.classify(&prompt)).await?;
                Ok::<_, CollaboratorError>(Intent::from_label(&label).unwrap_or(Intent::Other))
            })
            .await?;
        let source = if memoized { RouteSource::Memo } else { RouteSource::Model };
        Ok(RouteDecision { intent, source })
    }
}

/// Longest matching phrase wins; equal lengths go to the higher-priority intent. Category
/// vocabulary from the knowledge base counts as knowledge phrases.
pub fn match_rules(text: &str, payment_mode: bool) -> Option<Intent> {
    let normalized = normalize_text(text);
    let mut best: Option<(usize, u8, Intent)> = None;
    let mut consider = |intent: Intent, phrase: &str| {
        if !contains_phrase(&normalized, phrase) {
            return;
        }
        let candidate = (phrase.chars().count(), intent.rule_priority(), intent);
        if best.map(|(length, priority, _)| (candidate.0, candidate.1) > (length, priority)).unwrap_or(true) {
            best = Some(candidate);
        }
    };

    for rule in PHRASE_RULES {
        if rule.needs_payment_mode && !payment_mode {
            continue;
        }
        consider(rule.intent, rule.phrase);
    }
    for category in Category::ALL.iter().filter(|category| **category != Category::GeneralSupport) {
        for phrase in category.phrases() {
            consider(Intent::KnowledgeQuery, phrase);
        }
    }

    best.map(|(_, _, intent)| intent)
}
