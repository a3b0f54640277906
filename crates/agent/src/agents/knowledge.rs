use std::sync::Arc;

use async_trait::async_trait;
use tellr_core::domain::{
    Category, CategoryGroup, ConversationState, KnowledgeSource, Language, RetrievalResult,
    SidePayload,
};
use tellr_core::errors::{CollaboratorError, TurnError};
use tellr_core::messages::{render, MessageKey};
use tracing::info;

use crate::agents::{AgentOutcome, CapabilityAgent, TurnContext};
use crate::llm::{ChatMessage, LanguageModel, SamplingParams};
use crate::prompts;
use crate::retrieval::Retriever;
use crate::retry::{with_retries, RetryPolicy};

/// Answers one category group from retrieved passages.
pub struct SpecialistAgent {
    group: CategoryGroup,
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl SpecialistAgent {
    pub fn new(group: CategoryGroup, model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { group, model, retry }
    }

    pub fn group(&self) -> CategoryGroup {
        self.group
    }

    /// Callers guarantee `grounding` is non-empty.
    pub async fn answer(
        &self,
        question: &str,
        language: Language,
        grounding: &RetrievalResult,
    ) -> Result<String, CollaboratorError> {
        let messages = [
            ChatMessage::system(prompts::specialist_system_prompt(self.group)),
            prompts::grounding_message(&grounding.passages),
            ChatMessage::user(question),
        ];
        let params = SamplingParams::default();
        let answer = with_retries(self.retry, "knowledge.generate", || {
            self.model.generate(&messages, language, &params)
        })
        .await?;

        let trimmed = answer.trim();
        if trimmed.is_empty() {
            return Err(CollaboratorError::InvalidResponse {
                collaborator: "language_model",
                message: "empty answer".to_string(),
            });
        }
        Ok(trimmed.to_string())
    }
}

/// Routes knowledge questions to the loans, investments or support specialist. Without
/// grounding passages the question is answered with a fixed "no information" reply and the
/// model is never called.
pub struct KnowledgeAgent {
    retriever: Arc<Retriever>,
    loans: SpecialistAgent,
    investments: SpecialistAgent,
    support: SpecialistAgent,
}

impl KnowledgeAgent {
    pub fn new(retriever: Arc<Retriever>, model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self {
            retriever,
            loans: SpecialistAgent::new(CategoryGroup::Loans, model.clone(), retry),
            investments: SpecialistAgent::new(CategoryGroup::Investments, model.clone(), retry),
            support: SpecialistAgent::new(CategoryGroup::Support, model, retry),
        }
    }

    fn specialist(&self, group: CategoryGroup) -> &SpecialistAgent {
        match group {
            CategoryGroup::Loans => &self.loans,
            CategoryGroup::Investments => &self.investments,
            CategoryGroup::Support => &self.support,
        }
    }
}

#[async_trait]
impl CapabilityAgent for KnowledgeAgent {
    fn name(&self) -> &'static str {
        "knowledge"
    }

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        let utterance = context.utterance;
        let requested = Category::normalize(&utterance.text);
        let grounding = self
            .retriever
            .retrieve(&utterance.text, utterance.language, requested, self.retriever.default_k())
            .await?;

        let Some(top) = grounding.passages.first() else {
            info!(
                event_name = "knowledge.no_grounding",
                session_id = %utterance.session_id,
                category = requested.map(|category| category.key()).unwrap_or("any"),
                "no passages matched"
            );
            return Err(TurnError::NoGroundingAvailable);
        };

        let category = requested.unwrap_or(top.passage.category);
        let specialist = self.specialist(category.group());
        let answer = specialist.answer(&utterance.text, utterance.language, &grounding).await?;

        let card = SidePayload::KnowledgeCard {
            title: render(
                MessageKey::KnowledgeCardTitle,
                utterance.language,
                &[("topic", topic_label(category, utterance.language))],
            ),
            category,
            sources: grounding
                .passages
                .iter()
                .map(|scored| KnowledgeSource {
                    passage_id: scored.passage.id.0.clone(),
                    section: scored.passage.section.clone(),
                })
                .collect(),
        };
        Ok(AgentOutcome::generated(answer, state).with_payload(card))
    }
}

/// First category phrase written in the reply language's script.
fn topic_label(category: Category, language: Language) -> &'static str {
    let script = language.script();
    category
        .phrases()
        .iter()
        .copied()
        .find(|phrase| phrase.chars().any(|character| script.contains(character)))
        .unwrap_or_else(|| category.key())
}
