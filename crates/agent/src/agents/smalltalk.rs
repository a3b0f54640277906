use async_trait::async_trait;
use tellr_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use tellr_core::domain::ConversationState;
use tellr_core::errors::TurnError;
use tellr_core::messages::{localize, MessageKey};

use crate::agents::{AgentOutcome, CapabilityAgent, TurnContext};

pub struct GreetingAgent;

#[async_trait]
impl CapabilityAgent for GreetingAgent {
    fn name(&self) -> &'static str {
        "greeting"
    }

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        Ok(AgentOutcome::reply(localize(MessageKey::Greeting, context.utterance.language), state))
    }
}

/// Thanks the user and records that feedback arrived. The feedback text itself stays in
/// conversation history, not in the audit trail.
pub struct FeedbackAgent;

#[async_trait]
impl CapabilityAgent for FeedbackAgent {
    fn name(&self) -> &'static str {
        "feedback"
    }

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        context.audit_sink.emit(
            AuditEvent::from_context(
                context.audit,
                "feedback.received",
                AuditCategory::Routing,
                AuditOutcome::Success,
            )
            .with_metadata("language", context.utterance.language.tag())
            .with_metadata("length", context.utterance.text.chars().count().to_string()),
        );
        Ok(AgentOutcome::reply(
            localize(MessageKey::FeedbackThanks, context.utterance.language),
            state,
        ))
    }
}

pub struct FallbackAgent;

#[async_trait]
impl CapabilityAgent for FallbackAgent {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn handle(
        &self,
        context: &TurnContext<'_>,
        state: ConversationState,
    ) -> Result<AgentOutcome, TurnError> {
        Ok(AgentOutcome::reply(localize(MessageKey::FallbackHelp, context.utterance.language), state))
    }
}

#[cfg(test)]
mod tests {
    use tellr_core::domain::Language;
    use tellr_core::messages::{localize, MessageKey};

    use super::{FallbackAgent, FeedbackAgent, GreetingAgent};
    use crate::agents::testing::{state, Harness};
    use crate::agents::CapabilityAgent;

    #[tokio::test]
    async fn greeting_answers_in_the_users_language() {
        let harness = Harness::new("नमस्ते", Language::Hindi);
        let outcome = GreetingAgent.handle(&harness.context(), state()).await.expect("greeting");
        assert_eq!(outcome.reply, localize(MessageKey::Greeting, Language::Hindi));
        assert!(outcome.payload.is_none());
    }

    #[tokio::test]
    async fn feedback_is_audited_without_text() {
        let harness = Harness::new("the app is great, thanks", Language::English);
        FeedbackAgent.handle(&harness.context(), state()).await.expect("feedback");

        let events = harness.sink.events_of_type("feedback.received");
        assert_eq!(events.len(), 1);
        assert!(events[0].metadata.values().all(|value| !value.contains("great")));
    }

    #[tokio::test]
    async fn fallback_lists_capabilities() {
        let harness = Harness::new("hmm", Language::English);
        let outcome = FallbackAgent.handle(&harness.context(), state()).await.expect("fallback");
        assert_eq!(outcome.reply, localize(MessageKey::FallbackHelp, Language::English));
    }
}
