//! Prompt text sent to the language model. User-facing fixed strings live in
//! `tellr_core::messages`, not here.

use tellr_core::domain::{CategoryGroup, Intent, Language, ScoredPassage};

use crate::llm::ChatMessage;

pub fn language_instruction(language: Language) -> String {
    format!(
        "Always reply in {}. Use the script normally used for that language.",
        language.display_name()
    )
}

pub fn specialist_system_prompt(group: CategoryGroup) -> &'static str {
    match group {
        CategoryGroup::Loans => {
            "You are a loan specialist for a retail bank. Answer only from the reference passages \
             provided. Quote interest rates, fees, tenures and eligibility exactly as written. If the \
             passages do not answer the question, say that you do not have that information."
        }
        CategoryGroup::Investments => {
            "You are an investment and deposit specialist for a retail bank. Answer only from the \
             reference passages provided. Never promise returns beyond what the passages state and \
             never give personalised investment advice. If the passages do not answer the question, \
             say that you do not have that information."
        }
        CategoryGroup::Support => {
            "You are a customer support specialist for a retail bank. Answer only from the reference \
             passages provided, in two to four short sentences. If the passages do not answer the \
             question, say that you do not have that information."
        }
    }
}

/// Grounding context block listing each passage with its section.
pub fn grounding_message(passages: &[ScoredPassage]) -> ChatMessage {
    let mut context = String::from("Reference passages:\n");
    for (index, scored) in passages.iter().enumerate() {
        context.push_str(&format!(
            "[{}] ({}) {}\n",
            index + 1,
            if scored.passage.section.is_empty() { "general" } else { &scored.passage.section },
            scored.passage.text
        ));
    }
    ChatMessage::system(context)
}

pub fn classification_prompt(text: &str) -> String {
    let labels: Vec<&str> = Intent::ALL.iter().map(Intent::as_label).collect();
    format!(
        "Classify the banking customer's message into exactly one label from: {}.\n\
         greeting = hello or small talk; account_operation = balances, statements, transactions; \
         guided_payment = sending money to a payee; knowledge_query = questions about loans, \
         deposits, cards, schemes, rates or bank procedures; feedback = praise, complaints, \
         thanks; other = anything else.\n\
         Reply with the label only.\n\
         Message: {text}",
        labels.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use tellr_core::domain::{Category, Language, Passage, PassageId, ScoredPassage};

    use super::{classification_prompt, grounding_message, language_instruction};

    #[test]
    fn classification_prompt_lists_every_label() {
        let prompt = classification_prompt("what is my balance");
        for label in ["greeting", "account_operation", "guided_payment", "knowledge_query"] {
            assert!(prompt.contains(label));
        }
        assert!(prompt.ends_with("Message: what is my balance"));
    }

    #[test]
    fn grounding_numbers_passages_with_sections() {
        let passage = Passage {
            id: PassageId("psg_1".to_string()),
            text: "Rate: 8.5%".to_string(),
            language: Language::English,
            category: Category::HomeLoan,
            section: "Interest Rate".to_string(),
            keywords: vec![],
        };
        let message = grounding_message(&[ScoredPassage { passage, score: 0.9 }]);
        assert!(message.content.contains("[1] (Interest Rate) Rate: 8.5%"));
        assert!(language_instruction(Language::Hindi).contains("Hindi"));
    }
}
