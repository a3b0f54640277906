use serde::{Deserialize, Serialize};

/// What a single user turn is trying to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    AccountOperation,
    GuidedPayment,
    KnowledgeQuery,
    Feedback,
    Other,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::Greeting,
        Intent::AccountOperation,
        Intent::GuidedPayment,
        Intent::KnowledgeQuery,
        Intent::Feedback,
        Intent::Other,
    ];

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::AccountOperation => "account_operation",
            Self::GuidedPayment => "guided_payment",
            Self::KnowledgeQuery => "knowledge_query",
            Self::Feedback => "feedback",
            Self::Other => "other",
        }
    }

    /// Parses a label as produced by a classifier model. Tolerates surrounding
    /// punctuation, casing, spaces instead of underscores and trailing prose.
    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .trim_matches(|character: char| !character.is_ascii_alphanumeric() && character != '_')
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");

        if let Some(exact) = Self::ALL.iter().find(|intent| intent.as_label() == normalized) {
            return Some(*exact);
        }

        let first_line = normalized.lines().next().unwrap_or_default();
        Self::ALL.iter().copied().find(|intent| first_line.starts_with(intent.as_label()))
    }

    /// Relative precedence used when two deterministic rules match phrases of equal length.
    pub fn rule_priority(&self) -> u8 {
        match self {
            Self::GuidedPayment => 6,
            Self::AccountOperation => 5,
            Self::KnowledgeQuery => 4,
            Self::Feedback => 3,
            Self::Greeting => 2,
            Self::Other => 1,
        }
    }
}
