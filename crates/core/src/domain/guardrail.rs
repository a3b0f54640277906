use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    Toxicity,
    Pii,
    Injection,
    OffTopic,
    Gibberish,
    RateLimit,
    LanguageMismatch,
}

impl ViolationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toxicity => "toxicity",
            Self::Pii => "pii",
            Self::Injection => "injection",
            Self::OffTopic => "off_topic",
            Self::Gibberish => "gibberish",
            Self::RateLimit => "rate_limit",
            Self::LanguageMismatch => "language_mismatch",
        }
    }
}

/// Outcome of one safety check. Computed per call, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GuardrailVerdict {
    Pass,
    /// The text passed after rewriting; `text` replaces the original.
    Sanitized { text: String, redactions: usize, category: ViolationCategory },
    Fail { category: ViolationCategory, message: String },
}

impl GuardrailVerdict {
    pub fn is_pass(&self) -> bool {
        !matches!(self, Self::Fail { .. })
    }

    pub fn category(&self) -> Option<ViolationCategory> {
        match self {
            Self::Pass => None,
            Self::Sanitized { category, .. } | Self::Fail { category, .. } => Some(*category),
        }
    }

    /// The text that may be shown: the sanitized replacement, the refusal message, or the
    /// original when the check passed untouched.
    pub fn resolve<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            Self::Pass => original,
            Self::Sanitized { text, .. } => text,
            Self::Fail { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardrailVerdict, ViolationCategory};

    #[test]
    fn resolve_prefers_replacement_text() {
        let original = "call 1234";
        assert_eq!(GuardrailVerdict::Pass.resolve(original), original);

        let sanitized = GuardrailVerdict::Sanitized {
            text: "call [REDACTED]".to_string(),
            redactions: 1,
            category: ViolationCategory::Pii,
        };
        assert!(sanitized.is_pass());
        assert_eq!(sanitized.resolve(original), "call [REDACTED]");

        let failed = GuardrailVerdict::Fail {
            category: ViolationCategory::Injection,
            message: "no".to_string(),
        };
        assert!(!failed.is_pass());
        assert_eq!(failed.category(), Some(ViolationCategory::Injection));
        assert_eq!(failed.resolve(original), "no");
    }
}
