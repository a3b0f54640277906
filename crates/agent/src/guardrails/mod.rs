//! Rule-based safety checks run before routing and after generation.
//!
//! Input checks short-circuit in a fixed order: rate limit, injection, off-topic, gibberish,
//! toxicity, PII. Output checks redact PII, normalize model refusals and enforce the target
//! language's script. Templated replies, already localized, only get redaction, and so do the
//! display strings of side payloads. Only the rate-limit counters are mutable.

pub mod gibberish;
pub mod patterns;
pub mod pii;
pub mod rate_limit;
pub mod script;

use tellr_core::config::SafetyConfig;
use tellr_core::domain::{GuardrailVerdict, Language, SessionId, SidePayload, ViolationCategory};
use tellr_core::messages::{localize, MessageKey};
use tokio::time::Instant;

use self::rate_limit::RateLimiter;

/// Past this many tracked sessions the limiter drops idle ones on the next check.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafetyPolicy {
    pub script_floor: f32,
    pub gibberish_min_entropy: f32,
    pub max_input_chars: usize,
}

impl From<&SafetyConfig> for SafetyPolicy {
    fn from(config: &SafetyConfig) -> Self {
        Self {
            script_floor: config.script_floor,
            gibberish_min_entropy: config.gibberish_min_entropy,
            max_input_chars: config.max_input_chars,
        }
    }
}

#[derive(Debug)]
pub struct SafetyFilter {
    policy: SafetyPolicy,
    rate_limiter: RateLimiter,
}

impl SafetyFilter {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            policy: SafetyPolicy::from(config),
            rate_limiter: RateLimiter::new(config.per_minute, config.per_hour),
        }
    }

    pub fn policy(&self) -> SafetyPolicy {
        self.policy
    }

    pub fn check_input(&self, text: &str, language: Language, session_id: &SessionId) -> GuardrailVerdict {
        let failed = if !self.acquire(session_id) {
            Some(ViolationCategory::RateLimit)
        } else if patterns::is_injection(text) {
            Some(ViolationCategory::Injection)
        } else if patterns::is_off_topic(text) {
            Some(ViolationCategory::OffTopic)
        } else if gibberish::is_gibberish(
            text,
            self.policy.gibberish_min_entropy,
            self.policy.max_input_chars,
        ) {
            Some(ViolationCategory::Gibberish)
        } else if patterns::is_toxic(text) {
            Some(ViolationCategory::Toxicity)
        } else if pii::contains_pii(text) {
            Some(ViolationCategory::Pii)
        } else {
            None
        };

        match failed {
            Some(category) => refusal(category, language),
            None => GuardrailVerdict::Pass,
        }
    }

    /// A secret code sent through the client's secure input with no text; only the rate limit
    /// applies.
    pub fn check_secret_submission(&self, language: Language, session_id: &SessionId) -> GuardrailVerdict {
        if self.acquire(session_id) {
            GuardrailVerdict::Pass
        } else {
            refusal(ViolationCategory::RateLimit, language)
        }
    }

    fn acquire(&self, session_id: &SessionId) -> bool {
        if self.rate_limiter.tracked_sessions() > SWEEP_THRESHOLD {
            self.rate_limiter.sweep(Instant::now());
        }
        self.rate_limiter.try_acquire(session_id)
    }

    /// `Fail` means the reply could not be rescued and must be replaced by the fallback
    /// message carried in the verdict.
    pub fn check_output(&self, text: &str, language: Language) -> GuardrailVerdict {
        let (redacted, redactions) = pii::redact(text);

        if patterns::is_model_refusal(&redacted) {
            let standard = localize(MessageKey::StandardRefusal, language);
            if standard == text {
                return GuardrailVerdict::Pass;
            }
            return GuardrailVerdict::Sanitized {
                text: standard.to_string(),
                redactions,
                category: ViolationCategory::OffTopic,
            };
        }

        if !script::is_consistent(&redacted, language, self.policy.script_floor) {
            return GuardrailVerdict::Fail {
                category: ViolationCategory::LanguageMismatch,
                message: localize(MessageKey::SafetyFallback, language).to_string(),
            };
        }

        if redactions > 0 {
            GuardrailVerdict::Sanitized { text: redacted, redactions, category: ViolationCategory::Pii }
        } else {
            GuardrailVerdict::Pass
        }
    }

    /// Screens a reply rendered from a localized template with data filled in. Numbers in
    /// `issued` (references this system minted) are not treated as PII.
    pub fn check_templated_output(&self, text: &str, issued: &[&str]) -> GuardrailVerdict {
        let (redacted, redactions) = pii::redact_except(text, issued);
        if redactions > 0 {
            GuardrailVerdict::Sanitized { text: redacted, redactions, category: ViolationCategory::Pii }
        } else {
            GuardrailVerdict::Pass
        }
    }

    /// Redacts PII inside the payload's display strings in place; returns the redaction count.
    pub fn redact_payload(&self, payload: &mut SidePayload) -> usize {
        let mut total = 0;
        for field in payload.display_text_mut() {
            let (redacted, redactions) = pii::redact(field);
            if redactions > 0 {
                *field = redacted;
                total += redactions;
            }
        }
        total
    }
}

fn refusal(category: ViolationCategory, language: Language) -> GuardrailVerdict {
    GuardrailVerdict::Fail {
        category,
        message: localize(MessageKey::refusal_for(category), language).to_string(),
    }
}
