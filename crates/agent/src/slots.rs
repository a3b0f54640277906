//! Heuristic slot extraction for the payment dialogue. The state machine decides what a slot
//! means; this module only reads values out of free text.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use secrecy::SecretString;
use tellr_core::domain::Payee;

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yeah", "yep", "sure", "ok", "okay", "confirm", "confirmed", "proceed",
    "go ahead", "do it", "haan", "han", "ha", "ji haan", "हाँ", "हां", "जी हाँ", "जी हां", "ठीक है",
    "पुष्टि", "आगे बढ़ो",
];
const NEGATIVE: &[&str] = &[
    "no", "nope", "nah", "don't", "do not", "not now", "nahi", "nahin", "नहीं", "नही", "मत करो",
];
const CANCELLATION: &[&str] = &[
    "cancel", "stop", "abort", "never mind", "nevermind", "forget it", "cancel karo", "रद्द",
    "रद्द करो", "रोको", "बंद करो",
];
const RETRY: &[&str] = &["try again", "retry", "again", "once more", "फिर से", "दोबारा", "phir se"];

/// Lowercases, turns punctuation into spaces and collapses whitespace.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|character| {
            if (character.is_ascii_punctuation() && character != '\'')
                || matches!(character, '।' | '॥' | '“' | '”')
            {
                ' '
            } else {
                character
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-word phrase containment over normalized text.
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    format!(" {normalized} ").contains(&format!(" {phrase} "))
}

fn matches_any(text: &str, phrases: &[&str]) -> bool {
    let normalized = normalize_text(text);
    phrases.iter().any(|phrase| contains_phrase(&normalized, phrase))
}

pub fn is_cancellation(text: &str) -> bool {
    matches_any(text, CANCELLATION)
}

pub fn is_affirmative(text: &str) -> bool {
    !is_negative(text) && matches_any(text, AFFIRMATIVE)
}

pub fn is_negative(text: &str) -> bool {
    matches_any(text, NEGATIVE)
}

pub fn is_retry_request(text: &str) -> bool {
    matches_any(text, RETRY) || is_affirmative(text)
}

fn amount_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)(\d[\d,]*(?:\.\d+)?)(?:\s*(thousand|lakhs?|lacs?|crores?|cr|हज़ार|हजार|लाख|करोड़)\b|\s?(k)\b)?",
            )
            .ok()
        })
        .as_ref()
}

fn multiplier(unit: &str) -> Decimal {
    match unit.to_lowercase().as_str() {
        "k" | "thousand" | "हज़ार" | "हजार" => Decimal::new(1_000, 0),
        "lakh" | "lakhs" | "lac" | "lacs" | "लाख" => Decimal::new(100_000, 0),
        "crore" | "crores" | "cr" | "करोड़" => Decimal::new(10_000_000, 0),
        _ => Decimal::ONE,
    }
}

/// First positive amount in the text: `500`, `₹1,50,000`, `2.5k`, `1.5 lakh`, `2 हजार`.
/// Rounded to paise.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let pattern = amount_pattern()?;
    pattern.captures_iter(text).find_map(|captures| {
        let digits = captures.get(1)?.as_str().replace(',', "");
        let value = Decimal::from_str(&digits).ok()?;
        let unit = captures.get(2).or_else(|| captures.get(3)).map(|unit| unit.as_str());
        let amount = value.checked_mul(unit.map(multiplier).unwrap_or(Decimal::ONE))?;
        (amount > Decimal::ZERO).then(|| amount.round_dp(2))
    })
}

/// Best payee mentioned in the text. Full names and aliases beat a bare first name; the
/// longest match wins.
pub fn match_payee<'a>(text: &str, payees: &'a [Payee]) -> Option<&'a Payee> {
    let normalized = normalize_text(text);
    let mut best: Option<(usize, &Payee)> = None;

    for payee in payees {
        let mut names: Vec<String> = std::iter::once(payee.display_name.as_str())
            .chain(payee.aliases.iter().map(String::as_str))
            .map(normalize_text)
            .collect();
        if let Some(first) = normalize_text(&payee.display_name).split_whitespace().next() {
            if first.chars().count() >= 3 {
                names.push(first.to_string());
            }
        }

        for name in names {
            if !contains_phrase(&normalized, &name) {
                continue;
            }
            let length = name.chars().count();
            if best.map(|(best_length, _)| length > best_length).unwrap_or(true) {
                best = Some((length, payee));
            }
        }
    }

    best.map(|(_, payee)| payee)
}

/// A digits-only message of 4 to 6 digits, read as a secret code when no secure side channel
/// was used.
pub fn secret_code_candidate(text: &str) -> Option<SecretString> {
    let compact: String = text.chars().filter(|character| !character.is_whitespace()).collect();
    let is_code = (4..=6).contains(&compact.chars().count())
        && compact.chars().all(|character| character.is_ascii_digit());
    is_code.then(|| SecretString::from(compact))
}

/// Text as it may be written to history: a typed secret code never reaches the store.
pub fn scrub_for_history(text: &str) -> String {
    if secret_code_candidate(text).is_some() {
        "[secret code withheld]".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tellr_core::domain::Payee;

    use super::{
        is_affirmative, is_cancellation, is_negative, is_retry_request, match_payee,
        normalize_text, parse_amount, scrub_for_history, secret_code_candidate,
    };

    fn payees() -> Vec<Payee> {
        vec![
            Payee {
                payee_id: "p-asha".to_string(),
                display_name: "Asha Verma".to_string(),
                aliases: vec!["mom".to_string(), "आशा".to_string()],
            },
            Payee {
                payee_id: "p-ravi".to_string(),
                display_name: "Ravi Kumar".to_string(),
                aliases: vec![],
            },
        ]
    }

    #[test]
    fn parses_indian_amount_shapes() {
        assert_eq!(parse_amount("send 500 to Asha"), Some(Decimal::new(500, 0)));
        assert_eq!(parse_amount("pay ₹1,50,000 now"), Some(Decimal::new(150_000, 0)));
        assert_eq!(parse_amount("2.5k please"), Some(Decimal::new(2_500, 0)));
        assert_eq!(parse_amount("1.5 lakh"), Some(Decimal::new(150_000, 0)));
        assert_eq!(parse_amount("2 हजार भेजो"), Some(Decimal::new(2_000, 0)));
        assert_eq!(parse_amount("Rs. 99.999"), Some(Decimal::new(10_000, 2)));
        assert_eq!(parse_amount("0 rupees"), None);
        assert_eq!(parse_amount("a lot"), None);
    }

    #[test]
    fn payee_matching_prefers_longest_name() {
        let payees = payees();
        assert_eq!(match_payee("send money to Asha Verma", &payees).map(|p| p.payee_id.as_str()), Some("p-asha"));
        assert_eq!(match_payee("pay ravi 300", &payees).map(|p| p.payee_id.as_str()), Some("p-ravi"));
        assert_eq!(match_payee("transfer to mom", &payees).map(|p| p.payee_id.as_str()), Some("p-asha"));
        assert_eq!(match_payee("आशा को भेजो", &payees).map(|p| p.payee_id.as_str()), Some("p-asha"));
        assert!(match_payee("pay the landlord", &payees).is_none());
        assert!(match_payee("pay ravishankar", &payees).is_none());
    }

    #[test]
    fn yes_no_cancel_and_retry_words() {
        assert!(is_affirmative("Yes, go ahead."));
        assert!(is_affirmative("हाँ"));
        assert!(!is_affirmative("no"));
        assert!(is_negative("No thanks"));
        assert!(!is_negative("now please"));
        assert!(is_cancellation("please cancel this"));
        assert!(is_cancellation("रद्द करो"));
        assert!(!is_cancellation("what is the cancellation charge"));
        assert!(is_retry_request("try again"));
        assert!(is_retry_request("फिर से"));
    }

    #[test]
    fn secret_codes_are_short_digit_runs() {
        let code = secret_code_candidate(" 4321 ").expect("code");
        assert_eq!(code.expose_secret(), "4321");
        assert!(secret_code_candidate("123").is_none());
        assert!(secret_code_candidate("1234567").is_none());
        assert!(secret_code_candidate("12a4").is_none());
        assert_eq!(scrub_for_history("987654"), "[secret code withheld]");
        assert_eq!(scrub_for_history("pay 500"), "pay 500");
    }

    #[test]
    fn normalization_strips_punctuation() {
        assert_eq!(normalize_text("  Hello,   WORLD! "), "hello world");
        assert_eq!(normalize_text("हाँ।"), "हाँ");
    }
}
