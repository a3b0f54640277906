use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

pub const PLACEHOLDER: &str = "[REDACTED]";

/// Patterns whose first capture group (or whole match) is sensitive.
const PII_PATTERNS: &[&str] = &[
    // national ID, 12 digits in groups of four
    r"\b\d{4}[ -]?\d{4}[ -]?\d{4}\b",
    // PAN
    r"(?i)\b[a-z]{5}\d{4}[a-z]\b",
    // card numbers, 13 to 19 digits with optional separators
    r"\b(?:\d[ -]?){12,18}\d\b",
    // account numbers
    r"\b\d{9,18}\b",
    // security codes near their keyword, either order
    r"(?i)\b(?:pin|cvv|cvc|otp|mpin|upi\s+pin)\b[^\d\n]{0,20}\b(\d{3,6})\b",
    r"(?i)\b(\d{3,6})\b[^\d\n]{0,20}\b(?:pin|cvv|cvc|otp|mpin)\b",
    r"(?:पिन|ओटीपी|सीवीवी)[^\d\n]{0,20}(\d{3,6})\b",
];

fn patterns() -> &'static [Regex] {
    static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();
    COMPILED.get_or_init(|| PII_PATTERNS.iter().filter_map(|pattern| Regex::new(pattern).ok()).collect())
}

/// Sensitive byte ranges, sorted and merged.
pub fn find_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans: Vec<Range<usize>> = Vec::new();
    for pattern in patterns() {
        for captures in pattern.captures_iter(text) {
            if let Some(found) = captures.get(1).or_else(|| captures.get(0)) {
                spans.push(found.range());
            }
        }
    }

    spans.sort_by_key(|span| (span.start, span.end));
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

pub fn contains_pii(text: &str) -> bool {
    patterns().iter().any(|pattern| pattern.is_match(text))
}

/// Replaces every sensitive span with [`PLACEHOLDER`]; returns the new text and the number of
/// spans replaced.
pub fn redact(text: &str) -> (String, usize) {
    redact_except(text, &[])
}

/// Like [`redact`], but spans lying inside an occurrence of a `keep` token stay readable.
/// Used for references the system itself issued, which may look like account numbers.
pub fn redact_except(text: &str, keep: &[&str]) -> (String, usize) {
    let kept: Vec<Range<usize>> = keep
        .iter()
        .filter(|token| !token.is_empty())
        .flat_map(|token| text.match_indices(token).map(|(start, token)| start..start + token.len()))
        .collect();
    let spans: Vec<Range<usize>> = find_spans(text)
        .into_iter()
        .filter(|span| !kept.iter().any(|token| token.start <= span.start && span.end <= token.end))
        .collect();
    if spans.is_empty() {
        return (text.to_string(), 0);
    }

    let mut redacted = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in &spans {
        redacted.push_str(&text[cursor..span.start]);
        redacted.push_str(PLACEHOLDER);
        cursor = span.end;
    }
    redacted.push_str(&text[cursor..]);
    (redacted, spans.len())
}
