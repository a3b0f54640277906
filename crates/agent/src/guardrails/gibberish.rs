use std::collections::HashMap;

/// Texts shorter than this ("hi", "yes", "1234") are never judged.
const MIN_JUDGED_CHARS: usize = 12;
const MIN_TOKENS_FOR_REPETITION: usize = 4;
const MAX_REPEATED_SHARE: f32 = 0.6;

/// Shannon entropy in bits over the non-whitespace characters.
pub fn char_entropy(text: &str) -> f32 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for character in text.chars().filter(|character| !character.is_whitespace()) {
        *counts.entry(character).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    counts
        .values()
        .map(|count| {
            let probability = *count as f32 / total as f32;
            -probability * probability.log2()
        })
        .sum()
}

fn dominant_token_share(text: &str) -> Option<f32> {
    let tokens: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if tokens.len() < MIN_TOKENS_FOR_REPETITION {
        return None;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &tokens {
        *counts.entry(token.as_str()).or_default() += 1;
    }
    let top = counts.values().copied().max().unwrap_or_default();
    Some(top as f32 / tokens.len() as f32)
}

/// True for empty or symbol-only input, over-long input, low character entropy, and
/// one-token repetition.
pub fn is_gibberish(text: &str, min_entropy: f32, max_chars: usize) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() > max_chars {
        return true;
    }
    if !trimmed.chars().any(char::is_alphanumeric) {
        return true;
    }
    if trimmed.chars().count() < MIN_JUDGED_CHARS {
        return false;
    }
    if char_entropy(trimmed) < min_entropy {
        return true;
    }
    dominant_token_share(trimmed).is_some_and(|share| share >= MAX_REPEATED_SHARE)
}
