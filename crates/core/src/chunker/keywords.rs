use std::sync::OnceLock;

use regex::Regex;

use crate::chunker::sections::normalize_section;
use crate::domain::passage::Category;

pub const MAX_KEYWORDS: usize = 12;

fn figure_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)(?:₹|\brs\.?|\binr)\s?\d[\d,]*(?:\.\d+)?|\d[\d,]*(?:\.\d+)?\s?%|\b\d[\d,]*(?:\.\d+)?\b",
            )
            .ok()
        })
        .as_ref()
}

/// Heuristic keywords for a passage: figures first (amounts, rates, counts), then the section
/// name, then vocabulary of the passage's category found in the text.
pub fn extract(text: &str, section: &str, category: Category) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |keyword: String| {
        let keyword = keyword.trim().trim_end_matches([',', '.']).to_string();
        if !keyword.is_empty() && !keywords.contains(&keyword) && keywords.len() < MAX_KEYWORDS {
            keywords.push(keyword);
        }
    };

    if let Some(pattern) = figure_pattern() {
        for found in pattern.find_iter(text) {
            push(found.as_str().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase());
        }
    }

    let section = normalize_section(section);
    if !section.is_empty() {
        push(section);
    }

    let lowered = text.to_lowercase();
    for phrase in category.phrases() {
        if lowered.contains(phrase) {
            push((*phrase).to_string());
        }
    }
    push(category.key().to_string());

    keywords
}

#[cfg(test)]
mod tests {
    use super::{extract, MAX_KEYWORDS};
    use crate::domain::passage::Category;

    #[test]
    fn extracts_figures_section_and_category_terms() {
        let keywords = extract(
            "Home loan interest starts at 8.5% for amounts above ₹30,00,000 and Rs. 5000 processing fee.",
            "Interest Rate:",
            Category::HomeLoan,
        );
        assert!(keywords.contains(&"8.5%".to_string()), "{keywords:?}");
        assert!(keywords.contains(&"₹30,00,000".to_string()), "{keywords:?}");
        assert!(keywords.contains(&"rs. 5000".to_string()), "{keywords:?}");
        assert!(keywords.contains(&"interest rate".to_string()));
        assert!(keywords.contains(&"home loan".to_string()));
        assert!(keywords.contains(&"home_loan".to_string()));
    }

    #[test]
    fn keywords_are_deduplicated_and_capped() {
        let text = (1..40).map(|n| format!("{n} ")).collect::<String>() + " 1 1 1";
        let keywords = extract(&text, "Fees", Category::GeneralSupport);
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords.iter().filter(|keyword| keyword.as_str() == "1").count(), 1);
    }
}
