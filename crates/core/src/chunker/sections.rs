/// Section names that act as headers even without markup.
const KNOWN_SECTIONS: &[&str] = &[
    "eligibility",
    "eligibility criteria",
    "fees",
    "fees and charges",
    "charges",
    "interest rate",
    "interest rates",
    "documents required",
    "required documents",
    "tenure",
    "features",
    "key features",
    "benefits",
    "how to apply",
    "repayment",
    "पात्रता",
    "शुल्क",
    "शुल्क और प्रभार",
    "ब्याज दर",
    "आवश्यक दस्तावेज़",
    "आवश्यक दस्तावेज",
    "अवधि",
    "विशेषताएं",
    "लाभ",
    "आवेदन कैसे करें",
];

const MAX_HEADER_WORDS: usize = 8;

/// Returns the header label when `line` reads as a section header.
pub fn header_label(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.contains('|') {
        return None;
    }

    if trimmed.starts_with('#') {
        let label = trimmed.trim_start_matches('#').trim();
        return (!label.is_empty()).then(|| label.to_string());
    }

    let word_count = trimmed.split_whitespace().count();
    if word_count > MAX_HEADER_WORDS {
        return None;
    }

    let label = trimmed.trim_end_matches([':', '.', '।']).trim();
    if label.is_empty() {
        return None;
    }

    if trimmed.ends_with(':') || is_known_section(label) || is_all_caps(label) {
        return Some(label.to_string());
    }

    None
}

pub fn is_known_section(label: &str) -> bool {
    KNOWN_SECTIONS.contains(&normalize_section(label).as_str())
}

/// Lowercased, whitespace-collapsed section name used for keywords.
pub fn normalize_section(label: &str) -> String {
    label
        .trim()
        .trim_end_matches([':', '.', '।'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn is_all_caps(label: &str) -> bool {
    let letters: Vec<char> = label.chars().filter(|character| character.is_alphabetic()).collect();
    letters.len() >= 3
        && letters.iter().all(|character| character.is_ascii_uppercase())
        && !label.ends_with('?')
}

/// Page furniture: page numbers, confidentiality stamps, copyright lines.
pub fn is_boilerplate_line(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    if lowered.is_empty() {
        return true;
    }

    let stripped: String =
        lowered.chars().filter(|character| !matches!(character, '-' | '–' | ' ')).collect();
    if !stripped.is_empty() && stripped.chars().all(|character| character.is_ascii_digit()) {
        return true;
    }

    let page_marker = lowered
        .strip_prefix("page")
        .map(|rest| {
            rest.split_whitespace().all(|word| word == "of" || word.chars().all(|c| c.is_ascii_digit()))
        })
        .unwrap_or(false);

    page_marker
        || lowered.contains("confidential")
        || lowered.contains("all rights reserved")
        || lowered.starts_with('©')
        || lowered.starts_with("copyright")
}

/// A page contributes nothing when only furniture remains or it is too short to mean anything.
pub fn is_boilerplate_page(page: &str) -> bool {
    let content: Vec<&str> =
        page.lines().filter(|line| !is_boilerplate_line(line)).collect();
    let words: usize = content.iter().map(|line| line.split_whitespace().count()).sum();
    words <= 3
}
