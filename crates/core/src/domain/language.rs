use serde::{Deserialize, Serialize};

/// Languages the assistant converses in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Latin,
    Devanagari,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::Hindi];

    /// Parses a language tag by its primary subtag (`en-IN` is English).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag.trim().split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase();
        match primary.as_str() {
            "en" | "eng" | "english" => Some(Self::English),
            "hi" | "hin" | "hindi" => Some(Self::Hindi),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
        }
    }

    pub fn script(&self) -> Script {
        match self {
            Self::English => Script::Latin,
            Self::Hindi => Script::Devanagari,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
        }
    }
}

impl Script {
    pub fn contains(&self, character: char) -> bool {
        match self {
            Self::Latin => character.is_ascii_alphabetic(),
            Self::Devanagari => ('\u{0900}'..='\u{097F}').contains(&character),
        }
    }
}

/// Share of alphabetic characters in `text` that belong to `script`.
///
/// Returns `None` when the text has no alphabetic characters at all, so callers can
/// distinguish "all digits" from "wrong script".
pub fn script_share(text: &str, script: Script) -> Option<f32> {
    let mut letters = 0usize;
    let mut matching = 0usize;
    for character in text.chars() {
        if character.is_alphabetic() || Script::Devanagari.contains(character) {
            letters += 1;
            if script.contains(character) {
                matching += 1;
            }
        }
    }

    if letters == 0 {
        None
    } else {
        Some(matching as f32 / letters as f32)
    }
}

/// Detects the language of a passage or reply from its script mix.
pub fn detect_language(text: &str) -> Language {
    match script_share(text, Script::Devanagari) {
        Some(share) if share >= 0.3 => Language::Hindi,
        _ => Language::English,
    }
}
