use serde::{Deserialize, Serialize};

use crate::domain::language::Language;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PassageId(pub String);

/// Controlled vocabulary for document categories. Source wording in any language is
/// normalized onto one of these keys at ingestion time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    HomeLoan,
    PersonalLoan,
    EducationLoan,
    VehicleLoan,
    GoldLoan,
    FixedDeposit,
    RecurringDeposit,
    MutualFund,
    PublicProvidentFund,
    SavingsAccount,
    Cards,
    GeneralSupport,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryGroup {
    Loans,
    Investments,
    Support,
}

/// Phrases per category, most specific first within each list. English and Hindi wording
/// plus the abbreviations customers actually type.
const CATEGORY_PHRASES: &[(Category, &[&str])] = &[
    (Category::HomeLoan, &["home loan", "housing loan", "mortgage", "होम लोन", "गृह ऋण", "आवास ऋण"]),
    (Category::PersonalLoan, &["personal loan", "पर्सनल लोन", "व्यक्तिगत ऋण"]),
    (Category::EducationLoan, &["education loan", "student loan", "एजुकेशन लोन", "शिक्षा ऋण"]),
    (
        Category::VehicleLoan,
        &["vehicle loan", "car loan", "auto loan", "two wheeler loan", "वाहन ऋण", "कार लोन"],
    ),
    (Category::GoldLoan, &["gold loan", "गोल्ड लोन", "स्वर्ण ऋण"]),
    (Category::FixedDeposit, &["fixed deposit", "term deposit", "fd", "एफडी", "सावधि जमा"]),
    (Category::RecurringDeposit, &["recurring deposit", "rd", "आरडी", "आवर्ती जमा"]),
    (Category::MutualFund, &["mutual fund", "sip", "म्यूचुअल फंड"]),
    (
        Category::PublicProvidentFund,
        &["public provident fund", "ppf", "पीपीएफ", "लोक भविष्य निधि"],
    ),
    (Category::SavingsAccount, &["savings account", "saving account", "बचत खाता"]),
    (Category::Cards, &["credit card", "debit card", "क्रेडिट कार्ड", "डेबिट कार्ड"]),
    (
        Category::GeneralSupport,
        &["customer care", "support", "branch", "complaint", "ग्राहक सेवा", "शिकायत"],
    ),
];

impl Category {
    pub const ALL: [Category; 12] = [
        Category::HomeLoan,
        Category::PersonalLoan,
        Category::EducationLoan,
        Category::VehicleLoan,
        Category::GoldLoan,
        Category::FixedDeposit,
        Category::RecurringDeposit,
        Category::MutualFund,
        Category::PublicProvidentFund,
        Category::SavingsAccount,
        Category::Cards,
        Category::GeneralSupport,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::HomeLoan => "home_loan",
            Self::PersonalLoan => "personal_loan",
            Self::EducationLoan => "education_loan",
            Self::VehicleLoan => "vehicle_loan",
            Self::GoldLoan => "gold_loan",
            Self::FixedDeposit => "fixed_deposit",
            Self::RecurringDeposit => "recurring_deposit",
            Self::MutualFund => "mutual_fund",
            Self::PublicProvidentFund => "public_provident_fund",
            Self::SavingsAccount => "savings_account",
            Self::Cards => "cards",
            Self::GeneralSupport => "general_support",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|category| category.key() == key.trim())
    }

    pub fn group(&self) -> CategoryGroup {
        match self {
            Self::HomeLoan
            | Self::PersonalLoan
            | Self::EducationLoan
            | Self::VehicleLoan
            | Self::GoldLoan => CategoryGroup::Loans,
            Self::FixedDeposit
            | Self::RecurringDeposit
            | Self::MutualFund
            | Self::PublicProvidentFund => CategoryGroup::Investments,
            Self::SavingsAccount | Self::Cards | Self::GeneralSupport => CategoryGroup::Support,
        }
    }

    pub fn phrases(&self) -> &'static [&'static str] {
        CATEGORY_PHRASES
            .iter()
            .find(|(category, _)| category == self)
            .map(|(_, phrases)| *phrases)
            .unwrap_or(&[])
    }

    /// Maps free text onto a category key. The longest matching phrase wins so that
    /// "gold loan" beats the bare "loan" of a generic sentence. Short ASCII abbreviations
    /// ("fd", "rd", "sip") only match as whole words.
    pub fn normalize(raw: &str) -> Option<Self> {
        let lowered = raw.to_lowercase();
        let mut best: Option<(usize, Category)> = None;

        for (category, phrases) in CATEGORY_PHRASES {
            for phrase in *phrases {
                if !contains_phrase(&lowered, phrase) {
                    continue;
                }
                let length = phrase.chars().count();
                if best.map(|(best_length, _)| length > best_length).unwrap_or(true) {
                    best = Some((length, *category));
                }
            }
        }

        best.map(|(_, category)| category).or_else(|| Self::from_key(&lowered))
    }
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let whole_word = phrase.len() <= 3 && phrase.is_ascii();
    if !whole_word {
        return haystack.contains(phrase);
    }
    haystack
        .split(|character: char| !character.is_alphanumeric())
        .any(|token| token == phrase)
}

/// A chunk of source knowledge. Immutable once ingested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub text: String,
    pub language: Language,
    pub category: Category,
    pub section: String,
    pub keywords: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Ranked passages for one query, along with the filter that produced them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub language: Language,
    pub filter: Option<Category>,
    pub passages: Vec<ScoredPassage>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }
}
