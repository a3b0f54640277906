//! Fixed user-visible strings, one entry per key and language.
//!
//! Templates use `{name}` placeholders filled by [`render`]. Nothing in this catalog may carry
//! internal detail; every failure path in the assistant ends on one of these strings.

use crate::domain::guardrail::ViolationCategory;
use crate::domain::language::Language;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKey {
    RefusalToxicity,
    RefusalPii,
    RefusalInjection,
    RefusalOffTopic,
    RefusalGibberish,
    RefusalRateLimit,
    RefusalLanguageMismatch,
    /// Normalized form of a model reply that refused in its own words.
    StandardRefusal,
    NoInformation,
    SafetyFallback,
    RetryLater,
    SessionBusy,
    Greeting,
    FeedbackThanks,
    FallbackHelp,
    KnowledgeCardTitle,
    BalanceLine,
    NoAccounts,
    TransactionLine,
    NoTransactions,
    SelectAccount,
    PromptRecipient,
    RecipientNotFound,
    PromptAmount,
    InvalidAmount,
    PromptConfirmation,
    ConfirmationReprompt,
    RequestSecretCode,
    SecretCodeReprompt,
    VerificationPending,
    VerificationFailedRetry,
    VerificationFailedFinal,
    VerificationUnavailable,
    TransferCompleted,
    TransferFailed,
    FlowCancelled,
    FlowTimedOut,
}

impl MessageKey {
    pub const ALL: [MessageKey; 37] = [
        MessageKey::RefusalToxicity,
        MessageKey::RefusalPii,
        MessageKey::RefusalInjection,
        MessageKey::RefusalOffTopic,
        MessageKey::RefusalGibberish,
        MessageKey::RefusalRateLimit,
        MessageKey::RefusalLanguageMismatch,
        MessageKey::StandardRefusal,
        MessageKey::NoInformation,
        MessageKey::SafetyFallback,
        MessageKey::RetryLater,
        MessageKey::SessionBusy,
        MessageKey::Greeting,
        MessageKey::FeedbackThanks,
        MessageKey::FallbackHelp,
        MessageKey::KnowledgeCardTitle,
        MessageKey::BalanceLine,
        MessageKey::NoAccounts,
        MessageKey::TransactionLine,
        MessageKey::NoTransactions,
        MessageKey::SelectAccount,
        MessageKey::PromptRecipient,
        MessageKey::RecipientNotFound,
        MessageKey::PromptAmount,
        MessageKey::InvalidAmount,
        MessageKey::PromptConfirmation,
        MessageKey::ConfirmationReprompt,
        MessageKey::RequestSecretCode,
        MessageKey::SecretCodeReprompt,
        MessageKey::VerificationPending,
        MessageKey::VerificationFailedRetry,
        MessageKey::VerificationFailedFinal,
        MessageKey::VerificationUnavailable,
        MessageKey::TransferCompleted,
        MessageKey::TransferFailed,
        MessageKey::FlowCancelled,
        MessageKey::FlowTimedOut,
    ];

    pub fn refusal_for(category: ViolationCategory) -> Self {
        match category {
            ViolationCategory::Toxicity => Self::RefusalToxicity,
            ViolationCategory::Pii => Self::RefusalPii,
            ViolationCategory::Injection => Self::RefusalInjection,
            ViolationCategory::OffTopic => Self::RefusalOffTopic,
            ViolationCategory::Gibberish => Self::RefusalGibberish,
            ViolationCategory::RateLimit => Self::RefusalRateLimit,
            ViolationCategory::LanguageMismatch => Self::RefusalLanguageMismatch,
        }
    }
}

pub fn localize(key: MessageKey, language: Language) -> &'static str {
    match language {
        Language::English => english(key),
        Language::Hindi => hindi(key),
    }
}

/// Fills `{name}` placeholders. Unknown placeholders are left as they are.
pub fn render(key: MessageKey, language: Language, values: &[(&str, &str)]) -> String {
    let mut text = localize(key, language).to_string();
    for (name, value) in values {
        text = text.replace(&format!("{{{name}}}"), value);
    }
    text
}

fn english(key: MessageKey) -> &'static str {
    use MessageKey::*;
    match key {
        RefusalToxicity => "Let's keep our conversation respectful. How can I help with your banking today?",
        RefusalPii => "For your safety, please don't share ID numbers, card numbers, PINs or OTPs in chat.",
        RefusalInjection => "I can't change how I work or share my instructions. I'm happy to help with your banking needs.",
        RefusalOffTopic => "I can only help with banking topics such as accounts, payments, loans and investments.",
        RefusalGibberish => "Sorry, I couldn't understand that. Could you rephrase your question?",
        RefusalRateLimit => "You're sending messages too quickly. Please wait a moment and try again.",
        RefusalLanguageMismatch => "Sorry, I couldn't answer in your language. Please try asking again.",
        StandardRefusal => "I'm sorry, I can't help with that request. Is there something else about your banking I can help with?",
        NoInformation => "I'm sorry, I don't have information about that right now. Please contact your branch or customer care for details.",
        SafetyFallback => "I'm sorry, I couldn't prepare a proper answer. Please try again or rephrase your question.",
        RetryLater => "Something took longer than expected on our side. Please try again in a moment.",
        SessionBusy => "I'm still working on your previous message. Please wait a moment.",
        Greeting => "Hello! I can help you check balances, review transactions, make payments and answer questions about loans and investments.",
        FeedbackThanks => "Thank you for your feedback. It helps us serve you better.",
        FallbackHelp => "I can help with balances, recent transactions, payments, loans, deposits and investment schemes. What would you like to do?",
        KnowledgeCardTitle => "About {topic}",
        BalanceLine => "Your {account_type} account {account} has an available balance of {currency} {amount}.",
        NoAccounts => "I couldn't find any accounts linked to you.",
        TransactionLine => "{date}: {direction} of {currency} {amount} ({description})",
        NoTransactions => "There are no recent transactions on this account.",
        SelectAccount => "Which account would you like to see transactions for?",
        PromptRecipient => "Whom would you like to pay? Please tell me the payee's name.",
        RecipientNotFound => "I couldn't find that payee among your saved payees. Please tell me the name of a saved payee.",
        PromptAmount => "How much would you like to send to {recipient}?",
        InvalidAmount => "Please tell me the amount as a number, for example 500 or 2.5k.",
        PromptConfirmation => "You are about to send {currency} {amount} to {recipient}. Shall I proceed? Please say yes or no.",
        ConfirmationReprompt => "Please say yes to proceed with the payment or no to cancel it.",
        RequestSecretCode => "Please enter your secret code in the secure field to authorise this payment.",
        SecretCodeReprompt => "I still need your secret code. Please enter it in the secure field, or say cancel to stop.",
        VerificationPending => "Your secret code is already being checked for this payment. Say 'try again' to confirm the payment once more, or cancel to stop.",
        VerificationFailedRetry => "The secret code could not be verified and the payment was not made. Say 'try again' to confirm the payment once more, or cancel to stop.",
        VerificationFailedFinal => "The secret code could not be verified and the payment was not made. For your security, please start a new payment later.",
        VerificationUnavailable => "We couldn't verify your secret code right now, so the payment was not made. Please try again later.",
        TransferCompleted => "Done! {currency} {amount} has been sent to {recipient}. Your reference number is {reference}.",
        TransferFailed => "The payment could not be completed and no money was sent. Please try again later.",
        FlowCancelled => "Okay, I've cancelled the payment. No money was sent.",
        FlowTimedOut => "Your previous payment request timed out and was cancelled.",
    }
}

fn hindi(key: MessageKey) -> &'static str {
    use MessageKey::*;
    match key {
        RefusalToxicity => "कृपया बातचीत सम्मानजनक रखें। आज मैं आपकी बैंकिंग में कैसे मदद कर सकता हूँ?",
        RefusalPii => "आपकी सुरक्षा के लिए, कृपया चैट में आधार, कार्ड नंबर, पिन या ओटीपी साझा न करें।",
        RefusalInjection => "मैं अपने काम करने का तरीका नहीं बदल सकता और न ही अपने निर्देश साझा कर सकता हूँ। बैंकिंग से जुड़ी मदद के लिए मैं तैयार हूँ।",
        RefusalOffTopic => "मैं केवल बैंकिंग विषयों जैसे खाते, भुगतान, ऋण और निवेश में मदद कर सकता हूँ।",
        RefusalGibberish => "क्षमा करें, मैं समझ नहीं पाया। कृपया अपना प्रश्न दोबारा लिखें।",
        RefusalRateLimit => "आप बहुत जल्दी-जल्दी संदेश भेज रहे हैं। कृपया थोड़ी देर बाद फिर प्रयास करें।",
        RefusalLanguageMismatch => "क्षमा करें, मैं आपकी भाषा में उत्तर नहीं दे सका। कृपया फिर से पूछें।",
        StandardRefusal => "क्षमा करें, मैं इस अनुरोध में मदद नहीं कर सकता। क्या बैंकिंग से जुड़ी कोई और मदद चाहिए?",
        NoInformation => "क्षमा करें, इस बारे में अभी मेरे पास जानकारी नहीं है। विवरण के लिए कृपया अपनी शाखा या ग्राहक सेवा से संपर्क करें।",
        SafetyFallback => "क्षमा करें, मैं सही उत्तर तैयार नहीं कर सका। कृपया फिर से प्रयास करें या प्रश्न बदलकर पूछें।",
        RetryLater => "हमारी ओर से अपेक्षा से अधिक समय लगा। कृपया थोड़ी देर में फिर प्रयास करें।",
        SessionBusy => "मैं अभी आपके पिछले संदेश पर काम कर रहा हूँ। कृपया थोड़ा इंतज़ार करें।",
        Greeting => "नमस्ते! मैं बैलेंस देखने, लेनदेन जाँचने, भुगतान करने और ऋण व निवेश से जुड़े सवालों में आपकी मदद कर सकता हूँ।",
        FeedbackThanks => "आपकी प्रतिक्रिया के लिए धन्यवाद। इससे हमें आपकी बेहतर सेवा करने में मदद मिलती है।",
        FallbackHelp => "मैं बैलेंस, हाल के लेनदेन, भुगतान, ऋण, जमा और निवेश योजनाओं में मदद कर सकता हूँ। आप क्या करना चाहेंगे?",
        KnowledgeCardTitle => "{topic} के बारे में",
        BalanceLine => "आपके {account_type} खाते {account} में उपलब्ध शेष राशि {currency} {amount} है।",
        NoAccounts => "आपसे जुड़ा कोई खाता नहीं मिला।",
        TransactionLine => "{date}: {currency} {amount} का {direction} ({description})",
        NoTransactions => "इस खाते में हाल का कोई लेनदेन नहीं है।",
        SelectAccount => "आप किस खाते के लेनदेन देखना चाहेंगे?",
        PromptRecipient => "आप किसे भुगतान करना चाहेंगे? कृपया प्राप्तकर्ता का नाम बताएं।",
        RecipientNotFound => "यह प्राप्तकर्ता आपके सहेजे गए प्राप्तकर्ताओं में नहीं मिला। कृपया किसी सहेजे गए प्राप्तकर्ता का नाम बताएं।",
        PromptAmount => "आप {recipient} को कितनी राशि भेजना चाहेंगे?",
        InvalidAmount => "कृपया राशि अंकों में बताएं, जैसे 500 या 2.5k।",
        PromptConfirmation => "आप {recipient} को {currency} {amount} भेजने वाले हैं। क्या मैं आगे बढ़ूँ? कृपया हाँ या नहीं कहें।",
        ConfirmationReprompt => "भुगतान जारी रखने के लिए हाँ कहें या रद्द करने के लिए नहीं कहें।",
        RequestSecretCode => "इस भुगतान को अधिकृत करने के लिए कृपया सुरक्षित फ़ील्ड में अपना गुप्त कोड दर्ज करें।",
        SecretCodeReprompt => "मुझे अभी भी आपका गुप्त कोड चाहिए। कृपया इसे सुरक्षित फ़ील्ड में दर्ज करें, या रोकने के लिए रद्द कहें।",
        VerificationPending => "इस भुगतान के लिए आपका गुप्त कोड पहले ही जाँचा जा रहा है। भुगतान दोबारा पुष्टि करने के लिए 'फिर से' कहें, या रोकने के लिए रद्द कहें।",
        VerificationFailedRetry => "गुप्त कोड सत्यापित नहीं हो सका और भुगतान नहीं हुआ। भुगतान दोबारा पुष्टि करने के लिए 'फिर से' कहें, या रोकने के लिए रद्द कहें।",
        VerificationFailedFinal => "गुप्त कोड सत्यापित नहीं हो सका और भुगतान नहीं हुआ। आपकी सुरक्षा के लिए, कृपया बाद में नया भुगतान शुरू करें।",
        VerificationUnavailable => "अभी आपका गुप्त कोड सत्यापित नहीं हो सका, इसलिए भुगतान नहीं हुआ। कृपया बाद में फिर प्रयास करें।",
        TransferCompleted => "हो गया! {recipient} को {currency} {amount} भेज दिए गए हैं। आपका संदर्भ क्रमांक {reference} है।",
        TransferFailed => "भुगतान पूरा नहीं हो सका और कोई राशि नहीं भेजी गई। कृपया बाद में फिर प्रयास करें।",
        FlowCancelled => "ठीक है, मैंने भुगतान रद्द कर दिया है। कोई राशि नहीं भेजी गई।",
        FlowTimedOut => "आपका पिछला भुगतान अनुरोध समय-सीमा समाप्त होने के कारण रद्द हो गया।",
    }
}
