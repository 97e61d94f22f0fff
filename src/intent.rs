//! Intent classification and price extraction
//!
//! The classifier is a prioritized rule cascade over the lowercased
//! message: the first matching rule wins. Keyword sets cover both the
//! Turkish marketplace vocabulary the assistant grew up with and their
//! English equivalents. The classifier is a pure function of the message
//! and the session; when to re-classify is the engine's decision.

use crate::error::Result;
use crate::session::{ConversationStage, SessionState, UserIntent};
use regex::Regex;

/// Brand names recognized as product signals
pub const KNOWN_BRANDS: [&str; 14] = [
    "apple", "iphone", "samsung", "xiaomi", "huawei", "oppo", "lenovo", "asus", "dell", "hp",
    "sony", "lg", "vestel", "arcelik",
];

const TECH_SPEC_TOKENS: [&str; 12] = [
    "gb", "tb", "ram", "ssd", "inch", "inç", "ekran", "kamera", "batarya", "pil", "işlemci",
    "hafıza",
];

const CANCEL_KEYWORDS: [&str; 7] = [
    "iptal",
    "vazgeç",
    "vazgeçtim",
    "istemiyorum",
    "cancel",
    "stop",
    "nevermind",
];

const CONFIRM_KEYWORDS: [&str; 8] = [
    "onayla",
    "onaylıyorum",
    "yayınla",
    "confirm",
    "approve",
    "publish",
    "looks good",
    "tamamdır",
];

const EDIT_KEYWORDS: [&str; 8] = [
    "değiştir",
    "düzenle",
    "düzelt",
    "başlığı",
    "açıklamayı",
    "edit",
    "change",
    "rewrite",
];

const SELL_KEYWORDS: [&str; 8] = [
    "sat", "satmak", "satıyorum", "satacağım", "listele", "sell", "selling", "list my",
];

const SEARCH_KEYWORDS: [&str; 8] = [
    "ara",
    "arıyorum",
    "bul",
    "bakıyorum",
    "search",
    "find",
    "looking for",
    "buy a",
];

const PRICE_SENTIMENT: [&str; 8] = [
    "pahalı",
    "ucuz",
    "düşür",
    "indirim",
    "expensive",
    "cheap",
    "lower",
    "too much",
];

const QUESTION_MARKERS: [&str; 8] = [
    "?", "nasıl", "nedir", "ne zaman", "how", "what", "why", "when",
];

const PRICE_QUESTION_PHRASES: [&str; 4] = ["kaç para", "ne kadar", "how much", "worth"];

/// Rule-based intent classifier
///
/// Regexes are compiled once at construction and reused per call.
pub struct IntentClassifier {
    currency_amount: Regex,
    labelled_amount: Regex,
}

impl IntentClassifier {
    /// Build a classifier with its price patterns compiled
    ///
    /// # Errors
    ///
    /// Returns error if a pattern fails to compile
    pub fn new() -> Result<Self> {
        Ok(Self {
            currency_amount: Regex::new(r"(\d[\d.,]*)\s*(?:tl|try|lira)\b")?,
            labelled_amount: Regex::new(r"(?:fiyat[ıi]?|price)\D{0,12}?(\d[\d.,]*)")?,
        })
    }

    /// Classify a user message in the context of a session
    ///
    /// First matching rule wins:
    /// 1. brand + technical spec token is always a listing, whatever else
    ///    the message contains
    /// 2. in Preview, price talk is negotiation
    /// 3. cancel keywords
    /// 4. confirm keywords
    /// 5. edit keywords
    /// 6. brand + "how much" phrasing is a listing, not a question
    /// 7. sell keywords, or an attached image
    /// 8. search keywords
    /// 9. question markers
    /// 10. otherwise Unknown
    pub fn classify(&self, message: &str, session: &SessionState) -> UserIntent {
        let text = message.to_lowercase();
        let has_brand = contains_any(&text, &KNOWN_BRANDS);

        if has_brand && contains_any(&text, &TECH_SPEC_TOKENS) {
            return UserIntent::Listing;
        }

        if session.stage == ConversationStage::Preview
            && (self.mentions_price(&text) || contains_any(&text, &PRICE_SENTIMENT))
        {
            return UserIntent::Negotiating;
        }

        if contains_any(&text, &CANCEL_KEYWORDS) {
            return UserIntent::Cancelling;
        }

        if contains_any(&text, &CONFIRM_KEYWORDS) {
            return UserIntent::Confirming;
        }

        if contains_any(&text, &EDIT_KEYWORDS) {
            return UserIntent::Editing;
        }

        if has_brand && contains_any(&text, &PRICE_QUESTION_PHRASES) {
            return UserIntent::Listing;
        }

        if contains_any(&text, &SELL_KEYWORDS) || session.image_url.is_some() {
            return UserIntent::Listing;
        }

        if contains_any(&text, &SEARCH_KEYWORDS) {
            return UserIntent::Searching;
        }

        if contains_any(&text, &QUESTION_MARKERS) {
            return UserIntent::Question;
        }

        UserIntent::Unknown
    }

    /// Whether the message carries a recognizable price expression
    pub fn mentions_price(&self, text: &str) -> bool {
        self.currency_amount.is_match(text) || self.labelled_amount.is_match(text)
    }

    /// Pull the first price amount out of a message
    ///
    /// Understands `1500 tl`, `1.500 lira`, `fiyat 2,500`, `price: 900`.
    /// Thousands separators in both styles are normalized. Returns `None`
    /// when no amount is found.
    pub fn extract_price(&self, message: &str) -> Option<f64> {
        let text = message.to_lowercase();
        let raw = self
            .currency_amount
            .captures(&text)
            .or_else(|| self.labelled_amount.captures(&text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())?;
        parse_amount(&raw)
    }
}

/// Whether a message mentions sell verbs (used to re-route questions that
/// are actually listing requests)
pub fn has_sell_verbs(text: &str) -> bool {
    contains_any(&text.to_lowercase(), &SELL_KEYWORDS)
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Parse a numeric amount, normalizing thousands separators
///
/// `1.500` and `2,500` both mean 2500-style thousands grouping; a
/// trailing group of one or two digits is a decimal fraction.
fn parse_amount(raw: &str) -> Option<f64> {
    let mut normalized = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '.' | ',' => {
                let trailing_digits = chars[i + 1..].iter().take_while(|d| d.is_ascii_digit()).count();
                let is_last_separator = !chars[i + 1..].iter().any(|d| *d == '.' || *d == ',');
                if is_last_separator && trailing_digits > 0 && trailing_digits < 3 {
                    normalized.push('.');
                }
                // A three-digit group is a thousands separator: drop it.
            }
            d => normalized.push(*d),
        }
    }
    normalized.parse::<f64>().ok().filter(|v| *v > 0.0)
}
