//! Rule-based passage enrichment
//!
//! Tags each passage with its dominant product aspect and a lexicon-based
//! sentiment. Both end up in the index payload and can be used as
//! retrieval filters.

use crate::types::{Passage, PassageMetadata, ReviewRecord, Sentiment};

/// Aspect used when no keyword matches
pub const GENERAL_ASPECT: &str = "general";

const ASPECT_KEYWORDS: &[(&str, &[&str])] = &[
    ("battery", &["battery", "batteries", "charge", "charging", "power", "drain", "dies"]),
    ("shipping", &["shipping", "delivery", "arrived", "package", "shipped", "box", "packaging"]),
    ("price", &["price", "cost", "expensive", "cheap", "worth", "money", "value", "afford"]),
    ("quality", &["quality", "build", "material", "durable", "sturdy", "flimsy", "broke", "broken"]),
    ("performance", &["fast", "slow", "speed", "performance", "responsive", "lag", "loading"]),
    ("display", &["screen", "display", "resolution", "picture", "visual", "color", "bright"]),
    ("audio", &["sound", "audio", "speaker", "volume", "loud", "quiet", "noise"]),
    ("setup", &["setup", "install", "installation", "configure", "easy", "difficult"]),
    ("customer_service", &["support", "service", "customer", "help", "response", "refund", "return"]),
    ("remote", &["remote", "controller", "buttons", "click", "press"]),
];

const POSITIVE_WORDS: &[&str] = &[
    "great", "good", "excellent", "amazing", "awesome", "love", "perfect", "best", "fantastic",
    "wonderful", "happy", "satisfied", "recommend", "easy", "fast", "works", "nice", "beautiful",
    "solid", "reliable",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "worst", "hate", "poor", "broken", "slow", "difficult", "problem",
    "issue", "defective", "disappointed", "waste", "useless", "frustrating", "annoying", "junk",
    "cheap", "fail",
];

const NEGATORS: &[&str] = &["not", "no", "never", "don't", "doesn't", "didn't", "won't", "can't"];

/// Words looked at before a sentiment word when checking for negation
const NEGATION_WINDOW: usize = 3;

/// Sentiment label plus a score in `-1.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScore {
    pub label: Sentiment,
    pub score: f32,
}

/// Dominant aspect by keyword hits; ties go to the earlier aspect
pub fn detect_aspect(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let mut best = (GENERAL_ASPECT, 0);
    for (aspect, keywords) in ASPECT_KEYWORDS {
        let hits = keywords.iter().filter(|kw| lower.contains(**kw)).count();
        if hits > best.1 {
            best = (*aspect, hits);
        }
    }
    best.0
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lexicon sentiment; a negator up to three words back flips polarity
pub fn analyze_sentiment(text: &str) -> SentimentScore {
    let words = tokenize(text);
    let mut positive = 0.0_f32;
    let mut negative = 0.0_f32;

    for (i, word) in words.iter().enumerate() {
        let word = word.as_str();

        let negated = words[i.saturating_sub(NEGATION_WINDOW)..i]
            .iter()
            .any(|w| NEGATORS.contains(&w.as_str()));

        if POSITIVE_WORDS.contains(&word) {
            if negated {
                negative += 1.0;
            } else {
                positive += 1.0;
            }
        } else if NEGATIVE_WORDS.contains(&word) {
            if negated {
                positive += 1.0;
            } else {
                negative += 1.0;
            }
        }
    }

    let total = positive + negative;
    if total == 0.0 {
        return SentimentScore {
            label: Sentiment::Neutral,
            score: 0.0,
        };
    }

    let score = ((positive - negative) / total).clamp(-1.0, 1.0);

    let label = if score > 0.2 {
        Sentiment::Positive
    } else if score < -0.2 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    SentimentScore { label, score }
}

/// Build the metadata stored with a passage
pub fn enrich(record: &ReviewRecord, passage: &Passage) -> PassageMetadata {
    let sentiment = analyze_sentiment(&passage.text);
    PassageMetadata {
        record_id: record.id.clone(),
        product_id: record.product_id.clone(),
        rating: record.rating,
        timestamp: record.timestamp,
        reviewer_id: record.reviewer_id.clone(),
        position: passage.position,
        offset: passage.offset,
        aspect: Some(detect_aspect(&passage.text).to_string()),
        sentiment: Some(sentiment.label),
        sentiment_score: Some(sentiment.score),
    }
}
