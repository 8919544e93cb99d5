//! PII redaction for retrieved review text

use std::sync::OnceLock;

use regex::Regex;

/// Replacement for every redacted span
pub const REDACTED: &str = "[REDACTED]";

/// Patterns in application order; card numbers go before phone numbers so
/// a card is not half-matched as a phone
fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // credit card
            r"\b\d{4}[-.\s]?\d{4}[-.\s]?\d{4}[-.\s]?\d{4}\b",
            // ssn
            r"\b\d{3}[-.\s]?\d{2}[-.\s]?\d{4}\b",
            // email
            r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            // phone
            r"(?:\+\d{1,3}[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

/// Replace personal data with [`REDACTED`]
pub fn redact_pii(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in patterns() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, REDACTED).into_owned();
        }
    }
    out
}
