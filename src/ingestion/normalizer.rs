//! Text normalization
//!
//! `normalize_text` produces the canonical text that is chunked and stored.
//! `clean_for_embedding` goes further, but only on the copy sent to the
//! embedder.

use std::sync::OnceLock;

use regex::Regex;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("static regex"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("static regex"))
}

fn bang_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[!?]{2,}").expect("static regex"))
}

fn dots_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.{3,}").expect("static regex"))
}

/// Decode a single HTML entity body (the part between `&` and `;`)
fn decode_entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "trade" => '\u{2122}',
        "deg" => '\u{00B0}',
        "eacute" => '\u{00E9}',
        _ => return None,
    };
    Some(c)
}

fn decode_entities(text: &str) -> String {
    entity_regex()
        .replace_all(text, |caps: &regex::Captures| match decode_entity(&caps[1]) {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Map typographic punctuation to ASCII
fn fold_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => out.push('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            _ => out.push(c),
        }
    }
    out
}

/// Canonical form of review text: entities decoded, tags removed,
/// punctuation folded, whitespace collapsed and trimmed
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let decoded = decode_entities(text);
    let untagged = tag_regex().replace_all(&decoded, " ");
    let folded = fold_punctuation(&untagged);
    whitespace_regex()
        .replace_all(&folded, " ")
        .trim()
        .to_string()
}

/// Embedding-only clean-up: drops URLs and e-mail addresses and collapses
/// runs of `!?` and dots
pub fn clean_for_embedding(text: &str) -> String {
    let text = normalize_text(text);
    let text = url_regex().replace_all(&text, "");
    let text = email_regex().replace_all(&text, "");
    let text = bang_regex().replace_all(&text, "!");
    let text = dots_regex().replace_all(&text, "...");
    whitespace_regex()
        .replace_all(&text, " ")
        .trim()
        .to_string()
}
