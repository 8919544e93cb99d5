//! Line-delimited review record parser
//!
//! Each non-blank input line must hold one JSON object. A line that cannot
//! be turned into a [`ReviewRecord`] yields a `RecordValidation` error for
//! that line only; parsing carries on with the next line.

use std::collections::HashSet;
use std::io::BufRead;

use chrono::DateTime;
use serde_json::{Map, Value};

use super::normalizer::normalize_text;
use crate::errors::{RagError, Result};
use crate::types::ReviewRecord;

const TEXT_KEYS: &[&str] = &["text", "content", "review", "body"];
const ID_KEYS: &[&str] = &["id", "review_id"];
const PRODUCT_KEYS: &[&str] = &["product_id", "parent_asin", "asin"];
const REVIEWER_KEYS: &[&str] = &["reviewer_id", "user_id"];

/// Epoch values below this are taken to be seconds
const SECONDS_CUTOFF: i64 = 100_000_000_000;

/// Read/skip counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Non-blank lines consumed
    pub read: usize,
    /// Lines rejected by validation
    pub skipped: usize,
}

impl ParseStats {
    pub fn accepted(&self) -> usize {
        self.read - self.skipped
    }
}

/// Lazy, single-pass parser over a buffered reader
pub struct RecordParser<R> {
    reader: R,
    line_no: usize,
    limit: Option<usize>,
    seen_ids: HashSet<String>,
    stats: ParseStats,
    finished: bool,
}

impl<R: BufRead> RecordParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            limit: None,
            seen_ids: HashSet::new(),
            stats: ParseStats::default(),
            finished: false,
        }
    }

    /// Stop after `limit` non-blank records
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    fn validate_unique(&mut self, record: ReviewRecord) -> Result<ReviewRecord> {
        if !self.seen_ids.insert(record.id.clone()) {
            return Err(reject(
                self.line_no,
                "id",
                format!("duplicates an earlier record ('{}')", record.id),
            ));
        }
        Ok(record)
    }
}

impl<R: BufRead> Iterator for RecordParser<R> {
    type Item = Result<ReviewRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished || self.limit.is_some_and(|limit| self.stats.read >= limit) {
                return None;
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }
            self.stats.read += 1;

            let result =
                parse_record(&line, self.line_no).and_then(|record| self.validate_unique(record));
            if let Err(e) = &result {
                self.stats.skipped += 1;
                tracing::debug!(line = self.line_no, error = %e, "record rejected");
            }
            return Some(result);
        }
    }
}

fn reject(line: usize, field: &str, reason: impl Into<String>) -> RagError {
    RagError::RecordValidation {
        line,
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Parse and validate one line
pub fn parse_record(line: &str, line_no: usize) -> Result<ReviewRecord> {
    let value: Value = serde_json::from_str(line.trim())
        .map_err(|e| reject(line_no, "record", format!("is not valid JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| reject(line_no, "record", "is not a JSON object"))?;

    let text = extract_text(obj, line_no)?;
    let product_id = identifier(obj, PRODUCT_KEYS);
    let reviewer_id = identifier(obj, REVIEWER_KEYS);
    let rating = extract_rating(obj, line_no)?;
    let timestamp = extract_timestamp(obj, line_no)?;

    let id = match identifier(obj, ID_KEYS) {
        Some(id) => id,
        None => match (&reviewer_id, &product_id, timestamp) {
            (Some(reviewer), Some(product), Some(ts)) => format!("{}:{}:{}", reviewer, product, ts),
            _ => return Err(reject(line_no, "id", "is missing")),
        },
    };

    Ok(ReviewRecord {
        id,
        product_id,
        text,
        rating,
        timestamp,
        reviewer_id,
    })
}

fn extract_text(obj: &Map<String, Value>, line_no: usize) -> Result<String> {
    let mut present = false;
    for key in TEXT_KEYS {
        match obj.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(raw)) => {
                present = true;
                let text = normalize_text(raw);
                if !text.is_empty() {
                    return Ok(text);
                }
            }
            Some(_) => return Err(reject(line_no, key, "must be a string")),
        }
    }

    if present {
        Err(reject(line_no, "text", "is empty after normalization"))
    } else {
        Err(reject(line_no, "text", "is missing"))
    }
}

/// First non-empty string or integer among `keys`
fn identifier(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    })
}

fn extract_rating(obj: &Map<String, Value>, line_no: usize) -> Result<Option<f32>> {
    let rating = match obj.get("rating") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match rating {
        Some(r) if r.is_finite() && (0.0..=5.0).contains(&r) => Ok(Some(r as f32)),
        Some(r) => Err(reject(line_no, "rating", format!("{} is outside 0..=5", r))),
        None => Err(reject(line_no, "rating", "is not a number")),
    }
}

fn extract_timestamp(obj: &Map<String, Value>, line_no: usize) -> Result<Option<i64>> {
    let epoch = match obj.get("timestamp") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(i),
            None => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                // i64::MAX as f64 rounds up to 2^63, so the bound is exclusive
                if !f.is_finite() || f.abs() >= i64::MAX as f64 {
                    return Err(reject(line_no, "timestamp", format!("{} is out of range", n)));
                }
                Some(f as i64)
            }
        },
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| {
                        reject(line_no, "timestamp", format!("'{}' is not RFC 3339: {}", s, e))
                    })?;
                    return Ok(Some(parsed.timestamp_millis()));
                }
            }
        }
        Some(_) => None,
    };

    let Some(n) = epoch else {
        return Err(reject(line_no, "timestamp", "is not an epoch or date string"));
    };
    let out_of_range = || reject(line_no, "timestamp", format!("{} is out of range", n));
    if n.checked_abs().ok_or_else(out_of_range)? < SECONDS_CUTOFF {
        n.checked_mul(1000).map(Some).ok_or_else(out_of_range)
    } else {
        Ok(Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_all(input: &str) -> (Vec<Result<ReviewRecord>>, ParseStats) {
        let mut parser = RecordParser::new(Cursor::new(input.to_string()));
        let results: Vec<_> = parser.by_ref().collect();
        (results, parser.stats())
    }

    fn field_of(err: &RagError) -> &str {
        match err {
            RagError::RecordValidation { field, .. } => field,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parses_full_record() {
        let line = r#"{"id":"r1","product_id":"p1","text":"Battery lasts two days.","rating":5,"timestamp":1700000000,"reviewer_id":"u1"}"#;
        let record = parse_record(line, 1).unwrap();
        assert_eq!(record.id, "r1");
        assert_eq!(record.product_id.as_deref(), Some("p1"));
        assert_eq!(record.rating, Some(5.0));
        assert_eq!(record.timestamp, Some(1_700_000_000_000));
        assert_eq!(record.reviewer_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_alternate_field_names() {
        let line = r#"{"review_id":42,"parent_asin":"B00X","content":"<p>Nice &amp; light</p>","user_id":"AF3","rating":"4.0"}"#;
        let record = parse_record(line, 1).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.product_id.as_deref(), Some("B00X"));
        assert_eq!(record.text, "Nice & light");
        assert_eq!(record.reviewer_id.as_deref(), Some("AF3"));
        assert_eq!(record.rating, Some(4.0));
    }

    #[test]
    fn test_derived_id() {
        let line = r#"{"user_id":"u9","asin":"p3","text":"ok","timestamp":1600000000000}"#;
        let record = parse_record(line, 1).unwrap();
        assert_eq!(record.id, "u9:p3:1600000000000");
    }

    #[test]
    fn test_missing_id_rejected() {
        let err = parse_record(r#"{"text":"fine"}"#, 3).unwrap_err();
        assert_eq!(field_of(&err), "id");
    }

    #[test]
    fn test_missing_and_empty_text() {
        let err = parse_record(r#"{"id":"r3","rating":2}"#, 1).unwrap_err();
        assert_eq!(field_of(&err), "text");

        let err = parse_record(r#"{"id":"r3","text":"  <br> "}"#, 1).unwrap_err();
        assert_eq!(field_of(&err), "text");
    }

    #[test]
    fn test_bad_rating() {
        let err = parse_record(r#"{"id":"r","text":"x","rating":7}"#, 1).unwrap_err();
        assert_eq!(field_of(&err), "rating");
        let err = parse_record(r#"{"id":"r","text":"x","rating":"five"}"#, 1).unwrap_err();
        assert_eq!(field_of(&err), "rating");
    }

    #[test]
    fn test_rfc3339_timestamp() {
        let line = r#"{"id":"r","text":"x","timestamp":"2024-01-02T03:04:05Z"}"#;
        let record = parse_record(line, 1).unwrap();
        assert_eq!(record.timestamp, Some(1_704_164_645_000));

        let err = parse_record(r#"{"id":"r","text":"x","timestamp":"yesterday"}"#, 1).unwrap_err();
        assert_eq!(field_of(&err), "timestamp");
    }

    #[test]
    fn test_epoch_boundaries() {
        let at = |ts: &str| parse_record(&format!(r#"{{"id":"r","text":"x","timestamp":{}}}"#, ts), 1);

        assert_eq!(at("99999999999").unwrap().timestamp, Some(99_999_999_999_000));
        assert_eq!(at("100000000000").unwrap().timestamp, Some(100_000_000_000));
        assert_eq!(at("-99999999999").unwrap().timestamp, Some(-99_999_999_999_000));
        assert_eq!(at("1700000000.5").unwrap().timestamp, Some(1_700_000_000_000));
        assert_eq!(at("9223372036854775807").unwrap().timestamp, Some(i64::MAX));

        for bad in ["-9223372036854775808", "-1e30", "1e30", "18446744073709551615"] {
            let err = at(bad).unwrap_err();
            assert_eq!(field_of(&err), "timestamp", "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_overflowing_epoch_does_not_stop_parsing() {
        let input = "{\"id\":\"a\",\"text\":\"ok\",\"timestamp\":-9223372036854775808}\n\
                     {\"id\":\"b\",\"text\":\"fine\"}\n";
        let (results, stats) = parse_all(input);
        assert_eq!(results.len(), 2);
        assert_eq!(field_of(results[0].as_ref().unwrap_err()), "timestamp");
        assert_eq!(results[1].as_ref().unwrap().id, "b");
        assert_eq!(stats, ParseStats { read: 2, skipped: 1 });
    }

    #[test]
    fn test_per_line_isolation() {
        let input = "{\"id\":\"a\",\"text\":\"one\"}\nnot json\n\n{\"id\":\"b\",\"text\":\"two\"}\n";
        let (results, stats) = parse_all(input);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(RagError::RecordValidation { line: 2, .. })
        ));
        assert_eq!(results[2].as_ref().unwrap().id, "b");
        assert_eq!(stats, ParseStats { read: 3, skipped: 1 });
        assert_eq!(stats.accepted(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let input = "{\"id\":\"a\",\"text\":\"one\"}\n{\"id\":\"a\",\"text\":\"again\"}\n";
        let (results, stats) = parse_all(input);
        assert_eq!(field_of(results[1].as_ref().unwrap_err()), "id");
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_limit_counts_non_blank_records() {
        let input = "\n{\"id\":\"a\",\"text\":\"one\"}\n\nbad\n{\"id\":\"c\",\"text\":\"three\"}\n";
        let mut parser = RecordParser::new(Cursor::new(input)).with_limit(Some(2));
        let results: Vec<_> = parser.by_ref().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(parser.stats().read, 2);
        assert!(parser.next().is_none());
    }
}
