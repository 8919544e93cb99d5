//! Answer generation over an assembled context

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::config::GenerationConfig;
use crate::errors::{Dependency, RagError, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::rag::context::AssembledContext;
use crate::retry::RetryManager;
use crate::types::Answer;

/// Reply used when retrieval found nothing to ground an answer on
pub const NO_RELEVANT_REVIEWS: &str = "No relevant reviews were found for this question.";

const SYSTEM_PROMPT: &str = "You answer questions about products using only the customer reviews provided. \
Cite every review you rely on with its bracketed number, for example [1] or [2]. \
Do not cite numbers that are not listed. \
If the reviews do not contain the answer, say so.";

/// Leading query characters kept ahead of any context block
pub const MIN_QUERY_CHARS: usize = 200;

/// Characters the system prompt and the user prompt template take on their own
pub fn prompt_overhead() -> usize {
    SYSTEM_PROMPT.chars().count() + render_prompt("", "").chars().count()
}

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("static regex"))
}

/// Prompt construction, model call and citation mapping
pub struct AnswerOrchestrator {
    generator: Arc<dyn Generator>,
    retry: RetryManager,
    temperature: f32,
    max_tokens: u32,
    max_prompt_chars: usize,
}

impl AnswerOrchestrator {
    pub fn new(generator: Arc<dyn Generator>, config: &GenerationConfig, retry: RetryManager) -> Self {
        Self {
            generator,
            retry,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_prompt_chars: config.max_prompt_chars,
        }
    }

    /// Request for `query` over `context`, with the context it was built from.
    ///
    /// The system prompt plus the user prompt stay within `max_prompt_chars`.
    /// The first `MIN_QUERY_CHARS` of the query take precedence over context:
    /// lowest-ranked blocks are dropped to make room for them, and only then
    /// is the rest of the query cut.
    pub fn build_request(
        &self,
        query: &str,
        context: &AssembledContext,
    ) -> (GenerationRequest, AssembledContext) {
        let overhead = prompt_overhead();
        let query = query.trim();
        let query_chars = query.chars().count();

        let reserved = overhead + query_chars.min(MIN_QUERY_CHARS);
        let mut fitted = context.clone();
        fitted.shrink_to(self.max_prompt_chars.saturating_sub(reserved));
        if fitted.entries.len() < context.entries.len() {
            tracing::warn!(
                kept = fitted.entries.len(),
                dropped = context.entries.len() - fitted.entries.len(),
                "context blocks dropped to fit the prompt"
            );
        }

        let room = self
            .max_prompt_chars
            .saturating_sub(overhead + fitted.text.chars().count());
        let query: String = if query_chars > room {
            tracing::warn!(query_chars, kept = room, "query truncated to fit the prompt");
            query.chars().take(room).collect()
        } else {
            query.to_string()
        };

        let request = GenerationRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: render_prompt(&query, &fitted.text),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        (request, fitted)
    }

    /// Generate an answer whose citations all point into `context`
    pub async fn answer(&self, query: &str, context: &AssembledContext) -> Result<Answer> {
        let (request, context) = self.build_request(query, context);
        if context.is_empty() {
            return Ok(Answer {
                text: NO_RELEVANT_REVIEWS.to_string(),
                ..Answer::default()
            });
        }

        let request = &request;
        let generator = self.generator.as_ref();
        let reply = self
            .retry
            .execute_with_retry(Dependency::Generation, || async move {
                let raw = generator.generate(request).await?;
                let cleaned = clean_reply(&raw);
                if cleaned.is_empty() {
                    return Err(RagError::Generic(format!(
                        "{} returned an empty reply",
                        generator.name()
                    )));
                }
                Ok(cleaned)
            })
            .await?;

        let answer = resolve_citations(&reply, &context);
        if !answer.rejected_tags.is_empty() {
            tracing::warn!(rejected = ?answer.rejected_tags, "model cited passages outside the context");
        }
        Ok(answer)
    }
}

fn render_prompt(query: &str, context: &str) -> String {
    format!(
        "Reviews:\n\n{}\n\nQuestion: {}\n\nAnswer using only the reviews above and cite them as [n].",
        context, query
    )
}

/// Strip surrounding code fences and quotes from a model reply
pub fn clean_reply(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the language hint on the opening fence
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end().strip_suffix("```").unwrap_or(text).trim();
    }

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
        }
    }

    text.to_string()
}

/// Map `[n]` markers through the context's tag table. Unknown markers are
/// removed from the text and listed as rejected.
pub fn resolve_citations(reply: &str, context: &AssembledContext) -> Answer {
    let mut answer = Answer::default();
    let mut cited = HashSet::new();
    let mut rejected = HashSet::new();
    let mut text = String::with_capacity(reply.len());
    let mut cursor = 0;

    for captures in citation_pattern().captures_iter(reply) {
        let Some(marker) = captures.get(0) else {
            continue;
        };
        text.push_str(&reply[cursor..marker.start()]);
        cursor = marker.end();

        let citation = captures[1]
            .parse::<usize>()
            .ok()
            .and_then(|tag| context.citation_for(tag));

        match citation {
            Some(citation) => {
                text.push_str(marker.as_str());
                if cited.insert(citation.tag) {
                    answer.citations.push(citation);
                }
            }
            None => {
                let next = reply[cursor..].chars().next();
                if text.ends_with(' ') && next.map_or(true, |c| c.is_whitespace() || c.is_ascii_punctuation()) {
                    text.pop();
                }
                if rejected.insert(marker.as_str().to_string()) {
                    answer.rejected_tags.push(marker.as_str().to_string());
                }
            }
        }
    }
    text.push_str(&reply[cursor..]);

    answer.text = text.trim().to_string();
    answer
}
