//! Result interpretation and answer aggregation.
//!
//! Precedence for batched answers:
//! 1. count: one-sentence numeric answer
//! 2. list: structured summary leads
//! 3. FAQ matches only
//! 4. list or count with FAQ matches: structured first, FAQ as support
//! 5. nothing: unavailable, answered without a model call
//!
//! Raw records are returned alongside a `text+collection` answer but never
//! inside the text itself.

use crate::deadline;
use crate::reasoning::{ReasoningService, SynthesisInput};
use crate::stream::StreamChannel;
use crate::types::{AskResponse, FaqMatch, JsonMap, RetrievalResult};
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;

/// Answer when neither source covers the question.
pub const UNAVAILABLE_ANSWER: &str =
    "Sorry, I don't have information about that right now.";

/// Answer when the pipeline itself fails.
pub const GENERIC_ERROR_ANSWER: &str =
    "Sorry, something went wrong while answering your question.";

/// Summarize a structured result. `None` when there is nothing to summarize.
pub async fn interpret(
    reasoner: &dyn ReasoningService,
    question: &str,
    result: &RetrievalResult,
    timeout: Duration,
) -> Option<String> {
    if result.is_none() {
        return None;
    }

    match deadline::within(timeout, "summarize", reasoner.summarize(question, result)).await {
        Ok(text) => match usable_text(&text) {
            Some(summary) => Some(summary),
            None => {
                tracing::warn!("Summary was empty or raw JSON, using fallback");
                fallback_summary(result)
            }
        },
        Err(e) => {
            tracing::warn!("Summarize failed, using fallback: {}", e);
            fallback_summary(result)
        }
    }
}

/// Deterministic summary of a structured result.
pub fn fallback_summary(result: &RetrievalResult) -> Option<String> {
    match result {
        RetrievalResult::Count { collection, value } => Some(format!(
            "There {} {} matching {} {}.",
            if *value == 1 { "is" } else { "are" },
            value,
            collection,
            if *value == 1 { "record" } else { "records" }
        )),
        RetrievalResult::List {
            collection, items, ..
        } if items.is_empty() => Some(format!("No matching {} records were found.", collection)),
        RetrievalResult::List {
            collection, items, ..
        } => Some(format!("Found {} {} records.", items.len(), collection)),
        RetrievalResult::None => None,
    }
}

/// Build the final batched answer.
pub async fn synthesize(
    reasoner: &dyn ReasoningService,
    question: &str,
    structured: &RetrievalResult,
    summary: Option<&str>,
    faq: &[FaqMatch],
    facts: &JsonMap,
    timeout: Duration,
) -> AskResponse {
    if structured.is_none() && faq.is_empty() {
        tracing::info!("No structured result and no FAQ coverage");
        return AskResponse::text(UNAVAILABLE_ANSWER);
    }

    let input = SynthesisInput {
        question,
        structured,
        summary,
        faq,
        facts,
    };

    let content = match deadline::within(timeout, "synthesize", reasoner.synthesize(input)).await {
        Ok(text) => usable_text(&text),
        Err(e) => {
            tracing::warn!("Synthesis failed, assembling answer directly: {}", e);
            None
        }
    }
    .unwrap_or_else(|| deterministic_answer(structured, summary, faq));

    match structured {
        RetrievalResult::List {
            collection,
            schema,
            items,
        } => AskResponse::TextCollection {
            content,
            title: collection.clone(),
            schema: schema.clone(),
            items: items.clone(),
        },
        _ => AskResponse::text(content),
    }
}

/// Answer assembled without a model, following the same precedence.
pub fn deterministic_answer(
    structured: &RetrievalResult,
    summary: Option<&str>,
    faq: &[FaqMatch],
) -> String {
    let lead = match structured {
        RetrievalResult::Count { .. } => fallback_summary(structured),
        RetrievalResult::List { .. } => summary
            .map(str::to_string)
            .or_else(|| fallback_summary(structured)),
        RetrievalResult::None => None,
    };

    lead.or_else(|| faq.first().map(|m| m.answer.trim().to_string()))
        .unwrap_or_else(|| UNAVAILABLE_ANSWER.to_string())
}

/// Stream an FAQ-grounded answer into `channel`.
///
/// Always ends the channel with exactly one `done`. Without matches the
/// unavailable answer is sent as a single token; if the stream cannot be
/// opened the best FAQ answer is sent verbatim.
pub async fn stream_faq_answer(
    reasoner: &dyn ReasoningService,
    question: &str,
    faq: &[FaqMatch],
    facts: &JsonMap,
    timeout: Duration,
    mut channel: StreamChannel,
) {
    if faq.is_empty() {
        channel.send_token(UNAVAILABLE_ANSWER);
        channel.finish();
        return;
    }

    let opened = deadline::within(
        timeout,
        "answer stream",
        reasoner.stream_answer(question, faq, facts),
    )
    .await;

    let mut tokens = match opened {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("Could not open answer stream, sending best FAQ answer: {}", e);
            channel.send_token(faq[0].answer.trim());
            channel.finish();
            return;
        }
    };

    let mut forwarded = 0usize;
    loop {
        let token = match tokio::time::timeout(timeout, tokens.next()).await {
            Ok(Some(token)) => token,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    "Answer stream stalled for {}s after {} tokens",
                    timeout.as_secs(),
                    forwarded
                );
                break;
            }
        };
        match token {
            Ok(value) => {
                channel.send_token(value);
                forwarded += 1;
            }
            Err(e) => {
                tracing::warn!("Answer stream failed after {} tokens: {}", forwarded, e);
                break;
            }
        }
        if channel.is_closed() {
            tracing::debug!("Caller disconnected, stopping answer stream");
            break;
        }
    }

    tracing::debug!("Streamed {} tokens", forwarded);
    channel.finish();
}

/// Trimmed model text, or `None` if it is empty or a raw JSON document.
fn usable_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return None;
    }
    Some(trimmed.to_string())
}
