//! Follow-up question rewriting.

use crate::deadline;
use crate::reasoning::ReasoningService;
use crate::types::ChatTurn;
use std::time::Duration;

/// Resolve an elliptical question into a standalone search query.
///
/// Never fails: without history, or when the model call fails or returns
/// something unusable, the raw question is returned.
pub async fn rewrite(
    reasoner: &dyn ReasoningService,
    history: &[ChatTurn],
    question: &str,
    max_turns: usize,
    timeout: Duration,
) -> String {
    let turns: Vec<ChatTurn> = history
        .iter()
        .filter(|t| !t.content.trim().is_empty())
        .cloned()
        .collect();
    if turns.is_empty() || max_turns == 0 {
        return question.to_string();
    }
    let recent = &turns[turns.len().saturating_sub(max_turns)..];

    match deadline::within(timeout, "rewrite", reasoner.rewrite(recent, question)).await {
        Ok(raw) => match clean_rewrite(&raw) {
            Some(rewritten) => {
                tracing::debug!("Rewrote '{}' -> '{}'", question, rewritten);
                rewritten
            }
            None => {
                tracing::warn!("Rewrite returned no usable text, keeping raw question");
                question.to_string()
            }
        },
        Err(e) => {
            tracing::warn!("Rewrite failed, keeping raw question: {}", e);
            question.to_string()
        }
    }
}

/// First non-empty line, trimmed, with surrounding quotes removed.
pub fn clean_rewrite(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let unquoted = line
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '“' | '”'))
        .trim();
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}
