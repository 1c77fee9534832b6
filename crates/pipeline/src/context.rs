//! Conversation context accumulation.
//!
//! Pure functions only: the caller owns the context and gets the updated
//! value back.

use crate::types::{ConversationContext, JsonMap};
use serde_json::{Number, Value};

/// Number of raw questions kept in `history`.
pub const HISTORY_LIMIT: usize = 10;

/// Tokens of this many characters or fewer are not keywords.
const MIN_KEYWORD_CHARS: usize = 3;

const COUNTER_HINTS: &[&str] = &["count", "size", "total"];
const ADDITIVE_CUES: &[&str] = &["another", "more", "additional", "extra"];
const CORRECTING_CUES: &[&str] = &["actually", "total"];

/// Fold a new question into the context with the default history bound.
pub fn accumulate(prior: ConversationContext, question: &str) -> ConversationContext {
    accumulate_bounded(prior, question, HISTORY_LIMIT)
}

/// Fold a new question into the context, keeping at most `limit` history entries.
pub fn accumulate_bounded(
    mut prior: ConversationContext,
    question: &str,
    limit: usize,
) -> ConversationContext {
    prior.history.push(question.to_string());
    if prior.history.len() > limit {
        let excess = prior.history.len() - limit;
        prior.history.drain(..excess);
    }

    for token in tokenize(question) {
        if !prior.keywords.contains(&token) {
            prior.keywords.push(token);
        }
    }

    prior.last_question = Some(question.to_string());
    prior
}

/// Lower-case, strip punctuation, split on whitespace and keep tokens longer
/// than three characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_KEYWORD_CHARS)
        .map(str::to_string)
        .collect()
}

/// Merge extracted facts into the known facts.
///
/// Arrays are unioned, numeric counters (keys containing `count`, `size` or
/// `total`) are summed when the question reads as an increment, everything
/// else is replaced.
pub fn merge_facts(mut facts: JsonMap, updates: JsonMap, question: &str) -> JsonMap {
    let words = cue_words(question);
    let additive = ADDITIVE_CUES.iter().any(|c| words.iter().any(|w| w == c))
        && !CORRECTING_CUES.iter().any(|c| words.iter().any(|w| w == c));

    for (key, update) in updates {
        let merged = match (facts.remove(&key), update) {
            (Some(Value::Array(mut existing)), Value::Array(incoming)) => {
                for item in incoming {
                    if !existing.contains(&item) {
                        existing.push(item);
                    }
                }
                Value::Array(existing)
            }
            (Some(Value::Number(old)), Value::Number(new)) if additive && is_counter(&key) => {
                add_numbers(&old, &new).unwrap_or(Value::Number(new))
            }
            (_, update) => update,
        };
        facts.insert(key, merged);
    }

    facts
}

fn is_counter(key: &str) -> bool {
    let key = key.to_lowercase();
    COUNTER_HINTS.iter().any(|hint| key.contains(hint))
}

fn cue_words(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn add_numbers(old: &Number, new: &Number) -> Option<Value> {
    if let (Some(a), Some(b)) = (old.as_i64(), new.as_i64()) {
        return a.checked_add(b).map(Value::from);
    }
    let sum = old.as_f64()? + new.as_f64()?;
    Number::from_f64(sum).map(Value::Number)
}
