//! Intent routing and relevance grading.
//!
//! Both are single low-temperature language-model calls with strict label
//! instructions, and both have documented failure defaults: a failed
//! classification falls back to the query path (the more thorough one),
//! and a failed grading trusts retrieval (avoiding an unnecessary web
//! call — a latency/cost trade-off, not a correctness guarantee).
//!
//! Routing is purely model-based; there is deliberately no keyword
//! special-casing.

use tracing::warn;

use crate::models::{ChatMessage, Intent};
use crate::traits::ChatModel;

pub const CLASSIFY_SYSTEM_PROMPT: &str = "You are an intent classifier for an assistant. \
Decide whether the user's message is casual conversation (greetings, small talk, chit-chat, \
thanks) or an information request that needs looking something up. \
Reply with exactly one of the two labels: CASUAL or QUERY. Reply with the label only.";

pub const GRADE_SYSTEM_PROMPT: &str = "You judge whether retrieved context can plausibly \
answer a question. Reply strictly with yes or no, nothing else.";

/// Classify a query as casual conversation or an information request.
/// Any model failure defaults to [`Intent::Query`].
pub async fn classify_intent(model: &dyn ChatModel, query: &str, temperature: f32) -> Intent {
    let messages = [
        ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
        ChatMessage::user(query),
    ];
    match model.complete(&messages, temperature).await {
        Ok(reply) => {
            if reply.to_ascii_lowercase().contains("casual") {
                Intent::Casual
            } else {
                Intent::Query
            }
        }
        Err(e) => {
            warn!(error = %e, "intent classification failed; defaulting to query path");
            Intent::Query
        }
    }
}

/// Judge whether `context` plausibly answers `query`. The context is
/// truncated to `max_context_chars` before being shown to the model. Any
/// model failure defaults to `true` (trust retrieval).
pub async fn grade_relevance(
    model: &dyn ChatModel,
    query: &str,
    context: &str,
    max_context_chars: usize,
    temperature: f32,
) -> bool {
    let shown = truncate_chars(context, max_context_chars);
    let messages = [
        ChatMessage::system(GRADE_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion: {}\n\nCan the context answer the question? yes or no:",
            shown, query
        )),
    ];
    match model.complete(&messages, temperature).await {
        // The verdict is the reply's first word; a substring scan would
        // read "no" out of words like "cannot" or "unknown".
        Ok(reply) => match first_word(&reply).as_deref() {
            Some("yes") => true,
            Some("no") => false,
            _ => true,
        },
        Err(e) => {
            warn!(error = %e, "relevance grading failed; trusting retrieval");
            true
        }
    }
}

fn first_word(reply: &str) -> Option<String> {
    reply
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
