//! Answer synthesis: prompt assembly and the fragment pump.
//!
//! The engine's state machine decides which prompt to build (casual, or
//! context-grounded with a labeled source); this module builds it and
//! pumps the model's streamed fragments into the answer channel. Any
//! unrecoverable failure collapses to a single error-describing fragment —
//! chat queries always produce some text.

use futures_util::StreamExt;
use tokio::sync::mpsc::Sender;
use tracing::{debug, warn};

use crate::models::{ChatMessage, ConversationTurn};
use crate::traits::ChatModel;

/// Where the answer context came from; labeled in the prompt so the model
/// attributes it honestly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    KnowledgeBase,
    WebSearch,
}

impl ContextSource {
    pub fn label(self) -> &'static str {
        match self {
            ContextSource::KnowledgeBase => "Knowledge Base",
            ContextSource::WebSearch => "Web Search",
        }
    }
}

const CASUAL_SYSTEM_PROMPT: &str = "You are a friendly personal assistant. \
Respond naturally and briefly to the user's message, keeping the tone warm \
and conversational.";

/// Build the prompt for the casual path: history plus the query, no
/// retrieved context.
pub fn casual_prompt(query: &str, history: &[ConversationTurn]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(CASUAL_SYSTEM_PROMPT)];
    push_history(&mut messages, history);
    messages.push(ChatMessage::user(query));
    messages
}

/// Build the prompt for a context-grounded answer: current date, labeled
/// context source, context text, history, and the literal query.
pub fn context_prompt(
    query: &str,
    source: ContextSource,
    context: &str,
    history: &[ConversationTurn],
    current_date: &str,
) -> Vec<ChatMessage> {
    let system = format!(
        "You are an intelligent personal assistant. Today's date is {date}. \
Your goal is to explain the answer clearly and structurally based on the context provided.\n\
\n\
Guidelines:\n\
1. Use **bold text** for key terms or headings.\n\
2. Use bullet points or numbered lists for steps and details.\n\
3. If the context doesn't contain the answer, say \"I couldn't find that in your documents.\"\n\
4. Keep the tone professional but friendly.\n\
\n\
Context source: {label}\n\
Context:\n{context}",
        date = current_date,
        label = source.label(),
        context = context,
    );

    let mut messages = vec![ChatMessage::system(system)];
    push_history(&mut messages, history);
    messages.push(ChatMessage::user(query));
    messages
}

fn push_history(messages: &mut Vec<ChatMessage>, history: &[ConversationTurn]) {
    for turn in history {
        if turn.is_user {
            messages.push(ChatMessage::user(&turn.text));
        } else {
            messages.push(ChatMessage::assistant(&turn.text));
        }
    }
}

/// Stream the model's answer for `messages` into `tx`.
///
/// Terminates normally when the model finishes; if the call or the stream
/// fails, a single error-describing fragment is emitted instead. A closed
/// channel (consumer gone) ends the pump silently.
pub async fn pump_answer(
    model: &dyn ChatModel,
    messages: &[ChatMessage],
    temperature: f32,
    tx: Sender<String>,
) {
    let mut stream = match model.stream(messages, temperature).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "answer synthesis call failed");
            let _ = tx
                .send(format!("I ran into a problem answering that: {}", e))
                .await;
            return;
        }
    };

    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(text) => {
                if tx.send(text).await.is_err() {
                    debug!("answer consumer dropped mid-stream");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "answer stream broke mid-synthesis");
                let _ = tx
                    .send(format!("I ran into a problem answering that: {}", e))
                    .await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use futures_util::stream::BoxStream;

    #[test]
    fn context_prompt_carries_query_context_and_label() {
        let messages = context_prompt(
            "What is the capital of Laurania?",
            ContextSource::KnowledgeBase,
            "The capital of Laurania is Fendale.",
            &[],
            "2026-08-27",
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Knowledge Base"));
        assert!(messages[0].content.contains("Fendale"));
        assert!(messages[0].content.contains("2026-08-27"));
        assert_eq!(messages[1].content, "What is the capital of Laurania?");
    }

    #[test]
    fn history_is_interleaved_in_order() {
        let history = vec![
            ConversationTurn {
                is_user: true,
                text: "hello".to_string(),
                timestamp: Utc::now(),
            },
            ConversationTurn {
                is_user: false,
                text: "hi!".to_string(),
                timestamp: Utc::now(),
            },
        ];
        let messages = casual_prompt("how are you?", &history);
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "hello");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "how are you?");
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(&self, _m: &[ChatMessage], _t: f32) -> Result<String> {
            anyhow::bail!("unused")
        }
        async fn stream(
            &self,
            _m: &[ChatMessage],
            _t: f32,
        ) -> Result<BoxStream<'static, Result<String>>> {
            anyhow::bail!("model unreachable")
        }
    }

    #[tokio::test]
    async fn failed_synthesis_yields_single_error_fragment() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        pump_answer(&FailingModel, &[], 0.3, tx).await;

        let fragment = rx.recv().await.unwrap();
        assert!(fragment.contains("problem answering"));
        assert!(rx.recv().await.is_none());
    }
}
